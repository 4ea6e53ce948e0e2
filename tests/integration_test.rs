//! 整合測試 - 以記憶體中的假媒體層驗證完整擷取流程
//!
//! 不需要 ffmpeg：假媒體層記錄每次呼叫，並寫出空白片段檔讓編號可以接續。

use std::cell::RefCell;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use anyhow::{Result, bail};
use image::{Rgb, RgbImage};
use tempfile::TempDir;
use video_chunk_grid::component::chunk_extractor::{
    ChunkExtractor, ExtractorConfig, GridStyle, discover_sources, order_by_capture_key,
};
use video_chunk_grid::tools::{ClipRequest, FrameMap, MediaBackend, MediaHandle};

const FRAME_WIDTH: u32 = 60;
const FRAME_HEIGHT: u32 = 30;
const WHITE: Rgb<u8> = Rgb([255, 255, 255]);

#[derive(Debug, Default)]
struct Journal {
    opened: Vec<MediaHandle>,
    closed: Vec<MediaHandle>,
    frames: Vec<(f64, i32)>,
    clips: Vec<ClipRequest>,
    clip_frames: Vec<RgbImage>,
}

struct FakeBackend {
    durations_by_name: HashMap<String, f64>,
    durations: HashMap<MediaHandle, f64>,
    journal: Rc<RefCell<Journal>>,
    next_id: usize,
    fail_open: Option<String>,
    fail_clip_at: Option<usize>,
}

impl FakeBackend {
    fn new(files: &[(&str, f64)]) -> (Self, Rc<RefCell<Journal>>) {
        let journal = Rc::new(RefCell::new(Journal::default()));
        let backend = Self {
            durations_by_name: files
                .iter()
                .map(|(name, duration)| ((*name).to_string(), *duration))
                .collect(),
            durations: HashMap::new(),
            journal: Rc::clone(&journal),
            next_id: 0,
            fail_open: None,
            fail_clip_at: None,
        };
        (backend, journal)
    }

    fn allocate(&mut self, duration: f64) -> MediaHandle {
        let handle = MediaHandle::new(self.next_id);
        self.next_id += 1;
        self.durations.insert(handle, duration);
        self.journal.borrow_mut().opened.push(handle);
        handle
    }
}

impl MediaBackend for FakeBackend {
    fn open(&mut self, path: &Path) -> Result<MediaHandle> {
        let name = path.file_name().unwrap().to_string_lossy().to_string();
        if self.fail_open.as_deref() == Some(name.as_str()) {
            bail!("cannot decode {name}");
        }
        let Some(duration) = self.durations_by_name.get(&name).copied() else {
            bail!("unknown source {name}");
        };
        Ok(self.allocate(duration))
    }

    fn duration(&self, handle: MediaHandle) -> Result<f64> {
        match self.durations.get(&handle) {
            Some(duration) => Ok(*duration),
            None => bail!("unknown handle {handle:?}"),
        }
    }

    fn concatenate(&mut self, handles: &[MediaHandle]) -> Result<MediaHandle> {
        let total = handles
            .iter()
            .map(|h| self.duration(*h))
            .sum::<Result<f64>>()?;
        Ok(self.allocate(total))
    }

    fn frame_at(&mut self, _handle: MediaHandle, t: f64, rotate_degrees: i32) -> Result<RgbImage> {
        self.journal.borrow_mut().frames.push((t, rotate_degrees));
        Ok(RgbImage::from_pixel(FRAME_WIDTH, FRAME_HEIGHT, WHITE))
    }

    fn write_clip(
        &mut self,
        _handle: MediaHandle,
        request: &ClipRequest,
        frame_map: &mut FrameMap<'_>,
        output_path: &Path,
    ) -> Result<()> {
        let clip_number = self.journal.borrow().clips.len();
        if self.fail_clip_at == Some(clip_number) {
            bail!("encoder crashed");
        }

        let mut frame = RgbImage::from_pixel(FRAME_WIDTH, FRAME_HEIGHT, WHITE);
        frame_map(&mut frame);
        fs::write(output_path, b"")?;

        let mut journal = self.journal.borrow_mut();
        journal.clips.push(request.clone());
        journal.clip_frames.push(frame);
        Ok(())
    }

    fn close(&mut self, handle: MediaHandle) {
        self.journal.borrow_mut().closed.push(handle);
    }
}

fn extractor_config(root: &Path) -> ExtractorConfig {
    ExtractorConfig {
        screenshot_dir: root.join("screenshots"),
        clip_dir: root.join("30_second_video_segment"),
        rotate_degrees: 0,
        start_offset: 0,
        clip_duration: 30,
        interval: 300,
        output_height: 1080,
        output_fps: 15,
        video_codec: "libx264".to_string(),
        grid: GridStyle::default(),
    }
}

const LONG_SOURCE: &str = "DJI_20240601093000_0007_D.MP4";
const SHORT_SOURCE: &str = "DJI_20240601094500_0008_D.MP4";

fn two_sources() -> Vec<PathBuf> {
    // 列舉順序與拍攝順序相反，確認會依拍攝時間重新排序
    vec![PathBuf::from(SHORT_SOURCE), PathBuf::from(LONG_SOURCE)]
}

fn sorted_names(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = fs::read_dir(dir)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
        .collect();
    names.sort();
    names
}

fn assert_all_released(journal: &Journal) {
    let mut opened = journal.opened.clone();
    let mut closed = journal.closed.clone();
    opened.sort_by_key(|h| h.id());
    closed.sort_by_key(|h| h.id());
    assert_eq!(opened, closed, "每個開啟的控制代碼都要剛好釋放一次");
}

/// 測試 1: 兩個來源（400s + 200s）每 300 秒擷取 30 秒
#[test]
fn test_two_source_timeline_extraction() {
    let temp_dir = TempDir::new().unwrap();
    let (backend, journal) = FakeBackend::new(&[(LONG_SOURCE, 400.0), (SHORT_SOURCE, 200.0)]);

    let extractor = ChunkExtractor::prepare(
        backend,
        order_by_capture_key(two_sources()),
        extractor_config(temp_dir.path()),
    )
    .unwrap();

    assert!((extractor.timeline().total_duration() - 600.0).abs() < f64::EPSILON);
    assert_eq!(extractor.next_screenshot_index(), 1);
    assert_eq!(extractor.next_clip_index(), 1);

    let summary = extractor.run().unwrap();

    assert_eq!(summary.outcomes.len(), 2);
    let first = &summary.outcomes[0];
    assert_eq!(first.chunk.global_start, 0.0);
    assert_eq!(first.chunk.global_end, 30.0);
    assert_eq!(first.source_index, 0);
    assert_eq!(first.local_offset, 0.0);

    let second = &summary.outcomes[1];
    assert_eq!(second.chunk.global_start, 300.0);
    assert_eq!(second.chunk.global_end, 330.0);
    assert_eq!(second.source_index, 0);
    assert_eq!(second.local_offset, 300.0);

    assert_eq!(
        sorted_names(&temp_dir.path().join("screenshots")),
        vec![
            "screen1_timestamp_000000_source_index_0007_no_0001.jpg",
            "screen2_timestamp_000500_source_index_0007_no_0002.jpg",
        ]
    );
    assert_eq!(
        sorted_names(&temp_dir.path().join("30_second_video_segment")),
        vec![
            "clip1_timestamp_000000_source_index_0007_no_0001.mp4",
            "clip2_timestamp_000500_source_index_0007_no_0002.mp4",
        ]
    );

    let journal = journal.borrow();
    assert_eq!(journal.frames, vec![(0.0, 0), (300.0, 0)]);
    assert_eq!(journal.clips.len(), 2);
    assert_eq!(journal.clips[1].start, 300.0);
    assert_eq!(journal.clips[1].end, 330.0);
    assert_eq!(journal.clips[1].output_fps, 15);
    assert_all_released(&journal);
}

/// 測試 2: 截圖為旋轉後影格加上網格的 JPEG
#[test]
fn test_screenshot_has_grid_and_rotation_request() {
    let temp_dir = TempDir::new().unwrap();
    let (backend, journal) = FakeBackend::new(&[(LONG_SOURCE, 100.0)]);
    let config = ExtractorConfig {
        rotate_degrees: 90,
        ..extractor_config(temp_dir.path())
    };

    let summary = ChunkExtractor::prepare(
        backend,
        order_by_capture_key(vec![PathBuf::from(LONG_SOURCE)]),
        config,
    )
    .unwrap()
    .run()
    .unwrap();

    assert_eq!(journal.borrow().frames, vec![(0.0, 90)]);

    let screenshot = image::open(&summary.outcomes[0].screenshot_path)
        .unwrap()
        .to_rgb8();
    assert_eq!(screenshot.dimensions(), (FRAME_WIDTH, FRAME_HEIGHT));
    // 分割線附近為灰色，JPEG 有損，只比較大致亮度
    assert!(screenshot.get_pixel(20, 5)[0] < 160);
    assert!(screenshot.get_pixel(10, 5)[0] > 200);
}

/// 測試 3: 子片段的每一幀都套用網格
#[test]
fn test_clip_frames_have_grid() {
    let temp_dir = TempDir::new().unwrap();
    let (backend, journal) = FakeBackend::new(&[(LONG_SOURCE, 100.0)]);

    ChunkExtractor::prepare(
        backend,
        order_by_capture_key(vec![PathBuf::from(LONG_SOURCE)]),
        extractor_config(temp_dir.path()),
    )
    .unwrap()
    .run()
    .unwrap();

    let journal = journal.borrow();
    let frame = &journal.clip_frames[0];
    assert_eq!(*frame.get_pixel(20, 5), Rgb([80, 80, 80]));
    assert_eq!(*frame.get_pixel(40, 25), Rgb([80, 80, 80]));
    assert_eq!(*frame.get_pixel(30, 10), Rgb([80, 80, 80]));
    assert_eq!(*frame.get_pixel(5, 5), WHITE);
}

/// 測試 4: 既有輸出時從最大編號之後接續
#[test]
fn test_resume_numbering_from_existing_outputs() {
    let temp_dir = TempDir::new().unwrap();
    let screenshot_dir = temp_dir.path().join("screenshots");
    fs::create_dir_all(&screenshot_dir).unwrap();
    for i in 1..=5 {
        fs::write(
            screenshot_dir.join(format!(
                "screen{i}_timestamp_000000_source_index_0001_no_{i:04}.jpg"
            )),
            b"",
        )
        .unwrap();
    }

    let (backend, _journal) = FakeBackend::new(&[(LONG_SOURCE, 100.0)]);
    let extractor = ChunkExtractor::prepare(
        backend,
        order_by_capture_key(vec![PathBuf::from(LONG_SOURCE)]),
        extractor_config(temp_dir.path()),
    )
    .unwrap();

    assert_eq!(extractor.next_screenshot_index(), 6);
    assert_eq!(extractor.next_clip_index(), 1);

    let summary = extractor.run().unwrap();
    assert_eq!(
        summary.outcomes[0].screenshot_path.file_name().unwrap(),
        "screen6_timestamp_000000_source_index_0007_no_0006.jpg"
    );
}

/// 測試 5: 重複執行不覆蓋前一次的輸出
#[test]
fn test_second_run_never_overwrites() {
    let temp_dir = TempDir::new().unwrap();

    for _ in 0..2 {
        let (backend, _journal) = FakeBackend::new(&[(LONG_SOURCE, 400.0), (SHORT_SOURCE, 200.0)]);
        ChunkExtractor::prepare(
            backend,
            order_by_capture_key(two_sources()),
            extractor_config(temp_dir.path()),
        )
        .unwrap()
        .run()
        .unwrap();
    }

    let clips = sorted_names(&temp_dir.path().join("30_second_video_segment"));
    assert_eq!(clips.len(), 4);
    assert!(clips[3].ends_with("_no_0004.mp4"));
}

/// 測試 6: 起始時間跨入第二個來源
#[test]
fn test_start_offset_in_second_source() {
    let temp_dir = TempDir::new().unwrap();
    let (backend, _journal) = FakeBackend::new(&[(LONG_SOURCE, 400.0), (SHORT_SOURCE, 200.0)]);
    let config = ExtractorConfig {
        start_offset: 450,
        ..extractor_config(temp_dir.path())
    };

    let summary = ChunkExtractor::prepare(backend, order_by_capture_key(two_sources()), config)
        .unwrap()
        .run()
        .unwrap();

    assert_eq!(summary.outcomes.len(), 1);
    assert_eq!(summary.outcomes[0].source_index, 1);
    assert_eq!(summary.outcomes[0].local_offset, 50.0);
    assert_eq!(
        summary.outcomes[0].clip_path.file_name().unwrap(),
        "clip1_timestamp_000050_source_index_0008_no_0001.mp4"
    );
}

/// 測試 7: 來源開啟失敗時釋放已開啟的控制代碼
#[test]
fn test_open_failure_releases_handles() {
    let temp_dir = TempDir::new().unwrap();
    let (mut backend, journal) = FakeBackend::new(&[(LONG_SOURCE, 400.0), (SHORT_SOURCE, 200.0)]);
    backend.fail_open = Some(SHORT_SOURCE.to_string());

    let result = ChunkExtractor::prepare(
        backend,
        order_by_capture_key(two_sources()),
        extractor_config(temp_dir.path()),
    );

    assert!(result.is_err());
    let journal = journal.borrow();
    assert_eq!(journal.opened.len(), 1);
    assert_all_released(&journal);
}

/// 測試 8: 輸出中途失敗時中止並釋放所有控制代碼
#[test]
fn test_clip_failure_aborts_and_releases() {
    let temp_dir = TempDir::new().unwrap();
    let (mut backend, journal) =
        FakeBackend::new(&[(LONG_SOURCE, 400.0), (SHORT_SOURCE, 200.0)]);
    backend.fail_clip_at = Some(1);

    let result = ChunkExtractor::prepare(
        backend,
        order_by_capture_key(two_sources()),
        extractor_config(temp_dir.path()),
    )
    .unwrap()
    .run();

    assert!(result.is_err());
    let journal = journal.borrow();
    assert_eq!(journal.clips.len(), 1);
    // 來源兩個 + 串接一個
    assert_eq!(journal.opened.len(), 3);
    assert_all_released(&journal);
}

/// 測試 9: 沒有來源時回報錯誤
#[test]
fn test_empty_sources_is_error() {
    let temp_dir = TempDir::new().unwrap();
    let (backend, journal) = FakeBackend::new(&[]);

    let result = ChunkExtractor::prepare(backend, Vec::new(), extractor_config(temp_dir.path()));

    assert!(result.is_err());
    assert!(journal.borrow().opened.is_empty());
}

/// 測試 10: 提早丟棄擷取器也會釋放控制代碼
#[test]
fn test_drop_without_run_releases_handles() {
    let temp_dir = TempDir::new().unwrap();
    let (backend, journal) = FakeBackend::new(&[(LONG_SOURCE, 400.0)]);

    let extractor = ChunkExtractor::prepare(
        backend,
        order_by_capture_key(vec![PathBuf::from(LONG_SOURCE)]),
        extractor_config(temp_dir.path()),
    )
    .unwrap();
    drop(extractor);

    assert_all_released(&journal.borrow());
}

/// 測試 11: 掃描資料夾後依拍攝時間排序
#[test]
fn test_discover_and_order_sources() {
    let temp_dir = TempDir::new().unwrap();
    for name in [
        "DJI_20240601110000_0003_D.MP4",
        "DJI_20240601100000_0002_D.mp4",
        "._DJI_20240601090000_0001_D.MP4",
        "notes.txt",
        "DJI_20240601080000_0009_D.MOV",
    ] {
        fs::write(temp_dir.path().join(name), b"").unwrap();
    }
    fs::create_dir(temp_dir.path().join("nested.mp4")).unwrap();

    let sources = order_by_capture_key(discover_sources(temp_dir.path(), "mp4").unwrap());

    let names: Vec<String> = sources
        .iter()
        .map(|s| s.path.file_name().unwrap().to_string_lossy().to_string())
        .collect();
    assert_eq!(
        names,
        vec![
            "DJI_20240601100000_0002_D.mp4",
            "DJI_20240601110000_0003_D.MP4",
        ]
    );
    assert_eq!(sources[0].source_id.as_str(), "0002");
    assert_eq!(sources[1].capture_key.as_str(), "20240601110000");
}
