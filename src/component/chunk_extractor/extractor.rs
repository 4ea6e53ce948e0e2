//! 切片擷取主流程
//!
//! 每次執行建立一個 [`ChunkExtractor`]：開啟所有來源並串接成虛擬時間軸，
//! 依固定間隔輸出帶網格的截圖與子片段，結束時（成功或失敗）釋放所有媒體資源。

use super::chunk_plan::{ChunkRecord, ChunkWalker, format_hhmmss};
use super::filename_tag::SourceId;
use super::grid_overlay::GridStyle;
use super::output_namer::{ArtifactKind, SequenceCounter};
use super::timeline::{SourceCandidate, Timeline};
use crate::tools::{ClipRequest, MediaBackend, MediaHandle, ensure_directory_exists};
use anyhow::{Context, Result, bail};
use image::ImageFormat;
use indicatif::{ProgressBar, ProgressStyle};
use log::{debug, info, warn};
use std::path::{Path, PathBuf};

/// 單次執行的設定
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractorConfig {
    pub screenshot_dir: PathBuf,
    pub clip_dir: PathBuf,
    /// 逆時針旋轉角度
    pub rotate_degrees: i32,
    /// 第一個切片的起始秒數
    pub start_offset: u64,
    pub clip_duration: u64,
    pub interval: u64,
    pub output_height: u32,
    pub output_fps: u32,
    pub video_codec: String,
    pub grid: GridStyle,
}

impl ExtractorConfig {
    pub fn validate(&self) -> Result<()> {
        if self.interval == 0 {
            bail!("擷取間隔必須大於 0 秒");
        }
        if self.clip_duration == 0 {
            bail!("片段長度必須大於 0 秒");
        }
        if self.output_height == 0 || self.output_height % 2 != 0 {
            bail!("輸出高度必須為正偶數: {}", self.output_height);
        }
        if self.output_fps == 0 {
            bail!("輸出幀率必須大於 0");
        }
        if self.grid.rows == 0 || self.grid.cols == 0 {
            bail!("網格列數與欄數必須大於 0");
        }
        if self.video_codec.trim().is_empty() {
            bail!("未指定影片編碼器");
        }
        Ok(())
    }
}

/// 單一切片的輸出結果
#[derive(Debug, Clone, PartialEq)]
pub struct ChunkOutcome {
    pub chunk: ChunkRecord,
    pub source_index: usize,
    pub local_offset: f64,
    pub screenshot_path: PathBuf,
    pub clip_path: PathBuf,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExtractionSummary {
    pub total_duration: f64,
    pub outcomes: Vec<ChunkOutcome>,
}

impl ExtractionSummary {
    pub fn screenshots(&self) -> impl Iterator<Item = &Path> {
        self.outcomes.iter().map(|o| o.screenshot_path.as_path())
    }

    pub fn clips(&self) -> impl Iterator<Item = &Path> {
        self.outcomes.iter().map(|o| o.clip_path.as_path())
    }
}

/// 切片擷取器，一次執行一個實例，執行完即丟棄
pub struct ChunkExtractor<B: MediaBackend> {
    backend: B,
    config: ExtractorConfig,
    timeline: Timeline,
    source_handles: Vec<MediaHandle>,
    full_video: Option<MediaHandle>,
    screenshots: SequenceCounter,
    clips: SequenceCounter,
}

impl<B: MediaBackend> ChunkExtractor<B> {
    /// 開啟所有來源、建立時間軸並串接，同時從輸出資料夾接續編號
    ///
    /// 任何來源開啟失敗時，已開啟的控制代碼會先釋放再回傳錯誤。
    pub fn prepare(
        mut backend: B,
        sources: Vec<SourceCandidate>,
        config: ExtractorConfig,
    ) -> Result<Self> {
        config.validate()?;

        if sources.is_empty() {
            bail!("找不到任何來源影片");
        }

        ensure_directory_exists(&config.screenshot_dir)?;
        ensure_directory_exists(&config.clip_dir)?;

        let screenshots = SequenceCounter::resume(&config.screenshot_dir, ArtifactKind::Screenshot)?;
        let clips = SequenceCounter::resume(&config.clip_dir, ArtifactKind::Clip)?;

        let mut source_handles = Vec::new();
        let (timeline, full_video) =
            match open_timeline(&mut backend, sources, &mut source_handles) {
                Ok(opened) => opened,
                Err(e) => {
                    for handle in source_handles {
                        backend.close(handle);
                    }
                    return Err(e);
                }
            };

        info!(
            "時間軸建立完成: {} 個來源，總長 {:.2}s，截圖從 {} 號、片段從 {} 號開始",
            timeline.len(),
            timeline.total_duration(),
            screenshots.peek(),
            clips.peek()
        );

        Ok(Self {
            backend,
            config,
            timeline,
            source_handles,
            full_video: Some(full_video),
            screenshots,
            clips,
        })
    }

    pub fn timeline(&self) -> &Timeline {
        &self.timeline
    }

    pub fn config(&self) -> &ExtractorConfig {
        &self.config
    }

    pub fn next_screenshot_index(&self) -> u32 {
        self.screenshots.peek()
    }

    pub fn next_clip_index(&self) -> u32 {
        self.clips.peek()
    }

    /// 本次執行會處理的切片
    #[must_use]
    pub fn schedule(&self) -> ChunkWalker {
        ChunkWalker::new(
            self.config.start_offset,
            self.config.interval,
            self.config.clip_duration,
            self.timeline.total_duration(),
        )
    }

    /// 依序處理所有切片；任何媒體錯誤都會中止整次執行。結束前一律釋放媒體資源。
    pub fn run(mut self) -> Result<ExtractionSummary> {
        let result = self.extract_all();
        self.release();
        result
    }

    fn extract_all(&mut self) -> Result<ExtractionSummary> {
        let chunks: Vec<ChunkRecord> = self.schedule().collect();

        if chunks.is_empty() {
            warn!(
                "起始時間 {}s 已超過時間軸總長 {:.2}s，沒有可擷取的片段",
                self.config.start_offset,
                self.timeline.total_duration()
            );
        }

        let progress_bar = ProgressBar::new(chunks.len() as u64);
        progress_bar.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta}) {msg}")
                .context("無效的進度條樣式")?
                .progress_chars("#>-"),
        );

        let mut outcomes = Vec::with_capacity(chunks.len());
        for chunk in chunks {
            progress_bar.set_message(format!("{:.0}s", chunk.global_start));

            match self.extract_chunk(chunk) {
                Ok(outcome) => {
                    outcomes.push(outcome);
                    progress_bar.inc(1);
                }
                Err(e) => {
                    progress_bar.abandon_with_message("擷取失敗");
                    return Err(e);
                }
            }
        }

        progress_bar.finish_with_message("完成");

        Ok(ExtractionSummary {
            total_duration: self.timeline.total_duration(),
            outcomes,
        })
    }

    fn extract_chunk(&mut self, chunk: ChunkRecord) -> Result<ChunkOutcome> {
        let full_video = self.full_video.context("時間軸已釋放")?;

        let position = self.timeline.resolve(chunk.global_start)?;
        let source = self
            .timeline
            .source(position.source_index)
            .with_context(|| format!("找不到來源索引 {}", position.source_index))?;
        let timestamp_label = format_hhmmss(position.local_offset);
        let source_id: SourceId = source.source_id.clone();

        debug!(
            "切片 {:.0}s-{:.0}s → {} @ {:.2}s",
            chunk.global_start,
            chunk.global_end,
            source.file_name(),
            position.local_offset
        );

        // 截圖：旋轉 → 網格 → JPEG
        let mut frame = self
            .backend
            .frame_at(full_video, chunk.global_start, self.config.rotate_degrees)
            .with_context(|| format!("無法擷取 {:.0}s 的影格", chunk.global_start))?;
        self.config.grid.apply(&mut frame);

        let screenshot_path = self.screenshots.allocate(&timestamp_label, &source_id)?;
        frame
            .save_with_format(&screenshot_path, ImageFormat::Jpeg)
            .with_context(|| format!("無法儲存截圖: {}", screenshot_path.display()))?;
        info!("已儲存 {}", display_name(&screenshot_path));

        // 子片段：旋轉 → 縮放 → 幀率 → 逐幀網格，不含音訊
        let request = ClipRequest {
            start: chunk.global_start,
            end: chunk.global_end,
            rotate_degrees: self.config.rotate_degrees,
            output_height: self.config.output_height,
            output_fps: self.config.output_fps,
            codec: self.config.video_codec.clone(),
        };
        let clip_path = self.clips.allocate(&timestamp_label, &source_id)?;
        let mut frame_map = self.config.grid.frame_map();
        self.backend
            .write_clip(full_video, &request, &mut frame_map, &clip_path)
            .with_context(|| {
                format!(
                    "無法輸出片段 {:.0}s-{:.0}s: {}",
                    chunk.global_start,
                    chunk.global_end,
                    clip_path.display()
                )
            })?;
        info!("已儲存 {}", display_name(&clip_path));

        Ok(ChunkOutcome {
            chunk,
            source_index: position.source_index,
            local_offset: position.local_offset,
            screenshot_path,
            clip_path,
        })
    }

    /// 釋放串接時間軸與所有來源的控制代碼，可重複呼叫
    fn release(&mut self) {
        if let Some(handle) = self.full_video.take() {
            self.backend.close(handle);
        }
        if !self.source_handles.is_empty() {
            debug!("釋放 {} 個來源控制代碼", self.source_handles.len());
        }
        for handle in self.source_handles.drain(..) {
            self.backend.close(handle);
        }
    }
}

impl<B: MediaBackend> Drop for ChunkExtractor<B> {
    fn drop(&mut self) {
        self.release();
    }
}

fn open_timeline<B: MediaBackend>(
    backend: &mut B,
    sources: Vec<SourceCandidate>,
    handles: &mut Vec<MediaHandle>,
) -> Result<(Timeline, MediaHandle)> {
    let timeline = Timeline::build(sources, backend, handles)?;
    if timeline.total_duration() <= 0.0 {
        bail!("來源影片總長度為 0，無法建立時間軸");
    }
    let full_video = backend.concatenate(handles).context("無法串接來源影片")?;
    Ok((timeline, full_video))
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map_or_else(|| path.display().to_string(), |n| n.to_string_lossy().to_string())
}
