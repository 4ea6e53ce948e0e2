//! 以 ffmpeg / ffprobe 執行檔實作的媒體層
//!
//! - 單張影格：ffmpeg 以 PNG 輸出到 stdout，再用 `image` 解碼
//! - 子片段：解碼程序輸出 rgb24 原始影格，逐幀處理後寫入編碼程序的 stdin
//! - 串接：在暫存目錄寫入 ffconcat 清單，透過 concat demuxer 讀取

use super::ffprobe_info::{MediaInfo, probe_media};
use super::media_backend::{
    ClipRequest, FrameMap, MediaBackend, MediaHandle, rotated_canvas, scaled_width,
};
use anyhow::{Context, Result, anyhow, bail};
use image::{ImageFormat, RgbImage};
use log::{debug, warn};
use std::collections::HashMap;
use std::fs;
use std::io::{ErrorKind, Read, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use std::thread::{self, JoinHandle};
use tempfile::TempDir;

#[derive(Debug, Clone)]
enum MediaInput {
    File(PathBuf),
    Concat(PathBuf),
}

#[derive(Debug, Clone)]
struct OpenMedia {
    input: MediaInput,
    info: MediaInfo,
    /// 來源解析度不一致時，先縮放並補黑邊到共同畫布
    canvas_filter: Option<String>,
}

pub struct FfmpegBackend {
    scratch_dir: TempDir,
    media: HashMap<MediaHandle, OpenMedia>,
    next_id: usize,
}

impl FfmpegBackend {
    pub fn new() -> Result<Self> {
        let scratch_dir = tempfile::Builder::new()
            .prefix(".chunk_grid_")
            .tempdir()
            .context("無法建立暫存目錄")?;

        Ok(Self {
            scratch_dir,
            media: HashMap::new(),
            next_id: 0,
        })
    }

    fn register(&mut self, media: OpenMedia) -> MediaHandle {
        let handle = MediaHandle::new(self.next_id);
        self.next_id += 1;
        self.media.insert(handle, media);
        handle
    }

    fn get(&self, handle: MediaHandle) -> Result<&OpenMedia> {
        self.media
            .get(&handle)
            .ok_or_else(|| anyhow!("無效的媒體控制代碼: {}", handle.id()))
    }
}

impl MediaBackend for FfmpegBackend {
    fn open(&mut self, path: &Path) -> Result<MediaHandle> {
        let info = probe_media(path)?;
        debug!(
            "開啟來源 {}: {:.2}s, {}x{}, {:.2} fps",
            path.display(),
            info.duration_seconds,
            info.width,
            info.height,
            info.frame_rate
        );

        Ok(self.register(OpenMedia {
            input: MediaInput::File(path.to_path_buf()),
            info,
            canvas_filter: None,
        }))
    }

    fn duration(&self, handle: MediaHandle) -> Result<f64> {
        Ok(self.get(handle)?.info.duration_seconds)
    }

    fn concatenate(&mut self, handles: &[MediaHandle]) -> Result<MediaHandle> {
        let Some(&first) = handles.first() else {
            bail!("沒有可串接的來源影片");
        };
        let first_info = self.get(first)?.info.clone();

        let mut entries = Vec::with_capacity(handles.len());
        let mut sizes = Vec::with_capacity(handles.len());
        for &handle in handles {
            let media = self.get(handle)?;
            let MediaInput::File(path) = &media.input else {
                bail!("無法再次串接已串接的時間軸");
            };
            // concat 清單中的相對路徑會以清單所在目錄為基準
            let absolute = fs::canonicalize(path)
                .with_context(|| format!("無法取得絕對路徑: {}", path.display()))?;
            entries.push((absolute, media.info.duration_seconds));
            sizes.push((media.info.width, media.info.height));
        }

        let letterbox = letterbox_canvas(&sizes);
        let (width, height) = letterbox.unwrap_or((first_info.width, first_info.height));
        if let Some((w, h)) = letterbox {
            warn!("來源解析度不一致，統一補黑邊到 {w}x{h}");
        }

        let total: f64 = entries.iter().map(|(_, duration)| duration).sum();
        let list_path = self
            .scratch_dir
            .path()
            .join(format!("timeline_{}.ffconcat", self.next_id));
        fs::write(&list_path, build_concat_list(&entries))
            .with_context(|| format!("無法寫入串接清單: {}", list_path.display()))?;

        debug!(
            "串接 {} 個來源，總長 {:.2}s: {}",
            entries.len(),
            total,
            list_path.display()
        );

        Ok(self.register(OpenMedia {
            input: MediaInput::Concat(list_path),
            info: MediaInfo {
                duration_seconds: total,
                width,
                height,
                ..first_info
            },
            canvas_filter: letterbox.map(|(w, h)| letterbox_filter(w, h)),
        }))
    }

    fn frame_at(&mut self, handle: MediaHandle, t: f64, rotate_degrees: i32) -> Result<RgbImage> {
        let media = self.get(handle)?;

        let mut args = base_args();
        args.extend(input_args(&media.input, t, None));
        args.extend(["-frames:v", "1", "-an", "-sn", "-dn"].map(String::from));
        let filters: Vec<String> = media
            .canvas_filter
            .iter()
            .cloned()
            .chain(rotation_filter(rotate_degrees))
            .collect();
        if !filters.is_empty() {
            args.push("-vf".to_string());
            args.push(filters.join(","));
        }
        args.extend(["-f", "image2pipe", "-c:v", "png", "pipe:1"].map(String::from));

        debug!("擷取影格 t={t:.3}s: ffmpeg {}", args.join(" "));

        let output = Command::new("ffmpeg")
            .args(&args)
            .stdin(Stdio::null())
            .output()
            .context("無法執行 ffmpeg 擷取影格")?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            bail!("ffmpeg 擷取影格失敗 (t={t:.3}s): {}", stderr.trim());
        }

        if output.stdout.is_empty() {
            bail!("時間點 {t:.3}s 沒有可用的影格");
        }

        let image = image::load_from_memory_with_format(&output.stdout, ImageFormat::Png)
            .context("無法解碼 ffmpeg 輸出的影格")?;

        Ok(image.to_rgb8())
    }

    fn write_clip(
        &mut self,
        handle: MediaHandle,
        request: &ClipRequest,
        frame_map: &mut FrameMap<'_>,
        output_path: &Path,
    ) -> Result<()> {
        let media = self.get(handle)?.clone();

        let (rotated_width, rotated_height) =
            rotated_canvas(media.info.width, media.info.height, request.rotate_degrees);
        let height = request.output_height;
        let width = scaled_width(rotated_width, rotated_height, height);
        let filter = clip_filter(request.rotate_degrees, width, height, request.output_fps);
        let filter = match &media.canvas_filter {
            Some(canvas) => format!("{canvas},{filter}"),
            None => filter,
        };

        let mut decoder_args = base_args();
        decoder_args.push("-nostdin".to_string());
        decoder_args.extend(input_args(
            &media.input,
            request.start,
            Some(request.duration()),
        ));
        decoder_args.extend([
            "-map".to_string(),
            "0:v:0".to_string(),
            "-an".to_string(),
            "-sn".to_string(),
            "-dn".to_string(),
            "-vf".to_string(),
            filter,
            "-pix_fmt".to_string(),
            "rgb24".to_string(),
            "-f".to_string(),
            "rawvideo".to_string(),
            "pipe:1".to_string(),
        ]);

        let mut encoder_args = base_args();
        encoder_args.extend([
            "-y".to_string(),
            "-f".to_string(),
            "rawvideo".to_string(),
            "-pix_fmt".to_string(),
            "rgb24".to_string(),
            "-s:v".to_string(),
            format!("{width}x{height}"),
            "-r".to_string(),
            request.output_fps.to_string(),
            "-i".to_string(),
            "-".to_string(),
            "-an".to_string(),
            "-c:v".to_string(),
            request.codec.clone(),
            "-pix_fmt".to_string(),
            "yuv420p".to_string(),
            "-movflags".to_string(),
            "+faststart".to_string(),
            output_path.to_string_lossy().to_string(),
        ]);

        debug!("子片段解碼: ffmpeg {}", decoder_args.join(" "));
        debug!("子片段編碼: ffmpeg {}", encoder_args.join(" "));

        let mut decoder =
            FfmpegProcess::spawn("解碼", &decoder_args, Stdio::null(), Stdio::piped())?;
        let mut encoder =
            FfmpegProcess::spawn("編碼", &encoder_args, Stdio::piped(), Stdio::null())?;

        let mut frames_in = decoder.take_stdout()?;
        let mut frames_out = encoder.take_stdin()?;

        // 任何一步失敗時，decoder / encoder 會在離開作用域時被終止並回收
        let frame_count = pump_frames(&mut frames_in, &mut frames_out, width, height, frame_map)?;
        drop(frames_out);
        drop(frames_in);

        decoder.finish()?;
        encoder.finish()?;

        if frame_count == 0 {
            bail!(
                "區間 {:.3}s - {:.3}s 沒有解碼到任何影格",
                request.start,
                request.end
            );
        }

        debug!(
            "子片段完成: {} 幀, {}x{}, {}",
            frame_count,
            width,
            height,
            output_path.display()
        );

        Ok(())
    }

    fn close(&mut self, handle: MediaHandle) {
        let Some(media) = self.media.remove(&handle) else {
            return;
        };

        if let MediaInput::Concat(list_path) = media.input {
            if fs::remove_file(&list_path).is_err() {
                warn!("無法移除串接清單: {}", list_path.display());
            }
        }
    }
}

/// 檢查 ffmpeg 與 ffprobe 是否可執行
#[must_use]
pub fn ffmpeg_available() -> bool {
    ["ffmpeg", "ffprobe"].iter().all(|tool| {
        Command::new(tool)
            .arg("-version")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .is_ok_and(|status| status.success())
    })
}

/// 旋轉濾鏡：正角度為逆時針，直角使用無損的轉置 / 翻轉
#[must_use]
pub fn rotation_filter(rotate_degrees: i32) -> Option<String> {
    match rotate_degrees.rem_euclid(360) {
        0 => None,
        90 => Some("transpose=cclock".to_string()),
        180 => Some("hflip,vflip".to_string()),
        270 => Some("transpose=clock".to_string()),
        degrees => {
            // ffmpeg rotate 以順時針為正
            let angle = format!("-{degrees}*PI/180");
            Some(format!(
                "rotate={angle}:ow=rotw({angle}):oh=roth({angle}):c=black"
            ))
        }
    }
}

/// 子片段濾鏡鏈：旋轉 → 縮放 → 幀率
#[must_use]
pub fn clip_filter(rotate_degrees: i32, width: u32, height: u32, fps: u32) -> String {
    let mut filters: Vec<String> = rotation_filter(rotate_degrees).into_iter().collect();
    filters.push(format!("scale={width}:{height}"));
    filters.push(format!("fps={fps}"));
    filters.join(",")
}

/// 來源解析度不一致時回傳能容納所有來源的畫布大小；全部相同時回傳 `None`
#[must_use]
pub fn letterbox_canvas(sizes: &[(u32, u32)]) -> Option<(u32, u32)> {
    let first = *sizes.first()?;
    if sizes.iter().all(|&size| size == first) {
        return None;
    }

    let width = sizes.iter().map(|&(w, _)| w).max().unwrap_or(first.0);
    let height = sizes.iter().map(|&(_, h)| h).max().unwrap_or(first.1);
    Some((width, height))
}

/// 等比例縮放到畫布內，置中並以黑邊補滿
#[must_use]
pub fn letterbox_filter(width: u32, height: u32) -> String {
    format!(
        "scale={width}:{height}:force_original_aspect_ratio=decrease,\
         pad={width}:{height}:(ow-iw)/2:(oh-ih)/2:color=black,setsar=1"
    )
}

fn base_args() -> Vec<String> {
    vec![
        "-hide_banner".to_string(),
        "-loglevel".to_string(),
        "error".to_string(),
    ]
}

fn input_args(input: &MediaInput, seek: f64, duration: Option<f64>) -> Vec<String> {
    let mut args = Vec::new();
    let path = match input {
        MediaInput::File(path) => path,
        MediaInput::Concat(list_path) => {
            args.extend(["-f", "concat", "-safe", "0"].map(String::from));
            list_path
        }
    };

    if seek > 0.0 {
        args.push("-ss".to_string());
        args.push(format!("{seek:.3}"));
    }
    if let Some(duration) = duration {
        args.push("-t".to_string());
        args.push(format!("{duration:.3}"));
    }

    args.push("-i".to_string());
    args.push(path.to_string_lossy().to_string());
    args
}

/// 產生 ffconcat 清單內容，附上每個檔案的長度以免 demuxer 逐一探測
fn build_concat_list(entries: &[(PathBuf, f64)]) -> String {
    let mut list = String::from("ffconcat version 1.0\n");
    for (path, duration) in entries {
        let escaped = path.to_string_lossy().replace('\'', r"'\''");
        list.push_str(&format!("file '{escaped}'\nduration {duration:.6}\n"));
    }
    list
}

/// 從 `source` 逐幀讀取 rgb24 影格，套用 `frame_map` 後寫入 `sink`，回傳處理的幀數
fn pump_frames(
    source: &mut impl Read,
    sink: &mut impl Write,
    width: u32,
    height: u32,
    frame_map: &mut FrameMap<'_>,
) -> Result<usize> {
    let frame_size = width as usize * height as usize * 3;
    let mut buffer = vec![0_u8; frame_size];
    let mut frame_count = 0;

    while read_frame(source, &mut buffer)? {
        let mut frame = RgbImage::from_raw(width, height, std::mem::take(&mut buffer))
            .ok_or_else(|| anyhow!("影格大小不符: {width}x{height}"))?;
        frame_map(&mut frame);
        sink.write_all(frame.as_raw())
            .context("無法寫入影格至編碼器")?;
        buffer = frame.into_raw();
        frame_count += 1;
    }

    sink.flush().context("無法清空編碼器輸入")?;
    Ok(frame_count)
}

/// 讀滿一個影格；來源結束時回傳 `false`
fn read_frame(source: &mut impl Read, buffer: &mut [u8]) -> Result<bool> {
    let mut filled = 0;
    while filled < buffer.len() {
        match source.read(&mut buffer[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => {}
            Err(e) => return Err(e).context("無法讀取解碼器輸出"),
        }
    }

    match filled {
        0 => Ok(false),
        n if n == buffer.len() => Ok(true),
        n => bail!("解碼器輸出不完整的影格: {n}/{} bytes", buffer.len()),
    }
}

/// 錯誤訊息中保留的 stderr 長度
const STDERR_TAIL_BYTES: usize = 4096;

/// 外部 ffmpeg 程序；未正常結束前被丟棄時會終止並回收子程序
///
/// stderr 由背景執行緒持續讀取，避免管線塞滿後子程序卡在寫入而停止輸出影格。
struct FfmpegProcess {
    child: Option<Child>,
    stderr_reader: Option<JoinHandle<Vec<u8>>>,
    stage: &'static str,
}

impl FfmpegProcess {
    fn spawn(stage: &'static str, args: &[String], stdin: Stdio, stdout: Stdio) -> Result<Self> {
        Self::spawn_program("ffmpeg", stage, args, stdin, stdout)
    }

    fn spawn_program(
        program: &str,
        stage: &'static str,
        args: &[String],
        stdin: Stdio,
        stdout: Stdio,
    ) -> Result<Self> {
        let mut child = Command::new(program)
            .args(args)
            .stdin(stdin)
            .stdout(stdout)
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|error| {
                if error.kind() == ErrorKind::NotFound {
                    anyhow!("找不到 {program}，請確認已安裝並加入 PATH")
                } else {
                    anyhow!("無法啟動 {program} {stage}程序: {error}")
                }
            })?;

        let stderr_reader = child.stderr.take().map(drain_in_background);

        Ok(Self {
            child: Some(child),
            stderr_reader,
            stage,
        })
    }

    fn child_mut(&mut self) -> Result<&mut Child> {
        self.child
            .as_mut()
            .ok_or_else(|| anyhow!("ffmpeg {}程序已結束", self.stage))
    }

    fn take_stdout(&mut self) -> Result<ChildStdout> {
        let stage = self.stage;
        self.child_mut()?
            .stdout
            .take()
            .ok_or_else(|| anyhow!("無法取得 ffmpeg {stage}程序的 stdout"))
    }

    fn take_stdin(&mut self) -> Result<ChildStdin> {
        let stage = self.stage;
        self.child_mut()?
            .stdin
            .take()
            .ok_or_else(|| anyhow!("無法取得 ffmpeg {stage}程序的 stdin"))
    }

    fn finish(mut self) -> Result<()> {
        let mut child = self
            .child
            .take()
            .ok_or_else(|| anyhow!("ffmpeg {}程序已結束", self.stage))?;
        let status = child
            .wait()
            .with_context(|| format!("無法等待 ffmpeg {}程序", self.stage))?;
        let stderr = self.collect_stderr();

        if !status.success() {
            bail!(
                "ffmpeg {}失敗 ({}): {}",
                self.stage,
                status,
                stderr_tail(&stderr)
            );
        }

        Ok(())
    }

    fn collect_stderr(&mut self) -> Vec<u8> {
        self.stderr_reader
            .take()
            .and_then(|reader| reader.join().ok())
            .unwrap_or_default()
    }
}

impl Drop for FfmpegProcess {
    fn drop(&mut self) {
        if let Some(mut child) = self.child.take() {
            let _ = child.kill();
            let _ = child.wait();
        }
        // 子程序結束後管線關閉，讀取執行緒隨之返回
        self.collect_stderr();
    }
}

fn drain_in_background<R: Read + Send + 'static>(mut reader: R) -> JoinHandle<Vec<u8>> {
    thread::spawn(move || {
        let mut buffer = Vec::new();
        if let Err(e) = reader.read_to_end(&mut buffer) {
            debug!("讀取 ffmpeg stderr 中斷: {e}");
        }
        buffer
    })
}

/// stderr 最後一段文字，作為錯誤訊息
fn stderr_tail(stderr: &[u8]) -> String {
    let start = stderr.len().saturating_sub(STDERR_TAIL_BYTES);
    String::from_utf8_lossy(&stderr[start..]).trim().to_string()
}
