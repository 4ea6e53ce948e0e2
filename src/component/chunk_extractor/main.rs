use super::extractor::{ChunkExtractor, ExtractionSummary, ExtractorConfig};
use super::timeline::{SourceCandidate, discover_sources, order_by_capture_key};
use crate::config::save::{add_recent_path, save_settings};
use crate::config::{Config, ExtractionSettings};
use crate::tools::{FfmpegBackend, ffmpeg_available, validate_directory_exists, validate_file_exists};
use anyhow::{Result, bail};
use console::style;
use dialoguer::Input;
use log::{info, warn};
use std::path::{Path, PathBuf};

/// 時間軸切片擷取
///
/// 流程：
/// A. 掃描並依拍攝時間排序來源
/// B. 讀取長度，串接成虛擬時間軸
/// C. 每隔固定間隔取一個切片
/// D. 輸出帶網格的截圖與子片段
pub struct ChunkExtractionRunner<'a> {
    config: &'a mut Config,
}

impl<'a> ChunkExtractionRunner<'a> {
    pub const fn new(config: &'a mut Config) -> Self {
        Self { config }
    }

    /// 多檔模式：整個資料夾視為一條時間軸
    pub fn run(&mut self) -> Result<()> {
        println!("{}", style("=== 時間軸截圖與片段擷取 ===").cyan().bold());
        ensure_ffmpeg()?;

        let input_path = self.prompt_path("請輸入影片資料夾路徑")?;
        let input_dir = PathBuf::from(&input_path);
        validate_directory_exists(&input_dir)?;

        let settings = self.config.settings.extraction.clone();

        println!("{}", style("掃描影片檔案中...").dim());
        let sources = order_by_capture_key(discover_sources(&input_dir, &settings.video_extension)?);

        if sources.is_empty() {
            println!("{}", style("找不到任何影片檔案").yellow());
            return Ok(());
        }

        println!(
            "{}",
            style(format!("找到 {} 個影片檔案，依拍攝時間排序", sources.len())).green()
        );
        display_sources(&sources);

        self.remember_path(&input_path);
        self.extract(sources, &settings, &input_dir)
    }

    /// 單一影片模式：只有一個來源的時間軸，輸出到影片所在資料夾
    pub fn run_single_video(&mut self) -> Result<()> {
        println!("{}", style("=== 單一影片截圖與片段擷取 ===").cyan().bold());
        ensure_ffmpeg()?;

        let input_path = self.prompt_path("請輸入影片檔案路徑")?;
        let video_path = PathBuf::from(&input_path);
        validate_file_exists(&video_path)?;

        let output_root = video_path
            .parent()
            .map_or_else(|| PathBuf::from("."), Path::to_path_buf);
        let settings = self
            .config
            .settings
            .single_video
            .extraction_settings(&self.config.settings.extraction);

        let sources = order_by_capture_key(vec![video_path]);
        display_sources(&sources);

        self.remember_path(&input_path);
        self.extract(sources, &settings, &output_root)
    }

    fn extract(
        &self,
        sources: Vec<SourceCandidate>,
        settings: &ExtractionSettings,
        output_root: &Path,
    ) -> Result<()> {
        let rotate_degrees = prompt_rotation()?;
        let start_offset = prompt_start_offset()?;
        let extractor_config = settings.extractor_config(output_root, rotate_degrees, start_offset);

        print_plan(&extractor_config);

        let backend = FfmpegBackend::new()?;
        let extractor = ChunkExtractor::prepare(backend, sources, extractor_config)?;

        println!(
            "{}",
            style(format!(
                "時間軸總長 {:.1} 秒，截圖從 {} 號、片段從 {} 號開始",
                extractor.timeline().total_duration(),
                extractor.next_screenshot_index(),
                extractor.next_clip_index()
            ))
            .green()
        );
        println!();
        println!("{}", style("開始擷取...").cyan());

        let summary = extractor.run()?;
        print_summary(&summary);

        Ok(())
    }

    fn prompt_path(&self, prompt: &str) -> Result<String> {
        let mut input = Input::<String>::new().with_prompt(prompt);
        if let Some(recent) = self.config.settings.recent_paths.first() {
            input = input.default(recent.clone());
        }
        let path = input.interact_text()?;
        Ok(path.trim().to_string())
    }

    fn remember_path(&mut self, path: &str) {
        add_recent_path(&mut self.config.settings, path);
        if let Err(e) = save_settings(&self.config.settings) {
            warn!("無法儲存最近使用路徑: {e:#}");
        }
    }
}

fn ensure_ffmpeg() -> Result<()> {
    if !ffmpeg_available() {
        bail!("找不到 ffmpeg 或 ffprobe，請先安裝並加入 PATH");
    }
    Ok(())
}

fn prompt_rotation() -> Result<i32> {
    let degrees: i32 = Input::new()
        .with_prompt("逆時針旋轉角度（0、90、180、270 或任意角度）")
        .default(0)
        .interact_text()?;
    Ok(degrees)
}

fn prompt_start_offset() -> Result<u64> {
    let seconds: u64 = Input::new()
        .with_prompt("從第幾秒開始擷取")
        .default(0)
        .interact_text()?;
    Ok(seconds)
}

fn display_sources(sources: &[SourceCandidate]) {
    for (index, source) in sources.iter().enumerate() {
        let name = source
            .path
            .file_name()
            .unwrap_or_default()
            .to_string_lossy();
        println!(
            "  {}. [{}] {} {}",
            index + 1,
            source.source_id,
            style(&source.capture_key).dim(),
            name
        );
    }
}

fn print_plan(config: &ExtractorConfig) {
    println!(
        "\n{} 每 {} 秒擷取 {} 秒，輸出高度 {}，{} fps，旋轉 {}°",
        style("設定:").dim(),
        config.interval,
        config.clip_duration,
        config.output_height,
        config.output_fps,
        config.rotate_degrees
    );
    println!("  截圖 → {}", config.screenshot_dir.display());
    println!("  片段 → {}", config.clip_dir.display());
}

fn print_summary(summary: &ExtractionSummary) {
    println!();
    println!("{}", style("=== 擷取完成 ===").cyan().bold());
    println!(
        "  {} 時間軸總長: {:.1} 秒",
        style("•").dim(),
        summary.total_duration
    );
    println!(
        "  {} 截圖: {}",
        style("✓").green(),
        summary.screenshots().count()
    );
    println!("  {} 片段: {}", style("✓").green(), summary.clips().count());

    info!(
        "擷取完成: {} 個切片，時間軸 {:.2}s",
        summary.outcomes.len(),
        summary.total_duration
    );
}
