use crate::component::ChunkExtractionRunner;
use crate::config::Config;
use crate::pause;
use anyhow::Result;
use console::{Term, style};
use log::error;

pub fn run_timeline_extraction(term: &Term, config: &mut Config) -> Result<()> {
    let mut runner = ChunkExtractionRunner::new(config);

    if let Err(e) = runner.run() {
        error!("時間軸擷取失敗: {e:#}");
        eprintln!("{} {:#}", style("錯誤:").red().bold(), e);
    }

    pause(term)?;
    Ok(())
}

pub fn run_single_video_extraction(term: &Term, config: &mut Config) -> Result<()> {
    let mut runner = ChunkExtractionRunner::new(config);

    if let Err(e) = runner.run_single_video() {
        error!("單一影片擷取失敗: {e:#}");
        eprintln!("{} {:#}", style("錯誤:").red().bold(), e);
    }

    pause(term)?;
    Ok(())
}
