use anyhow::{Context, Result, anyhow, bail};
use serde::Deserialize;
use std::path::Path;
use std::process::Command;

/// ffprobe 回報的來源影片資訊
#[derive(Debug, Clone, PartialEq)]
pub struct MediaInfo {
    pub duration_seconds: f64,
    pub width: u32,
    pub height: u32,
    pub frame_rate: f64,
}

#[derive(Deserialize)]
struct FfprobeOutput {
    format: Option<FormatInfo>,
    streams: Option<Vec<StreamInfo>>,
}

#[derive(Deserialize)]
struct FormatInfo {
    duration: Option<String>,
}

#[derive(Deserialize)]
struct StreamInfo {
    codec_type: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    r_frame_rate: Option<String>,
    duration: Option<String>,
}

/// 使用 ffprobe 讀取影片長度、解析度與幀率
pub fn probe_media(path: &Path) -> Result<MediaInfo> {
    let output = Command::new("ffprobe")
        .args([
            "-v",
            "quiet",
            "-print_format",
            "json",
            "-show_format",
            "-show_streams",
            "-select_streams",
            "v:0",
        ])
        .arg(path)
        .output()
        .with_context(|| format!("無法執行 ffprobe: {}", path.display()))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        bail!("ffprobe 執行失敗 {}: {}", path.display(), stderr.trim());
    }

    let stdout = String::from_utf8_lossy(&output.stdout);
    parse_probe_output(&stdout).with_context(|| format!("無法解析影片資訊: {}", path.display()))
}

fn parse_probe_output(json: &str) -> Result<MediaInfo> {
    let FfprobeOutput { format, streams } =
        serde_json::from_str(json).context("無法解析 ffprobe 輸出")?;

    let Some(stream) = streams
        .into_iter()
        .flatten()
        .find(|s| s.codec_type.as_deref() == Some("video"))
    else {
        bail!("找不到視訊串流");
    };

    let (Some(width), Some(height)) = (stream.width, stream.height) else {
        bail!("無法取得影片解析度");
    };

    // 長度優先取 format，其次取串流
    let duration_seconds = format
        .and_then(|f| parse_seconds(f.duration.as_deref()))
        .or_else(|| parse_seconds(stream.duration.as_deref()))
        .ok_or_else(|| anyhow!("無法取得影片長度"))?;

    let frame_rate = stream
        .r_frame_rate
        .as_deref()
        .and_then(parse_frame_rate)
        .unwrap_or(30.0);

    Ok(MediaInfo {
        duration_seconds,
        width,
        height,
        frame_rate,
    })
}

fn parse_seconds(value: Option<&str>) -> Option<f64> {
    value
        .and_then(|v| v.trim().parse::<f64>().ok())
        .filter(|d| d.is_finite() && *d >= 0.0)
}

/// 幀率字串："30000/1001"、"30/1" 或純數字
fn parse_frame_rate(rate: &str) -> Option<f64> {
    match rate.split_once('/') {
        Some((num, den)) => {
            let den: f64 = den.parse().ok()?;
            (den > 0.0).then_some(num.parse::<f64>().ok()? / den)
        }
        None => rate.parse().ok(),
    }
}
