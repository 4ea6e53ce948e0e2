use crate::component::chunk_extractor::{ExtractorConfig, GridStyle};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// 設定檔位置（目前工作目錄）
pub const SETTINGS_FILE: &str = "settings.json";

/// 最近使用路徑的保留數量
pub const MAX_RECENT_PATHS: usize = 10;

#[derive(Debug, Clone, Default)]
pub struct Config {
    pub settings: UserSettings,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UserSettings {
    pub extraction: ExtractionSettings,
    pub single_video: SingleVideoSettings,
    pub recent_paths: Vec<String>,
}

/// 多檔時間軸擷取的固定參數
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractionSettings {
    /// 來源影片副檔名（不分大小寫）
    pub video_extension: String,
    pub screenshot_dir_name: String,
    pub clip_dir_name: String,
    /// 片段長度（秒）
    pub clip_duration: u64,
    /// 擷取間隔（秒）
    pub interval: u64,
    pub output_height: u32,
    pub output_fps: u32,
    pub video_codec: String,
    pub grid: GridStyle,
}

impl Default for ExtractionSettings {
    fn default() -> Self {
        Self {
            video_extension: "mp4".to_string(),
            screenshot_dir_name: "screenshots".to_string(),
            clip_dir_name: "30_second_video_segment".to_string(),
            clip_duration: 30,
            interval: 5 * 60,
            output_height: 1080,
            output_fps: 15,
            video_codec: "libx264".to_string(),
            grid: GridStyle::default(),
        }
    }
}

impl ExtractionSettings {
    /// 以輸出根目錄與使用者輸入組合出單次執行的設定
    #[must_use]
    pub fn extractor_config(
        &self,
        output_root: &Path,
        rotate_degrees: i32,
        start_offset: u64,
    ) -> ExtractorConfig {
        ExtractorConfig {
            screenshot_dir: output_root.join(&self.screenshot_dir_name),
            clip_dir: output_root.join(&self.clip_dir_name),
            rotate_degrees,
            start_offset,
            clip_duration: self.clip_duration,
            interval: self.interval,
            output_height: self.output_height,
            output_fps: self.output_fps,
            video_codec: self.video_codec.clone(),
            grid: self.grid,
        }
    }
}

/// 單一影片模式：只有一個來源的時間軸，片段較短
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SingleVideoSettings {
    pub screenshot_dir_name: String,
    pub clip_dir_name: String,
    pub clip_duration: u64,
    pub interval: u64,
}

impl Default for SingleVideoSettings {
    fn default() -> Self {
        Self {
            screenshot_dir_name: "screenshots".to_string(),
            clip_dir_name: "10_second_video_segments".to_string(),
            clip_duration: 10,
            interval: 5 * 60,
        }
    }
}

impl SingleVideoSettings {
    /// 以多檔設定為基礎，覆寫片段長度、間隔與輸出資料夾
    #[must_use]
    pub fn extraction_settings(&self, base: &ExtractionSettings) -> ExtractionSettings {
        ExtractionSettings {
            screenshot_dir_name: self.screenshot_dir_name.clone(),
            clip_dir_name: self.clip_dir_name.clone(),
            clip_duration: self.clip_duration,
            interval: self.interval,
            ..base.clone()
        }
    }
}
