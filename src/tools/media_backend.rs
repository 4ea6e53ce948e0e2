//! 外部媒體層介面
//!
//! 解碼、編碼、旋轉與縮放都交給外部媒體層處理，核心流程只透過這個 trait 操作。

use anyhow::Result;
use image::RgbImage;
use std::path::Path;

/// 媒體層配發的不透明控制代碼
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MediaHandle(usize);

impl MediaHandle {
    #[must_use]
    pub const fn new(id: usize) -> Self {
        Self(id)
    }

    #[must_use]
    pub const fn id(self) -> usize {
        self.0
    }
}

/// 子片段輸出請求：`[start, end)` 區間、旋轉、輸出高度與幀率
#[derive(Debug, Clone, PartialEq)]
pub struct ClipRequest {
    pub start: f64,
    pub end: f64,
    pub rotate_degrees: i32,
    pub output_height: u32,
    pub output_fps: u32,
    pub codec: String,
}

impl ClipRequest {
    #[must_use]
    pub fn duration(&self) -> f64 {
        (self.end - self.start).max(0.0)
    }
}

/// 逐幀處理函式，每一幀獨立套用，不保留跨幀狀態
pub type FrameMap<'a> = dyn FnMut(&mut RgbImage) + 'a;

pub trait MediaBackend {
    /// 開啟來源影片
    fn open(&mut self, path: &Path) -> Result<MediaHandle>;

    /// 影片長度（秒）
    fn duration(&self, handle: MediaHandle) -> Result<f64>;

    /// 將多個來源串接為單一連續時間軸
    fn concatenate(&mut self, handles: &[MediaHandle]) -> Result<MediaHandle>;

    /// 擷取時間點 `t` 的單一影格，並以逆時針角度旋轉（自動擴展畫布）
    fn frame_at(&mut self, handle: MediaHandle, t: f64, rotate_degrees: i32) -> Result<RgbImage>;

    /// 輸出子片段：旋轉、縮放至固定高度、重設幀率、逐幀套用 `frame_map`，不含音訊
    fn write_clip(
        &mut self,
        handle: MediaHandle,
        request: &ClipRequest,
        frame_map: &mut FrameMap<'_>,
        output_path: &Path,
    ) -> Result<()>;

    /// 釋放控制代碼
    fn close(&mut self, handle: MediaHandle);
}

/// 旋轉後（擴展畫布）的尺寸
#[must_use]
pub fn rotated_canvas(width: u32, height: u32, rotate_degrees: i32) -> (u32, u32) {
    match rotate_degrees.rem_euclid(360) {
        0 | 180 => (width, height),
        90 | 270 => (height, width),
        degrees => {
            let radians = f64::from(degrees).to_radians();
            let (sin, cos) = (radians.sin().abs(), radians.cos().abs());
            let w = f64::from(width);
            let h = f64::from(height);
            let rotated_width = (w * cos + h * sin).ceil() as u32;
            let rotated_height = (w * sin + h * cos).ceil() as u32;
            (rotated_width.max(1), rotated_height.max(1))
        }
    }
}

/// 依目標高度等比例縮放後的寬度（取偶數，供 yuv420p 編碼）
#[must_use]
pub fn scaled_width(width: u32, height: u32, target_height: u32) -> u32 {
    if height == 0 {
        return 2;
    }
    let scaled = f64::from(width) * f64::from(target_height) / f64::from(height);
    let even = ((scaled / 2.0).round() as u32) * 2;
    even.max(2)
}
