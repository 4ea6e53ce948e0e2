//! 網格疊加模組
//!
//! 在影像上畫出等距的直線與橫線（預設 3x3 九宮格）。
//! 影片則對每一幀獨立套用同一個轉換，不保留跨幀狀態。

use image::{GenericImage, Rgb, RgbImage};
use serde::{Deserialize, Serialize};

/// 網格樣式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GridStyle {
    pub rows: u32,
    pub cols: u32,
    /// 線條顏色 (R, G, B)
    pub color: [u8; 3],
    /// 線寬（像素）
    pub line_width: u32,
}

impl Default for GridStyle {
    fn default() -> Self {
        Self {
            rows: 3,
            cols: 3,
            color: [80, 80, 80],
            line_width: 2,
        }
    }
}

impl GridStyle {
    /// 對單張 RGB 影像套用網格
    pub fn apply(&self, image: &mut RgbImage) {
        draw_grid(image, self.rows, self.cols, Rgb(self.color), self.line_width);
    }

    /// 取得可逐幀套用的轉換函式
    #[must_use]
    pub fn frame_map(self) -> impl FnMut(&mut RgbImage) {
        move |frame: &mut RgbImage| self.apply(frame)
    }
}

/// 分割線位置：`i * size / count`，`i` 為 `1..count`
#[must_use]
pub fn grid_line_positions(size: u32, count: u32) -> Vec<u32> {
    if count == 0 {
        return Vec::new();
    }
    (1..count)
        .map(|i| (u64::from(i) * u64::from(size) / u64::from(count)) as u32)
        .collect()
}

/// 在影像上畫出 `cols - 1` 條直線與 `rows - 1` 條橫線，線條以分割位置為中心
///
/// 尺寸與像素格式不變。
pub fn draw_grid<I: GenericImage>(
    image: &mut I,
    rows: u32,
    cols: u32,
    color: I::Pixel,
    line_width: u32,
) {
    let (width, height) = image.dimensions();
    if width == 0 || height == 0 || line_width == 0 {
        return;
    }

    for x in grid_line_positions(width, cols) {
        for column in line_band(x, line_width, width) {
            for y in 0..height {
                image.put_pixel(column, y, color);
            }
        }
    }

    for y in grid_line_positions(height, rows) {
        for row in line_band(y, line_width, height) {
            for x in 0..width {
                image.put_pixel(x, row, color);
            }
        }
    }
}

/// 以 `position` 為中心、寬 `line_width` 的像素範圍，裁切在 `[0, limit)` 內
fn line_band(position: u32, line_width: u32, limit: u32) -> std::ops::Range<u32> {
    let start = position.saturating_sub(line_width / 2);
    let end = start.saturating_add(line_width).min(limit);
    start.min(end)..end
}
