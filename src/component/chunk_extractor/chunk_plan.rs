//! 切片排程
//!
//! 從起始秒數開始，每隔固定間隔在虛擬時間軸上取一個切片，直到超過總長度。

/// 單一切片的全域區間 `[global_start, global_end)`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChunkRecord {
    pub global_start: f64,
    pub global_end: f64,
}

impl ChunkRecord {
    #[must_use]
    pub fn duration(&self) -> f64 {
        self.global_end - self.global_start
    }
}

/// 依固定間隔走訪時間軸的迭代器
///
/// `t` 從 `start_offset` 起每次加 `interval`，`t >= total_duration` 時結束；
/// 每個切片的結束點為 `min(t + clip_duration, total_duration)`。
#[derive(Debug, Clone)]
pub struct ChunkWalker {
    next_start: u64,
    interval: u64,
    clip_duration: u64,
    total_duration: f64,
    finished: bool,
}

impl ChunkWalker {
    #[must_use]
    pub fn new(start_offset: u64, interval: u64, clip_duration: u64, total_duration: f64) -> Self {
        Self {
            next_start: start_offset,
            interval,
            clip_duration,
            total_duration,
            finished: false,
        }
    }
}

impl Iterator for ChunkWalker {
    type Item = ChunkRecord;

    fn next(&mut self) -> Option<Self::Item> {
        let t = self.next_start as f64;
        if self.finished || t >= self.total_duration {
            self.finished = true;
            return None;
        }

        // 間隔為 0 時只取一次，避免無窮迴圈
        match self.next_start.checked_add(self.interval) {
            Some(next) if self.interval > 0 => self.next_start = next,
            _ => self.finished = true,
        }

        let end = (t + self.clip_duration as f64).min(self.total_duration);
        Some(ChunkRecord {
            global_start: t,
            global_end: end,
        })
    }
}

/// 將來源內偏移（秒）轉為 `HHMMSS` 標籤
///
/// 先四捨五入到整秒（同值時取偶數），小時超過兩位數時只保留後兩位。
#[must_use]
pub fn format_hhmmss(seconds: f64) -> String {
    let total = if seconds.is_finite() && seconds > 0.0 {
        seconds.round_ties_even() as u64
    } else {
        0
    };
    let hours = (total / 3600) % 100;
    let minutes = (total % 3600) / 60;
    let secs = total % 60;
    format!("{hours:02}{minutes:02}{secs:02}")
}
