//! 虛擬時間軸模組
//!
//! 將多個依拍攝時間排序的來源影片視為一條連續時間軸，
//! 並以累積長度表把全域時間點換算回（來源索引, 來源內偏移）。

use super::filename_tag::{CaptureKey, SourceId, extract_capture_key, parse_source_id};
use crate::tools::{MediaBackend, MediaHandle};
use anyhow::{Context, Result, bail};
use log::debug;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// 隱藏檔前綴（包含 macOS 的 `._` AppleDouble 檔）
const HIDDEN_FILE_PREFIX: char = '.';

/// 尚未讀取長度的來源影片
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceCandidate {
    pub path: PathBuf,
    pub capture_key: CaptureKey,
    pub source_id: SourceId,
}

/// 時間軸上的來源影片
#[derive(Debug, Clone, PartialEq)]
pub struct SourceFile {
    pub path: PathBuf,
    pub capture_key: CaptureKey,
    /// 長度（秒）
    pub duration: f64,
    pub source_id: SourceId,
}

impl SourceFile {
    #[must_use]
    pub fn file_name(&self) -> String {
        file_name_of(&self.path)
    }
}

/// 全域時間點換算結果
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimelinePosition {
    pub source_index: usize,
    pub local_offset: f64,
}

/// 依拍攝時間排序的來源影片與累積長度表
#[derive(Debug, Clone, PartialEq)]
pub struct Timeline {
    sources: Vec<SourceFile>,
    /// `prefix[i]` 為第 i 個來源在全域時間軸上的起點
    prefix: Vec<f64>,
    total_duration: f64,
}

/// 掃描資料夾中的影片檔（不遞迴），依檔名排序作為列舉順序
///
/// 副檔名不分大小寫；以 `.` 開頭的隱藏檔會被略過。
pub fn discover_sources(directory: &Path, extension: &str) -> Result<Vec<PathBuf>> {
    let extension = extension.trim_start_matches('.').to_lowercase();
    let mut paths = Vec::new();

    for entry in WalkDir::new(directory)
        .min_depth(1)
        .max_depth(1)
        .follow_links(false)
        .sort_by_file_name()
    {
        let entry = entry.with_context(|| format!("無法讀取資料夾: {}", directory.display()))?;
        if !entry.file_type().is_file() {
            continue;
        }
        if is_video_candidate(&entry.file_name().to_string_lossy(), &extension) {
            paths.push(entry.into_path());
        }
    }

    Ok(paths)
}

fn is_video_candidate(file_name: &str, extension: &str) -> bool {
    if file_name.starts_with(HIDDEN_FILE_PREFIX) {
        return false;
    }
    Path::new(file_name)
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.to_lowercase() == extension)
}

/// 依拍攝時間鍵做穩定排序，並在排序後的位置上解析來源編號
#[must_use]
pub fn order_by_capture_key(paths: Vec<PathBuf>) -> Vec<SourceCandidate> {
    let mut keyed: Vec<(CaptureKey, PathBuf)> = paths
        .into_iter()
        .map(|path| (extract_capture_key(&file_name_of(&path)), path))
        .collect();

    // sort_by 為穩定排序，相同鍵值保留原本的列舉順序
    keyed.sort_by(|a, b| a.0.cmp(&b.0));

    keyed
        .into_iter()
        .enumerate()
        .map(|(position, (capture_key, path))| SourceCandidate {
            source_id: parse_source_id(&file_name_of(&path), position).into_inner(),
            capture_key,
            path,
        })
        .collect()
}

fn file_name_of(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().to_string())
        .unwrap_or_default()
}

impl Timeline {
    /// 依序開啟每個來源並讀取長度
    ///
    /// 每個成功開啟的控制代碼都會推入 `handles`，
    /// 即使中途失敗，呼叫端仍能釋放已開啟的部分。
    pub fn build<B: MediaBackend + ?Sized>(
        candidates: Vec<SourceCandidate>,
        backend: &mut B,
        handles: &mut Vec<MediaHandle>,
    ) -> Result<Self> {
        let mut sources = Vec::with_capacity(candidates.len());

        for candidate in candidates {
            let handle = backend
                .open(&candidate.path)
                .with_context(|| format!("無法開啟來源影片: {}", candidate.path.display()))?;
            handles.push(handle);

            let duration = backend
                .duration(handle)
                .with_context(|| format!("無法取得影片長度: {}", candidate.path.display()))?;

            debug!(
                "來源 {} [{}] {:.2}s",
                candidate.source_id,
                candidate.capture_key,
                duration
            );

            sources.push(SourceFile {
                path: candidate.path,
                capture_key: candidate.capture_key,
                duration,
                source_id: candidate.source_id,
            });
        }

        Self::from_sources(sources)
    }

    /// 以已知長度的來源建立時間軸
    pub fn from_sources(sources: Vec<SourceFile>) -> Result<Self> {
        let mut prefix = Vec::with_capacity(sources.len());
        let mut total_duration = 0.0;

        for source in &sources {
            if !source.duration.is_finite() || source.duration < 0.0 {
                bail!(
                    "影片長度無效 ({}): {}",
                    source.duration,
                    source.path.display()
                );
            }
            prefix.push(total_duration);
            total_duration += source.duration;
        }

        Ok(Self {
            sources,
            prefix,
            total_duration,
        })
    }

    #[must_use]
    pub fn total_duration(&self) -> f64 {
        self.total_duration
    }

    #[must_use]
    pub fn sources(&self) -> &[SourceFile] {
        &self.sources
    }

    #[must_use]
    pub fn source(&self, index: usize) -> Option<&SourceFile> {
        self.sources.get(index)
    }

    /// 第 `index` 個來源在全域時間軸上的起點
    #[must_use]
    pub fn start_of(&self, index: usize) -> Option<f64> {
        self.prefix.get(index).copied()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.sources.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }

    /// 將全域時間點換算為（來源索引, 來源內偏移）
    ///
    /// 找出唯一滿足 `prefix[i] <= t < prefix[i] + duration[i]` 的 `i`；
    /// 長度為 0 的來源不會被選中。`t` 不在 `[0, total)` 時回傳錯誤。
    pub fn resolve(&self, t: f64) -> Result<TimelinePosition> {
        if !t.is_finite() || t < 0.0 || t >= self.total_duration {
            bail!(
                "時間點 {t} 不在時間軸範圍內 [0, {})",
                self.total_duration
            );
        }

        // 第一個結束點大於 t 的來源
        let source_index = self
            .prefix
            .iter()
            .zip(&self.sources)
            .position(|(start, source)| t < start + source.duration)
            .with_context(|| format!("時間點 {t} 無法對應到任何來源"))?;

        Ok(TimelinePosition {
            source_index,
            local_offset: t - self.prefix[source_index],
        })
    }
}
