//! 輸出檔名模組
//!
//! 掃描既有輸出資料夾，找出每種產出物的下一個編號，
//! 讓重複執行時延續編號而不覆蓋舊檔。

use super::filename_tag::SourceId;
use anyhow::{Context, Result, bail};
use log::warn;
use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use walkdir::WalkDir;

static REGEX_SEQUENCE_MARKER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"_no_([0-9]+)").expect("Invalid regex"));

/// 產出物種類
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArtifactKind {
    Screenshot,
    Clip,
}

impl ArtifactKind {
    #[must_use]
    pub const fn prefix(self) -> &'static str {
        match self {
            Self::Screenshot => "screen",
            Self::Clip => "clip",
        }
    }

    #[must_use]
    pub const fn extension(self) -> &'static str {
        match self {
            Self::Screenshot => ".jpg",
            Self::Clip => ".mp4",
        }
    }
}

/// 單一產出物的命名資訊
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputArtifact {
    pub kind: ArtifactKind,
    pub sequence_index: u32,
    pub timestamp_label: String,
    pub source_id: SourceId,
}

impl OutputArtifact {
    /// `<kind><seq>_timestamp_<HHMMSS>_source_index_<id>_no_<seq4>.<ext>`
    #[must_use]
    pub fn file_name(&self) -> String {
        format!(
            "{prefix}{seq}_timestamp_{label}_source_index_{source}_no_{seq:04}{ext}",
            prefix = self.kind.prefix(),
            seq = self.sequence_index,
            label = self.timestamp_label,
            source = self.source_id,
            ext = self.kind.extension(),
        )
    }
}

/// 取出檔名中 `_no_<digits>` 的編號
#[must_use]
pub fn parse_sequence_marker(file_name: &str) -> Option<u32> {
    REGEX_SEQUENCE_MARKER
        .captures(file_name)
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse().ok())
}

/// 回傳資料夾中 `<prefix>*<extension>` 檔案的最大編號加一；沒有任何編號時回傳 1
///
/// 有前綴與副檔名但沒有編號標記的檔案會被略過。資料夾不存在時視為空資料夾。
/// 既有最大編號已是 `u32::MAX` 時回傳錯誤，不重複使用編號。
pub fn next_index(directory: &Path, prefix: &str, extension: &str) -> Result<u32> {
    if !directory.exists() {
        return Ok(1);
    }

    let mut max_index: Option<u32> = None;

    for entry in WalkDir::new(directory).min_depth(1).max_depth(1) {
        let entry = entry.with_context(|| format!("無法讀取資料夾: {}", directory.display()))?;
        let file_name = entry.file_name().to_string_lossy();
        if !file_name.starts_with(prefix) || !file_name.ends_with(extension) {
            continue;
        }

        match parse_sequence_marker(&file_name) {
            Some(index) => max_index = Some(max_index.map_or(index, |m| m.max(index))),
            None => warn!("略過沒有編號的檔案: {file_name}"),
        }
    }

    match max_index {
        None => Ok(1),
        Some(max) => match max.checked_add(1) {
            Some(next) => Ok(next),
            None => bail!("{} 中的 {prefix} 編號已達上限 {max}", directory.display()),
        },
    }
}

/// 單一產出物種類的遞增編號，啟動時從資料夾接續
#[derive(Debug, Clone)]
pub struct SequenceCounter {
    kind: ArtifactKind,
    directory: PathBuf,
    next: u32,
}

impl SequenceCounter {
    pub fn resume(directory: &Path, kind: ArtifactKind) -> Result<Self> {
        let next = next_index(directory, kind.prefix(), kind.extension())?;
        Ok(Self {
            kind,
            directory: directory.to_path_buf(),
            next,
        })
    }

    #[must_use]
    pub const fn peek(&self) -> u32 {
        self.next
    }

    /// 配發下一個產出物的完整路徑，編號加一；編號無法再遞增時回傳錯誤
    pub fn allocate(&mut self, timestamp_label: &str, source_id: &SourceId) -> Result<PathBuf> {
        let sequence_index = self.next;
        self.next = sequence_index
            .checked_add(1)
            .with_context(|| format!("{} 編號已達上限", self.kind.prefix()))?;

        let artifact = OutputArtifact {
            kind: self.kind,
            sequence_index,
            timestamp_label: timestamp_label.to_string(),
            source_id: source_id.clone(),
        };
        Ok(self.directory.join(artifact.file_name()))
    }
}
