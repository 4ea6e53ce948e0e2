//! 檔名標記解析模組
//!
//! 從 `DJI_<14 位數字>_..._<4 位數字>_...` 形式的檔名取出拍攝時間鍵與來源編號。
//! 解析永遠不會失敗：比對不到時回傳預設值，並以 [`Parsed::Fallback`] 標示。

use regex::Regex;
use std::fmt;
use std::sync::LazyLock;

/// 比對不到拍攝時間時使用的最小鍵值，讓這類檔案排在最前面
pub const SENTINEL_CAPTURE_KEY: &str = "00000000000000";

static REGEX_CAPTURE_KEY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"DJI_([0-9]{14})_").expect("Invalid regex"));

static REGEX_SOURCE_ID: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"_([0-9]{4})_").expect("Invalid regex"));

/// 解析結果：從檔名取得，或是使用預設值
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Parsed<T> {
    Found(T),
    Fallback(T),
}

impl<T> Parsed<T> {
    pub const fn value(&self) -> &T {
        match self {
            Self::Found(value) | Self::Fallback(value) => value,
        }
    }

    pub fn into_inner(self) -> T {
        match self {
            Self::Found(value) | Self::Fallback(value) => value,
        }
    }

    pub const fn is_fallback(&self) -> bool {
        matches!(self, Self::Fallback(_))
    }
}

/// 可排序的拍攝時間鍵（14 位數字字串，字典序即時間序）
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CaptureKey(String);

impl CaptureKey {
    #[must_use]
    pub fn sentinel() -> Self {
        Self(SENTINEL_CAPTURE_KEY.to_string())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    #[must_use]
    pub fn is_sentinel(&self) -> bool {
        self.0 == SENTINEL_CAPTURE_KEY
    }
}

impl fmt::Display for CaptureKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// 來源編號標籤，固定 4 位數字
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SourceId(String);

impl SourceId {
    /// 以排序後的位置產生後備編號（補零至 4 位）
    #[must_use]
    pub fn positional(position: usize) -> Self {
        Self(format!("{position:04}"))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// 解析拍攝時間鍵
#[must_use]
pub fn parse_capture_key(filename: &str) -> Parsed<CaptureKey> {
    REGEX_CAPTURE_KEY
        .captures(filename)
        .and_then(|caps| caps.get(1))
        .map_or_else(
            || Parsed::Fallback(CaptureKey::sentinel()),
            |m| Parsed::Found(CaptureKey(m.as_str().to_string())),
        )
}

/// 取得拍攝時間鍵，比對不到時回傳最小鍵值
#[must_use]
pub fn extract_capture_key(filename: &str) -> CaptureKey {
    parse_capture_key(filename).into_inner()
}

/// 解析來源編號，比對不到時以排序位置代替
#[must_use]
pub fn parse_source_id(filename: &str, position: usize) -> Parsed<SourceId> {
    REGEX_SOURCE_ID
        .captures(filename)
        .and_then(|caps| caps.get(1))
        .map_or_else(
            || Parsed::Fallback(SourceId::positional(position)),
            |m| Parsed::Found(SourceId(m.as_str().to_string())),
        )
}
