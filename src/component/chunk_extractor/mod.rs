//! 時間軸切片擷取元件
//!
//! 流程：
//! A. 掃描資料夾並依拍攝時間排序來源
//! B. 讀取各來源長度，串接成虛擬時間軸
//! C. 依固定間隔排出切片
//! D. 每個切片輸出帶網格的截圖與子片段
//! E. 依輸出資料夾既有編號接續命名

mod chunk_plan;
mod extractor;
mod filename_tag;
mod grid_overlay;
mod main;
mod output_namer;
mod timeline;

pub use chunk_plan::{ChunkRecord, ChunkWalker, format_hhmmss};
pub use extractor::{ChunkExtractor, ChunkOutcome, ExtractionSummary, ExtractorConfig};
pub use filename_tag::{
    CaptureKey, Parsed, SENTINEL_CAPTURE_KEY, SourceId, extract_capture_key, parse_capture_key,
    parse_source_id,
};
pub use grid_overlay::{GridStyle, draw_grid, grid_line_positions};
pub use main::ChunkExtractionRunner;
pub use output_namer::{
    ArtifactKind, OutputArtifact, SequenceCounter, next_index, parse_sequence_marker,
};
pub use timeline::{
    SourceCandidate, SourceFile, Timeline, TimelinePosition, discover_sources,
    order_by_capture_key,
};
