mod ffmpeg_media;
mod ffprobe_info;
mod media_backend;
mod path_validator;

pub use ffmpeg_media::{FfmpegBackend, clip_filter, ffmpeg_available, rotation_filter};
pub use ffprobe_info::{MediaInfo, probe_media};
pub use media_backend::{
    ClipRequest, FrameMap, MediaBackend, MediaHandle, rotated_canvas, scaled_width,
};
pub use path_validator::{ensure_directory_exists, validate_directory_exists, validate_file_exists};
