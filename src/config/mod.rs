pub mod load;
pub mod save;
pub mod types;

pub use types::{
    Config, ExtractionSettings, MAX_RECENT_PATHS, SETTINGS_FILE, SingleVideoSettings, UserSettings,
};
