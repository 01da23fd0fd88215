pub mod config;
pub mod contracts;
pub mod pipeline;
pub mod planner;

/// Video file extensions we accept as montage clips
pub const SUPPORTED_CLIP_EXTENSIONS: &[&str] = &[
    "mp4", "mov", "mkv", "webm", "avi", "m4v", "mpg", "mpeg", "mts",
];

/// Application name for XDG paths
pub const APP_NAME: &str = "supercut";
