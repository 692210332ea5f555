pub mod config;
pub mod cover;
pub mod db;
pub mod genres;
pub mod scanner;
pub mod tags;

/// The one audio container extension the scanner ingests.
pub const AUDIO_EXT: &str = "mp3";

/// Application name for XDG paths
pub const APP_NAME: &str = "waxcat";
