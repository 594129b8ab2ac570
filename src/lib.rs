//! Desktop and web front-ends over yt-dlp.

// Settings from the environment
pub mod config;
// Single-flight download invoker for the desktop window
pub mod downloader;
// yt-dlp child process behind the Engine trait
pub mod engine;
// Tracing subscriber setup
pub mod logging;
// Format modes, requests, outcomes, and UI events
pub mod model;
// Format mode -> yt-dlp options
pub mod options;
// Progress parsing and the relay to the UI
pub mod progress;
// Desktop window state machine
pub mod shell;
// Web form and file serving
pub mod web;

pub use config::Config;
pub use downloader::{DownloadError, Downloader};
pub use engine::{Engine, EngineError, EngineReport, YtDlp};
pub use model::{DownloadRequest, FormatMode, Outcome, UiEvent};
pub use options::EngineOptions;
