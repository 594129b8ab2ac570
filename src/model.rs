use std::fmt;
use std::path::PathBuf;

/// Format chosen by the user in either front-end
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum FormatMode {
    /// Best available video merged with best available audio
    #[default]
    BestVideo,
    /// Video capped at 1080p height
    Video1080p,
    /// Audio only, transcoded to MP3
    AudioMp3,
}

impl FormatMode {
    /// All modes in the order they appear in the selectors
    pub const ALL: [FormatMode; 3] = [
        FormatMode::BestVideo,
        FormatMode::Video1080p,
        FormatMode::AudioMp3,
    ];

    /// Label shown in the combo box and the web dropdown
    pub fn label(self) -> &'static str {
        match self {
            FormatMode::BestVideo => "Video Best Quality",
            FormatMode::Video1080p => "Video 1080p (if available)",
            FormatMode::AudioMp3 => "Audio (MP3)",
        }
    }

    /// Maps a selector label back to a mode; unknown labels fall back to the default
    pub fn from_label(label: &str) -> Self {
        Self::ALL
            .into_iter()
            .find(|mode| mode.label() == label.trim())
            .unwrap_or_default()
    }
}

impl fmt::Display for FormatMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// One download as submitted by the desktop form
#[derive(Clone, Debug)]
pub struct DownloadRequest {
    pub url: String,
    pub mode: FormatMode,
    pub output_dir: PathBuf,
}

/// Terminal result of one invocation, rendered by the UI
#[derive(Clone, Debug, PartialEq)]
pub struct Outcome {
    /// Status text for the user
    pub message: String,
    /// Produced file, when the front-end hands one back
    pub file: Option<PathBuf>,
}

impl Outcome {
    pub fn success(message: impl Into<String>, file: Option<PathBuf>) -> Self {
        Self { message: message.into(), file }
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Self { message: message.into(), file: None }
    }
}

/// Tagged message pushed from the download task to the UI thread
#[derive(Clone, Debug, PartialEq)]
pub enum UiEvent {
    /// Completion fraction in 0.0..=1.0
    Progress(f32),
    Status(String),
    /// Terminal success
    Done(String),
    /// Terminal failure
    Error(String),
}

impl UiEvent {
    pub fn is_terminal(&self) -> bool {
        matches!(self, UiEvent::Done(_) | UiEvent::Error(_))
    }
}
