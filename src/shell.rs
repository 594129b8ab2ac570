use crate::model::UiEvent;

/// Whether the desktop window currently has a download running
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum DownloadStatus {
    #[default]
    Idle,
    Downloading,
}

/// Display state of the desktop window, fed by drained events
#[derive(Clone, Debug)]
pub struct DownloadPanel {
    pub status: DownloadStatus,
    /// Progress bar value (0.0 to 1.0)
    pub progress: f32,
    /// Text of the status label
    pub message: String,
}

impl Default for DownloadPanel {
    fn default() -> Self {
        Self {
            status: DownloadStatus::Idle,
            progress: 0.0,
            message: "Idle".to_string(),
        }
    }
}

impl DownloadPanel {
    /// Idle -> Downloading, once the download slot was claimed
    pub fn begin(&mut self) {
        self.status = DownloadStatus::Downloading;
    }

    /// Shows a message without touching the state (e.g. a rejected submit)
    pub fn reject(&mut self, message: impl Into<String>) {
        self.message = message.into();
    }

    pub fn apply(&mut self, event: UiEvent) {
        if event.is_terminal() {
            self.status = DownloadStatus::Idle;
        }
        match event {
            UiEvent::Progress(value) => self.progress = value.clamp(0.0, 1.0),
            UiEvent::Status(text) | UiEvent::Error(text) => self.message = text,
            UiEvent::Done(text) => {
                self.progress = 1.0;
                self.message = text;
            }
        }
    }

    pub fn button_enabled(&self) -> bool {
        self.status == DownloadStatus::Idle
    }

    pub fn button_label(&self) -> &'static str {
        match self.status {
            DownloadStatus::Idle => "Download",
            DownloadStatus::Downloading => "Downloading...",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_idle() {
        let panel = DownloadPanel::default();
        assert_eq!(panel.status, DownloadStatus::Idle);
        assert_eq!(panel.message, "Idle");
        assert!(panel.button_enabled());
        assert_eq!(panel.button_label(), "Download");
    }

    #[test]
    fn downloading_disables_the_button_until_a_terminal_event() {
        let mut panel = DownloadPanel::default();
        panel.begin();
        assert!(!panel.button_enabled());
        assert_eq!(panel.button_label(), "Downloading...");

        panel.apply(UiEvent::Progress(0.5));
        panel.apply(UiEvent::Status("Downloading... 2.00 MB/s".into()));
        assert_eq!(panel.status, DownloadStatus::Downloading);
        assert_eq!(panel.message, "Downloading... 2.00 MB/s");

        panel.apply(UiEvent::Done("Finished: clip".into()));
        assert_eq!(panel.status, DownloadStatus::Idle);
        assert_eq!(panel.progress, 1.0);
        assert_eq!(panel.message, "Finished: clip");
    }

    #[test]
    fn error_re_enables_and_keeps_progress() {
        let mut panel = DownloadPanel::default();
        panel.begin();
        panel.apply(UiEvent::Progress(0.3));
        panel.apply(UiEvent::Error("Download failed: boom".into()));
        assert!(panel.button_enabled());
        assert_eq!(panel.progress, 0.3);
        assert_eq!(panel.message, "Download failed: boom");
    }

    #[test]
    fn rejected_submit_only_changes_the_label() {
        let mut panel = DownloadPanel::default();
        panel.begin();
        panel.reject("A download is already in progress.");
        assert_eq!(panel.status, DownloadStatus::Downloading);
        assert_eq!(panel.message, "A download is already in progress.");
    }
}
