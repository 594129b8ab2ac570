use std::sync::{Arc, Mutex};

use serde::Deserialize;
use tokio::sync::mpsc::UnboundedSender;

use crate::model::UiEvent;

/// Prefix yt-dlp puts in front of every progress line we ask it for
pub const PROGRESS_PREFIX: &str = "clipfetch-progress ";

/// In-flight fractions stop here; only the Done event fills the bar.
const IN_FLIGHT_CEILING: f32 = 0.99;

/// Callback the engine invokes for every progress report
pub type ProgressHook = Arc<dyn Fn(&ProgressReport) + Send + Sync>;

/// Phase reported by the engine
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    Downloading,
    /// Transfer done, post-processing about to start
    Finished,
    #[default]
    #[serde(other)]
    Other,
}

/// One progress payload as emitted by yt-dlp's progress template
#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
pub struct ProgressReport {
    #[serde(default)]
    pub status: Phase,
    pub downloaded_bytes: Option<f64>,
    pub total_bytes: Option<f64>,
    pub total_bytes_estimate: Option<f64>,
    /// Bytes per second
    pub speed: Option<f64>,
}

impl ProgressReport {
    /// Exact total when known, otherwise the engine's estimate
    pub fn total(&self) -> Option<f64> {
        self.total_bytes
            .or(self.total_bytes_estimate)
            .filter(|total| *total > 0.0)
    }
}

/// Parses a `clipfetch-progress {...}` line into a report
pub fn parse_progress_from_line(line: &str) -> Option<ProgressReport> {
    let json = line.trim().strip_prefix(PROGRESS_PREFIX.trim_end())?;
    serde_json::from_str(json.trim()).ok()
}

/// Turns engine reports into UI events
pub struct ProgressRelay {
    events: UnboundedSender<UiEvent>,
    high_water: Mutex<f32>,
}

impl ProgressRelay {
    pub fn new(events: UnboundedSender<UiEvent>) -> Self {
        Self { events, high_water: Mutex::new(0.0) }
    }

    pub fn handle(&self, report: &ProgressReport) {
        match report.status {
            Phase::Downloading => {
                if let Some(total) = report.total() {
                    let downloaded = report.downloaded_bytes.unwrap_or(0.0);
                    let fraction = (downloaded / total).clamp(0.0, 1.0) as f32;
                    let fraction = self.raise(fraction.min(IN_FLIGHT_CEILING));
                    let _ = self.events.send(UiEvent::Progress(fraction));
                }

                let status = match report.speed.filter(|speed| *speed > 0.0) {
                    Some(speed) => {
                        format!("Downloading... {:.2} MB/s", speed / (1024.0 * 1024.0))
                    }
                    None => "Downloading...".to_string(),
                };
                let _ = self.events.send(UiEvent::Status(status));
            }
            Phase::Finished => {
                let _ = self.events.send(UiEvent::Status("Processing media...".to_string()));
            }
            Phase::Other => {}
        }
    }

    // Merged downloads fetch video and audio separately; keep the bar from rewinding.
    fn raise(&self, fraction: f32) -> f32 {
        let mut high_water = match self.high_water.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if fraction > *high_water {
            *high_water = fraction;
        }
        *high_water
    }
}

/// Builds the hook handed to the engine for the desktop window
pub fn progress_hook(events: UnboundedSender<UiEvent>) -> ProgressHook {
    let relay = ProgressRelay::new(events);
    Arc::new(move |report| relay.handle(report))
}
