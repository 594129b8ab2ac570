//! Main application for the YouTube Downloader GUI

use std::{path::PathBuf, sync::Arc, time::Duration};

use anyhow::{Context, anyhow};
// eframe/egui for GUI application framework
use eframe::{App, Frame, egui};
use egui::Visuals;
// OnceCell for single-time runtime initialization
use once_cell::sync::OnceCell;
// FileDialog for folder selection dialogs
use rfd::FileDialog;
use tokio::{
    runtime::Runtime,
    sync::mpsc::{UnboundedReceiver, UnboundedSender, unbounded_channel},
};
use tracing::info;

use clipfetch::shell::DownloadPanel;
use clipfetch::{Config, DownloadRequest, Downloader, FormatMode, UiEvent, logging};

// Global Tokio runtime stored in a OnceCell for lazy init
static RUNTIME: OnceCell<Runtime> = OnceCell::new();

/// How often the window drains the event channel
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Program entry point: initializes runtime and launches GUI
fn main() -> anyhow::Result<()> {
    logging::init_tracing();

    let config = Config::from_env().context("reading configuration")?;
    let runtime = Runtime::new().context("starting tokio runtime")?;
    RUNTIME
        .set(runtime)
        .map_err(|_| anyhow!("tokio runtime initialized twice"))?;

    let options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_inner_size([760.0, 460.0])
            .with_min_inner_size([700.0, 420.0]),
        ..Default::default()
    };

    info!(folder = %config.download_dir.display(), "opening window");
    eframe::run_native(
        "YouTube Downloader",
        options,
        Box::new(move |cc| {
            // Use dark theme visuals
            cc.egui_ctx.set_visuals(Visuals::dark());
            Box::new(DownloaderApp::new(&config))
        }),
    )
    .map_err(|err| anyhow!("running window: {err}"))
}

/// Application state for the GUI
struct DownloaderApp {
    /// Input field for the video URL
    url_input: String,
    /// Destination folder for downloads
    download_folder: String,
    selected_mode: FormatMode,
    /// Progress bar, status label, and button state
    panel: DownloadPanel,
    downloader: Downloader,
    events_tx: UnboundedSender<UiEvent>,
    events_rx: UnboundedReceiver<UiEvent>,
}

impl DownloaderApp {
    fn new(config: &Config) -> Self {
        let (events_tx, events_rx) = unbounded_channel();
        Self {
            url_input: String::new(),
            download_folder: config.download_dir.display().to_string(),
            selected_mode: FormatMode::default(),
            panel: DownloadPanel::default(),
            downloader: Downloader::new(Arc::new(config.engine())),
            events_tx,
            events_rx,
        }
    }

    fn start_download(&mut self) {
        let slot = match self.downloader.try_begin() {
            Ok(slot) => slot,
            Err(err) => {
                self.panel.reject(err.to_string());
                return;
            }
        };
        let Some(runtime) = RUNTIME.get() else {
            self.panel.reject("Background runtime is not running.");
            return;
        };

        let request = DownloadRequest {
            url: self.url_input.clone(),
            mode: self.selected_mode,
            output_dir: PathBuf::from(&self.download_folder),
        };
        self.panel.begin();

        // Launch the download; the task is abandoned, not joined, on exit
        let downloader = self.downloader.clone();
        let events = self.events_tx.clone();
        runtime.spawn(async move {
            let _ = downloader.run(slot, request, events).await;
        });
    }
}

/// GUI update loop: called each frame to redraw and handle interactions
impl App for DownloaderApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut Frame) {
        // Drain everything the download task queued since the last frame
        while let Ok(event) = self.events_rx.try_recv() {
            self.panel.apply(event);
        }

        egui::CentralPanel::default().show(ctx, |ui| {
            ui.heading("YouTube Downloader");
            ui.label("Paste a YouTube link, choose format, and download.");
            ui.add_space(12.0);

            // URL input field
            ui.add(
                egui::TextEdit::singleline(&mut self.url_input)
                    .hint_text("https://www.youtube.com/watch?v=...")
                    .desired_width(f32::INFINITY),
            );

            // Format dropdown and folder selection
            ui.horizontal(|ui| {
                egui::ComboBox::from_id_source("format")
                    .selected_text(self.selected_mode.label())
                    .show_ui(ui, |ui| {
                        for mode in FormatMode::ALL {
                            ui.selectable_value(&mut self.selected_mode, mode, mode.label());
                        }
                    });
                ui.text_edit_singleline(&mut self.download_folder);
            });

            if ui.button("Choose Folder").clicked() {
                if let Some(folder) = FileDialog::new().set_directory(&self.download_folder).pick_folder() {
                    self.download_folder = folder.display().to_string();
                }
            }

            ui.add_space(6.0);
            ui.add(egui::ProgressBar::new(self.panel.progress).show_percentage());
            ui.label(&self.panel.message);
            ui.add_space(6.0);

            let button = egui::Button::new(self.panel.button_label());
            if ui.add_enabled(self.panel.button_enabled(), button).clicked() {
                self.start_download();
            }
        });

        // Request periodic repaint for progress updates
        ctx.request_repaint_after(POLL_INTERVAL);
    }
}
