use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use thiserror::Error;
use tokio::sync::mpsc::UnboundedSender;
use tracing::{info, warn};

use crate::engine::{Engine, EngineError, EngineReport};
use crate::model::{DownloadRequest, UiEvent};
use crate::options::EngineOptions;
use crate::progress::progress_hook;

#[derive(Debug, Error)]
pub enum DownloadError {
    #[error("Please enter a YouTube URL.")]
    MissingUrl,
    #[error("A download is already in progress.")]
    AlreadyRunning,
    #[error("Could not create folder {}: {source}", path.display())]
    OutputDir {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("Download failed: {0}")]
    Engine(#[from] EngineError),
}

/// Proof that this caller owns the single download slot; released on drop
#[derive(Debug)]
pub struct DownloadSlot {
    busy: Arc<AtomicBool>,
}

impl Drop for DownloadSlot {
    fn drop(&mut self) {
        self.busy.store(false, Ordering::Release);
    }
}

/// Desktop download invoker: one engine run at a time
#[derive(Clone)]
pub struct Downloader {
    engine: Arc<dyn Engine>,
    busy: Arc<AtomicBool>,
}

impl Downloader {
    pub fn new(engine: Arc<dyn Engine>) -> Self {
        Self { engine, busy: Arc::new(AtomicBool::new(false)) }
    }

    /// Claims the download slot, failing if a download is in flight
    pub fn try_begin(&self) -> Result<DownloadSlot, DownloadError> {
        self.busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| DownloadError::AlreadyRunning)?;
        Ok(DownloadSlot { busy: Arc::clone(&self.busy) })
    }

    /// Runs one download while holding `slot`, reporting through `events`.
    ///
    /// Always ends with exactly one terminal event (Done or Error).
    pub async fn run(
        &self,
        slot: DownloadSlot,
        request: DownloadRequest,
        events: UnboundedSender<UiEvent>,
    ) -> Result<EngineReport, DownloadError> {
        let result = self.execute(&request, &events).await;
        drop(slot);

        match &result {
            Ok(report) => {
                let title = report.title.as_deref().unwrap_or("Download complete");
                info!(title, "download finished");
                let _ = events.send(UiEvent::Done(format!("Finished: {}", title)));
            }
            Err(err) => {
                warn!(error = %err, "download failed");
                let _ = events.send(UiEvent::Error(err.to_string()));
            }
        }
        result
    }

    async fn execute(
        &self,
        request: &DownloadRequest,
        events: &UnboundedSender<UiEvent>,
    ) -> Result<EngineReport, DownloadError> {
        let url = request.url.trim();
        if url.is_empty() {
            return Err(DownloadError::MissingUrl);
        }

        let output_dir = prepare_output_dir(&request.output_dir).await?;
        let options = EngineOptions::for_mode(request.mode, &output_dir)
            .with_progress_hook(progress_hook(events.clone()));

        let _ = events.send(UiEvent::Progress(0.0));
        let _ = events.send(UiEvent::Status("Starting download...".to_string()));
        info!(url, mode = %request.mode, dir = %output_dir.display(), "download started");

        Ok(self.engine.fetch(url, &options).await?)
    }
}

/// Expands `~`, creates the folder if needed, and returns its absolute path
async fn prepare_output_dir(dir: &Path) -> Result<PathBuf, DownloadError> {
    let expanded = expand_home(dir);
    let to_err = |source| DownloadError::OutputDir { path: expanded.clone(), source };
    tokio::fs::create_dir_all(&expanded).await.map_err(to_err)?;
    tokio::fs::canonicalize(&expanded).await.map_err(to_err)
}

pub fn expand_home(path: &Path) -> PathBuf {
    match (path.strip_prefix("~"), dirs::home_dir()) {
        (Ok(rest), Some(home)) => home.join(rest),
        _ => path.to_path_buf(),
    }
}
