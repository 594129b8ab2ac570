//! The external download engine: yt-dlp run as a child process.

use std::collections::VecDeque;
use std::io;
use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};

use async_trait::async_trait;
use serde::Deserialize;
use thiserror::Error;
use tokio::{
    io::{AsyncBufReadExt, AsyncRead, BufReader},
    process::Command,
};
use tracing::{debug, info, warn};

use crate::options::{EngineOptions, RESULT_PREFIX};
use crate::progress::{ProgressHook, parse_progress_from_line};

/// Stderr lines kept around for building the failure message
const STDERR_TAIL: usize = 200;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("could not start {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },
    #[error("{0}")]
    Io(#[from] io::Error),
    /// The engine ran and reported a failure
    #[error("{0}")]
    Failed(String),
}

/// What the engine hands back after a successful run
#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
pub struct EngineReport {
    pub title: Option<String>,
    /// Final path of the produced file, after merging or transcoding
    pub filepath: Option<PathBuf>,
}

/// Anything able to fetch one URL with a set of options
#[async_trait]
pub trait Engine: Send + Sync {
    async fn fetch(&self, url: &str, options: &EngineOptions) -> Result<EngineReport, EngineError>;
}

#[derive(Clone, Debug)]
pub struct YtDlp {
    program: PathBuf,
    ffmpeg_location: Option<PathBuf>,
}

impl YtDlp {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self { program: program.into(), ffmpeg_location: None }
    }

    pub fn with_ffmpeg_location(mut self, location: Option<PathBuf>) -> Self {
        self.ffmpeg_location = location;
        self
    }
}

impl Default for YtDlp {
    fn default() -> Self {
        let bin = if cfg!(target_os = "windows") { "yt-dlp.exe" } else { "yt-dlp" };
        Self::new(bin)
    }
}

#[async_trait]
impl Engine for YtDlp {
    async fn fetch(&self, url: &str, options: &EngineOptions) -> Result<EngineReport, EngineError> {
        let mut command = Command::new(&self.program);
        command.args(options.to_args());
        if let Some(location) = &self.ffmpeg_location {
            command.arg("--ffmpeg-location").arg(location);
        }
        command
            .arg("--")
            .arg(url)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        info!(program = %self.program.display(), format = %options.format, url, "starting yt-dlp");
        let mut child = command.spawn().map_err(|source| EngineError::Spawn {
            program: self.program.display().to_string(),
            source,
        })?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| io::Error::other("yt-dlp stdout was not captured"))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| io::Error::other("yt-dlp stderr was not captured"))?;

        let hooks = &options.progress_hooks;
        let (out, err) =
            match tokio::try_join!(read_stream(stdout, hooks), read_stream(stderr, hooks)) {
                Ok(streams) => streams,
                Err(read_err) => {
                    // yt-dlp must not outlive the download slot
                    let _ = child.kill().await;
                    return Err(read_err.into());
                }
            };
        let status = child.wait().await?;

        if !status.success() {
            let message = failure_message(&err.lines, status);
            warn!(%status, %message, "yt-dlp failed");
            return Err(EngineError::Failed(message));
        }

        let report = out.report.or(err.report).unwrap_or_default();
        info!(title = ?report.title, file = ?report.filepath, "yt-dlp finished");
        Ok(report)
    }
}

#[derive(Default)]
struct StreamOutput {
    report: Option<EngineReport>,
    lines: VecDeque<String>,
}

/// Reads one pipe to the end, feeding progress lines to the hooks
async fn read_stream<R>(pipe: R, hooks: &[ProgressHook]) -> io::Result<StreamOutput>
where
    R: AsyncRead + Unpin,
{
    let mut output = StreamOutput::default();
    // Windows builds write the console code page, not UTF-8
    let mut lines = BufReader::new(pipe).split(b'\n');
    while let Some(bytes) = lines.next_segment().await? {
        let line = String::from_utf8_lossy(&bytes).trim_end_matches('\r').to_string();
        if let Some(progress) = parse_progress_from_line(&line) {
            for hook in hooks {
                hook(&progress);
            }
            continue;
        }
        if let Some(report) = parse_result_line(&line) {
            output.report = Some(report);
            continue;
        }

        debug!(line = %line, "yt-dlp");
        if output.lines.len() == STDERR_TAIL {
            output.lines.pop_front();
        }
        output.lines.push_back(line);
    }
    Ok(output)
}

fn parse_result_line(line: &str) -> Option<EngineReport> {
    let json = line.trim().strip_prefix(RESULT_PREFIX.trim_end())?;
    serde_json::from_str(json.trim()).ok()
}

/// Last `ERROR:` line, else the last non-empty line, else the exit status
fn failure_message(lines: &VecDeque<String>, status: ExitStatus) -> String {
    let error_line = lines
        .iter()
        .rev()
        .find_map(|line| line.trim().strip_prefix("ERROR:").map(str::trim));
    let last_line = lines.iter().rev().map(|line| line.trim()).find(|line| !line.is_empty());

    match error_line.or(last_line) {
        Some(message) if !message.is_empty() => message.to_string(),
        _ => format!("yt-dlp exited with {}", status),
    }
}

#[cfg(test)]
pub(crate) mod fake {
    use std::fs::OpenOptions;
    use std::io::Write;
    use std::path::Path;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::{Duration, UNIX_EPOCH};

    use super::*;
    use crate::progress::ProgressReport;

    /// Engine that replays a fixed script instead of touching the network
    #[derive(Default)]
    pub(crate) struct ScriptedEngine {
        pub reports: Vec<ProgressReport>,
        pub title: Option<String>,
        /// File name (inside the output folder) reported as the result
        pub reported_file: Option<String>,
        /// Files written to the output folder, with mtimes in seconds since the epoch
        pub files: Vec<(String, u64)>,
        pub failure: Option<String>,
        pub calls: AtomicUsize,
        pub last_options: Mutex<Option<EngineOptions>>,
    }

    impl ScriptedEngine {
        pub fn succeeding(title: &str) -> Self {
            Self { title: Some(title.to_string()), ..Default::default() }
        }

        pub fn failing(message: &str) -> Self {
            Self { failure: Some(message.to_string()), ..Default::default() }
        }

        pub fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Engine for ScriptedEngine {
        async fn fetch(&self, _url: &str, options: &EngineOptions) -> Result<EngineReport, EngineError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            *self.last_options.lock().unwrap() = Some(options.clone());

            for report in &self.reports {
                for hook in &options.progress_hooks {
                    hook(report);
                }
            }

            let dir = Path::new(&options.output_template).parent().unwrap().to_path_buf();
            for (name, mtime) in &self.files {
                let mut file = OpenOptions::new()
                    .create(true)
                    .truncate(true)
                    .write(true)
                    .open(dir.join(name))?;
                file.write_all(name.as_bytes())?;
                file.set_modified(UNIX_EPOCH + Duration::from_secs(*mtime))?;
            }

            if let Some(message) = &self.failure {
                return Err(EngineError::Failed(message.clone()));
            }
            Ok(EngineReport {
                title: self.title.clone(),
                filepath: self.reported_file.as_ref().map(|name| dir.join(name)),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::FormatMode;

    #[test]
    fn result_line_carries_title_and_path() {
        let line = r#"clipfetch-result {"title": "Big Buck Bunny", "filepath": "/tmp/a/Big Buck Bunny.mp4"}"#;
        let report = parse_result_line(line).expect("result line");
        assert_eq!(report.title.as_deref(), Some("Big Buck Bunny"));
        assert_eq!(report.filepath, Some(PathBuf::from("/tmp/a/Big Buck Bunny.mp4")));

        let partial = parse_result_line(r#"clipfetch-result {"title": "x", "filepath": null}"#)
            .expect("result line");
        assert_eq!(partial.filepath, None);
        assert!(parse_result_line("[Merger] Merging formats").is_none());
    }

    #[cfg(unix)]
    fn exit_status(code: i32) -> ExitStatus {
        use std::os::unix::process::ExitStatusExt;
        ExitStatus::from_raw(code << 8)
    }

    #[cfg(unix)]
    #[test]
    fn failure_message_prefers_error_lines() {
        let lines: VecDeque<String> = [
            "WARNING: something odd",
            "ERROR: [youtube] abc: Video unavailable",
            "trailing noise",
        ]
        .into_iter()
        .map(String::from)
        .collect();
        assert_eq!(failure_message(&lines, exit_status(1)), "[youtube] abc: Video unavailable");
    }

    #[cfg(unix)]
    #[test]
    fn failure_message_falls_back_to_last_line_then_status() {
        let lines: VecDeque<String> =
            ["first", "ffmpeg not found", "  "].into_iter().map(String::from).collect();
        assert_eq!(failure_message(&lines, exit_status(1)), "ffmpeg not found");

        let message = failure_message(&VecDeque::new(), exit_status(2));
        assert!(message.starts_with("yt-dlp exited with"), "{message}");
    }

    #[tokio::test]
    async fn non_utf8_output_is_decoded_lossily() {
        let stdout: &[u8] =
            b"clipfetch-result {\"title\": \"Cafe\", \"filepath\": null}\r\n";
        let stderr: &[u8] = b"[info] Caf\xE9 title\nERROR: Caf\xE9 is gone\n";

        let out = read_stream(stdout, &[]).await.unwrap();
        let err = read_stream(stderr, &[]).await.unwrap();

        assert_eq!(out.report.and_then(|report| report.title).as_deref(), Some("Cafe"));
        assert_eq!(err.lines.len(), 2);
        assert_eq!(err.lines[0], "[info] Caf\u{FFFD} title");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn non_utf8_stderr_does_not_fail_a_finished_run() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("yt-dlp");
        std::fs::write(
            &script,
            "#!/bin/sh\n\
             printf '[info] Caf\\351 title\\n' >&2\n\
             echo 'clipfetch-result {\"title\": \"Cafe\", \"filepath\": null}'\n\
             exit 0\n",
        )
        .unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();

        let engine = YtDlp::new(&script);
        let options = EngineOptions::for_mode(FormatMode::BestVideo, dir.path());
        // a freshly written script can briefly be "text file busy" while other tests fork
        let mut result = engine.fetch("https://example.com/v", &options).await;
        for _ in 0..5 {
            let busy = matches!(
                &result,
                Err(EngineError::Spawn { source, .. }) if source.raw_os_error() == Some(26)
            );
            if !busy {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(50)).await;
            result = engine.fetch("https://example.com/v", &options).await;
        }

        let report = result.unwrap();
        assert_eq!(report.title.as_deref(), Some("Cafe"));
        assert_eq!(report.filepath, None);
    }

    #[tokio::test]
    async fn missing_binary_is_a_spawn_error() {
        let engine = YtDlp::new("/definitely/not/here/yt-dlp");
        let options = EngineOptions::for_mode(FormatMode::BestVideo, &std::env::temp_dir());
        let err = engine.fetch("https://example.com/v", &options).await.unwrap_err();
        assert!(matches!(err, EngineError::Spawn { .. }));
        assert!(err.to_string().starts_with("could not start /definitely/not/here/yt-dlp"));
    }
}
