//! Web form: one synchronous download per request, file handed back by link.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use axum::{
    Form, Router,
    body::Body,
    extract::{Path as AxumPath, State},
    http::{StatusCode, header},
    response::{Html, IntoResponse, Response},
    routing::get,
};
use serde::Deserialize;
use thiserror::Error;
use tokio_util::io::ReaderStream;
use tracing::{info, warn};
use uuid::Uuid;

use crate::engine::{Engine, EngineError};
use crate::model::{FormatMode, Outcome};
use crate::options::EngineOptions;

/// Tried next to the engine-reported name when that file is missing
const CANDIDATE_EXTENSIONS: [&str; 5] = ["mp4", "mkv", "webm", "mp3", "m4a"];

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("Please paste a YouTube URL.")]
    MissingUrl,
    #[error("Download finished but file could not be located.")]
    NotLocated,
    #[error("Failed: {0}")]
    Engine(#[from] EngineError),
    #[error("Failed: {0}")]
    Io(#[from] io::Error),
}

/// Downloads `url` into a scratch directory and copies the result into `files_dir`
pub async fn fetch_to_file(
    engine: &dyn Engine,
    url: &str,
    mode: FormatMode,
    files_dir: &Path,
) -> Outcome {
    match try_fetch(engine, url, mode, files_dir).await {
        Ok((title, file)) => {
            info!(title = %title, file = %file.display(), "web download ready");
            Outcome::success(format!("Done: {}", title), Some(file))
        }
        Err(err) => {
            warn!(error = %err, "web download failed");
            Outcome::failure(err.to_string())
        }
    }
}

async fn try_fetch(
    engine: &dyn Engine,
    url: &str,
    mode: FormatMode,
    files_dir: &Path,
) -> Result<(String, PathBuf), FetchError> {
    let url = url.trim();
    if url.is_empty() {
        return Err(FetchError::MissingUrl);
    }

    // Removed when it goes out of scope, after the copy below.
    let scratch = tempfile::tempdir()?;
    let options = EngineOptions::for_mode(mode, scratch.path());
    let report = engine.fetch(url, &options).await?;
    let title = report.title.unwrap_or_else(|| "download".to_string());

    let scratch_dir = scratch.path().to_path_buf();
    let found = tokio::task::spawn_blocking(move || {
        locate_output(&scratch_dir, report.filepath.as_deref())
    })
    .await
    .map_err(io::Error::other)?
    .ok_or(FetchError::NotLocated)?;
    let name = found.file_name().ok_or(FetchError::NotLocated)?;

    // Each request gets its own folder so equal titles never overwrite each other
    let target_dir = files_dir.join(Uuid::new_v4().simple().to_string());
    tokio::fs::create_dir_all(&target_dir).await?;
    let persistent = target_dir.join(name);
    tokio::fs::copy(&found, &persistent).await?;

    Ok((title, persistent))
}

/// Blocking; run it off the async workers.
///
/// Engine-reported path, then the same stem with known extensions,
/// then the most recently modified file in `dir`.
pub fn locate_output(dir: &Path, reported: Option<&Path>) -> Option<PathBuf> {
    if let Some(guess) = reported {
        let found = std::iter::once(guess.to_path_buf())
            .chain(CANDIDATE_EXTENSIONS.iter().map(|ext| guess.with_extension(ext)))
            .find(|candidate| candidate.is_file());
        if found.is_some() {
            return found;
        }
    }
    newest_file(dir)
}

fn newest_file(dir: &Path) -> Option<PathBuf> {
    std::fs::read_dir(dir)
        .ok()?
        .filter_map(Result::ok)
        .filter_map(|entry| {
            let meta = entry.metadata().ok()?;
            if !meta.is_file() {
                return None;
            }
            Some((meta.modified().ok()?, entry.path()))
        })
        .max_by_key(|(modified, _)| *modified)
        .map(|(_, path)| path)
}

#[derive(Clone)]
pub struct WebState {
    pub engine: Arc<dyn Engine>,
    /// Finished files live here until the browser fetches them
    pub files_dir: PathBuf,
}

#[derive(Debug, Default, Deserialize)]
pub struct DownloadForm {
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub format: String,
}

pub fn router(state: WebState) -> Router {
    Router::new()
        .route("/", get(index).post(submit))
        .route("/files/{id}/{name}", get(serve_file))
        .with_state(state)
}

async fn index() -> Html<String> {
    Html(render_page("", FormatMode::default(), None))
}

async fn submit(State(state): State<WebState>, Form(form): Form<DownloadForm>) -> Html<String> {
    let mode = FormatMode::from_label(&form.format);
    let outcome = fetch_to_file(state.engine.as_ref(), &form.url, mode, &state.files_dir).await;
    Html(render_page(&form.url, mode, Some(&outcome)))
}

async fn serve_file(
    State(state): State<WebState>,
    AxumPath((id, name)): AxumPath<(String, String)>,
) -> Response {
    if !is_plain_file_name(&id) || !is_plain_file_name(&name) {
        return StatusCode::NOT_FOUND.into_response();
    }

    match tokio::fs::File::open(state.files_dir.join(&id).join(&name)).await {
        Ok(file) => {
            let disposition = format!("attachment; filename*=UTF-8''{}", urlencoding::encode(&name));
            let body = Body::from_stream(ReaderStream::new(file));
            (
                [
                    (header::CONTENT_TYPE, "application/octet-stream".to_string()),
                    (header::CONTENT_DISPOSITION, disposition),
                ],
                body,
            )
                .into_response()
        }
        Err(_) => StatusCode::NOT_FOUND.into_response(),
    }
}

/// `/files/{id}/{name}` for a file persisted by `fetch_to_file`
fn file_link(path: &Path) -> Option<(String, String)> {
    let name = path.file_name()?.to_string_lossy().into_owned();
    let id = path.parent()?.file_name()?.to_string_lossy().into_owned();
    let href = format!("/files/{}/{}", urlencoding::encode(&id), urlencoding::encode(&name));
    Some((href, name))
}

fn is_plain_file_name(name: &str) -> bool {
    !name.contains(['/', '\\'])
        && Path::new(name).file_name().is_some_and(|file| file == name)
}

fn render_page(url: &str, mode: FormatMode, outcome: Option<&Outcome>) -> String {
    let options: String = FormatMode::ALL
        .iter()
        .map(|option| {
            let selected = if *option == mode { " selected" } else { "" };
            format!(
                r#"<option value="{label}"{selected}>{label}</option>"#,
                label = escape_html(option.label()),
            )
        })
        .collect();

    let result = match outcome {
        Some(outcome) => {
            let link = outcome
                .file
                .as_deref()
                .and_then(file_link)
                .map(|(href, name)| {
                    format!(
                        r#"<p><a href="{href}" download>{text}</a></p>"#,
                        text = escape_html(&name),
                    )
                })
                .unwrap_or_default();
            format!(
                r#"<label>Status<br><textarea readonly rows="2" cols="60">{}</textarea></label>{}"#,
                escape_html(&outcome.message),
                link,
            )
        }
        None => String::new(),
    };

    format!(
        r#"<!doctype html>
<html>
<head><meta charset="utf-8"><title>YouTube Downloader</title></head>
<body>
<h2>YouTube Downloader</h2>
<p>Paste a YouTube link, choose format, then download.</p>
<form method="post" action="/">
<label>YouTube URL<br><input type="text" name="url" size="60" placeholder="https://www.youtube.com/watch?v=..." value="{url}"></label><br>
<label>Format<br><select name="format">{options}</select></label><br>
<button type="submit">Download</button>
</form>
{result}
</body>
</html>
"#,
        url = escape_html(url),
    )
}

fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            _ => escaped.push(c),
        }
    }
    escaped
}
