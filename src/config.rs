//! Settings read from the environment at startup.

use std::path::PathBuf;

use thiserror::Error;

use crate::engine::YtDlp;

pub const DEFAULT_PORT: u16 = 7860;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("PORT must be a port number, got {0:?}")]
    InvalidPort(String),
}

#[derive(Clone, Debug)]
pub struct Config {
    /// Web listening port (`PORT`)
    pub port: u16,
    /// yt-dlp executable (`YTDLP_PATH`)
    pub ytdlp: Option<PathBuf>,
    /// Forwarded to yt-dlp as `--ffmpeg-location` (`FFMPEG_LOCATION`)
    pub ffmpeg_location: Option<PathBuf>,
    /// Pre-filled output folder of the desktop window
    pub download_dir: PathBuf,
    /// Where the web variant keeps files until they are fetched (`CLIPFETCH_FILES_DIR`)
    pub files_dir: PathBuf,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        let port = match get("PORT") {
            Some(raw) => raw
                .trim()
                .parse()
                .map_err(|_| ConfigError::InvalidPort(raw.clone()))?,
            None => DEFAULT_PORT,
        };

        Ok(Self {
            port,
            ytdlp: get("YTDLP_PATH").map(PathBuf::from),
            ffmpeg_location: get("FFMPEG_LOCATION").map(PathBuf::from),
            download_dir: default_download_dir(),
            files_dir: get("CLIPFETCH_FILES_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| std::env::temp_dir().join("clipfetch")),
        })
    }

    pub fn engine(&self) -> YtDlp {
        let engine = match &self.ytdlp {
            Some(program) => YtDlp::new(program),
            None => YtDlp::default(),
        };
        engine.with_ffmpeg_location(self.ffmpeg_location.clone())
    }
}

fn default_download_dir() -> PathBuf {
    dirs::download_dir()
        .or_else(|| dirs::home_dir().map(|home| home.join("Downloads")))
        .unwrap_or_else(|| PathBuf::from("./downloads"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(vars: &[(&str, &str)]) -> Result<Config, ConfigError> {
        let vars: HashMap<String, String> =
            vars.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults_when_unset() {
        let config = config(&[]).unwrap();
        assert_eq!(config.port, 7860);
        assert_eq!(config.ytdlp, None);
        assert_eq!(config.ffmpeg_location, None);
        assert_eq!(config.files_dir, std::env::temp_dir().join("clipfetch"));
    }

    #[test]
    fn reads_overrides() {
        let config = config(&[
            ("PORT", " 8080 "),
            ("YTDLP_PATH", "/opt/yt-dlp"),
            ("FFMPEG_LOCATION", "/opt/ffmpeg/bin"),
            ("CLIPFETCH_FILES_DIR", "/srv/clipfetch"),
        ])
        .unwrap();
        assert_eq!(config.port, 8080);
        assert_eq!(config.ytdlp, Some(PathBuf::from("/opt/yt-dlp")));
        assert_eq!(config.ffmpeg_location, Some(PathBuf::from("/opt/ffmpeg/bin")));
        assert_eq!(config.files_dir, PathBuf::from("/srv/clipfetch"));
    }

    #[test]
    fn blank_port_uses_default_and_garbage_is_rejected() {
        assert_eq!(config(&[("PORT", "")]).unwrap().port, 7860);
        let err = config(&[("PORT", "seventy")]).unwrap_err();
        assert_eq!(err.to_string(), "PORT must be a port number, got \"seventy\"");
    }
}
