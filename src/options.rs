//! Options record handed to yt-dlp for one download.

use std::fmt;
use std::path::Path;

use crate::model::FormatMode;
use crate::progress::{PROGRESS_PREFIX, ProgressHook};

/// Prefix of the line yt-dlp prints once the file has its final name
pub const RESULT_PREFIX: &str = "clipfetch-result ";

/// Container used when video and audio streams are merged
const MERGE_CONTAINER: &str = "mp4";

/// Post-processing step run by the engine after the transfer
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PostProcessor {
    /// Extract the audio track with ffmpeg and transcode it
    ExtractAudio { codec: String, quality: String },
}

#[derive(Clone)]
pub struct EngineOptions {
    /// Output filename template, `%(title)s.%(ext)s` inside the target folder
    pub output_template: String,
    pub no_playlist: bool,
    /// yt-dlp format selector
    pub format: String,
    pub postprocessors: Vec<PostProcessor>,
    pub merge_output_format: Option<String>,
    pub quiet: bool,
    pub no_warnings: bool,
    pub progress_hooks: Vec<ProgressHook>,
}

impl EngineOptions {
    /// Maps a format mode to the engine configuration for `output_dir`
    pub fn for_mode(mode: FormatMode, output_dir: &Path) -> Self {
        let output_template = output_dir
            .join("%(title)s.%(ext)s")
            .to_string_lossy()
            .into_owned();

        let mut options = Self {
            output_template,
            no_playlist: true,
            format: String::new(),
            postprocessors: Vec::new(),
            merge_output_format: None,
            quiet: true,
            no_warnings: true,
            progress_hooks: Vec::new(),
        };

        match mode {
            FormatMode::AudioMp3 => {
                options.format = "bestaudio/best".to_string();
                options.postprocessors.push(PostProcessor::ExtractAudio {
                    codec: "mp3".to_string(),
                    quality: "192".to_string(),
                });
            }
            FormatMode::Video1080p => {
                options.format =
                    "bestvideo[height<=1080]+bestaudio/best[height<=1080]".to_string();
                options.merge_output_format = Some(MERGE_CONTAINER.to_string());
            }
            FormatMode::BestVideo => {
                options.format = "bestvideo+bestaudio/best".to_string();
                options.merge_output_format = Some(MERGE_CONTAINER.to_string());
            }
        }

        options
    }

    pub fn with_progress_hook(mut self, hook: ProgressHook) -> Self {
        self.progress_hooks.push(hook);
        self
    }

    /// Command-line arguments for yt-dlp, without the URL
    pub fn to_args(&self) -> Vec<String> {
        let mut args = vec!["-o".to_owned(), self.output_template.clone()];

        if self.no_playlist {
            args.push("--no-playlist".to_owned());
        }

        args.push("-f".to_owned());
        args.push(self.format.clone());

        for step in &self.postprocessors {
            match step {
                PostProcessor::ExtractAudio { codec, quality } => {
                    args.push("-x".to_owned());
                    args.push("--audio-format".to_owned());
                    args.push(codec.clone());
                    args.push("--audio-quality".to_owned());
                    args.push(format!("{}K", quality));
                }
            }
        }

        if let Some(container) = &self.merge_output_format {
            args.push("--merge-output-format".to_owned());
            args.push(container.clone());
        }

        if self.quiet {
            args.push("--quiet".to_owned());
        }
        if self.no_warnings {
            args.push("--no-warnings".to_owned());
        }

        // --quiet hides progress unless it is requested explicitly
        if !self.progress_hooks.is_empty() {
            args.push("--progress".to_owned());
            args.push("--newline".to_owned());
            args.push("--progress-template".to_owned());
            args.push(format!("download:{}%(progress)j", PROGRESS_PREFIX));
        }

        args.push("--print".to_owned());
        args.push(format!("after_move:{}%(.{{title,filepath}})j", RESULT_PREFIX));

        args
    }
}

impl fmt::Debug for EngineOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EngineOptions")
            .field("output_template", &self.output_template)
            .field("no_playlist", &self.no_playlist)
            .field("format", &self.format)
            .field("postprocessors", &self.postprocessors)
            .field("merge_output_format", &self.merge_output_format)
            .field("quiet", &self.quiet)
            .field("no_warnings", &self.no_warnings)
            .field("progress_hooks", &self.progress_hooks.len())
            .finish()
    }
}
