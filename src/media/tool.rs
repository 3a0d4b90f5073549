/*!
 * External transcoding tool boundary.
 *
 * All ffmpeg/ffprobe invocations go through the `MediaTool` trait. The real
 * implementation spawns the tools with `tokio::process`, races each call
 * against a timeout and kills the child when the timeout wins.
 */

use async_trait::async_trait;
use log::{debug, trace};
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::process::Command;

use crate::app_config::ToolConfig;
use crate::errors::MediaError;

use super::probe::MediaInfo;

/// Captured result of a successful tool call
#[derive(Debug, Clone, Default)]
pub struct ToolOutput {
    /// Filtered stderr, kept for debug logging
    pub diagnostic: String,
}

/// Invocation surface of the external media tools
#[async_trait]
pub trait MediaTool: Send + Sync {
    /// Run ffmpeg with the given arguments; the output path is the last one
    async fn ffmpeg(&self, args: &[String]) -> Result<ToolOutput, MediaError>;

    /// Probe a media file's container and stream metadata
    async fn probe(&self, path: &Path) -> Result<MediaInfo, MediaError>;
}

/// Argument builder for one ffmpeg invocation
#[derive(Debug, Clone)]
pub struct FfmpegArgs {
    args: Vec<String>,
}

impl Default for FfmpegArgs {
    fn default() -> Self {
        Self::new()
    }
}

impl FfmpegArgs {
    /// Start an invocation that overwrites its output and never reads stdin
    pub fn new() -> Self {
        Self {
            args: vec!["-hide_banner".to_string(), "-nostdin".to_string(), "-y".to_string()],
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn input(self, path: &Path) -> Self {
        self.arg("-i").arg(path_arg(path))
    }

    /// Seconds formatted with millisecond precision
    pub fn seconds(self, flag: &str, secs: f64) -> Self {
        self.arg(flag).arg(format_secs(secs))
    }

    /// Finish with the output path
    pub fn output(self, path: &Path) -> Vec<String> {
        let mut args = self.args;
        args.push(path_arg(path));
        args
    }
}

/// Lossy path-to-argument conversion
pub fn path_arg(path: &Path) -> String {
    path.to_string_lossy().to_string()
}

/// Format seconds for ffmpeg time arguments
pub fn format_secs(secs: f64) -> String {
    format!("{:.3}", secs.max(0.0))
}

/// ffmpeg/ffprobe spawned as child processes
pub struct FfmpegTool {
    ffmpeg_path: String,
    ffprobe_path: String,
    timeout: Duration,
}

impl FfmpegTool {
    pub fn new(config: &ToolConfig) -> Self {
        Self {
            ffmpeg_path: config.ffmpeg_path.clone(),
            ffprobe_path: config.ffprobe_path.clone(),
            timeout: Duration::from_secs(config.timeout_secs),
        }
    }

    async fn run(&self, tool: &str, program: &str, args: &[String]) -> Result<std::process::Output, MediaError> {
        trace!("{} {}", program, args.join(" "));

        let child_future = Command::new(program)
            .args(args)
            .kill_on_drop(true)
            .output();

        let output = tokio::select! {
            result = child_future => {
                result.map_err(|e| MediaError::Tool {
                    tool: tool.to_string(),
                    exit_code: None,
                    diagnostic: format!("failed to execute {}: {}", program, e),
                })?
            },
            _ = tokio::time::sleep(self.timeout) => {
                return Err(MediaError::Timeout {
                    tool: tool.to_string(),
                    secs: self.timeout.as_secs(),
                });
            }
        };

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(MediaError::Tool {
                tool: tool.to_string(),
                exit_code: output.status.code(),
                diagnostic: filter_ffmpeg_stderr(&stderr),
            });
        }

        Ok(output)
    }
}

#[async_trait]
impl MediaTool for FfmpegTool {
    async fn ffmpeg(&self, args: &[String]) -> Result<ToolOutput, MediaError> {
        let output = self.run("ffmpeg", &self.ffmpeg_path, args).await?;
        let diagnostic = filter_ffmpeg_stderr(&String::from_utf8_lossy(&output.stderr));
        debug!("ffmpeg finished: {}", args.last().map(String::as_str).unwrap_or(""));
        Ok(ToolOutput { diagnostic })
    }

    async fn probe(&self, path: &Path) -> Result<MediaInfo, MediaError> {
        let args = vec![
            "-v".to_string(),
            "quiet".to_string(),
            "-print_format".to_string(),
            "json".to_string(),
            "-show_format".to_string(),
            "-show_streams".to_string(),
            path_arg(path),
        ];
        let output = self.run("ffprobe", &self.ffprobe_path, &args).await?;

        let json: Value = serde_json::from_slice(&output.stdout)
            .map_err(|e| MediaError::validation(path, format!("unparseable ffprobe output: {}", e)))?;

        MediaInfo::from_ffprobe_json(&json).map_err(|reason| MediaError::validation(path, reason))
    }
}

/// Whether an executable can be found on `PATH`
pub fn tool_on_path(program: &str) -> Option<PathBuf> {
    if program.contains(std::path::MAIN_SEPARATOR) {
        let path = PathBuf::from(program);
        return path.is_file().then_some(path);
    }
    std::env::var_os("PATH").and_then(|paths| {
        std::env::split_paths(&paths)
            .map(|dir| dir.join(program))
            .find(|candidate| candidate.is_file())
    })
}

/// Filter ffmpeg stderr to only show meaningful error lines, stripping the
/// version banner, build configuration, and stream metadata noise.
pub fn filter_ffmpeg_stderr(stderr: &str) -> String {
    let noise_prefixes = [
        "ffmpeg version",
        "ffprobe version",
        "built with",
        "configuration:",
        "lib",
        "Input #",
        "Metadata:",
        "Duration:",
        "Chapter",
        "Stream #",
        "title",
        "encoder",
        "handler_name",
        "vendor_id",
        "major_brand",
        "minor_version",
        "compatible_brands",
        "creation_time",
        "Output #",
        "Stream mapping:",
        "Press [q]",
        "frame=",
        "size=",
    ];

    let meaningful: Vec<&str> = stderr
        .lines()
        .filter(|line| {
            let trimmed = line.trim();
            if trimmed.is_empty() {
                return false;
            }
            !noise_prefixes.iter().any(|p| trimmed.starts_with(p))
        })
        .collect();

    if meaningful.is_empty() {
        "unknown ffmpeg error (stderr was empty after filtering)".to_string()
    } else {
        meaningful.join("\n")
    }
}
