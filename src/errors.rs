/*!
 * Error types for the lingoclip media-assembly engine.
 *
 * Every failure inside a selection pipeline is a `MediaError`; the
 * per-selection boundary wraps it into a `SelectionError` carrying the
 * selection identifier and the stage that failed.
 */

use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Errors produced by the media stages and the external tool boundary
#[derive(Error, Debug)]
pub enum MediaError {
    /// Source unreadable, or every extraction strategy was exhausted
    #[error("Extraction failed for {source_path:?}: {message}")]
    Extraction {
        /// Source media file
        source_path: PathBuf,
        /// What went wrong
        message: String,
    },

    /// Overlay source missing or malformed
    #[error("Synchronization error: {0}")]
    Synchronization(String),

    /// Stream mismatch that even the filter-graph fallback could not join
    #[error("Concatenation error: {0}")]
    Concatenation(String),

    /// Composed output duration drifted beyond tolerance
    #[error("Composition error: expected {expected:.3}s, got {actual:.3}s ({message})")]
    Composition {
        /// Expected composed duration in seconds
        expected: f64,
        /// Probed composed duration in seconds
        actual: f64,
        /// Layout or stage context
        message: String,
    },

    /// Post-step artifact failed existence, size or playability checks
    #[error("Validation failed for {path:?}: {reason}")]
    Validation {
        /// Offending artifact
        path: PathBuf,
        /// Failed check
        reason: String,
    },

    /// External call exceeded its bound
    #[error("{tool} timed out after {secs}s")]
    Timeout {
        /// Tool name (ffmpeg, ffprobe)
        tool: String,
        /// Timeout that was exceeded
        secs: u64,
    },

    /// External tool exited unsuccessfully
    #[error("{tool} failed (exit code {}): {diagnostic}", exit_code.map(|c| c.to_string()).unwrap_or_else(|| "none".to_string()))]
    Tool {
        /// Tool name
        tool: String,
        /// Exit code, if the process exited normally
        exit_code: Option<i32>,
        /// Filtered stderr
        diagnostic: String,
    },

    /// Invalid configuration value
    #[error("Configuration error: {0}")]
    Config(String),

    /// Filesystem error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl MediaError {
    /// Shorthand for a validation failure
    pub fn validation(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::Validation {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Whether this error came from a timed-out external call
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }
}

/// Pipeline stage names, used for logging and the manifest's skip reasons
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Prepare,
    Extract,
    Synchronize,
    Repeat,
    Concatenate,
    Slide,
    Layout,
    Gain,
    Publish,
    Batch,
    /// The worker running the pipeline died
    Worker,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Prepare => "prepare",
            Self::Extract => "extract",
            Self::Synchronize => "synchronize",
            Self::Repeat => "repeat",
            Self::Concatenate => "concatenate",
            Self::Slide => "slide",
            Self::Layout => "layout",
            Self::Gain => "gain",
            Self::Publish => "publish",
            Self::Batch => "batch",
            Self::Worker => "worker",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Failure of one selection's pipeline; never aborts sibling selections
#[derive(Error, Debug)]
#[error("Selection '{selection_id}' failed at {stage}: {source}")]
pub struct SelectionError {
    /// Identifier of the failed selection
    pub selection_id: String,
    /// Stage that failed
    pub stage: Stage,
    /// Underlying media error
    #[source]
    pub source: MediaError,
}

impl SelectionError {
    pub fn new(selection_id: impl Into<String>, stage: Stage, source: MediaError) -> Self {
        Self {
            selection_id: selection_id.into(),
            stage,
            source,
        }
    }
}

/// Attach a stage to a `MediaError` result
pub trait StageContext<T> {
    fn at_stage(self, selection_id: &str, stage: Stage) -> Result<T, SelectionError>;
}

impl<T> StageContext<T> for Result<T, MediaError> {
    fn at_stage(self, selection_id: &str, stage: Stage) -> Result<T, SelectionError> {
        self.map_err(|e| SelectionError::new(selection_id, stage, e))
    }
}
