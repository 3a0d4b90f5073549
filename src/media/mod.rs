/*!
 * Media primitives shared by every assembly stage.
 *
 * - `tool`: the ffmpeg/ffprobe boundary with per-call timeouts
 * - `probe`: probed metadata, the probe cache and source handles
 * - `artifact`: clip artifacts, stream profiles and output validation
 */

use std::path::Path;
use std::sync::Arc;

use crate::errors::MediaError;

pub mod artifact;
pub mod probe;
pub mod tool;

pub use self::artifact::{ClipArtifact, Provenance, StreamProfile, is_uniform};
pub use self::probe::{MediaHandle, MediaInfo, MediaLibrary, ProbeCache};
pub use self::tool::{FfmpegArgs, FfmpegTool, MediaTool, ToolOutput};

/// Tool and probe cache handed to every stage
#[derive(Clone)]
pub struct MediaContext {
    pub tool: Arc<dyn MediaTool>,
    pub probes: ProbeCache,
}

impl MediaContext {
    pub fn new(tool: Arc<dyn MediaTool>, probes: ProbeCache) -> Self {
        Self { tool, probes }
    }

    /// Run one ffmpeg invocation; the output path's cache entry is dropped
    /// first since the file is about to be rewritten
    pub async fn ffmpeg(&self, args: Vec<String>) -> Result<ToolOutput, MediaError> {
        if let Some(output) = args.last() {
            self.probes.invalidate(Path::new(output));
        }
        self.tool.ffmpeg(&args).await
    }

    pub async fn probe(&self, path: &Path) -> Result<MediaInfo, MediaError> {
        self.probes.probe(self.tool.as_ref(), path).await
    }
}
