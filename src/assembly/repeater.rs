/*!
 * N-times repetition of a clip for pedagogical repetition.
 *
 * Preferred path: a concat-demuxer playlist naming the clip n times,
 * remuxed without re-encoding. When the remux is rejected the clip is
 * duplicated through `split`/`asplit` and re-encoded.
 */

use log::{debug, warn};

use crate::app_config::QualityConfig;
use crate::errors::MediaError;
use crate::media::artifact::{ClipArtifact, Provenance, bitexact_args, encoder_args};
use crate::media::tool::FfmpegArgs;
use crate::media::MediaContext;

use super::filters::{concat_playlist, repeat_filter_graph};
use super::janitor::ArtifactScope;

/// Highest repetition count accepted
pub const MAX_REPEAT: u32 = 5;

/// Which path produced the repeated clip
#[derive(Debug)]
pub enum RepeatOutcome {
    /// n == 1; the input is returned as-is
    Unchanged(ClipArtifact),
    /// Playlist remux, no re-encode
    Remuxed(ClipArtifact),
    /// Filter-graph duplication after the remux failed
    Reencoded {
        artifact: ClipArtifact,
        remux_failure: String,
    },
}

impl RepeatOutcome {
    pub fn artifact(&self) -> &ClipArtifact {
        match self {
            Self::Unchanged(artifact) | Self::Remuxed(artifact) | Self::Reencoded { artifact, .. } => artifact,
        }
    }

    pub fn into_artifact(self) -> ClipArtifact {
        match self {
            Self::Unchanged(artifact) | Self::Remuxed(artifact) | Self::Reencoded { artifact, .. } => artifact,
        }
    }
}

pub struct SegmentRepeater {
    quality: QualityConfig,
}

impl SegmentRepeater {
    pub fn new(quality: QualityConfig) -> Self {
        Self { quality }
    }

    /// Allowed drift of an n-times repetition
    pub fn tolerance(clip: &ClipArtifact, n: u32) -> f64 {
        clip.profile.frame_interval().max(0.02) + 0.01 * n as f64
    }

    /// Repeat `clip` `n` times. The clip must already be rebased to 0.
    pub async fn repeat(
        &self,
        ctx: &MediaContext,
        scope: &ArtifactScope,
        clip: &ClipArtifact,
        n: u32,
    ) -> Result<RepeatOutcome, MediaError> {
        if n == 0 || n > MAX_REPEAT {
            return Err(MediaError::Config(format!(
                "repeat count {} outside 1..={}",
                n, MAX_REPEAT
            )));
        }
        if n == 1 {
            return Ok(RepeatOutcome::Unchanged(clip.clone()));
        }

        let expected = clip.duration * n as f64;
        match self.remux(ctx, scope, clip, n, expected).await {
            Ok(artifact) => {
                debug!("Remuxed {:?} x{}", clip.path, n);
                Ok(RepeatOutcome::Remuxed(artifact))
            }
            Err(e @ MediaError::Timeout { .. }) => Err(e),
            Err(e) => {
                warn!("Playlist remux of {:?} failed, duplicating via filter graph: {}", clip.path, e);
                let artifact = self.duplicate(ctx, scope, clip, n, expected).await?;
                Ok(RepeatOutcome::Reencoded {
                    artifact,
                    remux_failure: e.to_string(),
                })
            }
        }
    }

    async fn remux(
        &self,
        ctx: &MediaContext,
        scope: &ArtifactScope,
        clip: &ClipArtifact,
        n: u32,
        expected: f64,
    ) -> Result<ClipArtifact, MediaError> {
        let playlist = scope.allocate("repeat", "txt");
        let entries = std::iter::repeat_n(clip.path.as_path(), n as usize);
        std::fs::write(&playlist, concat_playlist(entries))?;

        let output = scope.allocate("repeated", "mp4");
        let args = FfmpegArgs::new()
            .args(["-f", "concat", "-safe", "0"])
            .input(&playlist)
            .args(["-map", "0:v:0", "-map", "0:a:0?", "-c", "copy"])
            .args(bitexact_args())
            .output(&output);
        ctx.ffmpeg(args).await?;

        ClipArtifact::from_output(ctx, &output, clip.provenance, Some(expected), Self::tolerance(clip, n)).await
    }

    async fn duplicate(
        &self,
        ctx: &MediaContext,
        scope: &ArtifactScope,
        clip: &ClipArtifact,
        n: u32,
        expected: f64,
    ) -> Result<ClipArtifact, MediaError> {
        let output = scope.allocate("repeated-enc", "mp4");
        let mut args = FfmpegArgs::new()
            .input(&clip.path)
            .arg("-filter_complex")
            .arg(repeat_filter_graph(n, clip.has_audio()))
            .args(["-map", "[v]"]);
        if clip.has_audio() {
            args = args.args(["-map", "[a]"]);
        }
        let args = args
            .args(encoder_args(&self.quality))
            .seconds("-t", expected)
            .output(&output);
        ctx.ffmpeg(args).await?;

        let tolerance = Self::tolerance(clip, n).max(self.quality.frame_interval());
        ClipArtifact::from_output(ctx, &output, Provenance::Encode, Some(expected), tolerance).await
    }
}
