/*!
 * Ordered joining of clips.
 *
 * Uniform inputs (same codec, resolution, frame rate and audio
 * parameters) are joined at container level with the concat demuxer.
 * Anything else goes through a filter graph that normalises every segment
 * to one frame size, frame rate and sample rate before `concat`. A failed
 * container join escalates to the filter graph once.
 */

use log::{debug, warn};

use crate::app_config::{ConcatPreference, QualityConfig};
use crate::errors::MediaError;
use crate::media::artifact::{ClipArtifact, Provenance, bitexact_args, encoder_args, is_uniform};
use crate::media::tool::{FfmpegArgs, format_secs};
use crate::media::MediaContext;
use crate::models::Resolution;

use super::filters::{concat_filter_graph, concat_playlist};
use super::janitor::ArtifactScope;

/// Which path produced the joined clip
#[derive(Debug)]
pub enum ConcatOutcome {
    /// Container-level join, streams copied
    Container(ClipArtifact),
    /// Filter-graph join; `container_failure` is set when the container
    /// path was tried first
    FilterGraph {
        artifact: ClipArtifact,
        container_failure: Option<String>,
    },
}

impl ConcatOutcome {
    pub fn artifact(&self) -> &ClipArtifact {
        match self {
            Self::Container(artifact) | Self::FilterGraph { artifact, .. } => artifact,
        }
    }

    pub fn into_artifact(self) -> ClipArtifact {
        match self {
            Self::Container(artifact) | Self::FilterGraph { artifact, .. } => artifact,
        }
    }

    pub fn is_container(&self) -> bool {
        matches!(self, Self::Container(_))
    }
}

pub struct Concatenator {
    preference: ConcatPreference,
    quality: QualityConfig,
}

impl Concatenator {
    pub fn new(preference: ConcatPreference, quality: QualityConfig) -> Self {
        Self { preference, quality }
    }

    /// Allowed drift of a join of `clips`
    fn tolerance(&self, clips: &[ClipArtifact]) -> f64 {
        let frame = clips
            .iter()
            .map(|c| c.profile.frame_interval())
            .fold(self.quality.frame_interval(), f64::max);
        frame + 0.02 * clips.len() as f64
    }

    /// Join `clips` in order. Non-uniform inputs are normalised to `target`
    /// (the first clip's frame size when `None`).
    pub async fn concat(
        &self,
        ctx: &MediaContext,
        scope: &ArtifactScope,
        clips: &[ClipArtifact],
        target: Option<Resolution>,
    ) -> Result<ConcatOutcome, MediaError> {
        let first = clips
            .first()
            .ok_or_else(|| MediaError::Concatenation("nothing to concatenate".to_string()))?;
        if clips.len() == 1 && target.is_none_or(|t| t.width == first.profile.width && t.height == first.profile.height) {
            return Ok(ConcatOutcome::Container(first.clone()));
        }

        let expected: f64 = clips.iter().map(|c| c.duration).sum();
        let target = target.unwrap_or(Resolution::new(first.profile.width, first.profile.height));
        let target_matches = first.profile.width == target.width && first.profile.height == target.height;

        let mut container_failure = None;
        if self.preference == ConcatPreference::Auto && is_uniform(clips) && target_matches {
            match self.container(ctx, scope, clips, expected).await {
                Ok(artifact) => {
                    debug!("Container-level concat of {} clip(s)", clips.len());
                    return Ok(ConcatOutcome::Container(artifact));
                }
                Err(e @ MediaError::Timeout { .. }) => return Err(e),
                Err(e) => {
                    warn!("Container-level concat failed, falling back to filter graph: {}", e);
                    container_failure = Some(e.to_string());
                }
            }
        }

        match self.filter_graph(ctx, scope, clips, expected, target).await {
            Ok(artifact) => {
                debug!("Filter-graph concat of {} clip(s)", clips.len());
                Ok(ConcatOutcome::FilterGraph {
                    artifact,
                    container_failure,
                })
            }
            Err(e @ MediaError::Timeout { .. }) => Err(e),
            Err(e) => Err(MediaError::Concatenation(match container_failure {
                Some(container) => format!("container join failed ({}) and filter graph failed ({})", container, e),
                None => format!("filter graph failed: {}", e),
            })),
        }
    }

    async fn container(
        &self,
        ctx: &MediaContext,
        scope: &ArtifactScope,
        clips: &[ClipArtifact],
        expected: f64,
    ) -> Result<ClipArtifact, MediaError> {
        let playlist = scope.allocate("concat", "txt");
        std::fs::write(&playlist, concat_playlist(clips.iter().map(|c| c.path.as_path())))?;

        let output = scope.allocate("joined", "mp4");
        let args = FfmpegArgs::new()
            .args(["-f", "concat", "-safe", "0"])
            .input(&playlist)
            .args(["-map", "0:v:0", "-map", "0:a:0?", "-c", "copy"])
            .args(bitexact_args())
            .output(&output);
        ctx.ffmpeg(args).await?;

        let provenance = if clips.iter().all(|c| c.is_lossless()) {
            Provenance::Copy
        } else {
            Provenance::Encode
        };
        ClipArtifact::from_output(ctx, &output, provenance, Some(expected), self.tolerance(clips)).await
    }

    async fn filter_graph(
        &self,
        ctx: &MediaContext,
        scope: &ArtifactScope,
        clips: &[ClipArtifact],
        expected: f64,
        target: Resolution,
    ) -> Result<ClipArtifact, MediaError> {
        let mut args = FfmpegArgs::new();
        for clip in clips {
            args = args.input(&clip.path);
        }

        // silent stand-ins for clips without audio, appended after the clips
        let mut audio_inputs = Vec::with_capacity(clips.len());
        let mut next_input = clips.len();
        for (i, clip) in clips.iter().enumerate() {
            if clip.has_audio() {
                audio_inputs.push(i);
            } else {
                args = args
                    .args(["-f", "lavfi", "-t"])
                    .arg(format_secs(clip.duration))
                    .arg("-i")
                    .arg(format!("anullsrc=r={}:cl=stereo", self.quality.sample_rate));
                audio_inputs.push(next_input);
                next_input += 1;
            }
        }

        let output = scope.allocate("joined-enc", "mp4");
        let args = args
            .arg("-filter_complex")
            .arg(concat_filter_graph(
                &audio_inputs,
                target,
                self.quality.fps,
                self.quality.sample_rate,
            ))
            .args(["-map", "[v]", "-map", "[a]"])
            .arg("-s")
            .arg(target.as_size())
            .args(encoder_args(&self.quality))
            .seconds("-t", expected)
            .output(&output);
        ctx.ffmpeg(args).await?;

        ClipArtifact::from_output(ctx, &output, Provenance::Encode, Some(expected), self.tolerance(clips)).await
    }
}
