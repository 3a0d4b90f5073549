/*!
 * Time-range extraction from source media.
 *
 * Two strategies exist: a container-level copy (sub-second, precise only
 * when the range lands near keyframes) and a full re-encode (always frame
 * accurate). `auto` tries the copy first for short ranges and escalates to
 * encode when the copy fails validation. The outcome is returned as a
 * tagged value so callers can see which path ran.
 */

use log::{debug, info, warn};

use crate::app_config::{ExtractionConfig, ExtractionStrategy, QualityConfig};
use crate::errors::MediaError;
use crate::media::artifact::{ClipArtifact, Provenance, bitexact_args, encoder_args};
use crate::media::tool::FfmpegArgs;
use crate::media::{MediaContext, MediaHandle};
use crate::models::TimeRange;

use super::janitor::ArtifactScope;
use super::sync::SeekMode;

/// Slack added on top of one frame interval when checking durations
const DURATION_EPSILON: f64 = 0.002;

/// Which path produced the clip
#[derive(Debug)]
pub enum ExtractionOutcome {
    /// Container-level copy succeeded
    Copied(ClipArtifact),
    /// Re-encode succeeded; `copy_failure` is set when a copy was tried first
    Encoded {
        artifact: ClipArtifact,
        copy_failure: Option<String>,
    },
    /// Every attempted strategy failed
    Failed(MediaError),
}

impl ExtractionOutcome {
    pub fn artifact(&self) -> Option<&ClipArtifact> {
        match self {
            Self::Copied(artifact) | Self::Encoded { artifact, .. } => Some(artifact),
            Self::Failed(_) => None,
        }
    }

    pub fn into_result(self) -> Result<ClipArtifact, MediaError> {
        match self {
            Self::Copied(artifact) | Self::Encoded { artifact, .. } => Ok(artifact),
            Self::Failed(e) => Err(e),
        }
    }

    /// Short label for logs and tests
    pub fn path_taken(&self) -> &'static str {
        match self {
            Self::Copied(_) => "copy",
            Self::Encoded { copy_failure: Some(_), .. } => "copy->encode",
            Self::Encoded { .. } => "encode",
            Self::Failed(_) => "failed",
        }
    }
}

/// Concrete attempt order for one extraction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Attempt {
    Copy,
    Encode,
}

pub struct ClipExtractor {
    config: ExtractionConfig,
    quality: QualityConfig,
}

impl ClipExtractor {
    pub fn new(config: ExtractionConfig, quality: QualityConfig) -> Self {
        Self { config, quality }
    }

    /// Attempts for `strategy` over a range of `duration` seconds
    pub fn plan(&self, strategy: ExtractionStrategy, duration: f64) -> Vec<Attempt> {
        match strategy {
            ExtractionStrategy::Copy => vec![Attempt::Copy],
            ExtractionStrategy::Encode => vec![Attempt::Encode],
            ExtractionStrategy::Auto if duration <= self.config.copy_threshold_secs => {
                vec![Attempt::Copy, Attempt::Encode]
            }
            ExtractionStrategy::Auto => vec![Attempt::Encode],
        }
    }

    /// Extract `range` of `media` into a new artifact inside `scope`
    pub async fn extract(
        &self,
        ctx: &MediaContext,
        scope: &ArtifactScope,
        media: &MediaHandle,
        range: &TimeRange,
        strategy: ExtractionStrategy,
        seek: SeekMode,
    ) -> ExtractionOutcome {
        if let Err(e) = check_range(media, range) {
            return ExtractionOutcome::Failed(e);
        }

        let mut copy_failure = None;
        for attempt in self.plan(strategy, range.duration()) {
            match attempt {
                Attempt::Copy => match self.extract_copy(ctx, scope, media, range).await {
                    Ok(artifact) => {
                        debug!("Copied {} from {:?}", range, media.path);
                        return ExtractionOutcome::Copied(artifact);
                    }
                    Err(e @ MediaError::Timeout { .. }) => return ExtractionOutcome::Failed(e),
                    Err(e) => {
                        if strategy == ExtractionStrategy::Copy {
                            return ExtractionOutcome::Failed(MediaError::Extraction {
                                source_path: media.path.clone(),
                                message: format!("copy extraction failed: {}", e),
                            });
                        }
                        warn!("Copy extraction of {} failed, escalating to encode: {}", range, e);
                        copy_failure = Some(e.to_string());
                    }
                },
                Attempt::Encode => {
                    return match self.extract_encode(ctx, scope, media, range, seek).await {
                        Ok(artifact) => {
                            debug!("Encoded {} from {:?}", range, media.path);
                            ExtractionOutcome::Encoded { artifact, copy_failure }
                        }
                        Err(e @ MediaError::Timeout { .. }) => ExtractionOutcome::Failed(e),
                        Err(e) => ExtractionOutcome::Failed(MediaError::Extraction {
                            source_path: media.path.clone(),
                            message: match &copy_failure {
                                Some(copy) => format!("all strategies exhausted (copy: {}; encode: {})", copy, e),
                                None => format!("encode extraction failed: {}", e),
                            },
                        }),
                    };
                }
            }
        }

        ExtractionOutcome::Failed(MediaError::Extraction {
            source_path: media.path.clone(),
            message: "no extraction strategy attempted".to_string(),
        })
    }

    async fn extract_copy(
        &self,
        ctx: &MediaContext,
        scope: &ArtifactScope,
        media: &MediaHandle,
        range: &TimeRange,
    ) -> Result<ClipArtifact, MediaError> {
        let output = scope.allocate("copy", "mp4");
        let args = SeekMode::Approximate
            .input_args(&media.path, range)
            .args(["-map", "0:v:0", "-map", "0:a:0?", "-c", "copy"])
            .args(["-avoid_negative_ts", "make_zero"])
            .args(bitexact_args())
            .output(&output);
        ctx.ffmpeg(args).await?;

        let tolerance = media.info.frame_interval().unwrap_or(self.quality.frame_interval()) + DURATION_EPSILON;
        ClipArtifact::from_output(ctx, &output, Provenance::Copy, Some(range.duration()), tolerance).await
    }

    async fn extract_encode(
        &self,
        ctx: &MediaContext,
        scope: &ArtifactScope,
        media: &MediaHandle,
        range: &TimeRange,
        seek: SeekMode,
    ) -> Result<ClipArtifact, MediaError> {
        let output = scope.allocate("encode", "mp4");
        let mut args = seek
            .input_args(&media.path, range)
            .args(["-map", "0:v:0", "-map", "0:a:0?"])
            .args(["-vf", "setpts=PTS-STARTPTS"]);
        if media.info.has_audio() {
            args = args.args(["-af", "asetpts=PTS-STARTPTS"]);
        }
        let args = args.args(encoder_args(&self.quality)).output(&output);

        if range.duration() > 60.0 {
            info!("Re-encoding {:.1}s range {} of {:?}", range.duration(), range, media.path);
        }
        ctx.ffmpeg(args).await?;

        let tolerance = media
            .info
            .frame_interval()
            .unwrap_or(0.0)
            .max(self.quality.frame_interval())
            + DURATION_EPSILON;
        ClipArtifact::from_output(ctx, &output, Provenance::Encode, Some(range.duration()), tolerance).await
    }
}

fn check_range(media: &MediaHandle, range: &TimeRange) -> Result<(), MediaError> {
    if range.end <= range.start || range.start < 0.0 {
        return Err(MediaError::Extraction {
            source_path: media.path.clone(),
            message: format!("invalid range {}", range),
        });
    }
    let slack = media.info.frame_interval().unwrap_or(0.05);
    if range.end > media.duration() + slack {
        return Err(MediaError::Extraction {
            source_path: media.path.clone(),
            message: format!(
                "range {} exceeds source duration {:.3}s",
                range,
                media.duration()
            ),
        });
    }
    Ok(())
}
