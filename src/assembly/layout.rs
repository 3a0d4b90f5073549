/*!
 * Final layouts.
 *
 * - Wide: AV and slide side by side at equal height, or AV, bridge and
 *   slide in sequence
 * - Short: AV fitted into the top half-band above the slide, or AV
 *   letterboxed to vertical and followed by bridge and slide
 * - Batched short: several short outputs joined up to a maximum duration
 *
 * Parallel layouts last max(AV, slide), with the shorter track holding its
 * last frame. Sequential layouts last AV + bridge + slide. Every composed
 * output then gets exactly one separate gain pass.
 */

use log::{debug, warn};

use crate::app_config::{Config, QualityConfig, ShortArrangement, ShortFormConfig, WideArrangement};
use crate::errors::MediaError;
use crate::media::artifact::{ClipArtifact, Provenance, encoder_args, validate_artifact};
use crate::media::tool::{FfmpegArgs, format_secs};
use crate::media::MediaContext;
use crate::models::{LayoutKind, Resolution};

use super::concat::Concatenator;
use super::filters::{fit_to_band, hold_filter, letterbox_filter};
use super::janitor::ArtifactScope;

/// Concrete arrangement of one composed output
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arrangement {
    SideBySide,
    Sequential,
    Stacked,
    Letterboxed,
}

impl Arrangement {
    /// Whether AV and slide play at the same time
    pub fn is_parallel(&self) -> bool {
        matches!(self, Self::SideBySide | Self::Stacked)
    }
}

/// One AV track and one slide track headed for a layout
#[derive(Debug, Clone)]
pub struct LayoutJob {
    pub av: ClipArtifact,
    pub slide: ClipArtifact,
    pub kind: LayoutKind,
    pub resolution: Resolution,
}

/// Composed duration for an arrangement
pub fn expected_duration(arrangement: Arrangement, av: f64, slide: f64, bridge: f64) -> f64 {
    if arrangement.is_parallel() {
        av.max(slide)
    } else {
        av + bridge + slide
    }
}

/// Selection indices grouped into batches, plus the ones dropped for
/// exceeding the hard cap
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BatchPlan {
    pub batches: Vec<Vec<usize>>,
    pub dropped: Vec<usize>,
}

/// Greedy batching in input order. A clip longer than `hard_cap` is
/// dropped, never truncated; a clip that would push the running batch past
/// `max_duration` starts a new batch.
pub fn plan_batches(durations: &[f64], max_duration: f64, hard_cap: f64) -> BatchPlan {
    let mut plan = BatchPlan::default();
    let mut current: Vec<usize> = Vec::new();
    let mut total = 0.0;

    for (i, &duration) in durations.iter().enumerate() {
        if !(duration.is_finite() && duration > 0.0) || duration > hard_cap {
            warn!(
                "Clip {} ({:.1}s) exceeds the {:.0}s batch cap and is dropped",
                i, duration, hard_cap
            );
            plan.dropped.push(i);
            continue;
        }
        if !current.is_empty() && total + duration > max_duration {
            plan.batches.push(std::mem::take(&mut current));
            total = 0.0;
        }
        current.push(i);
        total += duration;
    }
    if !current.is_empty() {
        plan.batches.push(current);
    }
    plan
}

pub struct LayoutCompositor {
    quality: QualityConfig,
    short_form: ShortFormConfig,
    wide: WideArrangement,
    gain_percent: f64,
}

impl LayoutCompositor {
    pub fn new(config: &Config) -> Self {
        Self {
            quality: config.quality.clone(),
            short_form: config.short_form.clone(),
            wide: config.wide_form.arrangement,
            gain_percent: config.audio_gain_percent,
        }
    }

    pub fn arrangement(&self, kind: LayoutKind) -> Arrangement {
        match kind {
            LayoutKind::Wide => match self.wide {
                WideArrangement::SideBySide => Arrangement::SideBySide,
                WideArrangement::Sequential => Arrangement::Sequential,
            },
            LayoutKind::Short | LayoutKind::BatchedShort => match self.short_form.arrangement {
                ShortArrangement::Stacked => Arrangement::Stacked,
                ShortArrangement::Letterboxed => Arrangement::Letterboxed,
            },
        }
    }

    /// Frame size of the final output
    pub fn target_resolution(&self, kind: LayoutKind) -> Resolution {
        if kind.is_short() {
            self.short_form.resolution
        } else {
            self.quality.resolution
        }
    }

    /// Frame size the slide must be rendered at
    pub fn slide_resolution(&self, kind: LayoutKind) -> Resolution {
        let target = self.target_resolution(kind);
        match self.arrangement(kind) {
            Arrangement::SideBySide => Resolution::new(target.width / 2, target.height),
            Arrangement::Stacked => Resolution::new(target.width, target.height / 2),
            Arrangement::Sequential | Arrangement::Letterboxed => target,
        }
    }

    pub fn duration_tolerance(&self) -> f64 {
        self.short_form.duration_tolerance_secs
    }

    /// Compose one output. `bridge` is required by sequential arrangements.
    pub async fn compose(
        &self,
        ctx: &MediaContext,
        scope: &ArtifactScope,
        job: &LayoutJob,
        bridge: Option<&ClipArtifact>,
        concatenator: &Concatenator,
    ) -> Result<ClipArtifact, MediaError> {
        let arrangement = self.arrangement(job.kind);
        let bridge_duration = bridge.map(|b| b.duration).unwrap_or(0.0);
        let expected = expected_duration(arrangement, job.av.duration, job.slide.duration, bridge_duration);
        debug!(
            "Composing {:?} layout at {}: AV {:.3}s, slide {:.3}s, expected {:.3}s",
            arrangement, job.resolution, job.av.duration, job.slide.duration, expected
        );

        let composed = match arrangement {
            Arrangement::SideBySide | Arrangement::Stacked => {
                self.parallel(ctx, scope, job, arrangement, expected).await?
            }
            Arrangement::Sequential | Arrangement::Letterboxed => {
                let bridge = bridge.ok_or_else(|| MediaError::Composition {
                    expected,
                    actual: 0.0,
                    message: "sequential layout requires a transition bridge".to_string(),
                })?;
                let clips = [job.av.clone(), bridge.clone(), job.slide.clone()];
                concatenator
                    .concat(ctx, scope, &clips, Some(job.resolution))
                    .await?
                    .into_artifact()
            }
        };

        self.check_duration(&composed, expected, "composition")?;
        Ok(composed)
    }

    async fn parallel(
        &self,
        ctx: &MediaContext,
        scope: &ArtifactScope,
        job: &LayoutJob,
        arrangement: Arrangement,
        expected: f64,
    ) -> Result<ClipArtifact, MediaError> {
        let fps = self.quality.fps;
        let target = job.resolution;
        let av_hold = hold_filter(expected - job.av.duration);
        let slide_hold = hold_filter(expected - job.slide.duration);

        let (av_fit, panel, stack) = match arrangement {
            Arrangement::SideBySide => {
                let panel = Resolution::new(target.width / 2, target.height);
                (letterbox_filter(panel), panel, "hstack")
            }
            _ => {
                let band = Resolution::new(target.width, target.height / 2);
                let source = Resolution::new(job.av.profile.width, job.av.profile.height);
                (fit_to_band(source, band).filter(), band, "vstack")
            }
        };

        let with_hold = |chain: String, hold: &Option<String>| match hold {
            Some(hold) => format!("{},{}", chain, hold),
            None => chain,
        };
        let av_chain = with_hold(format!("[0:v:0]{},fps={},setpts=PTS-STARTPTS", av_fit, fps), &av_hold);
        let slide_chain = with_hold(
            format!("[1:v:0]{},fps={},setpts=PTS-STARTPTS", letterbox_filter(panel), fps),
            &slide_hold,
        );

        let mut args = FfmpegArgs::new().input(&job.av.path).input(&job.slide.path);
        let audio_source = if job.av.has_audio() {
            "[0:a:0]".to_string()
        } else {
            args = args
                .args(["-f", "lavfi", "-t"])
                .arg(format_secs(expected))
                .arg("-i")
                .arg(format!("anullsrc=r={}:cl=stereo", self.quality.sample_rate));
            "[2:a:0]".to_string()
        };
        let graph = format!(
            "{av}[p0];{slide}[p1];[p0][p1]{stack}=inputs=2,format=yuv420p[v];{audio}aresample={rate},apad[a]",
            av = av_chain,
            slide = slide_chain,
            stack = stack,
            audio = audio_source,
            rate = self.quality.sample_rate
        );

        let output = scope.allocate(if stack == "hstack" { "side-by-side" } else { "stacked" }, "mp4");
        let args = args
            .arg("-filter_complex")
            .arg(graph)
            .args(["-map", "[v]", "-map", "[a]"])
            .arg("-s")
            .arg(target.as_size())
            .args(encoder_args(&self.quality))
            .seconds("-t", expected)
            .output(&output);
        ctx.ffmpeg(args).await.map_err(|e| match e {
            MediaError::Tool { diagnostic, .. } => MediaError::Composition {
                expected,
                actual: 0.0,
                message: format!("{} failed: {}", stack, diagnostic),
            },
            other => other,
        })?;

        ClipArtifact::from_output(ctx, &output, Provenance::Encode, None, 0.0).await
    }

    /// Separate encode applying the corrective gain; video is copied
    pub async fn apply_gain(
        &self,
        ctx: &MediaContext,
        scope: &ArtifactScope,
        clip: &ClipArtifact,
    ) -> Result<ClipArtifact, MediaError> {
        let output = scope.allocate("gain", "mp4");
        let volume = format!("volume={:.2}", self.gain_percent / 100.0);
        let args = FfmpegArgs::new()
            .input(&clip.path)
            .args(["-map", "0:v:0", "-map", "0:a:0", "-c:v", "copy", "-af"])
            .arg(volume)
            .args(["-c:a", "aac", "-b:a"])
            .arg(format!("{}k", self.quality.audio_bitrate_kbps))
            .arg("-ar")
            .arg(self.quality.sample_rate.to_string())
            .output(&output);
        ctx.ffmpeg(args).await?;

        let info = validate_artifact(ctx, &output, None, 0.0).await?;
        let artifact = ClipArtifact {
            path: output,
            duration: info.duration,
            profile: clip.profile.clone(),
            provenance: Provenance::Encode,
            rebased: clip.rebased,
        };
        self.check_duration(&artifact, clip.duration, "gain pass")?;
        Ok(artifact)
    }

    /// Join composed short-form clips of one batch
    pub async fn compose_batch(
        &self,
        ctx: &MediaContext,
        scope: &ArtifactScope,
        clips: &[ClipArtifact],
        concatenator: &Concatenator,
    ) -> Result<ClipArtifact, MediaError> {
        let expected: f64 = clips.iter().map(|c| c.duration).sum();
        if expected > self.short_form.hard_cap_secs + self.duration_tolerance() {
            return Err(MediaError::Composition {
                expected,
                actual: 0.0,
                message: format!("batch would exceed the {:.0}s cap", self.short_form.hard_cap_secs),
            });
        }
        let joined = concatenator
            .concat(ctx, scope, clips, Some(self.short_form.resolution))
            .await?
            .into_artifact();
        self.check_duration(&joined, expected, "batch")?;
        Ok(joined)
    }

    fn check_duration(&self, clip: &ClipArtifact, expected: f64, what: &str) -> Result<(), MediaError> {
        let drift = (clip.duration - expected).abs();
        if drift > self.duration_tolerance() {
            return Err(MediaError::Composition {
                expected,
                actual: clip.duration,
                message: format!("{} drifted by {:.3}s", what, drift),
            });
        }
        Ok(())
    }
}
