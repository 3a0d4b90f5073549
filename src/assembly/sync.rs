/*!
 * Timestamp synchronization for baked-in overlays.
 *
 * Overlay cues are always expressed relative to the artifact being
 * modified, whose time basis starts at 0. Extractions that feed an overlay
 * use frame-accurate seeking; approximate seeking is only used when a later
 * stage re-encodes and rebases the result anyway. Clips headed for
 * repetition or concatenation are rebased to 0 first.
 */

use log::debug;
use std::fmt::Write as _;
use std::path::Path;

use crate::app_config::{OverlayConfig, QualityConfig};
use crate::errors::MediaError;
use crate::media::artifact::{ClipArtifact, Provenance, bitexact_args, encoder_args};
use crate::media::tool::{FfmpegArgs, format_secs};
use crate::media::MediaContext;
use crate::models::{Resolution, Selection, TimeRange};

use super::filters::{ass_color, ass_timestamp, escape_filter_path};
use super::janitor::ArtifactScope;

/// How the input is positioned on the requested start time
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeekMode {
    /// Input-side seek: jumps to the nearest keyframe, fast, imprecise
    Approximate,
    /// Output-side seek: decodes from the start and discards up to the
    /// exact timestamp, slow, exact
    FrameAccurate,
}

impl SeekMode {
    /// Seek discipline for an extraction
    pub fn for_extraction(feeds_overlay: bool) -> Self {
        if feeds_overlay {
            Self::FrameAccurate
        } else {
            Self::Approximate
        }
    }

    /// Input and trim arguments for reading `range` of `source`
    pub fn input_args(&self, source: &Path, range: &TimeRange) -> FfmpegArgs {
        match self {
            Self::Approximate => FfmpegArgs::new()
                .seconds("-ss", range.start)
                .input(source)
                .seconds("-t", range.duration()),
            Self::FrameAccurate => FfmpegArgs::new()
                .input(source)
                .seconds("-ss", range.start)
                .seconds("-t", range.duration()),
        }
    }
}

/// Style of one overlay cue
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CueStyle {
    /// Bilingual subtitle, bottom centre
    Subtitle,
    /// Highlighted expression, top centre
    Highlight,
}

impl CueStyle {
    fn name(&self) -> &'static str {
        match self {
            Self::Subtitle => "Subtitle",
            Self::Highlight => "Highlight",
        }
    }
}

/// A timed overlay line, relative to the start of the artifact
#[derive(Debug, Clone, PartialEq)]
pub struct OverlayCue {
    pub start: f64,
    pub end: f64,
    pub text: String,
    pub style: CueStyle,
}

/// The full overlay for one artifact
#[derive(Debug, Clone, PartialEq, Default)]
pub struct OverlayScript {
    pub cues: Vec<OverlayCue>,
}

impl OverlayScript {
    /// Bilingual subtitles for the whole context clip plus the expression
    /// highlight during its sub-range, rebased onto the context clip
    pub fn for_context(selection: &Selection, clip_duration: f64) -> Result<Self, MediaError> {
        check_text(selection)?;
        let relative = selection.expression_range.relative_to(&selection.context_range);
        if relative.end > clip_duration + 0.5 {
            return Err(MediaError::Synchronization(format!(
                "expression ends at {:.3}s but the context clip is only {:.3}s long",
                relative.end, clip_duration
            )));
        }

        Ok(Self {
            cues: vec![
                OverlayCue {
                    start: 0.0,
                    end: clip_duration,
                    text: format!("{}\n{}", selection.source_text, selection.target_text),
                    style: CueStyle::Subtitle,
                },
                OverlayCue {
                    start: relative.start,
                    end: relative.end.min(clip_duration),
                    text: selection.headline().to_string(),
                    style: CueStyle::Highlight,
                },
            ],
        })
    }

    /// Expression text over the whole expression clip
    pub fn for_expression(selection: &Selection, clip_duration: f64) -> Result<Self, MediaError> {
        check_text(selection)?;
        Ok(Self {
            cues: vec![
                OverlayCue {
                    start: 0.0,
                    end: clip_duration,
                    text: selection.headline().to_string(),
                    style: CueStyle::Highlight,
                },
                OverlayCue {
                    start: 0.0,
                    end: clip_duration,
                    text: selection.target_text.clone(),
                    style: CueStyle::Subtitle,
                },
            ],
        })
    }

    /// Render as an ASS script for a frame of `resolution`
    pub fn to_ass(&self, resolution: Resolution, config: &OverlayConfig) -> String {
        let mut ass = String::new();
        let _ = writeln!(ass, "[Script Info]");
        let _ = writeln!(ass, "ScriptType: v4.00+");
        let _ = writeln!(ass, "PlayResX: {}", resolution.width);
        let _ = writeln!(ass, "PlayResY: {}", resolution.height);
        let _ = writeln!(ass, "WrapStyle: 0");
        let _ = writeln!(ass);
        let _ = writeln!(ass, "[V4+ Styles]");
        let _ = writeln!(
            ass,
            "Format: Name, Fontname, Fontsize, PrimaryColour, OutlineColour, BackColour, Bold, BorderStyle, Outline, Shadow, Alignment, MarginL, MarginR, MarginV"
        );
        let _ = writeln!(
            ass,
            "Style: Subtitle,{},{},&H00FFFFFF,&H00000000,&H80000000,0,1,3,0,2,40,40,60",
            config.font_name, config.font_size
        );
        let _ = writeln!(
            ass,
            "Style: Highlight,{},{},{},&H00000000,&H80000000,1,1,3,0,8,40,40,60",
            config.font_name,
            config.font_size + config.font_size / 4,
            ass_color(&config.highlight_color)
        );
        let _ = writeln!(ass);
        let _ = writeln!(ass, "[Events]");
        let _ = writeln!(ass, "Format: Layer, Start, End, Style, Text");
        for cue in &self.cues {
            let _ = writeln!(
                ass,
                "Dialogue: 0,{},{},{},{}",
                ass_timestamp(cue.start),
                ass_timestamp(cue.end),
                cue.style.name(),
                escape_ass_text(&cue.text)
            );
        }
        ass
    }
}

fn check_text(selection: &Selection) -> Result<(), MediaError> {
    if selection.source_text.trim().is_empty() || selection.target_text.trim().is_empty() {
        return Err(MediaError::Synchronization(format!(
            "selection '{}' has no overlay text",
            selection.id
        )));
    }
    Ok(())
}

/// ASS has no brace escape; braces would start override blocks
pub fn escape_ass_text(text: &str) -> String {
    text.replace('\\', "/")
        .replace('{', "(")
        .replace('}', ")")
        .replace("\r\n", "\\N")
        .replace('\n', "\\N")
}

/// Applies overlays and timestamp rebasing
pub struct Synchronizer {
    overlay: OverlayConfig,
    quality: QualityConfig,
}

impl Synchronizer {
    pub fn new(overlay: OverlayConfig, quality: QualityConfig) -> Self {
        Self { overlay, quality }
    }

    pub fn burns_overlays(&self) -> bool {
        self.overlay.burn_subtitles
    }

    /// Seek discipline for extractions in this run
    pub fn seek_mode(&self) -> SeekMode {
        SeekMode::for_extraction(self.overlay.burn_subtitles)
    }

    /// Burn `script` into `clip`; output is re-encoded with rebased
    /// timestamps and the same duration
    pub async fn burn(
        &self,
        ctx: &MediaContext,
        scope: &ArtifactScope,
        clip: &ClipArtifact,
        script: &OverlayScript,
    ) -> Result<ClipArtifact, MediaError> {
        let ass_path = scope.allocate("overlay", "ass");
        let resolution = Resolution::new(clip.profile.width, clip.profile.height);
        std::fs::write(&ass_path, script.to_ass(resolution, &self.overlay)).map_err(|e| {
            MediaError::Synchronization(format!("cannot write overlay script {:?}: {}", ass_path, e))
        })?;

        let output = scope.allocate("overlaid", "mp4");
        let filter = format!(
            "setpts=PTS-STARTPTS,subtitles=filename='{}':charenc=UTF-8",
            escape_filter_path(&ass_path)
        );
        let mut args = FfmpegArgs::new()
            .input(&clip.path)
            .arg("-vf")
            .arg(filter)
            .args(["-map", "0:v:0", "-map", "0:a:0?"]);
        if clip.has_audio() {
            args = args.args(["-af", "asetpts=PTS-STARTPTS"]);
        }
        let args = args
            .args(encoder_args(&self.quality))
            .seconds("-t", clip.duration)
            .output(&output);

        debug!("Burning {} overlay cue(s) into {:?}", script.cues.len(), clip.path);
        ctx.ffmpeg(args).await.map_err(|e| match e {
            MediaError::Tool { diagnostic, .. } => {
                MediaError::Synchronization(format!("overlay burn failed: {}", diagnostic))
            }
            other => other,
        })?;

        let tolerance = clip.profile.frame_interval().max(self.quality.frame_interval()) * 1.5;
        ClipArtifact::from_output(ctx, &output, Provenance::Encode, Some(clip.duration), tolerance).await
    }

    /// Guarantee presentation timestamps start at 0. Copy-provenance clips
    /// are remuxed with shifted timestamps; encoded clips already carry
    /// rebased timestamps unless the probe says otherwise.
    pub async fn ensure_rebased(
        &self,
        ctx: &MediaContext,
        scope: &ArtifactScope,
        clip: ClipArtifact,
    ) -> Result<ClipArtifact, MediaError> {
        if clip.rebased {
            return Ok(clip);
        }

        let output = scope.allocate("rebased", "mp4");
        let args = FfmpegArgs::new()
            .input(&clip.path)
            .args(["-map", "0:v:0", "-map", "0:a:0?", "-c", "copy"])
            .args(["-avoid_negative_ts", "make_zero", "-output_ts_offset", "0"])
            .args(bitexact_args())
            .output(&output);
        ctx.ffmpeg(args).await?;

        let mut rebased = ClipArtifact::from_output(
            ctx,
            &output,
            clip.provenance,
            Some(clip.duration),
            clip.profile.frame_interval().max(0.05),
        )
        .await?;
        if !rebased.rebased {
            debug!(
                "Remux of {:?} still reports a non-zero start; forcing rebase by re-encode",
                clip.path
            );
            rebased = self.rebase_by_encode(ctx, scope, &clip).await?;
        }
        Ok(rebased)
    }

    async fn rebase_by_encode(
        &self,
        ctx: &MediaContext,
        scope: &ArtifactScope,
        clip: &ClipArtifact,
    ) -> Result<ClipArtifact, MediaError> {
        let output = scope.allocate("rebased-enc", "mp4");
        let mut args = FfmpegArgs::new()
            .input(&clip.path)
            .args(["-vf", "setpts=PTS-STARTPTS"]);
        if clip.has_audio() {
            args = args.args(["-af", "asetpts=PTS-STARTPTS"]);
        }
        let args = args
            .args(encoder_args(&self.quality))
            .arg("-t")
            .arg(format_secs(clip.duration))
            .output(&output);
        ctx.ffmpeg(args).await?;
        ClipArtifact::from_output(
            ctx,
            &output,
            Provenance::Encode,
            Some(clip.duration),
            self.quality.frame_interval() * 1.5,
        )
        .await
    }
}
