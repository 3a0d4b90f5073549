/*!
 * Slide tracks: text over a still image or solid colour, with narration or
 * silence, rendered to an exact target duration.
 *
 * The same renderer produces the transition bridge used by sequential
 * layouts (a still plus an optional sound effect).
 */

use log::debug;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::app_config::{QualityConfig, SlideConfig, SlideMode, TransitionConfig};
use crate::errors::MediaError;
use crate::media::artifact::{ClipArtifact, Provenance, encoder_args};
use crate::media::tool::{FfmpegArgs, format_secs};
use crate::media::MediaContext;
use crate::models::{Resolution, Selection};

use super::filters::{escape_filter_path, ffmpeg_color, letterbox_filter};
use super::janitor::ArtifactScope;

/// Text content of one slide
#[derive(Debug, Clone, PartialEq)]
pub struct SlidePayload {
    pub headline: String,
    pub body: Vec<String>,
}

impl SlidePayload {
    /// Expression, both lines, vocabulary and scene label of one selection
    pub fn for_selection(selection: &Selection) -> Self {
        let mut body = vec![selection.source_text.clone(), selection.target_text.clone()];
        let words: Vec<&str> = selection
            .ordered_vocabulary()
            .iter()
            .map(|v| v.word.as_str())
            .collect();
        if !words.is_empty() {
            body.push(String::new());
            body.push(words.join(" · "));
        }
        body.push(format!("[{}]", selection.scene.label()));

        Self {
            headline: selection.headline().to_string(),
            body,
        }
    }

    /// One slide covering every expression of a shared context, ordered by
    /// expression start
    pub fn for_group(selections: &[&Selection]) -> Self {
        let mut ordered: Vec<&Selection> = selections.to_vec();
        ordered.sort_by(|a, b| a.expression_range.start.total_cmp(&b.expression_range.start));

        let Some(first) = ordered.first() else {
            return Self {
                headline: String::new(),
                body: Vec::new(),
            };
        };
        let mut body = vec![first.source_text.clone(), first.target_text.clone(), String::new()];
        body.extend(
            ordered
                .iter()
                .enumerate()
                .map(|(i, s)| format!("{}. {}", i + 1, s.headline())),
        );

        Self {
            headline: ordered
                .iter()
                .map(|s| s.headline())
                .collect::<Vec<_>>()
                .join(" / "),
            body,
        }
    }

    pub fn body_text(&self) -> String {
        self.body.join("\n")
    }
}

/// What fills the slide behind the text
#[derive(Debug, Clone, PartialEq)]
pub enum SlideBackground {
    /// `RRGGBB`
    Color(String),
    Image(PathBuf),
}

impl SlideBackground {
    pub fn from_config(config: &SlideConfig) -> Self {
        match &config.background_image {
            Some(image) => Self::Image(image.clone()),
            None => Self::Color(config.background_color.clone()),
        }
    }
}

/// Audio track of a rendered slide
#[derive(Debug, Clone, PartialEq)]
pub enum SlideAudio {
    Silence,
    /// Narration looped to fill the slide
    Looped(PathBuf),
    /// Narration or effect padded with silence
    Padded(PathBuf),
}

/// Which selections share a slide. Selections share one only when they cut
/// the same context range out of the same source (`default_source` unless
/// the selection names its own). Groups are in first-appearance order;
/// every selection appears in exactly one group.
pub fn slide_groups(selections: &[Selection], default_source: &Path, mode: SlideMode) -> Vec<Vec<usize>> {
    match mode {
        SlideMode::PerExpression => (0..selections.len()).map(|i| vec![i]).collect(),
        SlideMode::SharedContext => {
            let mut order: Vec<(&Path, (u64, u64))> = Vec::new();
            let mut groups: HashMap<(&Path, (u64, u64)), Vec<usize>> = HashMap::new();
            for (i, selection) in selections.iter().enumerate() {
                let source = selection.source.as_deref().unwrap_or(default_source);
                let key = (source, selection.context_range.millis());
                let group = groups.entry(key).or_default();
                if group.is_empty() {
                    order.push(key);
                }
                group.push(i);
            }
            order
                .into_iter()
                .filter_map(|key| groups.remove(&key))
                .map(|mut group| {
                    group.sort_by(|a, b| {
                        selections[*a]
                            .expression_range
                            .start
                            .total_cmp(&selections[*b].expression_range.start)
                    });
                    group
                })
                .collect()
        }
    }
}

pub struct SlideComposer {
    config: SlideConfig,
    quality: QualityConfig,
}

impl SlideComposer {
    pub fn new(config: SlideConfig, quality: QualityConfig) -> Self {
        Self { config, quality }
    }

    pub fn background(&self) -> SlideBackground {
        SlideBackground::from_config(&self.config)
    }

    /// Audio source for optional narration, honouring the loop setting
    pub fn audio_for(&self, narration: Option<PathBuf>) -> SlideAudio {
        match narration {
            Some(path) if self.config.loop_narration => SlideAudio::Looped(path),
            Some(path) => SlideAudio::Padded(path),
            None => SlideAudio::Silence,
        }
    }

    /// Slide length. Parallel layouts pass the AV duration so the slide
    /// covers it; sequential and shared slides use narration or the
    /// configured fallback.
    pub fn target_duration(&self, av_duration: Option<f64>, narration: Option<f64>) -> f64 {
        match av_duration {
            Some(av) => av.max(narration.unwrap_or(0.0)),
            None => narration.unwrap_or(self.config.sequential_duration_secs),
        }
    }

    /// Render a slide of exactly `target_duration` seconds
    #[allow(clippy::too_many_arguments)]
    pub async fn compose(
        &self,
        ctx: &MediaContext,
        scope: &ArtifactScope,
        payload: &SlidePayload,
        background: &SlideBackground,
        audio: &SlideAudio,
        target_duration: f64,
        resolution: Resolution,
    ) -> Result<ClipArtifact, MediaError> {
        let headline_file = scope.allocate("headline", "txt");
        let body_file = scope.allocate("body", "txt");
        std::fs::write(&headline_file, &payload.headline)?;
        std::fs::write(&body_file, payload.body_text())?;

        let text = [
            self.drawtext(&headline_file, self.config.font_size + self.config.font_size / 2, "h/6"),
            self.drawtext(&body_file, self.config.font_size, "(h-text_h)/2"),
        ]
        .join(",");

        debug!(
            "Composing {:.3}s slide '{}' at {}",
            target_duration, payload.headline, resolution
        );
        self.render(ctx, scope, "slide", background, Some(&text), audio, target_duration, resolution)
            .await
    }

    /// Still (or black) plus optional sound effect, played between AV and
    /// slide in sequential layouts
    pub async fn bridge(
        &self,
        ctx: &MediaContext,
        scope: &ArtifactScope,
        transition: &TransitionConfig,
        resolution: Resolution,
    ) -> Result<ClipArtifact, MediaError> {
        let background = match &transition.image {
            Some(image) => SlideBackground::Image(image.clone()),
            None => SlideBackground::Color("000000".to_string()),
        };
        let audio = match &transition.sound_effect {
            Some(effect) => SlideAudio::Padded(effect.clone()),
            None => SlideAudio::Silence,
        };
        self.render(
            ctx,
            scope,
            "bridge",
            &background,
            None,
            &audio,
            transition.duration_secs,
            resolution,
        )
        .await
    }

    fn drawtext(&self, textfile: &Path, size: u32, y: &str) -> String {
        let mut filter = format!(
            "drawtext=textfile='{}':expansion=none:fontcolor=white:fontsize={}:line_spacing={}:x=(w-text_w)/2:y={}",
            escape_filter_path(textfile),
            size,
            size / 3,
            y
        );
        if let Some(font) = &self.config.font_file {
            filter.push_str(&format!(":fontfile='{}'", escape_filter_path(font)));
        }
        filter
    }

    #[allow(clippy::too_many_arguments)]
    async fn render(
        &self,
        ctx: &MediaContext,
        scope: &ArtifactScope,
        stem: &str,
        background: &SlideBackground,
        text: Option<&str>,
        audio: &SlideAudio,
        duration: f64,
        resolution: Resolution,
    ) -> Result<ClipArtifact, MediaError> {
        if !(duration.is_finite() && duration > 0.0) {
            return Err(MediaError::Composition {
                expected: duration,
                actual: 0.0,
                message: format!("cannot render a {} of {:.3}s", stem, duration),
            });
        }

        let fps = self.quality.fps;
        let mut args = match background {
            SlideBackground::Image(image) => FfmpegArgs::new()
                .args(["-loop", "1", "-framerate"])
                .arg(fps.to_string())
                .seconds("-t", duration)
                .input(image),
            SlideBackground::Color(color) => FfmpegArgs::new().args(["-f", "lavfi", "-i"]).arg(format!(
                "color=c={}:s={}:r={}:d={}",
                ffmpeg_color(color),
                resolution.as_size(),
                fps,
                format_secs(duration)
            )),
        };
        let mut audio_filter = format!("[1:a:0]aresample={}", self.quality.sample_rate);
        args = match audio {
            SlideAudio::Silence => args.args(["-f", "lavfi"]).seconds("-t", duration).arg("-i").arg(format!(
                "anullsrc=r={}:cl=stereo",
                self.quality.sample_rate
            )),
            SlideAudio::Looped(path) => args.args(["-stream_loop", "-1"]).input(path),
            SlideAudio::Padded(path) => {
                audio_filter.push_str(",apad");
                args.input(path)
            }
        };

        let mut video_filter = format!("[0:v:0]{}", letterbox_filter(resolution));
        if let Some(text) = text {
            video_filter.push(',');
            video_filter.push_str(text);
        }
        video_filter.push_str(",format=yuv420p[v]");

        let output = scope.allocate(stem, "mp4");
        let args = args
            .arg("-filter_complex")
            .arg(format!("{};{}[a]", video_filter, audio_filter))
            .args(["-map", "[v]", "-map", "[a]"])
            .arg("-s")
            .arg(resolution.as_size())
            .args(encoder_args(&self.quality))
            .seconds("-t", duration)
            .output(&output);
        ctx.ffmpeg(args).await.map_err(|e| match e {
            MediaError::Tool { diagnostic, .. } => MediaError::Composition {
                expected: duration,
                actual: 0.0,
                message: format!("{} render failed: {}", stem, diagnostic),
            },
            other => other,
        })?;

        ClipArtifact::from_output(
            ctx,
            &output,
            Provenance::Encode,
            Some(duration),
            self.quality.frame_interval() * 1.5,
        )
        .await
    }
}
