/*!
 * Clip artifacts passed between pipeline stages.
 */

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::app_config::QualityConfig;
use crate::errors::MediaError;

use super::MediaContext;
use super::probe::MediaInfo;

/// How an artifact's streams were produced
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provenance {
    /// Streams copied from the source without decoding
    Copy,
    /// Streams decoded and re-encoded with the quality profile
    Encode,
}

/// Codec/resolution/timing signature; equal profiles can be joined losslessly
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StreamProfile {
    pub video_codec: String,
    pub width: u32,
    pub height: u32,
    /// Frame rate in thousandths of a frame per second
    pub fps_milli: u32,
    pub audio_codec: Option<String>,
    pub sample_rate: Option<u32>,
    pub channels: Option<u32>,
}

impl StreamProfile {
    pub fn from_info(info: &MediaInfo) -> Option<Self> {
        let video = info.video.as_ref()?;
        Some(Self {
            video_codec: video.codec.clone(),
            width: video.width,
            height: video.height,
            fps_milli: (video.fps * 1000.0).round() as u32,
            audio_codec: info.audio.as_ref().map(|a| a.codec.clone()),
            sample_rate: info.audio.as_ref().map(|a| a.sample_rate),
            channels: info.audio.as_ref().map(|a| a.channels),
        })
    }

    pub fn fps(&self) -> f64 {
        self.fps_milli as f64 / 1000.0
    }

    pub fn frame_interval(&self) -> f64 {
        if self.fps_milli == 0 {
            return 0.0;
        }
        1000.0 / self.fps_milli as f64
    }
}

/// An intermediate or final clip; its time basis always starts at 0
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClipArtifact {
    pub path: PathBuf,
    /// Probed duration in seconds
    pub duration: f64,
    pub profile: StreamProfile,
    pub provenance: Provenance,
    /// Presentation timestamps known to start at 0
    pub rebased: bool,
}

impl ClipArtifact {
    /// Validate a freshly written file and describe it as an artifact
    pub async fn from_output(
        ctx: &MediaContext,
        path: &Path,
        provenance: Provenance,
        expected: Option<f64>,
        tolerance: f64,
    ) -> Result<Self, MediaError> {
        let info = validate_artifact(ctx, path, expected, tolerance).await?;
        let profile = StreamProfile::from_info(&info)
            .ok_or_else(|| MediaError::validation(path, "artifact has no video stream"))?;
        Ok(Self {
            path: path.to_path_buf(),
            duration: info.duration,
            rebased: info.start_time.abs() < profile.frame_interval().max(0.001),
            profile,
            provenance,
        })
    }

    pub fn has_audio(&self) -> bool {
        self.profile.audio_codec.is_some()
    }

    /// Whether lossless container-level paths remain available downstream
    pub fn is_lossless(&self) -> bool {
        self.provenance == Provenance::Copy
    }
}

/// True when every artifact shares codec, resolution, frame rate and audio
/// parameters, i.e. container-level joining is legal
pub fn is_uniform(artifacts: &[ClipArtifact]) -> bool {
    match artifacts.split_first() {
        Some((first, rest)) => rest.iter().all(|a| a.profile == first.profile),
        None => true,
    }
}

/// Existence, size and playability checks for a stage output
pub async fn validate_artifact(
    ctx: &MediaContext,
    path: &Path,
    expected: Option<f64>,
    tolerance: f64,
) -> Result<MediaInfo, MediaError> {
    let metadata = std::fs::metadata(path)
        .map_err(|_| MediaError::validation(path, "output file was not created"))?;
    if metadata.len() == 0 {
        return Err(MediaError::validation(path, "output file is empty"));
    }

    let info = ctx.probes.probe(ctx.tool.as_ref(), path).await?;
    if !(info.duration.is_finite() && info.duration > 0.0) {
        return Err(MediaError::validation(
            path,
            format!("invalid duration {}", info.duration),
        ));
    }

    if let Some(expected) = expected {
        let drift = (info.duration - expected).abs();
        if drift > tolerance {
            return Err(MediaError::validation(
                path,
                format!(
                    "duration {:.3}s differs from expected {:.3}s by more than {:.3}s",
                    info.duration, expected, tolerance
                ),
            ));
        }
    }

    Ok(info)
}

/// Encoder arguments for the configured quality profile
pub fn encoder_args(quality: &QualityConfig) -> Vec<String> {
    vec![
        "-c:v".to_string(),
        quality.video_codec.clone(),
        "-preset".to_string(),
        quality.preset.clone(),
        "-crf".to_string(),
        quality.crf.to_string(),
        "-pix_fmt".to_string(),
        "yuv420p".to_string(),
        "-r".to_string(),
        quality.fps.to_string(),
        "-c:a".to_string(),
        "aac".to_string(),
        "-b:a".to_string(),
        format!("{}k", quality.audio_bitrate_kbps),
        "-ar".to_string(),
        quality.sample_rate.to_string(),
        "-ac".to_string(),
        "2".to_string(),
    ]
}

/// Muxer flags that make repeated runs byte-identical
pub fn bitexact_args() -> Vec<String> {
    ["-map_metadata", "-1", "-fflags", "+bitexact", "-flags:v", "+bitexact", "-flags:a", "+bitexact"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}
