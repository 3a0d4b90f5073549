use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::default::Default;
use std::path::{Path, PathBuf};

use crate::models::Resolution;

/// Application configuration module
/// Declarative quality and layout settings for the assembly engine. Every
/// field carries a serde default so partial configuration files load.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Config {
    /// Encoding quality profile
    #[serde(default)]
    pub quality: QualityConfig,

    /// Clip extraction strategy
    #[serde(default)]
    pub extraction: ExtractionConfig,

    /// Concatenation policy
    #[serde(default)]
    pub concat: ConcatConfig,

    /// Baked-in subtitle overlays
    #[serde(default)]
    pub overlay: OverlayConfig,

    /// How many times the expression clip is repeated
    #[serde(default = "default_repeat_count")]
    pub repeat_count: u32,

    /// Slide rendering
    #[serde(default)]
    pub slide: SlideConfig,

    /// Bridge between AV and slide in sequential layouts
    #[serde(default)]
    pub transition: TransitionConfig,

    /// Landscape layout
    #[serde(default)]
    pub wide_form: WideFormConfig,

    /// Vertical layout and batching
    #[serde(default)]
    pub short_form: ShortFormConfig,

    /// Corrective audio gain in percent applied after compositing
    #[serde(default = "default_audio_gain_percent")]
    pub audio_gain_percent: f64,

    /// Worker pool sizing
    #[serde(default)]
    pub concurrency: ConcurrencyConfig,

    /// External tool settings
    #[serde(default)]
    pub tool: ToolConfig,

    /// Private directory for intermediate artifacts
    #[serde(default)]
    pub work_dir: Option<PathBuf>,

    /// Log level
    #[serde(default)]
    pub log_level: LogLevel,
}

/// Extraction strategy
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "lowercase")]
pub enum ExtractionStrategy {
    /// Container-level copy, no decode
    Copy,
    /// Full decode and re-encode, frame accurate
    Encode,
    /// Copy for short ranges, falling back to encode
    #[default]
    Auto,
}

impl std::fmt::Display for ExtractionStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Copy => "copy",
            Self::Encode => "encode",
            Self::Auto => "auto",
        };
        f.write_str(name)
    }
}

impl std::str::FromStr for ExtractionStrategy {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "copy" => Ok(Self::Copy),
            "encode" => Ok(Self::Encode),
            "auto" => Ok(Self::Auto),
            _ => Err(anyhow!("Invalid extraction strategy: {}", s)),
        }
    }
}

/// Concatenation preference
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum ConcatPreference {
    /// Container-level for uniform inputs, filter graph otherwise
    #[default]
    Auto,
    /// Always re-encode through the filter graph
    FilterGraph,
}

/// Wide-form arrangement; exactly one is active per run
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum WideArrangement {
    #[default]
    SideBySide,
    Sequential,
}

/// Short-form arrangement
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum ShortArrangement {
    /// AV in the top half band, slide in the bottom band
    #[default]
    Stacked,
    /// AV letterboxed full-frame, then bridge, then full-screen slide
    Letterboxed,
}

/// Slide sharing mode
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum SlideMode {
    #[default]
    PerExpression,
    SharedContext,
}

/// Encoding quality profile shared by every re-encoding stage
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct QualityConfig {
    /// Video encoder (libx264 or libx265)
    #[serde(default = "default_video_codec")]
    pub video_codec: String,

    /// Constant rate factor
    #[serde(default = "default_crf")]
    pub crf: u32,

    /// Encoder preset
    #[serde(default = "default_preset")]
    pub preset: String,

    /// Baseline frame rate all re-encodes normalise to
    #[serde(default = "default_fps")]
    pub fps: u32,

    /// Wide-form output resolution
    #[serde(default = "default_wide_resolution")]
    pub resolution: Resolution,

    /// Audio bitrate in kbit/s
    #[serde(default = "default_audio_bitrate_kbps")]
    pub audio_bitrate_kbps: u32,

    /// Audio sample rate in Hz
    #[serde(default = "default_sample_rate")]
    pub sample_rate: u32,
}

impl Default for QualityConfig {
    fn default() -> Self {
        Self {
            video_codec: default_video_codec(),
            crf: default_crf(),
            preset: default_preset(),
            fps: default_fps(),
            resolution: default_wide_resolution(),
            audio_bitrate_kbps: default_audio_bitrate_kbps(),
            sample_rate: default_sample_rate(),
        }
    }
}

impl QualityConfig {
    /// One frame interval at the baseline frame rate
    pub fn frame_interval(&self) -> f64 {
        1.0 / self.fps.max(1) as f64
    }
}

/// Extraction settings
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct ExtractionConfig {
    #[serde(default)]
    pub strategy: ExtractionStrategy,

    /// Longest range (seconds) for which `auto` attempts a copy first
    #[serde(default = "default_copy_threshold_secs")]
    pub copy_threshold_secs: f64,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            strategy: ExtractionStrategy::default(),
            copy_threshold_secs: default_copy_threshold_secs(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Default)]
pub struct ConcatConfig {
    #[serde(default)]
    pub preference: ConcatPreference,
}

/// Subtitle overlay settings
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct OverlayConfig {
    /// Burn bilingual subtitles into the context and expression clips
    #[serde(default = "default_true")]
    pub burn_subtitles: bool,

    #[serde(default = "default_overlay_font")]
    pub font_name: String,

    #[serde(default = "default_overlay_font_size")]
    pub font_size: u32,

    /// Highlight colour for the expression, `RRGGBB`
    #[serde(default = "default_highlight_color")]
    pub highlight_color: String,
}

impl Default for OverlayConfig {
    fn default() -> Self {
        Self {
            burn_subtitles: true,
            font_name: default_overlay_font(),
            font_size: default_overlay_font_size(),
            highlight_color: default_highlight_color(),
        }
    }
}

/// Slide settings
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct SlideConfig {
    #[serde(default)]
    pub mode: SlideMode,

    /// Background image; a solid colour is used when absent
    #[serde(default)]
    pub background_image: Option<PathBuf>,

    /// Background colour, `RRGGBB`
    #[serde(default = "default_slide_background")]
    pub background_color: String,

    /// Font file for drawtext; ffmpeg's default font when absent
    #[serde(default)]
    pub font_file: Option<PathBuf>,

    #[serde(default = "default_slide_font_size")]
    pub font_size: u32,

    /// Slide length in sequential layouts when no narration dictates it
    #[serde(default = "default_sequential_slide_secs")]
    pub sequential_duration_secs: f64,

    /// Loop narration to fill the slide; pad with silence otherwise
    #[serde(default)]
    pub loop_narration: bool,
}

impl Default for SlideConfig {
    fn default() -> Self {
        Self {
            mode: SlideMode::default(),
            background_image: None,
            background_color: default_slide_background(),
            font_file: None,
            font_size: default_slide_font_size(),
            sequential_duration_secs: default_sequential_slide_secs(),
            loop_narration: false,
        }
    }
}

/// Transition bridge settings
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct TransitionConfig {
    /// Still image shown during the bridge; black when absent
    #[serde(default)]
    pub image: Option<PathBuf>,

    /// Optional sound effect played over the still
    #[serde(default)]
    pub sound_effect: Option<PathBuf>,

    #[serde(default = "default_transition_secs")]
    pub duration_secs: f64,
}

impl Default for TransitionConfig {
    fn default() -> Self {
        Self {
            image: None,
            sound_effect: None,
            duration_secs: default_transition_secs(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Default)]
pub struct WideFormConfig {
    #[serde(default)]
    pub arrangement: WideArrangement,
}

/// Short-form and batching settings
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct ShortFormConfig {
    #[serde(default)]
    pub arrangement: ShortArrangement,

    /// Vertical target resolution
    #[serde(default = "default_short_resolution")]
    pub resolution: Resolution,

    /// Target maximum length of a batch in seconds
    #[serde(default = "default_max_batch_secs")]
    pub max_batch_duration_secs: f64,

    /// Hard cap: clips longer than this are never batched
    #[serde(default = "default_hard_cap_secs")]
    pub hard_cap_secs: f64,

    /// Allowed drift between expected and composed duration
    #[serde(default = "default_duration_tolerance_secs")]
    pub duration_tolerance_secs: f64,

    /// Individual clips up to this length are kept next to the batches
    #[serde(default = "default_preserve_max_secs")]
    pub preserve_max_duration_secs: f64,
}

impl Default for ShortFormConfig {
    fn default() -> Self {
        Self {
            arrangement: ShortArrangement::default(),
            resolution: default_short_resolution(),
            max_batch_duration_secs: default_max_batch_secs(),
            hard_cap_secs: default_hard_cap_secs(),
            duration_tolerance_secs: default_duration_tolerance_secs(),
            preserve_max_duration_secs: default_preserve_max_secs(),
        }
    }
}

/// Worker pool sizing
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct ConcurrencyConfig {
    /// Fraction of available cores given to selection workers
    #[serde(default = "default_cpu_fraction")]
    pub cpu_fraction: f64,

    /// Optional absolute cap on workers
    #[serde(default)]
    pub max_workers: Option<usize>,
}

impl Default for ConcurrencyConfig {
    fn default() -> Self {
        Self {
            cpu_fraction: default_cpu_fraction(),
            max_workers: None,
        }
    }
}

impl ConcurrencyConfig {
    /// Worker count for a host with `available_cores` cores
    pub fn worker_count(&self, available_cores: usize) -> usize {
        let by_fraction = (available_cores as f64 * self.cpu_fraction).floor() as usize;
        let workers = by_fraction.max(1);
        match self.max_workers {
            Some(cap) if cap > 0 => workers.min(cap),
            _ => workers,
        }
    }
}

/// External tool settings
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct ToolConfig {
    #[serde(default = "default_ffmpeg_path")]
    pub ffmpeg_path: String,

    #[serde(default = "default_ffprobe_path")]
    pub ffprobe_path: String,

    /// Timeout for every external call, in seconds
    #[serde(default = "default_tool_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for ToolConfig {
    fn default() -> Self {
        Self {
            ffmpeg_path: default_ffmpeg_path(),
            ffprobe_path: default_ffprobe_path(),
            timeout_secs: default_tool_timeout_secs(),
        }
    }
}

/// Log verbosity level
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Error,
    Warn,
    #[default]
    Info,
    Debug,
    Trace,
}

const ALLOWED_CODECS: &[&str] = &["libx264", "libx265"];

const ALLOWED_PRESETS: &[&str] = &[
    "ultrafast", "superfast", "veryfast", "faster", "fast", "medium", "slow", "slower", "veryslow",
];

fn default_repeat_count() -> u32 {
    3
}

fn default_audio_gain_percent() -> f64 {
    100.0
}

fn default_video_codec() -> String {
    "libx264".to_string()
}

fn default_crf() -> u32 {
    20
}

fn default_preset() -> String {
    "veryfast".to_string()
}

fn default_fps() -> u32 {
    24
}

fn default_wide_resolution() -> Resolution {
    Resolution::new(1920, 1080)
}

fn default_short_resolution() -> Resolution {
    Resolution::new(1080, 1920)
}

fn default_audio_bitrate_kbps() -> u32 {
    192
}

fn default_sample_rate() -> u32 {
    48000
}

fn default_copy_threshold_secs() -> f64 {
    30.0
}

fn default_true() -> bool {
    true
}

fn default_overlay_font() -> String {
    "Arial".to_string()
}

fn default_overlay_font_size() -> u32 {
    42
}

fn default_highlight_color() -> String {
    "FFD400".to_string()
}

fn default_slide_background() -> String {
    "1E1E2E".to_string()
}

fn default_slide_font_size() -> u32 {
    48
}

fn default_sequential_slide_secs() -> f64 {
    5.0
}

fn default_transition_secs() -> f64 {
    1.0
}

fn default_max_batch_secs() -> f64 {
    120.0
}

fn default_hard_cap_secs() -> f64 {
    180.0
}

fn default_duration_tolerance_secs() -> f64 {
    0.5
}

fn default_preserve_max_secs() -> f64 {
    60.0
}

fn default_cpu_fraction() -> f64 {
    0.5
}

fn default_ffmpeg_path() -> String {
    "ffmpeg".to_string()
}

fn default_ffprobe_path() -> String {
    "ffprobe".to_string()
}

fn default_tool_timeout_secs() -> u64 {
    600
}

fn is_hex_color(value: &str) -> bool {
    value.len() == 6 && value.chars().all(|c| c.is_ascii_hexdigit())
}

fn validate_resolution(name: &str, resolution: &Resolution) -> Result<()> {
    for (axis, value) in [("width", resolution.width), ("height", resolution.height)] {
        if !(16..=7680).contains(&value) {
            return Err(anyhow!("{} {} must be within 16..=7680, got {}", name, axis, value));
        }
        if value % 2 != 0 {
            return Err(anyhow!("{} {} must be even, got {}", name, axis, value));
        }
    }
    Ok(())
}

impl Config {
    /// Load a configuration file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to open config file: {:?}", path))?;
        let config: Config = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {:?}", path))?;
        Ok(config)
    }

    /// Validate every value against its allowed range
    pub fn validate(&self) -> Result<()> {
        let q = &self.quality;
        if !ALLOWED_CODECS.contains(&q.video_codec.as_str()) {
            return Err(anyhow!(
                "Unsupported video codec '{}', expected one of {}",
                q.video_codec,
                ALLOWED_CODECS.join(", ")
            ));
        }
        if q.crf > 51 {
            return Err(anyhow!("crf must be within 0..=51, got {}", q.crf));
        }
        if !ALLOWED_PRESETS.contains(&q.preset.as_str()) {
            return Err(anyhow!("Unknown encoder preset '{}'", q.preset));
        }
        if !(1..=120).contains(&q.fps) {
            return Err(anyhow!("fps must be within 1..=120, got {}", q.fps));
        }
        validate_resolution("quality.resolution", &q.resolution)?;
        if !(32..=512).contains(&q.audio_bitrate_kbps) {
            return Err(anyhow!(
                "audio bitrate must be within 32..=512 kbit/s, got {}",
                q.audio_bitrate_kbps
            ));
        }
        if ![22050, 44100, 48000].contains(&q.sample_rate) {
            return Err(anyhow!("Unsupported audio sample rate {}", q.sample_rate));
        }

        if self.extraction.copy_threshold_secs <= 0.0 {
            return Err(anyhow!("copy threshold must be positive"));
        }
        if !(1..=5).contains(&self.repeat_count) {
            return Err(anyhow!("repeat count must be within 1..=5, got {}", self.repeat_count));
        }
        if !is_hex_color(&self.overlay.highlight_color) {
            return Err(anyhow!("overlay highlight colour must be RRGGBB"));
        }
        if self.overlay.font_size == 0 || self.slide.font_size == 0 {
            return Err(anyhow!("font sizes must be positive"));
        }
        if !is_hex_color(&self.slide.background_color) {
            return Err(anyhow!("slide background colour must be RRGGBB"));
        }
        if self.slide.sequential_duration_secs <= 0.0 {
            return Err(anyhow!("sequential slide duration must be positive"));
        }
        if self.transition.duration_secs <= 0.0 || self.transition.duration_secs > 10.0 {
            return Err(anyhow!("transition duration must be within (0, 10] seconds"));
        }

        let s = &self.short_form;
        validate_resolution("short_form.resolution", &s.resolution)?;
        if !s.resolution.is_vertical() {
            return Err(anyhow!("short-form resolution must be vertical, got {}", s.resolution));
        }
        if s.max_batch_duration_secs <= 0.0 || s.hard_cap_secs <= 0.0 {
            return Err(anyhow!("batch durations must be positive"));
        }
        if s.max_batch_duration_secs > s.hard_cap_secs {
            return Err(anyhow!(
                "max batch duration {}s exceeds the hard cap {}s",
                s.max_batch_duration_secs,
                s.hard_cap_secs
            ));
        }
        if s.duration_tolerance_secs <= 0.0 {
            return Err(anyhow!("duration tolerance must be positive"));
        }

        if !(0.0..=400.0).contains(&self.audio_gain_percent) {
            return Err(anyhow!(
                "audio gain must be within 0..=400 percent, got {}",
                self.audio_gain_percent
            ));
        }
        if !(self.concurrency.cpu_fraction > 0.0 && self.concurrency.cpu_fraction <= 1.0) {
            return Err(anyhow!(
                "cpu fraction must be within (0, 1], got {}",
                self.concurrency.cpu_fraction
            ));
        }
        if self.tool.timeout_secs == 0 {
            return Err(anyhow!("tool timeout must be positive"));
        }

        Ok(())
    }

    /// Directory for intermediate artifacts
    pub fn resolved_work_dir(&self) -> PathBuf {
        self.work_dir.clone().unwrap_or_else(|| {
            dirs::cache_dir()
                .unwrap_or_else(std::env::temp_dir)
                .join("lingoclip")
                .join("work")
        })
    }
}

/// Default implementation for Config
impl Default for Config {
    fn default() -> Self {
        Config {
            quality: QualityConfig::default(),
            extraction: ExtractionConfig::default(),
            concat: ConcatConfig::default(),
            overlay: OverlayConfig::default(),
            repeat_count: default_repeat_count(),
            slide: SlideConfig::default(),
            transition: TransitionConfig::default(),
            wide_form: WideFormConfig::default(),
            short_form: ShortFormConfig::default(),
            audio_gain_percent: default_audio_gain_percent(),
            concurrency: ConcurrencyConfig::default(),
            tool: ToolConfig::default(),
            work_dir: None,
            log_level: LogLevel::default(),
        }
    }
}
