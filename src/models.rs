/*!
 * Input data model: selections, time ranges and layout kinds.
 *
 * Selections are produced by an external content-selection service and are
 * treated as immutable here; `Selection::validate` enforces the invariants
 * the assembly pipeline relies on.
 */

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

/// A half-open time range in seconds on the source timeline
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TimeRange {
    /// Start in seconds
    pub start: f64,
    /// End in seconds
    pub end: f64,
}

impl TimeRange {
    pub fn new(start: f64, end: f64) -> Self {
        Self { start, end }
    }

    pub fn duration(&self) -> f64 {
        self.end - self.start
    }

    /// Whether `other` lies entirely inside this range
    pub fn contains(&self, other: &TimeRange) -> bool {
        other.start >= self.start && other.end <= self.end
    }

    /// This range expressed relative to `origin`, i.e. rebased onto a clip
    /// that starts at `origin.start`
    pub fn relative_to(&self, origin: &TimeRange) -> TimeRange {
        TimeRange {
            start: (self.start - origin.start).max(0.0),
            end: (self.end - origin.start).max(0.0),
        }
    }

    /// Millisecond key used for shared-clip lookups
    pub fn millis(&self) -> (u64, u64) {
        (
            (self.start * 1000.0).round() as u64,
            (self.end * 1000.0).round() as u64,
        )
    }
}

impl fmt::Display for TimeRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{:.3}s, {:.3}s]", self.start, self.end)
    }
}

/// A vocabulary word annotated on one of the selection's source lines
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VocabularyAnnotation {
    pub word: String,
    /// Index of the source line the word appears on
    #[serde(default)]
    pub line_index: usize,
}

/// Scene classification supplied by the upstream analysis
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SceneKind {
    #[default]
    Dialogue,
    Action,
    Narration,
    Other,
}

impl SceneKind {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Dialogue => "Dialogue",
            Self::Action => "Action",
            Self::Narration => "Narration",
            Self::Other => "Scene",
        }
    }
}

/// One identified opportunity to become a learning clip
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Selection {
    /// Stable identifier
    pub id: String,
    /// Text in the source (spoken) language
    pub source_text: String,
    /// Text in the learner's language
    pub target_text: String,
    /// The taught phrase itself, shown as the slide headline
    #[serde(default)]
    pub expression: String,
    /// Scene-context window
    pub context_range: TimeRange,
    /// Sub-window highlighting the taught phrase
    pub expression_range: TimeRange,
    #[serde(default)]
    pub vocabulary: Vec<VocabularyAnnotation>,
    #[serde(default)]
    pub scene: SceneKind,
    /// Source file override; the run's source is used when absent
    #[serde(default)]
    pub source: Option<PathBuf>,
}

impl Selection {
    /// Check the invariants every downstream stage assumes
    pub fn validate(&self) -> Result<()> {
        if self.id.trim().is_empty() {
            return Err(anyhow!("Selection id must not be empty"));
        }
        if !self.id.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_') {
            return Err(anyhow!(
                "Selection id '{}' may only contain ASCII letters, digits, '-' and '_'",
                self.id
            ));
        }
        for (name, range) in [("context", &self.context_range), ("expression", &self.expression_range)] {
            if !range.start.is_finite() || !range.end.is_finite() || range.start < 0.0 {
                return Err(anyhow!("Selection '{}': invalid {} range {}", self.id, name, range));
            }
            if range.end <= range.start {
                return Err(anyhow!("Selection '{}': empty {} range {}", self.id, name, range));
            }
        }
        if !self.context_range.contains(&self.expression_range) {
            return Err(anyhow!(
                "Selection '{}': expression range {} is not inside context range {}",
                self.id,
                self.expression_range,
                self.context_range
            ));
        }
        Ok(())
    }

    /// Headline shown on the slide; falls back to the source text
    pub fn headline(&self) -> &str {
        if self.expression.trim().is_empty() {
            &self.source_text
        } else {
            &self.expression
        }
    }

    /// Vocabulary words ordered by the source line they appear on
    pub fn ordered_vocabulary(&self) -> Vec<&VocabularyAnnotation> {
        let mut words: Vec<&VocabularyAnnotation> = self.vocabulary.iter().collect();
        words.sort_by_key(|v| v.line_index);
        words
    }
}

/// Load and validate an ordered list of selections from a JSON file
pub fn load_selections<P: AsRef<Path>>(path: P) -> Result<Vec<Selection>> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read selections file: {:?}", path))?;
    let selections: Vec<Selection> = serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse selections file: {:?}", path))?;

    let mut seen = std::collections::HashSet::new();
    for selection in &selections {
        selection.validate()?;
        if !seen.insert(selection.id.as_str()) {
            return Err(anyhow!("Duplicate selection id '{}'", selection.id));
        }
    }
    Ok(selections)
}

/// Final layout family requested for a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LayoutKind {
    /// Landscape side-by-side or sequential output
    Wide,
    /// Vertical short-form output
    Short,
    /// Short-form outputs concatenated into bounded batches
    BatchedShort,
}

impl LayoutKind {
    pub fn is_short(&self) -> bool {
        matches!(self, Self::Short | Self::BatchedShort)
    }
}

impl fmt::Display for LayoutKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Wide => "wide",
            Self::Short => "short",
            Self::BatchedShort => "batched_short",
        };
        f.write_str(name)
    }
}

/// Frame size in pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

impl Resolution {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn is_vertical(&self) -> bool {
        self.height > self.width
    }

    /// ffmpeg `WxH` size string
    pub fn as_size(&self) -> String {
        format!("{}x{}", self.width, self.height)
    }
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}
