/*!
 * Media-assembly stages, leaves first.
 *
 * - `extractor`: time-range extraction (copy, encode, auto)
 * - `sync`: seek discipline, overlays and timestamp rebasing
 * - `repeater`: N-times repetition
 * - `concat`: container-level and filter-graph joining
 * - `slide`: slide and transition-bridge rendering
 * - `layout`: wide, short and batched-short composition
 * - `janitor`: ownership and cleanup of intermediate artifacts
 * - `shared`: at-most-once creation of clips shared by selections
 * - `filters`: pure filter-graph builders
 */

pub mod concat;
pub mod extractor;
pub mod filters;
pub mod janitor;
pub mod layout;
pub mod repeater;
pub mod shared;
pub mod slide;
pub mod sync;

pub use self::concat::{ConcatOutcome, Concatenator};
pub use self::extractor::{ClipExtractor, ExtractionOutcome};
pub use self::janitor::{ArtifactScope, ResourceJanitor};
pub use self::layout::{Arrangement, BatchPlan, LayoutCompositor, LayoutJob, plan_batches};
pub use self::repeater::{RepeatOutcome, SegmentRepeater};
pub use self::shared::SharedClips;
pub use self::slide::{SlideAudio, SlideBackground, SlideComposer, SlidePayload, slide_groups};
pub use self::sync::{OverlayScript, SeekMode, Synchronizer};
