/*!
 * # LingoClip - bilingual study clips from video
 *
 * A Rust library that turns selected dialogue moments of a video into
 * language-learning clips: the surrounding context, the key expression
 * repeated, subtitles burned in and an explanatory slide laid out beside
 * or after the video.
 *
 * ## Features
 *
 * - Stream-copy extraction with re-encode fallback
 * - Burned-in bilingual overlays with timeline re-basing
 * - Expression repetition and container/filter-graph concatenation
 * - Text slides with optional narration
 * - Wide, short and batched short-form layouts
 * - Bounded parallel processing with per-selection failure isolation
 *
 * ## Architecture
 *
 * The library is organized in these main modules:
 * - `app_config`: Configuration management
 * - `models`: Selections, time ranges and layout kinds
 * - `media`: External tool invocation, probing and clip artifacts
 * - `assembly`: Stage components:
 *   - `assembly::extractor`: Clip extraction
 *   - `assembly::sync`: Overlay burning and timeline re-basing
 *   - `assembly::repeater`: Expression repetition
 *   - `assembly::concat`: Concatenation
 *   - `assembly::slide`: Slide rendering
 *   - `assembly::layout`: Final layouts and batching
 *   - `assembly::janitor`: Intermediate file lifetime
 * - `pipeline`: One selection's stage sequence
 * - `scheduler`: Bounded parallel fan-out
 * - `manifest`: Run results
 * - `providers`: Narration audio sources
 * - `app_controller`: Main application controller
 * - `file_utils`: File system operations
 * - `errors`: Custom error types for the application
 */

// Global lints configuration
// These lints will be allowed but not auto-fixed
#![allow(clippy::uninlined_format_args)]
#![allow(clippy::redundant_closure_for_method_calls)]

// Public modules
pub mod app_config;
pub mod app_controller;
pub mod assembly;
pub mod errors;
pub mod file_utils;
pub mod manifest;
pub mod media;
pub mod models;
pub mod pipeline;
pub mod providers;
pub mod scheduler;

// Re-export main types for easier usage
pub use app_config::Config;
pub use app_controller::Controller;
pub use errors::{MediaError, SelectionError, Stage};
pub use manifest::RunManifest;
pub use models::{LayoutKind, Resolution, Selection, TimeRange, load_selections};
pub use pipeline::RunRequest;
