/*!
 * Narration collaborators for slides.
 *
 * Speech synthesis happens outside this crate; a provider only hands back
 * the path of an already-rendered audio file for a selection, if any.
 *
 * - `NoNarration`: slides carry silence
 * - `DirectoryNarration`: looks up `<dir>/<selection-id>.{mp3,wav,m4a}`
 */

use async_trait::async_trait;
use std::fmt::Debug;
use std::path::PathBuf;

use crate::errors::MediaError;
use crate::models::Selection;

pub mod directory;

pub use self::directory::DirectoryNarration;

/// Source of narrated audio for slides
#[async_trait]
pub trait NarrationProvider: Send + Sync + Debug {
    /// Narration for one selection; `Ok(None)` means the slide is silent
    async fn narration(&self, selection: &Selection) -> Result<Option<PathBuf>, MediaError>;

    /// Narration for a slide shared by several selections
    async fn shared_narration(&self, selections: &[&Selection]) -> Result<Option<PathBuf>, MediaError> {
        match selections {
            [only] => self.narration(only).await,
            _ => Ok(None),
        }
    }
}

/// Every slide is silent
#[derive(Debug, Default, Clone, Copy)]
pub struct NoNarration;

#[async_trait]
impl NarrationProvider for NoNarration {
    async fn narration(&self, _selection: &Selection) -> Result<Option<PathBuf>, MediaError> {
        Ok(None)
    }
}
