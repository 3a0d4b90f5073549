/*!
 * Narration files pre-rendered into a directory, one per selection.
 */

use async_trait::async_trait;
use log::debug;
use std::path::{Path, PathBuf};

use crate::errors::MediaError;
use crate::models::Selection;

use super::NarrationProvider;

/// Extensions probed in order
const EXTENSIONS: [&str; 3] = ["mp3", "wav", "m4a"];

#[derive(Debug, Clone)]
pub struct DirectoryNarration {
    dir: PathBuf,
}

impl DirectoryNarration {
    pub fn new<P: AsRef<Path>>(dir: P) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
        }
    }

    fn lookup(&self, stem: &str) -> Option<PathBuf> {
        EXTENSIONS
            .iter()
            .map(|ext| self.dir.join(format!("{}.{}", stem, ext)))
            .find(|path| path.is_file())
    }
}

#[async_trait]
impl NarrationProvider for DirectoryNarration {
    async fn narration(&self, selection: &Selection) -> Result<Option<PathBuf>, MediaError> {
        let found = self.lookup(&selection.id);
        match &found {
            Some(path) => debug!("Narration for '{}': {:?}", selection.id, path),
            None => debug!("No narration for '{}' in {:?}", selection.id, self.dir),
        }
        Ok(found)
    }

    /// A shared slide uses `<first-id>+<last-id>` when present, else the
    /// first selection's own narration
    async fn shared_narration(&self, selections: &[&Selection]) -> Result<Option<PathBuf>, MediaError> {
        let (Some(first), Some(last)) = (selections.first(), selections.last()) else {
            return Ok(None);
        };
        if selections.len() > 1 {
            if let Some(path) = self.lookup(&format!("{}+{}", first.id, last.id)) {
                return Ok(Some(path));
            }
        }
        self.narration(first).await
    }
}
