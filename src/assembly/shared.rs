/*!
 * Clips shared by several selections (a common context window, a shared
 * slide). Each key is created at most once per run: the check and the
 * creation happen under that key's lock.
 */

use log::debug;
use parking_lot::Mutex;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::errors::MediaError;
use crate::media::ClipArtifact;

use super::janitor::ArtifactScope;

type Slot = Arc<tokio::sync::Mutex<Option<ClipArtifact>>>;

/// Run-scoped registry of shared clips
pub struct SharedClips {
    scope: ArtifactScope,
    slots: Mutex<HashMap<String, Slot>>,
    created: AtomicUsize,
}

impl SharedClips {
    pub fn new(scope: ArtifactScope) -> Self {
        Self {
            scope,
            slots: Mutex::new(HashMap::new()),
            created: AtomicUsize::new(0),
        }
    }

    /// Stable key from the parts identifying a shared clip
    pub fn key(parts: &[&str]) -> String {
        let mut hasher = Sha256::new();
        for part in parts {
            hasher.update(part.as_bytes());
            hasher.update([0u8]);
        }
        let digest = format!("{:x}", hasher.finalize());
        digest[..16].to_string()
    }

    /// Scope that owns shared clips; it lives as long as the run
    pub fn scope(&self) -> &ArtifactScope {
        &self.scope
    }

    /// Number of clips actually created so far
    pub fn created_count(&self) -> usize {
        self.created.load(Ordering::SeqCst)
    }

    /// Return the clip for `key`, running `create` only if no earlier call
    /// succeeded. Concurrent callers for the same key wait for the first.
    pub async fn get_or_create<F, Fut>(&self, key: &str, create: F) -> Result<ClipArtifact, MediaError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<ClipArtifact, MediaError>>,
    {
        let slot = {
            let mut slots = self.slots.lock();
            slots.entry(key.to_string()).or_default().clone()
        };

        let mut guard = slot.lock().await;
        if let Some(existing) = guard.as_ref() {
            debug!("Reusing shared clip {} ({:?})", key, existing.path);
            return Ok(existing.clone());
        }

        let artifact = create().await?;
        self.created.fetch_add(1, Ordering::SeqCst);
        *guard = Some(artifact.clone());
        Ok(artifact)
    }
}
