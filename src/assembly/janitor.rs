/*!
 * Ownership and cleanup of intermediate artifacts.
 *
 * A `ResourceJanitor` owns one private run directory. Each selection
 * pipeline works inside an `ArtifactScope` (a subdirectory) whose files are
 * deleted when the scope is released or dropped, on success and on every
 * error path. Files tagged "preserve" survive. All operations are
 * idempotent and the janitor may be shared by concurrent pipelines.
 */

use log::{debug, warn};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, SystemTime};
use walkdir::WalkDir;

use crate::media::ProbeCache;

/// Marker file identifying a janitor-owned run directory
pub const RUN_MARKER: &str = ".lingoclip-run";

/// What happens to a tracked path on release
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Retention {
    Discard,
    Preserve,
}

#[derive(Default)]
struct JanitorState {
    tracked: HashMap<PathBuf, Retention>,
    scopes: Vec<PathBuf>,
}

/// Run-wide owner of every intermediate artifact path
#[derive(Clone)]
pub struct ResourceJanitor {
    run_dir: PathBuf,
    state: Arc<Mutex<JanitorState>>,
    probes: Option<ProbeCache>,
}

impl ResourceJanitor {
    /// Create a fresh private run directory under `root`
    pub fn new<P: AsRef<Path>>(root: P) -> io::Result<Self> {
        let run_dir = root
            .as_ref()
            .join(format!("run-{}", uuid::Uuid::new_v4().simple()));
        std::fs::create_dir_all(&run_dir)?;
        std::fs::write(run_dir.join(RUN_MARKER), std::process::id().to_string())?;
        debug!("Created run directory {:?}", run_dir);

        Ok(Self {
            run_dir,
            state: Arc::new(Mutex::new(JanitorState::default())),
            probes: None,
        })
    }

    /// Drop probe cache entries of every file this janitor deletes
    pub fn with_probes(mut self, probes: ProbeCache) -> Self {
        self.probes = Some(probes);
        self
    }

    pub fn run_dir(&self) -> &Path {
        &self.run_dir
    }

    /// Start tracking a path; an existing preserve tag is kept
    pub fn track<P: AsRef<Path>>(&self, path: P) -> PathBuf {
        let path = path.as_ref().to_path_buf();
        self.state
            .lock()
            .tracked
            .entry(path.clone())
            .or_insert(Retention::Discard);
        path
    }

    /// Tag a path so that no release deletes it
    pub fn preserve<P: AsRef<Path>>(&self, path: P) {
        self.state
            .lock()
            .tracked
            .insert(path.as_ref().to_path_buf(), Retention::Preserve);
    }

    pub fn is_preserved<P: AsRef<Path>>(&self, path: P) -> bool {
        self.state.lock().tracked.get(path.as_ref()) == Some(&Retention::Preserve)
    }

    pub fn is_tracked<P: AsRef<Path>>(&self, path: P) -> bool {
        self.state.lock().tracked.contains_key(path.as_ref())
    }

    pub fn tracked_count(&self) -> usize {
        self.state.lock().tracked.len()
    }

    /// Delete one tracked path unless preserved. Returns true when a file
    /// was actually removed.
    pub fn release<P: AsRef<Path>>(&self, path: P) -> bool {
        let path = path.as_ref();
        {
            let mut state = self.state.lock();
            match state.tracked.get(path) {
                Some(Retention::Discard) => {
                    state.tracked.remove(path);
                }
                Some(Retention::Preserve) | None => return false,
            }
        }
        self.forget_probe(path);
        remove_file_quietly(path)
    }

    fn forget_probe(&self, path: &Path) {
        if let Some(probes) = &self.probes {
            probes.invalidate(path);
        }
    }

    /// Delete every non-preserved tracked path and every empty scope
    /// directory. Safe to call repeatedly, including from a signal handler.
    pub fn release_all(&self) -> usize {
        let (paths, scopes) = {
            let mut state = self.state.lock();
            let paths: Vec<PathBuf> = state
                .tracked
                .iter()
                .filter(|(_, r)| **r == Retention::Discard)
                .map(|(p, _)| p.clone())
                .collect();
            for path in &paths {
                state.tracked.remove(path);
            }
            (paths, state.scopes.clone())
        };

        for path in &paths {
            self.forget_probe(path);
        }
        let removed = paths.iter().filter(|p| remove_file_quietly(p)).count();
        for dir in scopes.iter().rev() {
            let _ = std::fs::remove_dir(dir);
        }
        if removed > 0 {
            debug!("Janitor removed {} intermediate artifact(s)", removed);
        }
        removed
    }

    /// Release everything and remove the run directory if nothing preserved
    /// remains in it
    pub fn finish(&self) -> usize {
        let removed = self.release_all();
        let has_preserved = self
            .state
            .lock()
            .tracked
            .keys()
            .any(|p| p.starts_with(&self.run_dir) && p.exists());
        if !has_preserved {
            let _ = std::fs::remove_file(self.run_dir.join(RUN_MARKER));
            let _ = std::fs::remove_dir(&self.run_dir);
        }
        removed
    }

    /// Open a private scope directory for one selection (or the run's
    /// shared clips)
    pub fn scope(&self, name: &str) -> io::Result<ArtifactScope> {
        let safe: String = name
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
            .collect();
        let dir = self
            .run_dir
            .join(format!("{}-{}", safe, &uuid::Uuid::new_v4().simple().to_string()[..8]));
        std::fs::create_dir_all(&dir)?;
        self.state.lock().scopes.push(dir.clone());

        Ok(ArtifactScope {
            janitor: self.clone(),
            dir,
            owned: Mutex::new(Vec::new()),
            counter: AtomicUsize::new(0),
        })
    }

    /// Remove run directories left behind by runs that died without cleanup
    pub fn sweep_stale<P: AsRef<Path>>(root: P, max_age: Duration) -> usize {
        let root = root.as_ref();
        if !root.is_dir() {
            return 0;
        }

        let now = SystemTime::now();
        let mut swept = 0;
        for entry in WalkDir::new(root)
            .min_depth(2)
            .max_depth(2)
            .into_iter()
            .filter_map(|e| e.ok())
        {
            if entry.file_name() != RUN_MARKER {
                continue;
            }
            let age = entry
                .metadata()
                .ok()
                .and_then(|m| m.modified().ok())
                .and_then(|m| now.duration_since(m).ok())
                .unwrap_or_default();
            if age < max_age {
                continue;
            }
            if let Some(dir) = entry.path().parent() {
                match std::fs::remove_dir_all(dir) {
                    Ok(()) => swept += 1,
                    Err(e) => warn!("Failed to sweep stale run directory {:?}: {}", dir, e),
                }
            }
        }
        swept
    }
}

/// Per-selection artifact scope; releases its files when dropped
pub struct ArtifactScope {
    janitor: ResourceJanitor,
    dir: PathBuf,
    owned: Mutex<Vec<PathBuf>>,
    counter: AtomicUsize,
}

impl ArtifactScope {
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn janitor(&self) -> &ResourceJanitor {
        &self.janitor
    }

    /// Allocate and track a fresh file path inside the scope
    pub fn allocate(&self, stem: &str, extension: &str) -> PathBuf {
        let n = self.counter.fetch_add(1, Ordering::Relaxed);
        let path = self.dir.join(format!("{:02}-{}.{}", n, stem, extension));
        self.adopt(&path);
        path
    }

    /// Track a path created elsewhere as owned by this scope
    pub fn adopt<P: AsRef<Path>>(&self, path: P) {
        let path = self.janitor.track(path);
        self.owned.lock().push(path);
    }

    /// Keep a file past the end of the scope
    pub fn preserve<P: AsRef<Path>>(&self, path: P) {
        self.janitor.preserve(path);
    }

    /// Move ownership of `path` to `other`, so it outlives this scope
    pub fn hand_over<P: AsRef<Path>>(&self, path: P, other: &ArtifactScope) {
        let path = path.as_ref();
        self.owned.lock().retain(|p| p != path);
        other.adopt(path);
    }

    pub fn owned_count(&self) -> usize {
        self.owned.lock().len()
    }

    /// Delete every owned, non-preserved file and the scope directory if it
    /// ends up empty
    pub fn release(&self) -> usize {
        let owned: Vec<PathBuf> = std::mem::take(&mut *self.owned.lock());
        let removed = owned.iter().filter(|p| self.janitor.release(p)).count();
        let _ = std::fs::remove_dir(&self.dir);
        removed
    }
}

impl Drop for ArtifactScope {
    fn drop(&mut self) {
        self.release();
    }
}

fn remove_file_quietly(path: &Path) -> bool {
    match std::fs::remove_file(path) {
        Ok(()) => true,
        Err(e) if e.kind() == io::ErrorKind::NotFound => false,
        Err(e) => {
            warn!("Failed to remove {:?}: {}", path, e);
            false
        }
    }
}
