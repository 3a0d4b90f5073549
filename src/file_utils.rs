use anyhow::{Context, Result, anyhow};
use log::debug;
use once_cell::sync::Lazy;
use regex::Regex;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::models::LayoutKind;

// @module: File and directory utilities

static UNSAFE_NAME_CHARS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"[^A-Za-z0-9._-]+").unwrap()
});

// @struct: File operations utility
pub struct FileManager;

impl FileManager {
    // @checks: File existence
    pub fn file_exists<P: AsRef<Path>>(path: P) -> bool {
        path.as_ref().is_file()
    }

    // @creates: Directory and parents if needed
    pub fn ensure_dir<P: AsRef<Path>>(path: P) -> Result<()> {
        let path = path.as_ref();
        if !path.exists() {
            fs::create_dir_all(path).with_context(|| format!("Failed to create directory: {:?}", path))?;
        }
        Ok(())
    }

    /// Replace characters that are unsafe in file names
    pub fn sanitize_stem(stem: &str) -> String {
        let cleaned = UNSAFE_NAME_CHARS.replace_all(stem.trim(), "_");
        if cleaned.is_empty() {
            "output".to_string()
        } else {
            cleaned.into_owned()
        }
    }

    // @generates: Published path for one selection's output
    pub fn selection_output_path<P: AsRef<Path>>(output_dir: P, selection_id: &str, layout: LayoutKind) -> PathBuf {
        let kind = match layout {
            LayoutKind::Wide => "wide",
            LayoutKind::Short | LayoutKind::BatchedShort => "short",
        };
        output_dir
            .as_ref()
            .join(format!("{}.{}.mp4", Self::sanitize_stem(selection_id), kind))
    }

    // @generates: Published path for a short-form batch (1-based)
    pub fn batch_output_path<P: AsRef<Path>>(output_dir: P, batch_number: usize) -> PathBuf {
        output_dir.as_ref().join(format!("batch-{:02}.mp4", batch_number))
    }

    /// Write a string to a file, ensuring the parent directory exists
    pub fn write_to_file<P: AsRef<Path>>(path: P, content: &str) -> Result<()> {
        if let Some(parent) = path.as_ref().parent() {
            Self::ensure_dir(parent)?;
        }
        fs::write(&path, content).with_context(|| format!("Failed to write to file: {:?}", path.as_ref()))?;
        Ok(())
    }

    /// Write through a sibling temporary file and rename it into place, so
    /// readers never see a partial file
    pub fn write_atomically<P: AsRef<Path>>(path: P, content: &str) -> Result<()> {
        let path = path.as_ref();
        let parent = path.parent().unwrap_or_else(|| Path::new("."));
        Self::ensure_dir(parent)?;

        let tmp = tempfile::NamedTempFile::new_in(parent)
            .with_context(|| format!("Failed to create temporary file in {:?}", parent))?;
        fs::write(tmp.path(), content).with_context(|| format!("Failed to write {:?}", tmp.path()))?;
        tmp.persist(path)
            .map_err(|e| anyhow!("Failed to move temporary file to {:?}: {}", path, e.error))?;
        Ok(())
    }

    /// Move a finished artifact from the work directory to `to`. Rename
    /// when possible; across filesystems, copy to a hidden sibling, rename
    /// that into place and remove the original.
    pub fn publish<P1: AsRef<Path>, P2: AsRef<Path>>(from: P1, to: P2, overwrite: bool) -> io::Result<PathBuf> {
        let from = from.as_ref();
        let to = to.as_ref();

        if !from.is_file() {
            return Err(io::Error::new(
                io::ErrorKind::NotFound,
                format!("artifact {:?} does not exist", from),
            ));
        }
        if to.exists() && !overwrite {
            return Err(io::Error::new(
                io::ErrorKind::AlreadyExists,
                format!("{:?} already exists (use --force to overwrite)", to),
            ));
        }
        if let Some(parent) = to.parent() {
            fs::create_dir_all(parent)?;
        }

        match fs::rename(from, to) {
            Ok(()) => {}
            Err(rename_error) => {
                debug!("Rename {:?} -> {:?} failed ({}), copying", from, to, rename_error);
                let file_name = to
                    .file_name()
                    .map(|n| n.to_string_lossy().to_string())
                    .unwrap_or_else(|| "artifact".to_string());
                let staging = to.with_file_name(format!(".{}.partial", file_name));
                if let Err(e) = fs::copy(from, &staging).and_then(|_| fs::rename(&staging, to)) {
                    let _ = fs::remove_file(&staging);
                    return Err(e);
                }
                fs::remove_file(from)?;
            }
        }
        Ok(to.to_path_buf())
    }
}
