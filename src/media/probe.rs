/*!
 * Probed media metadata and the shared probe cache.
 *
 * The cache is an explicit object passed to every worker. Entries are keyed
 * by path and only served while the file's modification time and size
 * still match what was probed.
 */

use log::debug;
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::SystemTime;

use crate::errors::MediaError;

use super::tool::MediaTool;

/// Video stream properties
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VideoStreamInfo {
    pub codec: String,
    pub width: u32,
    pub height: u32,
    /// Frames per second
    pub fps: f64,
    /// Stream duration when the container reports one
    pub duration: Option<f64>,
}

/// Audio stream properties
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AudioStreamInfo {
    pub codec: String,
    pub sample_rate: u32,
    pub channels: u32,
}

/// Container and first-stream metadata of a media file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MediaInfo {
    /// Container duration in seconds
    pub duration: f64,
    /// Container start time in seconds
    pub start_time: f64,
    pub video: Option<VideoStreamInfo>,
    pub audio: Option<AudioStreamInfo>,
}

impl MediaInfo {
    /// Parse `ffprobe -show_format -show_streams -print_format json` output
    pub fn from_ffprobe_json(json: &Value) -> Result<Self, String> {
        let streams = json
            .get("streams")
            .and_then(|s| s.as_array())
            .ok_or_else(|| "no streams reported".to_string())?;

        let video = streams
            .iter()
            .find(|s| s.get("codec_type").and_then(|t| t.as_str()) == Some("video"))
            .map(|s| VideoStreamInfo {
                codec: str_field(s, "codec_name").unwrap_or("unknown").to_string(),
                width: s.get("width").and_then(|v| v.as_u64()).unwrap_or(0) as u32,
                height: s.get("height").and_then(|v| v.as_u64()).unwrap_or(0) as u32,
                fps: str_field(s, "r_frame_rate")
                    .map(parse_frame_rate)
                    .filter(|fps| *fps > 0.0)
                    .or_else(|| str_field(s, "avg_frame_rate").map(parse_frame_rate))
                    .unwrap_or(0.0),
                duration: str_field(s, "duration").and_then(|d| d.parse::<f64>().ok()),
            });

        let audio = streams
            .iter()
            .find(|s| s.get("codec_type").and_then(|t| t.as_str()) == Some("audio"))
            .map(|s| AudioStreamInfo {
                codec: str_field(s, "codec_name").unwrap_or("unknown").to_string(),
                sample_rate: str_field(s, "sample_rate")
                    .and_then(|r| r.parse::<u32>().ok())
                    .unwrap_or(0),
                channels: s.get("channels").and_then(|v| v.as_u64()).unwrap_or(0) as u32,
            });

        if video.is_none() && audio.is_none() {
            return Err("no audio or video stream".to_string());
        }

        let format = json.get("format");
        let duration = format
            .and_then(|f| str_field(f, "duration"))
            .and_then(|d| d.parse::<f64>().ok())
            .or_else(|| video.as_ref().and_then(|v| v.duration))
            .unwrap_or(0.0);
        let start_time = format
            .and_then(|f| str_field(f, "start_time"))
            .and_then(|d| d.parse::<f64>().ok())
            .unwrap_or(0.0);

        Ok(Self {
            duration,
            start_time,
            video,
            audio,
        })
    }

    /// Duration of the video stream, falling back to the container
    pub fn video_duration(&self) -> f64 {
        self.video
            .as_ref()
            .and_then(|v| v.duration)
            .unwrap_or(self.duration)
    }

    pub fn has_audio(&self) -> bool {
        self.audio.is_some()
    }

    /// One frame interval of the video stream, if known
    pub fn frame_interval(&self) -> Option<f64> {
        self.video
            .as_ref()
            .filter(|v| v.fps > 0.0)
            .map(|v| 1.0 / v.fps)
    }
}

fn str_field<'a>(value: &'a Value, key: &str) -> Option<&'a str> {
    value.get(key).and_then(|v| v.as_str())
}

/// Parse a frame rate such as `30000/1001` or `25`
pub fn parse_frame_rate(rate: &str) -> f64 {
    if let Some((num, den)) = rate.split_once('/') {
        let num: f64 = num.trim().parse().unwrap_or(0.0);
        let den: f64 = den.trim().parse().unwrap_or(0.0);
        if den > 0.0 {
            return num / den;
        }
        return 0.0;
    }
    rate.trim().parse().unwrap_or(0.0)
}

/// Identity of a file's content as far as the cache is concerned
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ProbeKey {
    pub modified: Option<SystemTime>,
    pub size: u64,
}

impl ProbeKey {
    pub fn for_path(path: &Path) -> std::io::Result<Self> {
        let metadata = std::fs::metadata(path)?;
        Ok(Self {
            modified: metadata.modified().ok(),
            size: metadata.len(),
        })
    }
}

#[derive(Debug, Clone)]
struct CachedProbe {
    key: ProbeKey,
    info: MediaInfo,
}

/// Concurrency-safe metadata cache keyed by (path, modification time, size)
#[derive(Clone, Default)]
pub struct ProbeCache {
    entries: Arc<RwLock<HashMap<PathBuf, CachedProbe>>>,
    hits: Arc<AtomicUsize>,
    misses: Arc<AtomicUsize>,
}

impl ProbeCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cached info for `path` if it was probed with the same key
    pub fn lookup(&self, path: &Path, key: &ProbeKey) -> Option<MediaInfo> {
        let entries = self.entries.read();
        match entries.get(path) {
            Some(cached) if cached.key == *key => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                Some(cached.info.clone())
            }
            Some(_) => {
                debug!("Probe cache entry for {:?} is stale", path);
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    /// Store info for `path`, replacing any stale entry
    pub fn insert(&self, path: &Path, key: ProbeKey, info: MediaInfo) {
        self.entries
            .write()
            .insert(path.to_path_buf(), CachedProbe { key, info });
    }

    /// Drop the entry for a file that is about to be deleted or rewritten
    pub fn invalidate(&self, path: &Path) {
        self.entries.write().remove(path);
    }

    /// Probe through the cache
    pub async fn probe(&self, tool: &dyn MediaTool, path: &Path) -> Result<MediaInfo, MediaError> {
        let key = ProbeKey::for_path(path)
            .map_err(|e| MediaError::validation(path, format!("cannot stat file: {}", e)))?;

        if let Some(info) = self.lookup(path, &key) {
            return Ok(info);
        }

        let info = tool.probe(path).await?;
        self.insert(path, key, info.clone());
        Ok(info)
    }

    /// (hits, misses, hit rate)
    pub fn stats(&self) -> (usize, usize, f64) {
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        let total = hits + misses;
        let hit_rate = if total > 0 { hits as f64 / total as f64 } else { 0.0 };
        (hits, misses, hit_rate)
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

/// A source file plus its probed metadata, shared read-only by selections
#[derive(Debug, Clone)]
pub struct MediaHandle {
    pub path: PathBuf,
    pub info: MediaInfo,
}

impl MediaHandle {
    /// Probe a source file; fails with an extraction error when unreadable
    pub async fn open(path: &Path, tool: &dyn MediaTool, cache: &ProbeCache) -> Result<Self, MediaError> {
        if !path.is_file() {
            return Err(MediaError::Extraction {
                source_path: path.to_path_buf(),
                message: "source file does not exist".to_string(),
            });
        }

        let info = cache.probe(tool, path).await.map_err(|e| MediaError::Extraction {
            source_path: path.to_path_buf(),
            message: format!("source is not readable media: {}", e),
        })?;

        if info.video.is_none() {
            return Err(MediaError::Extraction {
                source_path: path.to_path_buf(),
                message: "source has no video stream".to_string(),
            });
        }

        Ok(Self {
            path: path.to_path_buf(),
            info,
        })
    }

    pub fn duration(&self) -> f64 {
        self.info.duration
    }
}

/// One `MediaHandle` per distinct source file
#[derive(Default)]
pub struct MediaLibrary {
    handles: Mutex<HashMap<PathBuf, Arc<MediaHandle>>>,
}

impl MediaLibrary {
    pub fn new() -> Self {
        Self::default()
    }

    /// Handle for `path`, probing it on first use
    pub async fn open(
        &self,
        path: &Path,
        tool: &dyn MediaTool,
        cache: &ProbeCache,
    ) -> Result<Arc<MediaHandle>, MediaError> {
        if let Some(handle) = self.handles.lock().get(path) {
            return Ok(handle.clone());
        }

        let handle = Arc::new(MediaHandle::open(path, tool, cache).await?);
        let mut handles = self.handles.lock();
        Ok(handles.entry(path.to_path_buf()).or_insert(handle).clone())
    }

    pub fn len(&self) -> usize {
        self.handles.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.lock().is_empty()
    }
}
