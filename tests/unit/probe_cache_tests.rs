/*!
 * Tests for the probe cache and source media handles
 */

use std::sync::Arc;

use lingoclip::errors::MediaError;
use lingoclip::media::{MediaLibrary, MediaTool, ProbeCache};

use crate::common::mock_tool::{audio_info, source_info};
use crate::common::{self, MockTool};

/// Repeated probes of an unchanged file hit the cache
#[tokio::test]
async fn test_probe_withUnchangedFile_shouldHitCache() {
    let dir = common::create_temp_dir().unwrap();
    let tool = MockTool::new();
    let path = dir.path().join("clip.mp4");
    tool.add_media(&path, source_info(8.0));
    let cache = ProbeCache::new();

    let first = cache.probe(&tool, &path).await.unwrap();
    let second = cache.probe(&tool, &path).await.unwrap();

    assert_eq!(first, second);
    assert_eq!(tool.probe_count(), 1);
    let (hits, misses, rate) = cache.stats();
    assert_eq!((hits, misses), (1, 1));
    assert!((rate - 0.5).abs() < 1e-9);
}

/// A rewritten file is probed again
#[tokio::test]
async fn test_probe_withRewrittenFile_shouldReprobe() {
    let dir = common::create_temp_dir().unwrap();
    let tool = MockTool::new();
    let path = dir.path().join("clip.mp4");
    tool.add_media(&path, source_info(8.0));
    let cache = ProbeCache::new();
    cache.probe(&tool, &path).await.unwrap();

    std::fs::write(&path, b"a longer placeholder than before").unwrap();
    let info = cache.probe(&tool, &path).await.unwrap();

    assert_eq!(tool.probe_count(), 2);
    assert!((info.duration - 8.0).abs() < 1e-9);
    assert_eq!(cache.len(), 1);
}

/// Invalidated entries are probed again
#[tokio::test]
async fn test_invalidate_withCachedEntry_shouldForceProbe() {
    let dir = common::create_temp_dir().unwrap();
    let tool = MockTool::new();
    let path = dir.path().join("clip.mp4");
    tool.add_media(&path, source_info(8.0));
    let cache = ProbeCache::new();

    cache.probe(&tool, &path).await.unwrap();
    cache.invalidate(&path);
    assert!(cache.is_empty());
    cache.probe(&tool, &path).await.unwrap();
    assert_eq!(tool.probe_count(), 2);
}

/// Probing a missing file is a validation error without a tool call
#[tokio::test]
async fn test_probe_withMissingFile_shouldFailWithoutToolCall() {
    let dir = common::create_temp_dir().unwrap();
    let tool = MockTool::new();
    let cache = ProbeCache::new();

    let result = cache.probe(&tool, &dir.path().join("absent.mp4")).await;
    assert!(matches!(result, Err(MediaError::Validation { .. })));
    assert_eq!(tool.probe_count(), 0);
}

/// Concurrent opens of the same source share one handle
#[tokio::test]
async fn test_media_library_withConcurrentOpens_shouldShareHandle() {
    let dir = common::create_temp_dir().unwrap();
    let tool = Arc::new(MockTool::new());
    let path = dir.path().join("episode.mkv");
    tool.add_media(&path, source_info(1200.0));
    let library = Arc::new(MediaLibrary::new());
    let cache = ProbeCache::new();

    let mut handles = Vec::new();
    for _ in 0..4 {
        let (tool, library, cache, path) = (tool.clone(), library.clone(), cache.clone(), path.clone());
        handles.push(tokio::spawn(async move {
            let tool: &dyn MediaTool = tool.as_ref();
            library.open(&path, tool, &cache).await.unwrap()
        }));
    }
    let mut opened = Vec::new();
    for handle in handles {
        opened.push(handle.await.unwrap());
    }

    assert_eq!(library.len(), 1);
    assert!(opened.windows(2).all(|w| Arc::ptr_eq(&w[0], &w[1])));
    assert!((opened[0].duration() - 1200.0).abs() < 1e-9);
    assert!(tool.probe_count() <= 4);
}

/// Audio-only files are not usable sources
#[tokio::test]
async fn test_media_library_withAudioOnlySource_shouldRejectIt() {
    let dir = common::create_temp_dir().unwrap();
    let tool = MockTool::new();
    let path = dir.path().join("podcast.mp3");
    tool.add_media(&path, audio_info(60.0));

    let result = MediaLibrary::new().open(&path, &tool, &ProbeCache::new()).await;
    match result {
        Err(MediaError::Extraction { message, .. }) => assert!(message.contains("no video stream")),
        other => panic!("unexpected result {:?}", other.map(|h| h.path.clone())),
    }
}

/// Cloned caches share their entries
#[test]
fn test_probe_withClonedCache_shouldShareEntries() {
    let dir = common::create_temp_dir().unwrap();
    let tool = MockTool::new();
    let path = dir.path().join("clip.mp4");
    tool.add_media(&path, source_info(4.0));
    let cache = ProbeCache::new();
    let clone = cache.clone();

    let result = tokio_test::block_on(async {
        cache.probe(&tool, &path).await?;
        clone.probe(&tool, &path).await
    });

    assert!(result.is_ok());
    assert_eq!(tool.probe_count(), 1);
    assert_eq!(clone.len(), 1);
}
