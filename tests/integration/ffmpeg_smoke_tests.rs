/*!
 * Smoke tests against the real ffmpeg/ffprobe binaries.
 *
 * Skipped (as passing) when either tool is missing from PATH. Only native
 * encoders are used to generate the fixture so that minimal builds work.
 */

use std::path::Path;
use std::sync::Arc;

use lingoclip::app_config::{ExtractionConfig, ExtractionStrategy, QualityConfig, ToolConfig};
use lingoclip::assembly::{ClipExtractor, ResourceJanitor, SeekMode, SegmentRepeater};
use lingoclip::media::tool::tool_on_path;
use lingoclip::media::{FfmpegArgs, FfmpegTool, MediaContext, MediaHandle, ProbeCache};
use lingoclip::models::TimeRange;

use crate::common;

fn tools_available() -> bool {
    let found = tool_on_path("ffmpeg").is_some() && tool_on_path("ffprobe").is_some();
    if !found {
        eprintln!("ffmpeg/ffprobe not on PATH, skipping");
    }
    found
}

/// 6s of test pattern, every frame a keyframe so copy cuts land exactly
async fn generate_source(ctx: &MediaContext, path: &Path) {
    let args = FfmpegArgs::new()
        .args(["-f", "lavfi", "-i", "testsrc=size=320x240:rate=24:duration=6"])
        .args(["-c:v", "mpeg4", "-g", "1", "-q:v", "5"])
        .output(path);
    ctx.ffmpeg(args).await.unwrap();
}

#[tokio::test]
async fn test_real_tools_withGeneratedSource_shouldProbeExtractAndRepeat() {
    if !tools_available() {
        return;
    }
    common::init_logging();
    let dir = common::create_temp_dir().unwrap();
    let ctx = MediaContext::new(Arc::new(FfmpegTool::new(&ToolConfig::default())), ProbeCache::new());
    let source = dir.path().join("source.mp4");
    generate_source(&ctx, &source).await;

    let media = MediaHandle::open(&source, ctx.tool.as_ref(), &ctx.probes).await.unwrap();
    assert!((media.duration() - 6.0).abs() < 0.1);
    let video = media.info.video.as_ref().unwrap();
    assert_eq!((video.width, video.height), (320, 240));
    assert!(!media.info.has_audio());

    let janitor = ResourceJanitor::new(dir.path().join("work")).unwrap();
    let scope = janitor.scope("smoke").unwrap();
    let extracted = ClipExtractor::new(ExtractionConfig::default(), QualityConfig::default())
        .extract(
            &ctx,
            &scope,
            &media,
            &TimeRange::new(1.0, 3.0),
            ExtractionStrategy::Copy,
            SeekMode::Approximate,
        )
        .await
        .into_result()
        .unwrap();
    assert!((extracted.duration - 2.0).abs() < 0.1);

    let repeated = SegmentRepeater::new(QualityConfig::default())
        .repeat(&ctx, &scope, &extracted, 2)
        .await
        .unwrap()
        .into_artifact();
    assert!((repeated.duration - 4.0).abs() < 0.2);
    assert!(repeated.path.is_file());

    drop(scope);
    janitor.finish();
    assert!(!janitor.run_dir().exists());
}

/// Copying the same range twice produces byte-identical files
#[tokio::test]
async fn test_real_tools_withRepeatedCopyExtraction_shouldBeByteIdentical() {
    if !tools_available() {
        return;
    }
    let dir = common::create_temp_dir().unwrap();
    let ctx = MediaContext::new(Arc::new(FfmpegTool::new(&ToolConfig::default())), ProbeCache::new());
    let source = dir.path().join("source.mp4");
    generate_source(&ctx, &source).await;
    let media = MediaHandle::open(&source, ctx.tool.as_ref(), &ctx.probes).await.unwrap();

    let janitor = ResourceJanitor::new(dir.path().join("work")).unwrap();
    let extractor = ClipExtractor::new(ExtractionConfig::default(), QualityConfig::default());
    let range = TimeRange::new(2.0, 4.0);
    let first_scope = janitor.scope("first").unwrap();
    let second_scope = janitor.scope("second").unwrap();

    let mut copies = Vec::new();
    for scope in [&first_scope, &second_scope] {
        let outcome = extractor
            .extract(&ctx, scope, &media, &range, ExtractionStrategy::Copy, SeekMode::Approximate)
            .await;
        assert_eq!(outcome.path_taken(), "copy");
        copies.push(outcome.into_result().unwrap());
    }

    assert_ne!(copies[0].path, copies[1].path);
    let first = std::fs::read(&copies[0].path).unwrap();
    let second = std::fs::read(&copies[1].path).unwrap();
    assert!(!first.is_empty());
    assert!(first == second, "copy extraction is not deterministic");
}

/// A failing ffmpeg call surfaces the tool's diagnostic
#[tokio::test]
async fn test_real_tools_withMissingInput_shouldReportToolError() {
    if !tools_available() {
        return;
    }
    let dir = common::create_temp_dir().unwrap();
    let ctx = MediaContext::new(Arc::new(FfmpegTool::new(&ToolConfig::default())), ProbeCache::new());
    let args = FfmpegArgs::new()
        .input(&dir.path().join("absent.mp4"))
        .args(["-c", "copy"])
        .output(&dir.path().join("out.mp4"));

    match ctx.ffmpeg(args).await {
        Err(lingoclip::errors::MediaError::Tool { tool, exit_code, diagnostic }) => {
            assert_eq!(tool, "ffmpeg");
            assert_ne!(exit_code, Some(0));
            assert!(diagnostic.contains("absent.mp4"));
        }
        other => panic!("unexpected result {:?}", other.map(|o| o.diagnostic)),
    }
}
