/*!
 * Tests for clip extraction and the copy -> encode escalation
 */

use std::sync::Arc;

use lingoclip::app_config::{ExtractionConfig, ExtractionStrategy, QualityConfig};
use lingoclip::assembly::{ClipExtractor, ExtractionOutcome, ResourceJanitor, SeekMode};
use lingoclip::errors::MediaError;
use lingoclip::media::{MediaHandle, Provenance};
use lingoclip::models::TimeRange;

use crate::common::mock_tool::{is_copy_extraction, is_encode_extraction, source_info};
use crate::common::{self, MockTool};

struct Setup {
    _dir: tempfile::TempDir,
    tool: Arc<MockTool>,
    janitor: ResourceJanitor,
    media: MediaHandle,
}

async fn setup(tool: MockTool) -> Setup {
    let dir = common::create_temp_dir().unwrap();
    let source = dir.path().join("source.mkv");
    tool.add_media(&source, source_info(600.0));
    let tool = Arc::new(tool);
    let ctx = common::media_context(&tool);
    let media = MediaHandle::open(&source, ctx.tool.as_ref(), &ctx.probes).await.unwrap();
    let janitor = ResourceJanitor::new(dir.path().join("work")).unwrap();
    Setup {
        _dir: dir,
        tool,
        janitor,
        media,
    }
}

fn extractor() -> ClipExtractor {
    ClipExtractor::new(ExtractionConfig::default(), QualityConfig::default())
}

async fn extract(setup: &Setup, range: TimeRange, strategy: ExtractionStrategy) -> ExtractionOutcome {
    let ctx = common::media_context(&setup.tool);
    let scope = setup.janitor.scope("extract").unwrap();
    let outcome = extractor()
        .extract(&ctx, &scope, &setup.media, &range, strategy, SeekMode::FrameAccurate)
        .await;
    // keep the files alive for the assertions
    if let Some(artifact) = outcome.artifact() {
        scope.preserve(&artifact.path);
    }
    outcome
}

/// A short range within tolerance is copied without re-encoding
#[tokio::test]
async fn test_extract_withShortRange_shouldCopy() {
    let setup = setup(MockTool::new()).await;
    let outcome = extract(&setup, TimeRange::new(100.0, 112.0), ExtractionStrategy::Auto).await;

    assert_eq!(outcome.path_taken(), "copy");
    let artifact = outcome.artifact().unwrap();
    assert_eq!(artifact.provenance, Provenance::Copy);
    assert!((artifact.duration - 12.0).abs() <= 1.0 / 24.0);
    assert_eq!(setup.tool.count_calls(is_encode_extraction), 0);
}

/// A copy that lands off the requested range escalates to encode exactly once
#[tokio::test]
async fn test_extract_withDriftingCopy_shouldFallBackToEncode() {
    let tool = MockTool::new();
    tool.drift_when(is_copy_extraction, 0.4);
    let setup = setup(tool).await;

    let outcome = extract(&setup, TimeRange::new(100.0, 112.0), ExtractionStrategy::Auto).await;

    assert_eq!(outcome.path_taken(), "copy->encode");
    match &outcome {
        ExtractionOutcome::Encoded { artifact, copy_failure } => {
            assert_eq!(artifact.provenance, Provenance::Encode);
            assert!((artifact.duration - 12.0).abs() <= 1.0 / 24.0);
            assert!(copy_failure.as_deref().unwrap().contains("differs from expected"));
        }
        other => panic!("unexpected outcome {:?}", other),
    }
    assert_eq!(setup.tool.count_calls(is_copy_extraction), 1);
    assert_eq!(setup.tool.count_calls(is_encode_extraction), 1);
}

/// Long ranges skip the copy attempt under `auto`
#[tokio::test]
async fn test_extract_withRangeOverThreshold_shouldEncodeDirectly() {
    let setup = setup(MockTool::new()).await;
    let outcome = extract(&setup, TimeRange::new(10.0, 50.0), ExtractionStrategy::Auto).await;

    assert_eq!(outcome.path_taken(), "encode");
    assert_eq!(setup.tool.count_calls(is_copy_extraction), 0);
}

/// An explicit copy strategy never escalates
#[tokio::test]
async fn test_extract_withCopyStrategyFailing_shouldFailWithoutEncode() {
    let tool = MockTool::new();
    tool.fail_when(is_copy_extraction);
    let setup = setup(tool).await;

    let outcome = extract(&setup, TimeRange::new(100.0, 104.0), ExtractionStrategy::Copy).await;

    assert_eq!(outcome.path_taken(), "failed");
    assert!(matches!(outcome.into_result(), Err(MediaError::Extraction { .. })));
    assert_eq!(setup.tool.count_calls(is_encode_extraction), 0);
}

/// Both strategies failing yields an extraction error naming both
#[tokio::test]
async fn test_extract_withAllStrategiesFailing_shouldReportExhaustion() {
    let tool = MockTool::new();
    tool.fail_when(|args| args.iter().any(|a| a == "-ss"));
    let setup = setup(tool).await;

    let outcome = extract(&setup, TimeRange::new(100.0, 104.0), ExtractionStrategy::Auto).await;

    match outcome.into_result() {
        Err(MediaError::Extraction { message, .. }) => assert!(message.contains("all strategies exhausted")),
        other => panic!("unexpected result {:?}", other),
    }
}

/// A timed-out encode surfaces as a timeout, not a generic extraction error
#[tokio::test]
async fn test_extract_withTimeout_shouldReportTimeout() {
    let tool = MockTool::new();
    tool.time_out_when(is_encode_extraction);
    let setup = setup(tool).await;

    let outcome = extract(&setup, TimeRange::new(10.0, 50.0), ExtractionStrategy::Encode).await;

    let error = outcome.into_result().unwrap_err();
    assert!(error.is_timeout());
}

/// A hung copy is a hard failure and never escalates to encode
#[tokio::test]
async fn test_extract_withTimedOutCopy_shouldFailWithoutEncode() {
    let tool = MockTool::new();
    tool.time_out_when(is_copy_extraction);
    let setup = setup(tool).await;

    let outcome = extract(&setup, TimeRange::new(100.0, 112.0), ExtractionStrategy::Auto).await;

    assert_eq!(outcome.path_taken(), "failed");
    assert!(outcome.into_result().unwrap_err().is_timeout());
    assert_eq!(setup.tool.count_calls(is_copy_extraction), 1);
    assert_eq!(setup.tool.count_calls(is_encode_extraction), 0);
}

/// Ranges past the end of the source are rejected before any tool call
#[tokio::test]
async fn test_extract_withRangePastSource_shouldFailWithoutCalls() {
    let setup = setup(MockTool::new()).await;
    let outcome = extract(&setup, TimeRange::new(590.0, 640.0), ExtractionStrategy::Auto).await;

    assert!(matches!(outcome, ExtractionOutcome::Failed(MediaError::Extraction { .. })));
    assert!(setup.tool.calls().is_empty());
}
