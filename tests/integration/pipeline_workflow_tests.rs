/*!
 * End-to-end runs of the assembly pipeline against the scripted media tool
 */

use std::sync::Arc;
use std::time::Duration;

use lingoclip::app_config::{SlideMode, WideArrangement};
use lingoclip::errors::Stage;
use lingoclip::manifest::{EntryOutcome, RunManifest};
use lingoclip::models::LayoutKind;
use lingoclip::providers::DirectoryNarration;

use crate::common::mock_tool::{audio_info, has_pair, is_copy_extraction, is_slide_render, output_named};
use crate::common::{self, Fixture, MockTool};

/// A wide run publishes one file per selection plus the manifest
#[tokio::test]
async fn test_wide_run_withTwoSelections_shouldPublishBothAndManifest() {
    let fixture = Fixture::new(600.0);
    let controller = fixture.controller(fixture.config());
    let request = fixture.request(
        vec![
            common::selection("s1", (100.0, 110.0), (102.0, 104.0)),
            common::selection("s2", (200.0, 212.0), (205.0, 206.5)),
        ],
        LayoutKind::Wide,
    );

    let manifest = controller.run(request).await.unwrap();

    assert_eq!(manifest.succeeded_ids().len(), 2);
    assert!(manifest.skipped.is_empty());
    for (id, expected) in [("s1", 16.0), ("s2", 16.5)] {
        let path = fixture.output.join(format!("{}.wide.mp4", id));
        assert!(path.is_file(), "{:?} missing", path);
        let entry = manifest.entry(id).unwrap();
        assert_eq!(entry.outputs, vec![path]);
        assert_eq!(entry.outcome, EntryOutcome::Published);
        assert!((entry.duration - expected).abs() <= 0.5);
    }

    let written = RunManifest::from_file(fixture.output.join("manifest.json")).unwrap();
    assert_eq!(written.entries.len(), 2);
    assert!(written.finished_at.is_some());
    assert!(fixture.leftover_work_files().is_empty());
}

/// A repeated selection id is skipped at preparation; the first one runs
#[tokio::test]
async fn test_run_withDuplicateSelectionIds_shouldSkipLaterDuplicate() {
    let fixture = Fixture::new(600.0);
    let controller = fixture.controller(fixture.config());
    let request = fixture.request(
        vec![
            common::selection("s1", (100.0, 110.0), (102.0, 104.0)),
            common::selection("s1", (200.0, 212.0), (205.0, 206.5)),
        ],
        LayoutKind::Wide,
    );

    let manifest = controller.run(request).await.unwrap();

    assert_eq!(manifest.succeeded_ids(), vec!["s1"]);
    assert_eq!(manifest.skipped.len(), 1);
    assert_eq!(manifest.skipped[0].id, "s1");
    assert_eq!(manifest.skipped[0].stage, Stage::Prepare);
    assert!(manifest.skipped[0].reason.contains("duplicate"));
    let entry = manifest.entry("s1").unwrap();
    assert!((entry.duration - 16.0).abs() <= 0.5);
    assert_eq!(fixture.tool.count_calls(|args| args.iter().any(|a| a == "200.000")), 0);
}

/// Short layouts stack AV above the slide at the vertical resolution
#[tokio::test]
async fn test_short_run_withOneSelection_shouldStackVertically() {
    let fixture = Fixture::new(600.0);
    let controller = fixture.controller(fixture.config());
    let request = fixture.request(
        vec![common::selection("s1", (100.0, 110.0), (102.0, 104.0))],
        LayoutKind::Short,
    );

    let manifest = controller.run(request).await.unwrap();

    assert_eq!(manifest.succeeded_ids(), vec!["s1"]);
    assert!(fixture.output.join("s1.short.mp4").is_file());
    let calls = fixture.tool.calls();
    let stack = calls.iter().find(|args| output_named(args, "stacked")).unwrap();
    assert!(has_pair(stack, "-s", "1080x1920"));
}

/// Selections over the same context window extract it once
#[tokio::test]
async fn test_run_withSharedContext_shouldExtractContextOnce() {
    let fixture = Fixture::new(600.0);
    let controller = fixture.controller(fixture.config());
    let request = fixture.request(
        vec![
            common::selection("s1", (100.0, 110.0), (102.0, 104.0)),
            common::selection("s2", (100.0, 110.0), (105.0, 107.0)),
        ],
        LayoutKind::Wide,
    );

    let manifest = controller.run(request).await.unwrap();

    assert_eq!(manifest.succeeded_ids().len(), 2);
    let context_extractions =
        fixture.tool.count_calls(|args| is_copy_extraction(args) && has_pair(args, "-ss", "100.000"));
    assert_eq!(context_extractions, 1);
    assert!(fixture.leftover_work_files().is_empty());
}

/// Shared-context slide mode renders one slide for the whole group
#[tokio::test]
async fn test_run_withSharedSlideMode_shouldRenderOneSlidePerContext() {
    let fixture = Fixture::new(600.0);
    let mut config = fixture.config();
    config.slide.mode = SlideMode::SharedContext;
    let controller = fixture.controller(config);
    let request = fixture.request(
        vec![
            common::selection("s1", (100.0, 110.0), (102.0, 104.0)),
            common::selection("s2", (100.0, 110.0), (105.0, 107.0)),
            common::selection("s3", (300.0, 310.0), (301.0, 302.0)),
        ],
        LayoutKind::Wide,
    );

    let manifest = controller.run(request).await.unwrap();

    assert_eq!(manifest.succeeded_ids().len(), 3);
    assert_eq!(fixture.tool.count_calls(is_slide_render), 2);
}

/// One failing selection is skipped with its stage; the others publish
#[tokio::test]
async fn test_run_withFailingSelections_shouldIsolateAndClean() {
    let tool = MockTool::new();
    tool.fail_when(|args| {
        args.last()
            .is_some_and(|out| out.contains("/s3-") && out.ends_with("-gain.mp4"))
    });
    let fixture = Fixture::with_tool(tool, 300.0);
    let controller = fixture.controller(fixture.config());
    let request = fixture.request(
        vec![
            common::selection("s1", (10.0, 20.0), (12.0, 14.0)),
            common::selection("s2", (400.0, 410.0), (402.0, 404.0)),
            common::selection("s3", (30.0, 40.0), (32.0, 34.0)),
            common::selection("s4", (50.0, 60.0), (45.0, 47.0)),
        ],
        LayoutKind::Wide,
    );

    let manifest = controller.run(request).await.unwrap();

    assert_eq!(manifest.succeeded_ids(), vec!["s1"]);
    let stage_of = |id: &str| manifest.skipped.iter().find(|s| s.id == id).map(|s| s.stage);
    assert_eq!(stage_of("s2"), Some(Stage::Extract));
    assert_eq!(stage_of("s3"), Some(Stage::Gain));
    assert_eq!(stage_of("s4"), Some(Stage::Prepare));
    assert!(fixture.output.join("s1.wide.mp4").is_file());
    assert!(!fixture.output.join("s3.wide.mp4").exists());
    assert!(fixture.leftover_work_files().is_empty());
}

/// Batched runs join short clips, drop over-long ones and keep short ones
#[tokio::test]
async fn test_batched_run_withCapExceeded_shouldDropAndPreserve() {
    let fixture = Fixture::new(600.0);
    let mut config = fixture.config();
    config.short_form.max_batch_duration_secs = 18.0;
    config.short_form.hard_cap_secs = 20.0;
    let controller = fixture.controller(config);
    let request = fixture.request(
        vec![
            common::selection("s1", (10.0, 20.0), (12.0, 14.0)),
            common::selection("s2", (30.0, 40.0), (32.0, 34.0)),
            common::selection("s3", (50.0, 70.0), (52.0, 54.0)),
        ],
        LayoutKind::BatchedShort,
    );

    let manifest = controller.run(request).await.unwrap();

    assert_eq!(manifest.batches.len(), 2);
    assert_eq!(manifest.batches[0].members, vec!["s1"]);
    assert_eq!(manifest.batches[1].members, vec!["s2"]);
    assert!(fixture.output.join("batch-01.mp4").is_file());
    assert!(fixture.output.join("batch-02.mp4").is_file());

    let s1 = manifest.entry("s1").unwrap();
    assert_eq!(s1.outcome, EntryOutcome::BatchedAndPreserved);
    assert_eq!(s1.batch, Some(1));
    assert!(fixture.output.join("s1.short.mp4").is_file());

    assert_eq!(manifest.skipped.len(), 1);
    assert_eq!(manifest.skipped[0].id, "s3");
    assert_eq!(manifest.skipped[0].stage, Stage::Batch);
    assert!(fixture.leftover_work_files().is_empty());
}

/// Several short clips fit in one batch
#[tokio::test]
async fn test_batched_run_withRoomToSpare_shouldProduceSingleBatch() {
    let fixture = Fixture::new(600.0);
    let controller = fixture.controller(fixture.config());
    let request = fixture.request(
        (0..3)
            .map(|i| {
                let start = 10.0 + 20.0 * i as f64;
                common::selection(&format!("s{}", i + 1), (start, start + 10.0), (start + 2.0, start + 4.0))
            })
            .collect(),
        LayoutKind::BatchedShort,
    );

    let manifest = controller.run(request).await.unwrap();

    assert_eq!(manifest.batches.len(), 1);
    assert_eq!(manifest.batches[0].members, vec!["s1", "s2", "s3"]);
    assert!((manifest.batches[0].duration - 48.0).abs() <= 0.5);
    assert_eq!(manifest.entries.len(), 3);
}

/// Existing outputs are only replaced with `force`
#[tokio::test]
async fn test_run_withExistingOutput_shouldRequireForce() {
    let fixture = Fixture::new(600.0);
    let controller = fixture.controller(fixture.config());
    let selections = vec![common::selection("s1", (100.0, 110.0), (102.0, 104.0))];

    let first = controller
        .run(fixture.request(selections.clone(), LayoutKind::Wide))
        .await
        .unwrap();
    assert_eq!(first.succeeded_ids(), vec!["s1"]);

    let second = controller
        .run(fixture.request(selections.clone(), LayoutKind::Wide))
        .await
        .unwrap();
    assert!(second.entries.is_empty());
    assert_eq!(second.skipped[0].stage, Stage::Publish);

    let mut forced = fixture.request(selections, LayoutKind::Wide);
    forced.force = true;
    let third = controller.run(forced).await.unwrap();
    assert_eq!(third.succeeded_ids(), vec!["s1"]);
    assert!(fixture.leftover_work_files().is_empty());
}

/// Narrated slides in sequential layouts last as long as their narration
#[tokio::test]
async fn test_sequential_run_withNarration_shouldFollowNarrationLength() {
    let fixture = Fixture::new(600.0);
    let narration_dir = fixture.dir.path().join("narration");
    fixture.tool.add_media(&narration_dir.join("s1.mp3"), audio_info(3.0));

    let mut config = fixture.config();
    config.wide_form.arrangement = WideArrangement::Sequential;
    let controller = fixture.controller_with(config, Arc::new(DirectoryNarration::new(&narration_dir)));
    let request = fixture.request(
        vec![
            common::selection("s1", (100.0, 110.0), (102.0, 104.0)),
            common::selection("s2", (200.0, 210.0), (202.0, 204.0)),
        ],
        LayoutKind::Wide,
    );

    let manifest = controller.run(request).await.unwrap();

    // AV 16s + bridge 1s + slide (narration 3s, or the 5s fallback)
    assert!((manifest.entry("s1").unwrap().duration - 20.0).abs() <= 0.5);
    assert!((manifest.entry("s2").unwrap().duration - 22.0).abs() <= 0.5);
    let narration = narration_dir.join("s1.mp3").to_string_lossy().to_string();
    assert_eq!(
        fixture
            .tool
            .count_calls(|args| is_slide_render(args) && args.contains(&narration)),
        1
    );
}

/// The worker pool bounds concurrent tool calls
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_run_withSlowTool_shouldRespectWorkerCap() {
    let fixture = Fixture::with_tool(MockTool::new().with_latency(Duration::from_millis(10)), 600.0);
    let controller = fixture.controller(fixture.config());
    let request = fixture.request(
        (0..6)
            .map(|i| {
                let start = 10.0 + 30.0 * i as f64;
                common::selection(&format!("s{}", i), (start, start + 10.0), (start + 2.0, start + 4.0))
            })
            .collect(),
        LayoutKind::Wide,
    );

    let manifest = controller.run(request).await.unwrap();

    assert_eq!(manifest.entries.len(), 6);
    assert!(fixture.tool.max_in_flight() <= 2);
}

/// A missing source aborts the run before any work
#[tokio::test]
async fn test_run_withMissingSource_shouldFail() {
    let fixture = Fixture::new(600.0);
    let controller = fixture.controller(fixture.config());
    let mut request = fixture.request(vec![common::selection("s1", (1.0, 5.0), (2.0, 3.0))], LayoutKind::Wide);
    request.source = fixture.dir.path().join("absent.mkv");

    assert!(controller.run(request).await.is_err());
    assert!(fixture.tool.calls().is_empty());
}
