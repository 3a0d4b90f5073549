/*!
 * Tests for the bounded selection scheduler
 */

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use lingoclip::app_config::ConcurrencyConfig;
use lingoclip::errors::{MediaError, SelectionError, Stage};
use lingoclip::models::Selection;
use lingoclip::scheduler::BatchScheduler;

use crate::common;

fn selections(count: usize) -> Vec<Selection> {
    (0..count)
        .map(|i| common::selection(&format!("s{}", i), (0.0, 10.0), (2.0, 4.0)))
        .collect()
}

/// A failing selection is reported while its siblings complete
#[tokio::test]
async fn test_run_withOneFailure_shouldIsolateIt() {
    let scheduler = BatchScheduler::new(2);
    let results = scheduler
        .run(
            selections(4),
            |s: Selection| async move {
                if s.id == "s2" {
                    Err(SelectionError::new(
                        s.id,
                        Stage::Extract,
                        MediaError::Config("bad range".to_string()),
                    ))
                } else {
                    Ok(s.id)
                }
            },
            |_, _| {},
        )
        .await;

    assert_eq!(results.len(), 4);
    assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 3);
    let failure = results[2].as_ref().unwrap_err();
    assert_eq!(failure.selection_id, "s2");
    assert_eq!(failure.stage, Stage::Extract);
}

/// A panicking pipeline becomes a worker-stage failure for that selection only
#[tokio::test]
async fn test_run_withPanickingPipeline_shouldReportWorkerStage() {
    let scheduler = BatchScheduler::new(2);
    let results = scheduler
        .run(
            selections(3),
            |s: Selection| async move {
                if s.id == "s1" {
                    panic!("pipeline blew up");
                }
                Ok::<_, SelectionError>(s.id)
            },
            |_, _| {},
        )
        .await;

    assert_eq!(results[0].as_ref().unwrap(), "s0");
    assert_eq!(results[2].as_ref().unwrap(), "s2");
    let failure = results[1].as_ref().unwrap_err();
    assert_eq!(failure.selection_id, "s1");
    assert_eq!(failure.stage, Stage::Worker);
}

/// Never more than `workers` pipelines run at once
#[tokio::test]
async fn test_run_withSlowPipelines_shouldRespectWorkerBound() {
    let in_flight = Arc::new(AtomicUsize::new(0));
    let peak = Arc::new(AtomicUsize::new(0));
    let scheduler = BatchScheduler::new(3);

    let (counter, high) = (in_flight.clone(), peak.clone());
    let results = scheduler
        .run(
            selections(10),
            move |s: Selection| {
                let counter = counter.clone();
                let high = high.clone();
                async move {
                    let now = counter.fetch_add(1, Ordering::SeqCst) + 1;
                    high.fetch_max(now, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(20)).await;
                    counter.fetch_sub(1, Ordering::SeqCst);
                    Ok::<_, SelectionError>(s.id)
                }
            },
            |_, _| {},
        )
        .await;

    assert_eq!(results.len(), 10);
    assert!(peak.load(Ordering::SeqCst) <= 3);
    assert!(peak.load(Ordering::SeqCst) >= 2);
}

/// The completion callback sees every selection exactly once
#[tokio::test]
async fn test_run_withCallback_shouldReportEveryIndex() {
    let scheduler = BatchScheduler::new(4);
    let mut seen = Vec::new();
    scheduler
        .run(
            selections(5),
            |s: Selection| async move { Ok::<_, SelectionError>(s.id) },
            |index, result| {
                assert!(result.is_ok());
                seen.push(index);
            },
        )
        .await;

    seen.sort_unstable();
    assert_eq!(seen, vec![0, 1, 2, 3, 4]);
}

/// Pool size follows the CPU fraction and the optional cap
#[test]
fn test_worker_count_withFractionAndCap_shouldClamp() {
    let mut config = ConcurrencyConfig::default();
    config.cpu_fraction = 0.5;
    config.max_workers = None;
    assert_eq!(config.worker_count(8), 4);
    assert_eq!(config.worker_count(1), 1);

    config.max_workers = Some(2);
    assert_eq!(config.worker_count(8), 2);

    assert!(BatchScheduler::from_config(&config).workers() <= 2);
}

/// Counts how many pipelines were torn down before finishing
struct DropCounter(Arc<AtomicUsize>);

impl Drop for DropCounter {
    fn drop(&mut self) {
        self.0.fetch_add(1, Ordering::SeqCst);
    }
}

/// Abandoning a run aborts the pipelines still in flight
#[tokio::test]
async fn test_run_withDroppedRun_shouldAbortInFlightPipelines() {
    let scheduler = BatchScheduler::new(2);
    let started = Arc::new(AtomicUsize::new(0));
    let torn_down = Arc::new(AtomicUsize::new(0));
    let finished = Arc::new(AtomicUsize::new(0));

    let (s, t, f) = (started.clone(), torn_down.clone(), finished.clone());
    let run = scheduler.run(
        selections(4),
        move |sel: Selection| {
            let (started, torn_down, finished) = (s.clone(), t.clone(), f.clone());
            async move {
                started.fetch_add(1, Ordering::SeqCst);
                let _guard = DropCounter(torn_down);
                tokio::time::sleep(Duration::from_secs(30)).await;
                finished.fetch_add(1, Ordering::SeqCst);
                Ok::<_, SelectionError>(sel.id)
            }
        },
        |_, _| {},
    );

    assert!(tokio::time::timeout(Duration::from_millis(100), run).await.is_err());
    for _ in 0..50 {
        if torn_down.load(Ordering::SeqCst) == started.load(Ordering::SeqCst) {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    assert_eq!(started.load(Ordering::SeqCst), 2);
    assert_eq!(torn_down.load(Ordering::SeqCst), 2);
    assert_eq!(finished.load(Ordering::SeqCst), 0);
}
