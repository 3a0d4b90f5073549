/*!
 * Bounded fan-out of selection pipelines.
 *
 * Each selection's pipeline runs as its own tokio task; at most `workers`
 * of them are in flight. A failed or panicking pipeline is logged with its
 * selection id and turned into a `SelectionError`; siblings keep running.
 * Results come back in input order. Dropping the run aborts every task
 * still in flight, which drops (and kills) their external tool calls.
 */

use futures::stream::{self, StreamExt};
use log::{debug, error};
use std::future::Future;
use std::sync::Arc;
use tokio::task::JoinSet;

use crate::app_config::ConcurrencyConfig;
use crate::errors::{MediaError, SelectionError, Stage};
use crate::models::Selection;

pub struct BatchScheduler {
    workers: usize,
}

impl BatchScheduler {
    pub fn new(workers: usize) -> Self {
        Self {
            workers: workers.max(1),
        }
    }

    /// Size the pool from the host's core count
    pub fn from_config(config: &ConcurrencyConfig) -> Self {
        let cores = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);
        let workers = config.worker_count(cores);
        debug!("Scheduler: {} worker(s) for {} core(s)", workers, cores);
        Self::new(workers)
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Run `pipeline` over every selection. `on_complete` is called once per
    /// finished selection, in completion order, with its input index.
    pub async fn run<R, F, Fut, C>(
        &self,
        selections: Vec<Selection>,
        pipeline: F,
        mut on_complete: C,
    ) -> Vec<Result<R, SelectionError>>
    where
        F: Fn(Selection) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<R, SelectionError>> + Send + 'static,
        R: Send + 'static,
        C: FnMut(usize, &Result<R, SelectionError>),
    {
        let total = selections.len();
        let pipeline = Arc::new(pipeline);

        let mut completed = stream::iter(selections.into_iter().enumerate())
            .map(|(index, selection)| {
                let pipeline = pipeline.clone();
                let id = selection.id.clone();
                async move {
                    // the set aborts the task if this future is dropped
                    let mut task = JoinSet::new();
                    task.spawn(async move { pipeline(selection).await });
                    let result = match task.join_next().await {
                        Some(Ok(result)) => result,
                        Some(Err(join_error)) => Err(SelectionError::new(
                            id,
                            Stage::Worker,
                            MediaError::Io(std::io::Error::other(format!(
                                "pipeline task aborted: {}",
                                join_error
                            ))),
                        )),
                        None => Err(SelectionError::new(
                            id,
                            Stage::Worker,
                            MediaError::Io(std::io::Error::other("pipeline task vanished")),
                        )),
                    };
                    (index, result)
                }
            })
            .buffer_unordered(self.workers);

        let mut results: Vec<Option<Result<R, SelectionError>>> = (0..total).map(|_| None).collect();
        while let Some((index, result)) = completed.next().await {
            if let Err(e) = &result {
                log_failure(e);
            }
            on_complete(index, &result);
            results[index] = Some(result);
        }

        results.into_iter().flatten().collect()
    }
}

fn log_failure(e: &SelectionError) {
    match &e.source {
        MediaError::Tool {
            tool,
            exit_code,
            diagnostic,
        } => error!(
            "Selection '{}' failed at {}: {} exited with {:?}\n{}",
            e.selection_id, e.stage, tool, exit_code, diagnostic
        ),
        other => error!("Selection '{}' failed at {}: {}", e.selection_id, e.stage, other),
    }
}
