use anyhow::{Context, Result, anyhow};
use indicatif::{ProgressBar, ProgressStyle};
use log::{info, warn};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::app_config::Config;
use crate::assembly::ResourceJanitor;
use crate::errors::Stage;
use crate::file_utils::FileManager;
use crate::manifest::RunManifest;
use crate::media::{FfmpegTool, MediaContext, MediaTool, ProbeCache};
use crate::models::LayoutKind;
use crate::pipeline::{Assembler, RunRequest, SelectionOutput};
use crate::providers::{NarrationProvider, NoNarration};
use crate::scheduler::BatchScheduler;

// @module: Application controller for clip assembly runs

/// Run directories older than this are removed at startup
const STALE_RUN_AGE: Duration = Duration::from_secs(6 * 60 * 60);

/// Main application controller
pub struct Controller {
    // @field: App configuration
    config: Config,
    tool: Arc<dyn MediaTool>,
    probes: ProbeCache,
    narration: Arc<dyn NarrationProvider>,
    janitor: ResourceJanitor,
    show_progress: bool,
}

impl Controller {
    // @method: Create a controller backed by the real ffmpeg tools
    pub fn with_config(config: Config) -> Result<Self> {
        let tool = Arc::new(FfmpegTool::new(&config.tool));
        Self::with_parts(config, tool, Arc::new(NoNarration))
    }

    /// Create a controller with explicit collaborators
    pub fn with_parts(
        config: Config,
        tool: Arc<dyn MediaTool>,
        narration: Arc<dyn NarrationProvider>,
    ) -> Result<Self> {
        config.validate()?;

        let work_root = config.resolved_work_dir();
        FileManager::ensure_dir(&work_root)?;
        let swept = ResourceJanitor::sweep_stale(&work_root, STALE_RUN_AGE);
        if swept > 0 {
            info!("Removed {} stale run director{}", swept, if swept == 1 { "y" } else { "ies" });
        }
        let probes = ProbeCache::new();
        let janitor = ResourceJanitor::new(&work_root)
            .with_context(|| format!("Failed to create a run directory under {:?}", work_root))?
            .with_probes(probes.clone());

        Ok(Self {
            config,
            tool,
            probes,
            narration,
            janitor,
            show_progress: false,
        })
    }

    /// Show an indicatif progress bar during runs
    pub fn with_progress(mut self, show: bool) -> Self {
        self.show_progress = show;
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Handle used by the interrupt handler to clean up
    pub fn janitor(&self) -> ResourceJanitor {
        self.janitor.clone()
    }

    pub fn probes(&self) -> &ProbeCache {
        &self.probes
    }

    /// Run every selection and write `manifest.json` to the output directory
    pub async fn run(&self, request: RunRequest) -> Result<RunManifest> {
        let start_time = Instant::now();

        if !FileManager::file_exists(&request.source) {
            return Err(anyhow!("Source file does not exist: {:?}", request.source));
        }
        FileManager::ensure_dir(&request.output_dir)?;

        let mut manifest = RunManifest::new(&request.source, request.layout);
        let mut selections = Vec::with_capacity(request.selections.len());
        let mut seen_ids = HashSet::new();
        for selection in &request.selections {
            if !seen_ids.insert(selection.id.as_str()) {
                warn!("Skipping selection with duplicate id '{}'", selection.id);
                manifest.record_skip(&selection.id, Stage::Prepare, "duplicate selection id");
                continue;
            }
            match selection.validate() {
                Ok(()) => selections.push(selection.clone()),
                Err(e) => {
                    warn!("Skipping invalid selection '{}': {}", selection.id, e);
                    manifest.record_skip(&selection.id, Stage::Prepare, e.to_string());
                }
            }
        }
        let request = RunRequest {
            selections: selections.clone(),
            ..request
        };

        let ctx = MediaContext::new(self.tool.clone(), self.probes.clone());
        let assembler = Arc::new(Assembler::new(
            self.config.clone(),
            ctx,
            self.janitor.clone(),
            self.narration.clone(),
            &request,
        )?);

        let scheduler = BatchScheduler::from_config(&self.config.concurrency);
        info!(
            "Assembling {} selection(s) as {} with {} worker(s)",
            selections.len(),
            request.layout,
            scheduler.workers()
        );

        let progress_bar = self.progress_bar(selections.len() as u64);
        let batched = request.layout == LayoutKind::BatchedShort;
        let worker_assembler = assembler.clone();
        let results = scheduler
            .run(
                selections,
                move |selection| {
                    let assembler = worker_assembler.clone();
                    async move { assembler.process(&selection).await }
                },
                |_, result: &Result<SelectionOutput, _>| {
                    match result {
                        Ok(output) if !batched => manifest.record_success(output.manifest_entry(request.layout)),
                        Ok(_) => {}
                        Err(e) => manifest.record_failure(e),
                    }
                    progress_bar.inc(1);
                },
            )
            .await;
        progress_bar.finish_and_clear();

        if batched {
            let staged: Vec<SelectionOutput> = results.into_iter().filter_map(|r| r.ok()).collect();
            assembler.assemble_batches(staged, &mut manifest).await;
        }
        drop(assembler);
        self.janitor.release_all();

        manifest.finish();
        let manifest_path = request.output_dir.join("manifest.json");
        manifest.write_to(&manifest_path)?;

        let (hits, misses, _) = self.probes.stats();
        info!(
            "Run complete in {}: {} succeeded, {} skipped (probe cache {} hit(s), {} miss(es))",
            Self::format_duration(start_time.elapsed()),
            manifest.entries.len(),
            manifest.skipped.len(),
            hits,
            misses
        );
        Ok(manifest)
    }

    fn progress_bar(&self, total: u64) -> ProgressBar {
        if !self.show_progress {
            return ProgressBar::hidden();
        }
        let progress_bar = ProgressBar::new(total);
        let style = ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} selections ({percent}%) {eta}")
            .or_else(|_| ProgressStyle::default_bar().template("{spinner} [{elapsed_precise}] [{bar:40}] {pos}/{len}"))
            .unwrap_or_else(|_| ProgressStyle::default_bar());
        progress_bar.set_style(style.progress_chars("█▓▒░"));
        progress_bar
    }

    // Format duration in a human-readable format
    fn format_duration(duration: Duration) -> String {
        let total_seconds = duration.as_secs();
        let hours = total_seconds / 3600;
        let minutes = (total_seconds % 3600) / 60;
        let seconds = total_seconds % 60;

        if hours > 0 {
            format!("{}h {}m {}s", hours, minutes, seconds)
        } else if minutes > 0 {
            format!("{}m {}s", minutes, seconds)
        } else {
            format!("{}s", seconds)
        }
    }
}

impl Drop for Controller {
    fn drop(&mut self) {
        self.janitor.finish();
    }
}
