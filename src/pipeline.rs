/*!
 * One selection's pipeline, stage by stage.
 *
 * Stages are strictly sequential: extract context, synchronize overlays,
 * extract and repeat the expression, concatenate into the AV track,
 * compose the slide, lay out, apply gain, publish. Each stage's artifact
 * is validated before the next starts. All intermediate files live in the
 * selection's `ArtifactScope` and are deleted when it drops, on success
 * and on every error path.
 */

use log::{debug, error, info, warn};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::app_config::{Config, ExtractionStrategy};
use crate::assembly::{
    ArtifactScope, ClipExtractor, Concatenator, LayoutCompositor, LayoutJob, OverlayScript, ResourceJanitor,
    SegmentRepeater, SharedClips, SlideAudio, SlideComposer, SlidePayload, Synchronizer, plan_batches, slide_groups,
};
use crate::errors::{MediaError, SelectionError, Stage, StageContext};
use crate::file_utils::FileManager;
use crate::manifest::{BatchEntry, EntryOutcome, ManifestEntry, RunManifest};
use crate::media::{ClipArtifact, MediaContext, MediaHandle, MediaLibrary};
use crate::models::{LayoutKind, Resolution, Selection};
use crate::providers::NarrationProvider;

/// Everything one run needs besides the configuration
#[derive(Debug, Clone)]
pub struct RunRequest {
    /// Default source media; selections may name their own
    pub source: PathBuf,
    pub selections: Vec<Selection>,
    pub layout: LayoutKind,
    pub output_dir: PathBuf,
    /// Overrides the configured extraction strategy
    pub strategy: Option<ExtractionStrategy>,
    /// Overwrite existing outputs
    pub force: bool,
}

/// Final clip of one selection
#[derive(Debug, Clone)]
pub struct SelectionOutput {
    pub id: String,
    pub artifact: ClipArtifact,
    /// Where the clip was published; `None` while it waits for batching
    pub published: Option<PathBuf>,
}

impl SelectionOutput {
    /// Manifest entry for a selection published on its own
    pub fn manifest_entry(&self, layout: LayoutKind) -> ManifestEntry {
        ManifestEntry {
            id: self.id.clone(),
            outputs: self.published.iter().cloned().collect(),
            duration: self.artifact.duration,
            layout,
            outcome: EntryOutcome::Published,
            batch: None,
        }
    }
}

type ContextKey = (PathBuf, (u64, u64));

/// Stage components plus the run-wide shared state
pub struct Assembler {
    config: Config,
    ctx: MediaContext,
    library: MediaLibrary,
    janitor: ResourceJanitor,
    narration: Arc<dyn NarrationProvider>,
    extractor: ClipExtractor,
    sync: Synchronizer,
    repeater: SegmentRepeater,
    concat: Concatenator,
    slides: SlideComposer,
    layout: LayoutCompositor,
    shared: SharedClips,
    staging: ArtifactScope,
    source: PathBuf,
    layout_kind: LayoutKind,
    strategy: ExtractionStrategy,
    output_dir: PathBuf,
    overwrite: bool,
    context_users: HashMap<ContextKey, usize>,
    groups: HashMap<String, Arc<Vec<Selection>>>,
}

impl Assembler {
    pub fn new(
        config: Config,
        ctx: MediaContext,
        janitor: ResourceJanitor,
        narration: Arc<dyn NarrationProvider>,
        request: &RunRequest,
    ) -> Result<Self, MediaError> {
        let shared = SharedClips::new(janitor.scope("shared")?);
        let staging = janitor.scope("staging")?;

        let mut context_users: HashMap<ContextKey, usize> = HashMap::new();
        for selection in &request.selections {
            let key = (
                source_of(selection, &request.source).to_path_buf(),
                selection.context_range.millis(),
            );
            *context_users.entry(key).or_default() += 1;
        }

        let mut groups = HashMap::new();
        for group in slide_groups(&request.selections, &request.source, config.slide.mode) {
            let members: Arc<Vec<Selection>> =
                Arc::new(group.iter().map(|&i| request.selections[i].clone()).collect());
            for member in members.iter() {
                groups.insert(member.id.clone(), members.clone());
            }
        }

        Ok(Self {
            extractor: ClipExtractor::new(config.extraction.clone(), config.quality.clone()),
            sync: Synchronizer::new(config.overlay.clone(), config.quality.clone()),
            repeater: SegmentRepeater::new(config.quality.clone()),
            concat: Concatenator::new(config.concat.preference, config.quality.clone()),
            slides: SlideComposer::new(config.slide.clone(), config.quality.clone()),
            layout: LayoutCompositor::new(&config),
            strategy: request.strategy.unwrap_or(config.extraction.strategy),
            config,
            ctx,
            library: MediaLibrary::new(),
            janitor,
            narration,
            shared,
            staging,
            source: request.source.clone(),
            layout_kind: request.layout,
            output_dir: request.output_dir.clone(),
            overwrite: request.force,
            context_users,
            groups,
        })
    }

    pub fn layout_kind(&self) -> LayoutKind {
        self.layout_kind
    }

    /// Run every stage for one selection
    pub async fn process(&self, selection: &Selection) -> Result<SelectionOutput, SelectionError> {
        let id = selection.id.as_str();
        let scope = self.janitor.scope(id).map_err(MediaError::from).at_stage(id, Stage::Prepare)?;
        debug!("Selection '{}': context {}, expression {}", id, selection.context_range, selection.expression_range);

        let source = source_of(selection, &self.source);
        let media = self
            .library
            .open(source, self.ctx.tool.as_ref(), &self.ctx.probes)
            .await
            .at_stage(id, Stage::Prepare)?;

        let context = self.context_clip(&scope, &media, selection).await.at_stage(id, Stage::Extract)?;
        let context = self
            .synchronize(&scope, context, |duration| OverlayScript::for_context(selection, duration))
            .await
            .at_stage(id, Stage::Synchronize)?;

        let expression = self
            .extractor
            .extract(
                &self.ctx,
                &scope,
                &media,
                &selection.expression_range,
                self.strategy,
                self.sync.seek_mode(),
            )
            .await
            .into_result()
            .at_stage(id, Stage::Extract)?;
        let expression = self
            .synchronize(&scope, expression, |duration| OverlayScript::for_expression(selection, duration))
            .await
            .at_stage(id, Stage::Synchronize)?;

        let repeated = self
            .repeater
            .repeat(&self.ctx, &scope, &expression, self.config.repeat_count)
            .await
            .at_stage(id, Stage::Repeat)?
            .into_artifact();

        let av = self
            .concat
            .concat(&self.ctx, &scope, &[context, repeated], None)
            .await
            .at_stage(id, Stage::Concatenate)?
            .into_artifact();

        let slide = self.slide_for(&scope, selection, &av).await.at_stage(id, Stage::Slide)?;

        let job = LayoutJob {
            av,
            slide,
            kind: self.layout_kind,
            resolution: self.layout.target_resolution(self.layout_kind),
        };
        let bridge = if self.layout.arrangement(self.layout_kind).is_parallel() {
            None
        } else {
            Some(self.bridge(job.resolution).await.at_stage(id, Stage::Layout)?)
        };
        let composed = self
            .layout
            .compose(&self.ctx, &scope, &job, bridge.as_ref(), &self.concat)
            .await
            .at_stage(id, Stage::Layout)?;

        let finished = self
            .layout
            .apply_gain(&self.ctx, &scope, &composed)
            .await
            .at_stage(id, Stage::Gain)?;

        self.finish(&scope, selection, finished).at_stage(id, Stage::Publish)
    }

    /// Raw context clip; shared when several selections use the same window
    async fn context_clip(
        &self,
        scope: &ArtifactScope,
        media: &MediaHandle,
        selection: &Selection,
    ) -> Result<ClipArtifact, MediaError> {
        let range = selection.context_range;
        let seek = self.sync.seek_mode();
        let users = self
            .context_users
            .get(&(media.path.clone(), range.millis()))
            .copied()
            .unwrap_or(1);

        if users < 2 {
            return self
                .extractor
                .extract(&self.ctx, scope, media, &range, self.strategy, seek)
                .await
                .into_result();
        }

        let (start, end) = range.millis();
        let key = SharedClips::key(&[
            "context",
            &media.path.to_string_lossy(),
            &start.to_string(),
            &end.to_string(),
            &self.strategy.to_string(),
            &format!("{:?}", seek),
        ]);
        self.shared
            .get_or_create(&key, || async {
                info!("Extracting shared context {} for {} selections", range, users);
                self.extractor
                    .extract(&self.ctx, self.shared.scope(), media, &range, self.strategy, seek)
                    .await
                    .into_result()
            })
            .await
    }

    /// Burn the overlay when enabled; rebase timestamps to 0 either way
    async fn synchronize<F>(&self, scope: &ArtifactScope, clip: ClipArtifact, script: F) -> Result<ClipArtifact, MediaError>
    where
        F: FnOnce(f64) -> Result<OverlayScript, MediaError>,
    {
        if !self.sync.burns_overlays() {
            return self.sync.ensure_rebased(&self.ctx, scope, clip).await;
        }
        let script = script(clip.duration)?;
        let burned = self.sync.burn(&self.ctx, scope, &clip, &script).await?;
        self.sync.ensure_rebased(&self.ctx, scope, burned).await
    }

    async fn slide_for(
        &self,
        scope: &ArtifactScope,
        selection: &Selection,
        av: &ClipArtifact,
    ) -> Result<ClipArtifact, MediaError> {
        let resolution = self.layout.slide_resolution(self.layout_kind);
        let background = self.slides.background();

        if let Some(group) = self.groups.get(&selection.id).filter(|g| g.len() > 1) {
            let members: Vec<&Selection> = group.iter().collect();
            let ids: Vec<&str> = members.iter().map(|s| s.id.as_str()).collect();
            let key = SharedClips::key(&["slide", &ids.join(","), &resolution.as_size()]);
            return self
                .shared
                .get_or_create(&key, || async {
                    let narration = self.narration.shared_narration(&members).await?;
                    let audio = self.slides.audio_for(narration);
                    let narration_secs = self.narration_duration(&audio).await?;
                    let target = self.slides.target_duration(None, narration_secs);
                    self.slides
                        .compose(
                            &self.ctx,
                            self.shared.scope(),
                            &SlidePayload::for_group(&members),
                            &background,
                            &audio,
                            target,
                            resolution,
                        )
                        .await
                })
                .await;
        }

        let narration = self.narration.narration(selection).await?;
        let audio = self.slides.audio_for(narration);
        let narration_secs = self.narration_duration(&audio).await?;
        let parallel = self.layout.arrangement(self.layout_kind).is_parallel();
        let target = self
            .slides
            .target_duration(parallel.then_some(av.duration), narration_secs);
        self.slides
            .compose(
                &self.ctx,
                scope,
                &SlidePayload::for_selection(selection),
                &background,
                &audio,
                target,
                resolution,
            )
            .await
    }

    /// Length a padded narration imposes on its slide; looped narration
    /// adapts to the slide instead
    async fn narration_duration(&self, audio: &SlideAudio) -> Result<Option<f64>, MediaError> {
        match audio {
            SlideAudio::Padded(path) => {
                let info = self.ctx.probe(path).await.map_err(|e| MediaError::Composition {
                    expected: 0.0,
                    actual: 0.0,
                    message: format!("narration {:?} is unreadable: {}", path, e),
                })?;
                Ok(Some(info.duration))
            }
            SlideAudio::Looped(_) | SlideAudio::Silence => Ok(None),
        }
    }

    /// Transition bridge, rendered once per run and resolution
    async fn bridge(&self, resolution: Resolution) -> Result<ClipArtifact, MediaError> {
        let key = SharedClips::key(&["bridge", &resolution.as_size()]);
        self.shared
            .get_or_create(&key, || {
                self.slides
                    .bridge(&self.ctx, self.shared.scope(), &self.config.transition, resolution)
            })
            .await
    }

    /// Publish, or hand the clip to the staging scope when it still has to
    /// be batched
    fn finish(
        &self,
        scope: &ArtifactScope,
        selection: &Selection,
        clip: ClipArtifact,
    ) -> Result<SelectionOutput, MediaError> {
        if self.layout_kind == LayoutKind::BatchedShort {
            scope.hand_over(&clip.path, &self.staging);
            return Ok(SelectionOutput {
                id: selection.id.clone(),
                artifact: clip,
                published: None,
            });
        }

        let destination = FileManager::selection_output_path(&self.output_dir, &selection.id, self.layout_kind);
        let published = FileManager::publish(&clip.path, &destination, self.overwrite)?;
        info!("Published '{}' -> {:?} ({:.1}s)", selection.id, published, clip.duration);
        Ok(SelectionOutput {
            id: selection.id.clone(),
            artifact: clip,
            published: Some(published),
        })
    }

    /// Join staged short-form clips into batches and record everything in
    /// the manifest. Clips within the preserve threshold are also published
    /// on their own; the rest of the staging area is released afterwards.
    pub async fn assemble_batches(&self, outputs: Vec<SelectionOutput>, manifest: &mut RunManifest) {
        let short_form = &self.config.short_form;
        let durations: Vec<f64> = outputs.iter().map(|o| o.artifact.duration).collect();
        let plan = plan_batches(&durations, short_form.max_batch_duration_secs, short_form.hard_cap_secs);

        for &index in &plan.dropped {
            manifest.record_skip(
                &outputs[index].id,
                Stage::Batch,
                format!(
                    "duration {:.1}s exceeds the {:.0}s batch cap",
                    outputs[index].artifact.duration, short_form.hard_cap_secs
                ),
            );
        }

        for (i, members) in plan.batches.iter().enumerate() {
            let number = i + 1;
            let clips: Vec<ClipArtifact> = members.iter().map(|&m| outputs[m].artifact.clone()).collect();
            let ids: Vec<String> = members.iter().map(|&m| outputs[m].id.clone()).collect();

            match self.build_batch(number, &clips).await {
                Ok((path, duration)) => {
                    info!("Batch {} published: {:?} ({:.1}s, {} clip(s))", number, path, duration, ids.len());
                    manifest.record_batch(BatchEntry {
                        path: path.clone(),
                        members: ids.clone(),
                        duration,
                    });
                    for &m in members {
                        let entry = self.batched_entry(&outputs[m], number, &path);
                        manifest.record_success(entry);
                    }
                }
                Err(e) => {
                    error!("Batch {} ({}) failed: {}", number, ids.join(", "), e);
                    for id in &ids {
                        manifest.record_skip(id, Stage::Batch, e.to_string());
                    }
                }
            }
        }

        self.staging.release();
    }

    async fn build_batch(&self, number: usize, clips: &[ClipArtifact]) -> Result<(PathBuf, f64), MediaError> {
        let scope = self.janitor.scope(&format!("batch-{:02}", number))?;
        let mut joined = self.layout.compose_batch(&self.ctx, &scope, clips, &self.concat).await?;
        if clips.iter().any(|c| c.path == joined.path) {
            // single-clip batch: the staged clip itself may still be preserved
            let copy = scope.allocate("batch", "mp4");
            std::fs::copy(&joined.path, &copy)?;
            joined.path = copy;
        }
        let destination = FileManager::batch_output_path(&self.output_dir, number);
        let path = FileManager::publish(&joined.path, &destination, self.overwrite)?;
        Ok((path, joined.duration))
    }

    fn batched_entry(&self, output: &SelectionOutput, number: usize, batch_path: &Path) -> ManifestEntry {
        let mut outputs = vec![batch_path.to_path_buf()];
        let mut outcome = EntryOutcome::Batched;

        if output.artifact.duration <= self.config.short_form.preserve_max_duration_secs {
            self.staging.preserve(&output.artifact.path);
            let destination = FileManager::selection_output_path(&self.output_dir, &output.id, LayoutKind::Short);
            match FileManager::publish(&output.artifact.path, &destination, self.overwrite) {
                Ok(path) => {
                    outputs.push(path);
                    outcome = EntryOutcome::BatchedAndPreserved;
                }
                Err(e) => warn!("Could not keep '{}' as its own clip: {}", output.id, e),
            }
        }

        ManifestEntry {
            id: output.id.clone(),
            outputs,
            duration: output.artifact.duration,
            layout: LayoutKind::BatchedShort,
            outcome,
            batch: Some(number),
        }
    }
}

fn source_of<'a>(selection: &'a Selection, default: &'a Path) -> &'a Path {
    selection.source.as_deref().unwrap_or(default)
}
