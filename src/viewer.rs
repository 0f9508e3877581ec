//! Engine wiring
//!
//! [`Viewer`] owns every component and runs the per-frame data flow on the
//! UI thread:
//!
//! 1. Drain content-change notifications and invalidate the cache
//! 2. Drain finished background fetches
//! 3. Bump the viewport generation if the viewport moved; once it settles,
//!    forget failed blocks so they are retried
//! 4. Compose the main view and the overview from cached data only
//! 5. Queue the blocks the composition was missing
//!
//! The embedding toolkit feeds input through [`Viewer::handle_input`],
//! paints the [`Frame`] returned by [`Viewer::frame`], and calls
//! [`Viewer::poll`] while fetches are pending to learn when to redraw.

use crate::annotations::{AnnotationReader, AnnotationStore};
use crate::config::ViewerConfig;
use crate::error::{Result, ResultExt, ViewerError};
use crate::interaction::{InputEvent, InteractionController};
use crate::lod::{FetchBatch, FetchPool, LodCache};
use crate::render::{Composer, DrawList, Overview, PixelMapping, Scene, Style};
use crate::source::{ContentChange, EventSource, SampleSource};
use crate::viewport::{ChannelTable, Viewport};
use crossbeam_channel::{unbounded, Receiver};
use std::sync::Arc;

/// Initial main view size until the toolkit reports one
const DEFAULT_VIEW_WIDTH: f64 = 1280.0;
const DEFAULT_VIEW_HEIGHT: f64 = 720.0;

/// Everything needed to paint one frame
#[derive(Debug, Clone)]
pub struct Frame {
    pub main: DrawList,
    pub overview: DrawList,
    /// Mapping the main list was drawn with, for the toolkit's own hit-tests
    pub mapping: PixelMapping,
    /// Blocks the main view is still missing at full fidelity
    pub missing: usize,
    /// Jobs queued by this frame
    pub submitted: usize,
    /// Blocks being built in the background
    pub pending: usize,
}

/// The viewport rendering and annotation engine
pub struct Viewer {
    config: ViewerConfig,
    source: Arc<dyn SampleSource>,
    events: Arc<dyn EventSource>,
    cache: Arc<LodCache>,
    pool: FetchPool,
    viewport: Viewport,
    store: AnnotationStore,
    controller: InteractionController,
    composer: Composer,
    overview: Overview,
    changes: Receiver<ContentChange>,
    /// Bumped whenever the viewport differs from the last composed one
    generation: u64,
    last_viewport: Option<Viewport>,
    settled: bool,
    needs_redraw: bool,
}

impl Viewer {
    /// Build the engine around a sample source and an event source
    pub fn new(source: Arc<dyn SampleSource>, events: Arc<dyn EventSource>, config: ViewerConfig) -> Result<Self> {
        config.validate()?;
        let sample_rate = source.sample_rate();
        if !(sample_rate.is_finite() && sample_rate > 0.0) {
            return Err(ViewerError::InvalidRange(format!(
                "sample rate must be positive, got {}",
                sample_rate
            )));
        }
        if source.channel_count() == 0 {
            return Err(ViewerError::InvalidRange("source has no channels".to_string()));
        }

        let channels = ChannelTable::from_source(source.as_ref());
        let plot_width = (DEFAULT_VIEW_WIDTH - config.view.gutter_px).max(1.0);
        let viewport = Viewport::new(
            channels,
            sample_rate,
            source.sample_count(),
            &config.view,
            plot_width,
            DEFAULT_VIEW_HEIGHT,
        );

        let cache = Arc::new(LodCache::new(source.clone(), &config.cache));
        let pool = FetchPool::new(cache.clone(), config.cache.fetch_workers, config.cache.queue_depth);
        let (tx, changes) = unbounded();
        source.on_content_changed(tx);

        tracing::info!(
            "Viewer created: {} channels, {} samples at {} Hz",
            source.channel_count(),
            source.sample_count(),
            sample_rate
        );

        Ok(Self {
            store: AnnotationStore::new(&config.annotations),
            controller: InteractionController::new(config.interaction.clone(), config.view.clone()),
            composer: Composer::new(config.view.clone(), Style::default()),
            overview: Overview::new(DEFAULT_VIEW_WIDTH, 60.0),
            config,
            source,
            events,
            cache,
            pool,
            viewport,
            changes,
            generation: 0,
            last_viewport: None,
            settled: true,
            needs_redraw: true,
        })
    }

    // ==================== Accessors ====================

    pub fn config(&self) -> &ViewerConfig {
        &self.config
    }

    pub fn source(&self) -> &Arc<dyn SampleSource> {
        &self.source
    }

    pub fn cache(&self) -> &Arc<LodCache> {
        &self.cache
    }

    pub fn viewport(&self) -> &Viewport {
        &self.viewport
    }

    pub fn viewport_mut(&mut self) -> &mut Viewport {
        self.needs_redraw = true;
        &mut self.viewport
    }

    pub fn annotations(&self) -> &AnnotationStore {
        &self.store
    }

    pub fn annotations_mut(&mut self) -> &mut AnnotationStore {
        self.needs_redraw = true;
        &mut self.store
    }

    /// Read handle usable from other threads
    pub fn annotation_reader(&self) -> AnnotationReader {
        self.store.reader()
    }

    pub fn controller(&self) -> &InteractionController {
        &self.controller
    }

    pub fn controller_mut(&mut self) -> &mut InteractionController {
        self.needs_redraw = true;
        &mut self.controller
    }

    pub fn style_mut(&mut self) -> &mut Style {
        self.needs_redraw = true;
        self.composer.style_mut()
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    // ==================== Input ====================

    /// Feed one input event; returns whether a redraw is needed
    pub fn handle_input(&mut self, event: InputEvent) -> bool {
        let changed = self
            .controller
            .handle(event, &mut self.viewport, &mut self.store, &self.overview);
        self.needs_redraw |= changed;
        changed
    }

    /// Size of the main view in pixels, label gutter included
    pub fn resize(&mut self, width_px: f64, height_px: f64) {
        let plot_width = width_px - self.config.view.gutter_px;
        self.viewport.resize(plot_width, height_px);
        self.needs_redraw = true;
    }

    pub fn resize_overview(&mut self, width_px: f64, height_px: f64) {
        self.overview.resize(width_px, height_px);
        self.needs_redraw = true;
    }

    // ==================== Frame loop ====================

    /// Collect background results; returns whether a redraw is due
    pub fn poll(&mut self) -> bool {
        let mut invalidated = 0;
        while let Ok(change) = self.changes.try_recv() {
            self.cache.invalidate(&change);
            invalidated += 1;
        }
        if invalidated > 0 {
            tracing::debug!("Applied {} content changes", invalidated);
            self.needs_redraw = true;
        }

        let batch: FetchBatch = self.pool.drain();
        if batch.unavailable > 0 {
            tracing::warn!("{} blocks could not be read and are shown as gaps", batch.unavailable);
        }
        self.needs_redraw |= batch.redraw;
        self.needs_redraw
    }

    /// Blocks being built in the background
    pub fn pending(&self) -> usize {
        self.pool.in_flight()
    }

    /// Compose the current state and schedule missing data
    pub fn frame(&mut self) -> Frame {
        self.poll();

        if self.last_viewport.as_ref() != Some(&self.viewport) {
            self.generation += 1;
            self.last_viewport = Some(self.viewport.clone());
            self.settled = false;
        }
        if !self.settled && self.controller.is_idle() {
            let retried = self.cache.clear_unavailable();
            if retried > 0 {
                tracing::debug!("Viewport settled, retrying {} unavailable blocks", retried);
            }
            self.settled = true;
        }

        let snapshot = self.store.snapshot();
        let scene = Scene {
            cache: &self.cache,
            annotations: &snapshot,
            labels: self.store.labels(),
            events: self.events.as_ref(),
            options: self.controller.display_options(),
        };
        let selection = self.controller.selection();
        let composition = self.composer.compose(&self.viewport, selection, &scene);
        let overview = self
            .overview
            .compose(&self.viewport, selection, &scene, self.composer.style());

        let submitted = self.pool.submit(&composition.missing, self.generation);
        self.needs_redraw = false;

        Frame {
            main: composition.draw_list,
            overview,
            mapping: composition.mapping,
            missing: composition.missing.len(),
            submitted,
            pending: self.pool.in_flight(),
        }
    }

    // ==================== Annotation persistence ====================

    /// Annotations as a JSON array of `(onset, duration, label, channels)` records
    pub fn export_annotations(&self) -> Result<String> {
        self.store.export_json()
    }

    /// Replace the annotations from a JSON array; undoable as one edit
    pub fn import_annotations(&mut self, json: &str) -> Result<()> {
        self.store
            .import_json(json)
            .context("Failed to import annotations")?;
        self.controller.selection_mut().selected_annotation = None;
        self.needs_redraw = true;
        Ok(())
    }
}
