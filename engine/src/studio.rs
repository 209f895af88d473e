use serde::Serialize;
use image::RgbaImage;
use crate::brush::Brush;
use crate::config::EngineConfig;
use crate::error::{CanvasError, Result};
use crate::geometry::ResizeRules;
use crate::history::{BaseSnapshot, History};
use crate::input::{GestureContext, GestureState, InputAction};
use crate::jobs::{JobReconciler, PlaceholderEvent, ReconcileReport, SubmitResponse, Submission};
use crate::model::CanvasModel;
use crate::objects::{AreaSelection, Layer, LayerImage, Placeholder};
use crate::persistence::{self, ImageStore, KeyValueStore, PersistScheduler, SessionSnapshot};
use crate::types::{Bounds, Tool, ViewMode};
use crate::viewport::{self, Layout, Viewport};

pub const DEFAULT_SESSION_KEY: &str = "canvas-session";
const FIT_PADDING: f64 = 24.0;

#[derive(Serialize, Clone, Copy, Debug, PartialEq, Default)]
pub struct TickOutcome {
    pub saved: bool,
    pub poll_due: bool,
}

/// The whole canvas: model, base raster, view state, gestures, history,
/// generation jobs and the save timer. Time comes in as `now_ms`.
pub struct CanvasCore {
    pub(crate) config: EngineConfig,
    pub(crate) rules: ResizeRules,
    pub(crate) model: CanvasModel,
    pub(crate) base: RgbaImage,
    pub(crate) base_revision: u64,
    pub(crate) history: History<BaseSnapshot>,
    pub(crate) viewport: Viewport,
    pub(crate) view_mode: ViewMode,
    pub(crate) area: Option<AreaSelection>,
    pub(crate) tool: Tool,
    pub(crate) brush: Brush,
    pub(crate) gesture: GestureContext,
    pub(crate) jobs: JobReconciler,
    pub(crate) persist: PersistScheduler,
    pub(crate) view_dirty: bool,
    session_key: String,
}

impl CanvasCore {
    pub fn new(config: EngineConfig) -> Result<Self> {
        let config = config.sanitized();
        let base = RgbaImage::new(config.canvas_width, config.canvas_height);
        let history = History::new(BaseSnapshot::capture(&base)?, config.history_cap);
        Ok(CanvasCore {
            rules: ResizeRules::from_config(&config),
            model: CanvasModel::new(config.min_image_size),
            base,
            base_revision: 0,
            history,
            viewport: Viewport::default(),
            view_mode: ViewMode::default(),
            area: None,
            tool: Tool::default(),
            brush: Brush::default(),
            gesture: GestureContext::default(),
            jobs: JobReconciler::new(config.poll_interval_ms, config.placement_gap),
            persist: PersistScheduler::new(config.persist_debounce_ms),
            view_dirty: false,
            session_key: DEFAULT_SESSION_KEY.to_string(),
            config,
        })
    }

    pub fn with_session_key(mut self, key: &str) -> Self {
        self.session_key = key.to_string();
        self
    }

    // --- Queries ---

    pub fn config(&self) -> &EngineConfig { &self.config }
    pub fn model(&self) -> &CanvasModel { &self.model }
    pub fn base(&self) -> &RgbaImage { &self.base }
    pub fn base_revision(&self) -> u64 { self.base_revision }
    pub fn viewport(&self) -> Viewport { self.viewport }
    pub fn view_mode(&self) -> ViewMode { self.view_mode }
    pub fn area(&self) -> Option<&AreaSelection> { self.area.as_ref() }
    pub fn tool(&self) -> Tool { self.tool }
    pub fn brush(&self) -> &Brush { &self.brush }
    pub fn gesture(&self) -> &GestureContext { &self.gesture }
    pub fn gesture_state(&self) -> &GestureState { &self.gesture.state }
    pub fn jobs(&self) -> &JobReconciler { &self.jobs }
    pub fn placeholders(&self) -> &[Placeholder] { self.jobs.placeholders() }
    pub fn history(&self) -> &History<BaseSnapshot> { &self.history }
    pub fn session_key(&self) -> &str { &self.session_key }

    pub fn canvas_bounds(&self) -> Bounds {
        Bounds::new(0.0, 0.0, self.base.width() as f64, self.base.height() as f64)
    }

    // --- Model ---

    /// Direct model access for plain edits (add, move, resize, rotate,
    /// select, layer management). Deletions go through [`CanvasCore::delete_image`]
    /// and [`CanvasCore::delete_layer`] so generated results stay deleted.
    pub fn model_mut(&mut self) -> &mut CanvasModel {
        &mut self.model
    }

    pub fn delete_image(&mut self, id: u32) -> Result<LayerImage> {
        self.cancel_gesture_on(id);
        let removed = self.model.delete_image(id)?;
        self.jobs.mark_result_deleted(&removed);
        Ok(removed)
    }

    pub fn delete_layer(&mut self, id: u32) -> Result<Layer> {
        if let Some(layer) = self.model.layer(id) {
            let ids: Vec<u32> = layer.images.iter().map(|i| i.id).collect();
            for image_id in ids {
                self.cancel_gesture_on(image_id);
            }
        }
        let removed = self.model.delete_layer(id)?;
        for img in &removed.images {
            self.jobs.mark_result_deleted(img);
        }
        Ok(removed)
    }

    fn cancel_gesture_on(&mut self, image_id: u32) {
        let touches = self.gesture.image_before.as_ref().is_some_and(|img| img.id == image_id);
        if touches {
            let mut ignored = Vec::new();
            self.cancel_in_progress(&mut ignored);
        }
    }

    // --- Tools and view ---

    /// Switching tools abandons whatever gesture is running.
    pub fn set_tool(&mut self, tool: Tool) -> Vec<InputAction> {
        let mut actions = Vec::new();
        if self.tool != tool {
            self.cancel_in_progress(&mut actions);
            self.tool = tool;
        }
        actions
    }

    pub fn set_brush(&mut self, brush: Brush) {
        self.brush = brush;
    }

    pub fn set_view_mode(&mut self, mode: ViewMode) {
        self.view_mode = mode;
        self.view_dirty = true;
    }

    pub fn set_viewport(&mut self, viewport: Viewport) {
        let zoom = viewport.zoom.clamp(self.config.min_zoom, self.config.max_zoom);
        self.viewport = Viewport { zoom, ..viewport };
        self.view_dirty = true;
    }

    pub fn layout(&self, window_w: f64, window_h: f64) -> Layout {
        viewport::layout(self.view_mode, window_w, window_h)
    }

    /// Fit the canvas into the canvas rect of the current layout.
    pub fn fit_to_window(&mut self, window_w: f64, window_h: f64) -> Viewport {
        let layout = self.layout(window_w, window_h);
        let fitted = Viewport::fit(self.base.width() as f64, self.base.height() as f64, &layout.canvas, FIT_PADDING);
        self.set_viewport(fitted);
        self.viewport
    }

    pub fn set_area(&mut self, bounds: Bounds) {
        self.area = Some(AreaSelection::idle(bounds));
        self.view_dirty = true;
    }

    pub fn clear_area(&mut self) {
        if self.area.take().is_some() {
            self.view_dirty = true;
        }
    }

    // --- History ---

    pub fn undo(&mut self) -> Result<bool> {
        let snapshot = match self.history.undo() {
            Some(s) => s.clone(),
            None => return Ok(false),
        };
        self.restore_base(&snapshot)?;
        Ok(true)
    }

    pub fn redo(&mut self) -> Result<bool> {
        let snapshot = match self.history.redo() {
            Some(s) => s.clone(),
            None => return Ok(false),
        };
        self.restore_base(&snapshot)?;
        Ok(true)
    }

    fn restore_base(&mut self, snapshot: &BaseSnapshot) -> Result<()> {
        self.base = snapshot.restore()?;
        self.base_revision += 1;
        self.model.mark_dirty();
        Ok(())
    }

    // --- Generation jobs ---

    /// Where a submission without an explicit target lands: the area selection, else the whole canvas.
    pub fn default_target(&self) -> Bounds {
        self.area.as_ref().map(|a| a.bounds).unwrap_or_else(|| self.canvas_bounds())
    }

    pub fn begin_submission(&mut self, requested: Option<Bounds>) -> Submission {
        let requested = requested.unwrap_or_else(|| self.default_target());
        let submission = self.jobs.begin_submission(requested);
        log::info!("submission {} placed at {:?}", submission.placeholder_id, submission.target);
        submission
    }

    pub fn complete_submission(&mut self, placeholder_id: &str, response: &SubmitResponse) -> Result<ReconcileReport> {
        self.jobs.complete_submission(&mut self.model, placeholder_id, response)
    }

    pub fn fail_submission(&mut self, placeholder_id: &str, reason: &str) -> Result<ReconcileReport> {
        self.jobs.fail_submission(placeholder_id, reason)
    }

    pub fn apply_poll(&mut self, raw: &serde_json::Value, now_ms: f64) -> ReconcileReport {
        self.jobs.mark_polled(now_ms);
        let fallback = self.canvas_bounds();
        self.jobs.apply_poll(&mut self.model, raw, fallback)
    }

    pub fn poll_due(&self, now_ms: f64) -> bool {
        self.jobs.poll_due(now_ms)
    }

    pub fn dismiss_placeholder(&mut self, placeholder_id: &str) -> Result<Placeholder> {
        self.jobs.dismiss_placeholder(placeholder_id)
    }

    pub fn drain_events(&mut self) -> Vec<PlaceholderEvent> {
        self.jobs.drain_events()
    }

    // --- Persistence ---

    /// Fold change flags from the model, jobs and view into the save timer.
    fn absorb_changes(&mut self, now_ms: f64) -> bool {
        let model = self.model.take_dirty();
        let jobs = self.jobs.take_dirty();
        let view = std::mem::replace(&mut self.view_dirty, false);
        let changed = model || jobs || view;
        if changed {
            self.persist.mark_dirty(now_ms);
        }
        changed
    }

    /// Called periodically by the host. Saves once the canvas has been idle
    /// long enough and reports whether a job poll is due.
    pub fn tick(&mut self, now_ms: f64, store: &mut dyn KeyValueStore, images: &mut dyn ImageStore) -> Result<TickOutcome> {
        self.absorb_changes(now_ms);
        let mut outcome = TickOutcome { saved: false, poll_due: self.poll_due(now_ms) };
        if self.persist.due(now_ms) && self.gesture.state.is_idle() {
            self.save(store, images)?;
            outcome.saved = true;
        }
        Ok(outcome)
    }

    /// Save immediately if anything is pending (page hide / unload).
    pub fn flush(&mut self, now_ms: f64, store: &mut dyn KeyValueStore, images: &mut dyn ImageStore) -> Result<bool> {
        self.absorb_changes(now_ms);
        if !self.persist.is_dirty() {
            return Ok(false);
        }
        self.save(store, images)?;
        Ok(true)
    }

    /// Write the session. On failure the save stays pending for the next tick.
    pub fn save(&mut self, store: &mut dyn KeyValueStore, images: &mut dyn ImageStore) -> Result<()> {
        let deleted_results = self.jobs.deleted_results();
        let snapshot = SessionSnapshot {
            model: &self.model,
            base: &self.base,
            viewport: self.viewport,
            view_mode: self.view_mode,
            area: self.area.as_ref(),
            placeholders: self.jobs.placeholders(),
            deleted_results,
        };
        let result = persistence::serialize_session(&snapshot, images, &self.config)
            .and_then(|blob| store.put(&self.session_key, blob));
        match result {
            Ok(()) => {
                self.persist.clear();
                log::debug!("session saved under {}", self.session_key);
                Ok(())
            }
            Err(e) => {
                log::warn!("session save failed: {}", e);
                Err(match e {
                    CanvasError::Storage(msg) => CanvasError::Storage(msg),
                    other => CanvasError::Storage(other.to_string()),
                })
            }
        }
    }

    /// Restore the saved session. Returns the references that could not be
    /// resolved, or `None` when nothing was saved.
    pub fn load(&mut self, store: &dyn KeyValueStore, images: &dyn ImageStore) -> Result<Option<Vec<String>>> {
        let blob = match store.get(&self.session_key)? {
            Some(blob) => blob,
            None => return Ok(None),
        };
        let restored = persistence::deserialize_session(&blob, images, &self.config)?;

        self.config.canvas_width = restored.base.width();
        self.config.canvas_height = restored.base.height();
        self.rules = ResizeRules::from_config(&self.config);
        self.history.reset(BaseSnapshot::capture(&restored.base)?);
        self.base = restored.base;
        self.base_revision += 1;
        self.model = restored.model;
        self.viewport = restored.viewport;
        self.view_mode = restored.view_mode;
        self.area = restored.area;
        self.gesture = GestureContext::default();
        self.jobs = JobReconciler::new(self.config.poll_interval_ms, self.config.placement_gap);
        self.jobs.restore(restored.placeholders, restored.deleted_results);
        self.persist.clear();
        self.view_dirty = false;
        self.model.take_dirty();

        log::info!(
            "session {} loaded: {} layers, {} placeholders, {} dropped references",
            self.session_key,
            self.model.layers().len(),
            self.jobs.placeholders().len(),
            restored.dropped.len()
        );
        Ok(Some(restored.dropped))
    }
}
