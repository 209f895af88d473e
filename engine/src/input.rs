//! Pointer and touch gesture handling.
//!
//! One gesture runs at a time. Which one starts is decided on pointer-down,
//! in priority order: resize handle, rotate handle, area selection, brush
//! stroke, image body on the selected layer, then pan. Two touch points
//! always cancel whatever is running and start a pinch.

use std::collections::BTreeMap;
use serde::{Serialize, Deserialize};
use kurbo::Point;
use crate::brush::Stroke;
use crate::error::Result;
use crate::geometry;
use crate::history::BaseSnapshot;
use crate::objects::{AreaSelection, LayerImage};
use crate::studio::CanvasCore;
use crate::types::{AreaHandle, AreaMode, Bounds, HandleType, PointerSource, Tool};

/// Area rectangles smaller than this on either side are dropped at gesture end.
pub const MIN_AREA_SIZE: f64 = 4.0;
/// Screen pixels a pointer may wander and still count as a tap.
const TAP_SLOP: f64 = 3.0;

const BUTTON_PRIMARY: i16 = 0;
const BUTTON_MIDDLE: i16 = 1;

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq)]
pub struct PointerEvent {
    pub pointer_id: i32,
    /// Screen space.
    pub x: f64,
    pub y: f64,
    #[serde(default)]
    pub source: PointerSource,
    #[serde(default)]
    pub button: i16,
    #[serde(default = "full_pressure")]
    pub pressure: f64,
}

fn full_pressure() -> f64 {
    1.0
}

impl PointerEvent {
    pub fn mouse(x: f64, y: f64) -> Self {
        PointerEvent { pointer_id: 1, x, y, source: PointerSource::Mouse, button: BUTTON_PRIMARY, pressure: 1.0 }
    }

    pub fn touch(pointer_id: i32, x: f64, y: f64) -> Self {
        PointerEvent { pointer_id, x, y, source: PointerSource::Touch, button: BUTTON_PRIMARY, pressure: 1.0 }
    }

    pub fn pen(x: f64, y: f64, pressure: f64) -> Self {
        PointerEvent { pointer_id: 2, x, y, source: PointerSource::Pen, button: BUTTON_PRIMARY, pressure }
    }

    pub fn screen_point(&self) -> Point {
        Point::new(self.x, self.y)
    }
}

/// What a pinch acts on. Chosen when the second finger lands and kept until it ends.
#[derive(Serialize, Clone, Copy, Debug, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PinchTarget {
    Image { id: u32 },
    Canvas,
}

#[derive(Clone, Debug, PartialEq, Default)]
pub enum GestureState {
    #[default]
    Idle,
    Panning { start_screen: Point, last_screen: Point },
    DraggingImage { id: u32, last: Point },
    ResizingImage { id: u32, handle: HandleType, start: Point },
    Rotating { id: u32 },
    DrawingArea { anchor: Point },
    DraggingArea { last: Point },
    ResizingArea { handle: HandleType, start: Point },
    Stroking,
    PinchZoom { target: PinchTarget, start_distance: f64, last_distance: f64, last_mid: Point },
}

impl GestureState {
    pub fn name(&self) -> &'static str {
        match self {
            GestureState::Idle => "idle",
            GestureState::Panning { .. } => "panning",
            GestureState::DraggingImage { .. } => "dragging_image",
            GestureState::ResizingImage { .. } => "resizing_image",
            GestureState::Rotating { .. } => "rotating",
            GestureState::DrawingArea { .. } => "drawing_area",
            GestureState::DraggingArea { .. } => "dragging_area",
            GestureState::ResizingArea { .. } => "resizing_area",
            GestureState::Stroking => "stroking",
            GestureState::PinchZoom { .. } => "pinch_zoom",
        }
    }

    pub fn is_idle(&self) -> bool {
        matches!(self, GestureState::Idle)
    }
}

/// Everything the dispatcher tracks between pointer events.
#[derive(Clone, Debug, Default)]
pub struct GestureContext {
    pub(crate) state: GestureState,
    pub(crate) pointers: BTreeMap<i32, (Point, PointerSource)>,
    /// Pointer that owns the current single-pointer gesture.
    pub(crate) primary: Option<i32>,
    /// Set after a pinch while fingers remain down.
    pub(crate) suppressed: bool,
    pub(crate) image_before: Option<LayerImage>,
    pub(crate) area_before: Option<Option<AreaSelection>>,
    pub(crate) stroke: Option<Stroke>,
}

impl GestureContext {
    pub fn state(&self) -> &GestureState {
        &self.state
    }

    pub fn stroke(&self) -> Option<&Stroke> {
        self.stroke.as_ref()
    }

    fn touches(&self) -> Vec<Point> {
        self.pointers
            .values()
            .filter(|(_, source)| *source == PointerSource::Touch)
            .map(|(p, _)| *p)
            .collect()
    }
}

/// What changed as a result of an input event, for the shell to react to.
#[derive(Serialize, Clone, Debug, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InputAction {
    RenderNeeded,
    SelectionChanged { image_id: Option<u32> },
    ImageUpdated { id: u32 },
    AreaChanged,
    ViewportChanged,
    StrokeCommitted,
}

fn log_failure<T>(what: &str, res: Result<T>) -> Option<T> {
    match res {
        Ok(v) => Some(v),
        Err(e) => {
            log::warn!("{} failed: {}", what, e);
            None
        }
    }
}

impl CanvasCore {
    pub fn pointer_down(&mut self, ev: PointerEvent) -> Vec<InputAction> {
        let screen = ev.screen_point();
        let mut actions = Vec::new();
        self.gesture.pointers.insert(ev.pointer_id, (screen, ev.source));

        if ev.source == PointerSource::Touch {
            match self.gesture.touches().len() {
                2 => {
                    self.cancel_in_progress(&mut actions);
                    self.start_pinch(&mut actions);
                    return actions;
                }
                n if n > 2 => return actions,
                _ => {}
            }
        }

        if self.gesture.suppressed || !self.gesture.state.is_idle() {
            return actions;
        }

        self.gesture.primary = Some(ev.pointer_id);
        if ev.button == BUTTON_MIDDLE {
            self.enter(GestureState::Panning { start_screen: screen, last_screen: screen });
            return actions;
        }
        if ev.button != BUTTON_PRIMARY {
            self.gesture.primary = None;
            return actions;
        }

        let p = self.viewport.screen_to_canvas(screen);
        self.resolve_gesture(p, screen, ev.pressure, &mut actions);
        actions
    }

    pub fn pointer_move(&mut self, ev: PointerEvent) -> Vec<InputAction> {
        let screen = ev.screen_point();
        match self.gesture.pointers.get_mut(&ev.pointer_id) {
            Some(slot) => slot.0 = screen,
            None => return Vec::new(),
        }

        if matches!(self.gesture.state, GestureState::PinchZoom { .. }) {
            return self.update_pinch();
        }
        if self.gesture.primary != Some(ev.pointer_id) {
            return Vec::new();
        }

        let p = self.viewport.screen_to_canvas(screen);
        let mut actions = Vec::new();
        match self.gesture.state.clone() {
            GestureState::Idle | GestureState::PinchZoom { .. } => {}
            GestureState::Panning { start_screen, last_screen } => {
                self.viewport.pan_by(screen - last_screen);
                self.view_dirty = true;
                self.gesture.state = GestureState::Panning { start_screen, last_screen: screen };
                actions.push(InputAction::ViewportChanged);
            }
            GestureState::DraggingImage { id, last } => {
                log_failure("move image", self.model.move_image(id, p.x - last.x, p.y - last.y));
                self.gesture.state = GestureState::DraggingImage { id, last: p };
                actions.push(InputAction::RenderNeeded);
            }
            GestureState::ResizingImage { id, handle, start } => {
                if let Some(origin) = self.gesture.image_before.clone() {
                    let b = origin.bounds();
                    let center = b.center();
                    let delta = geometry::rotate_point(p, center, -origin.rotation)
                        - geometry::rotate_point(start, center, -origin.rotation);
                    let resized = geometry::resize_with_snaps(&b, handle, delta, true, &self.rules, &[b, origin.base_box]);
                    log_failure("resize image", self.model.resize_image(id, resized));
                    actions.push(InputAction::RenderNeeded);
                }
            }
            GestureState::Rotating { id } => {
                if let Some(origin) = self.gesture.image_before.as_ref() {
                    let center = origin.bounds().center();
                    let angle = geometry::rotation_from_pointer(center, p, self.config.rotation_snap_tolerance_deg);
                    log_failure("rotate image", self.model.rotate_image(id, angle));
                    actions.push(InputAction::RenderNeeded);
                }
            }
            GestureState::DrawingArea { anchor } => {
                if let Some(area) = self.area.as_mut() {
                    area.bounds = Bounds::from_corners(anchor, p);
                    actions.push(InputAction::AreaChanged);
                }
            }
            GestureState::DraggingArea { last } => {
                if let Some(area) = self.area.as_mut() {
                    area.bounds = area.bounds.translate(p.x - last.x, p.y - last.y);
                    self.gesture.state = GestureState::DraggingArea { last: p };
                    actions.push(InputAction::AreaChanged);
                }
            }
            GestureState::ResizingArea { handle, start } => {
                let before = self.gesture.area_before.clone().flatten();
                if let (Some(before), Some(area)) = (before, self.area.as_mut()) {
                    area.bounds = geometry::resize_from_handle(&before.bounds, handle, p - start, false, 0.0);
                    actions.push(InputAction::AreaChanged);
                }
            }
            GestureState::Stroking => {
                if let Some(stroke) = self.gesture.stroke.as_mut() {
                    stroke.push(p.x, p.y, ev.pressure);
                    actions.push(InputAction::RenderNeeded);
                }
            }
        }
        actions
    }

    pub fn pointer_up(&mut self, ev: PointerEvent) -> Vec<InputAction> {
        let mut actions = Vec::new();
        if self.gesture.pointers.remove(&ev.pointer_id).is_none() {
            return actions;
        }

        if matches!(self.gesture.state, GestureState::PinchZoom { .. }) {
            self.gesture.image_before = None;
            self.gesture.suppressed = !self.gesture.pointers.is_empty();
            self.enter(GestureState::Idle);
            actions.push(InputAction::RenderNeeded);
            return actions;
        }
        if self.gesture.pointers.is_empty() {
            self.gesture.suppressed = false;
        }
        if self.gesture.primary != Some(ev.pointer_id) {
            return actions;
        }

        self.finish_gesture(ev.screen_point(), &mut actions);
        actions
    }

    /// Lost capture or an explicit cancel: undo whatever the running gesture applied.
    pub fn pointer_cancel(&mut self) -> Vec<InputAction> {
        let mut actions = Vec::new();
        self.gesture.pointers.clear();
        self.gesture.suppressed = false;
        self.cancel_in_progress(&mut actions);
        actions
    }

    fn enter(&mut self, next: GestureState) {
        log::debug!("gesture {} -> {}", self.gesture.state.name(), next.name());
        self.gesture.state = next;
    }

    /// Selected image, if its layer is showing.
    fn hittable_selected_image(&self) -> Option<LayerImage> {
        let img = self.model.selected_image()?;
        let layer = self.model.layer(self.model.layer_of_image(img.id)?)?;
        layer.visible.then(|| img.clone())
    }

    /// Topmost image under `p` on the selected layer. Other layers are not hit-testable.
    fn hit_image_on_selected_layer(&self, p: Point) -> Option<u32> {
        let layer = self.model.layer(self.model.selected_layer_id()?)?;
        if layer.is_base_layer || !layer.visible {
            return None;
        }
        layer
            .images
            .iter()
            .rev()
            .find(|img| geometry::hit_test_body(&img.bounds(), img.rotation, p))
            .map(|img| img.id)
    }

    fn resolve_gesture(&mut self, p: Point, screen: Point, pressure: f64, actions: &mut Vec<InputAction>) {
        let radius = geometry::hit_radius(
            self.viewport.display_scale(),
            self.config.handle_base_radius,
            self.config.handle_min_radius,
        );

        if let Some(img) = self.hittable_selected_image() {
            let b = img.bounds();
            if let Some(handle) = geometry::hit_test_handles(&b, img.rotation, p, radius) {
                let id = img.id;
                self.gesture.image_before = Some(img);
                self.enter(GestureState::ResizingImage { id, handle, start: p });
                return;
            }
            if geometry::hit_test_rotate_handle(&b, img.rotation, p, self.config.rotate_handle_offset, radius) {
                let id = img.id;
                self.gesture.image_before = Some(img);
                self.enter(GestureState::Rotating { id });
                return;
            }
        }

        if self.tool == Tool::AreaSelect {
            self.gesture.area_before = Some(self.area.clone());
            let grabbed = self.area.as_ref().and_then(|area| {
                match geometry::hit_test_handles(&area.bounds, 0.0, p, radius) {
                    Some(handle) => Some(AreaHandle::Corner(handle)),
                    None => area.bounds.contains(p).then_some(AreaHandle::Move),
                }
            });
            let next = match grabbed {
                Some(AreaHandle::Corner(handle)) => GestureState::ResizingArea { handle, start: p },
                Some(AreaHandle::Move) => GestureState::DraggingArea { last: p },
                None => {
                    self.area = Some(AreaSelection::idle(Bounds::new(p.x, p.y, 0.0, 0.0)));
                    GestureState::DrawingArea { anchor: p }
                }
            };
            if let Some(area) = self.area.as_mut() {
                area.active_handle = grabbed;
                area.mode = match next {
                    GestureState::ResizingArea { .. } => AreaMode::Resizing,
                    GestureState::DraggingArea { .. } => AreaMode::Dragging,
                    _ => AreaMode::Drawing,
                };
            }
            self.enter(next);
            actions.push(InputAction::AreaChanged);
            return;
        }

        if self.tool == Tool::Brush {
            let mut stroke = Stroke::new(self.brush.clone());
            stroke.push(p.x, p.y, pressure);
            self.gesture.stroke = Some(stroke);
            self.enter(GestureState::Stroking);
            actions.push(InputAction::RenderNeeded);
            return;
        }

        if let Some(id) = self.hit_image_on_selected_layer(p) {
            if log_failure("select image", self.model.select_image(Some(id))).is_some() {
                actions.push(InputAction::SelectionChanged { image_id: Some(id) });
            }
            self.gesture.image_before = self.model.image(id).cloned();
            self.enter(GestureState::DraggingImage { id, last: p });
            return;
        }

        self.enter(GestureState::Panning { start_screen: screen, last_screen: screen });
    }

    fn finish_gesture(&mut self, screen: Point, actions: &mut Vec<InputAction>) {
        let prev = std::mem::replace(&mut self.gesture.state, GestureState::Idle);
        log::debug!("gesture {} -> idle", prev.name());
        self.gesture.primary = None;
        self.gesture.image_before = None;

        match prev {
            GestureState::Idle | GestureState::PinchZoom { .. } => {}
            GestureState::Panning { start_screen, .. } => {
                let tapped = (screen - start_screen).hypot() <= TAP_SLOP;
                if tapped && self.model.selected_image().is_some() {
                    log_failure("clear selection", self.model.select_image(None));
                    actions.push(InputAction::SelectionChanged { image_id: None });
                }
            }
            GestureState::DraggingImage { id, .. }
            | GestureState::ResizingImage { id, .. }
            | GestureState::Rotating { id } => {
                actions.push(InputAction::ImageUpdated { id });
            }
            GestureState::DrawingArea { .. } | GestureState::DraggingArea { .. } | GestureState::ResizingArea { .. } => {
                self.gesture.area_before = None;
                self.settle_area();
                self.view_dirty = true;
                actions.push(InputAction::AreaChanged);
            }
            GestureState::Stroking => {
                if let Some(stroke) = self.gesture.stroke.take() {
                    if log_failure("commit stroke", self.commit_stroke(&stroke)).is_some() {
                        actions.push(InputAction::StrokeCommitted);
                    }
                }
            }
        }
    }

    /// Clear transient area flags and drop a rectangle too small to use.
    fn settle_area(&mut self) {
        if let Some(area) = self.area.as_mut() {
            area.mode = AreaMode::Idle;
            area.active_handle = None;
            if area.bounds.width < MIN_AREA_SIZE || area.bounds.height < MIN_AREA_SIZE {
                self.area = None;
            }
        }
    }

    fn commit_stroke(&mut self, stroke: &Stroke) -> Result<()> {
        stroke.rasterize(&mut self.base);
        self.base_revision += 1;
        let snapshot = BaseSnapshot::capture(&self.base)?;
        self.history.push(snapshot);
        self.model.mark_dirty();
        log::debug!("stroke committed, {} points, history at {}", stroke.points.len(), self.history.cursor());
        Ok(())
    }

    pub(crate) fn cancel_in_progress(&mut self, actions: &mut Vec<InputAction>) {
        let prev = std::mem::replace(&mut self.gesture.state, GestureState::Idle);
        if !prev.is_idle() {
            log::debug!("gesture {} cancelled", prev.name());
        }
        self.gesture.primary = None;

        match prev {
            GestureState::DraggingImage { .. }
            | GestureState::ResizingImage { .. }
            | GestureState::Rotating { .. }
            | GestureState::PinchZoom { target: PinchTarget::Image { .. }, .. } => {
                if let Some(origin) = self.gesture.image_before.take() {
                    log_failure("restore image", self.model.restore_image(&origin));
                    actions.push(InputAction::ImageUpdated { id: origin.id });
                }
            }
            GestureState::DrawingArea { .. } | GestureState::DraggingArea { .. } | GestureState::ResizingArea { .. } => {
                if let Some(before) = self.gesture.area_before.take() {
                    self.area = before;
                    actions.push(InputAction::AreaChanged);
                }
            }
            GestureState::Stroking => {
                self.gesture.stroke = None;
                actions.push(InputAction::RenderNeeded);
            }
            GestureState::Idle | GestureState::Panning { .. } | GestureState::PinchZoom { .. } => {}
        }

        self.gesture.image_before = None;
        self.gesture.area_before = None;
        self.gesture.stroke = None;
    }

    fn start_pinch(&mut self, actions: &mut Vec<InputAction>) {
        let touches = self.gesture.touches();
        let (a, b) = match touches.as_slice() {
            [a, b, ..] => (*a, *b),
            _ => return,
        };
        let distance = a.distance(b).max(f64::EPSILON);
        let mid = a.midpoint(b);

        let target = match self.hittable_selected_image() {
            Some(img) if self.tool == Tool::Move => {
                let id = img.id;
                self.gesture.image_before = Some(img);
                PinchTarget::Image { id }
            }
            _ => PinchTarget::Canvas,
        };
        self.gesture.primary = None;
        self.enter(GestureState::PinchZoom { target, start_distance: distance, last_distance: distance, last_mid: mid });
        actions.push(InputAction::RenderNeeded);
    }

    fn update_pinch(&mut self) -> Vec<InputAction> {
        let (target, start_distance, last_distance, last_mid) = match self.gesture.state {
            GestureState::PinchZoom { target, start_distance, last_distance, last_mid } => {
                (target, start_distance, last_distance, last_mid)
            }
            _ => return Vec::new(),
        };
        let touches = self.gesture.touches();
        let (a, b) = match touches.as_slice() {
            [a, b, ..] => (*a, *b),
            _ => return Vec::new(),
        };
        let distance = a.distance(b);
        let mid = a.midpoint(b);

        let action = match target {
            PinchTarget::Canvas => {
                self.viewport.pan_by(mid - last_mid);
                if last_distance > f64::EPSILON {
                    self.viewport.zoom_about(mid, distance / last_distance, self.config.min_zoom, self.config.max_zoom);
                }
                self.view_dirty = true;
                InputAction::ViewportChanged
            }
            PinchTarget::Image { id } => {
                if let Some(origin) = self.gesture.image_before.as_ref() {
                    let scaled = geometry::scale_about_center(&origin.bounds(), distance / start_distance, self.config.min_image_size);
                    log_failure("pinch resize", self.model.resize_image(id, scaled));
                }
                InputAction::ImageUpdated { id }
            }
        };
        self.gesture.state = GestureState::PinchZoom { target, start_distance, last_distance: distance, last_mid: mid };
        vec![action]
    }
}
