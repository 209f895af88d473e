//! Hit testing, resize math and snap rules.
//!
//! Everything here is a pure function over canvas-space values. Out-of-range
//! inputs are clamped, never rejected.

use kurbo::{Point, Vec2};
use crate::config::EngineConfig;
use crate::types::{Bounds, HandleType};

const CARDINALS: [f64; 5] = [0.0, 90.0, 180.0, 270.0, 360.0];

/// Thresholds applied after a resize, before it is committed.
#[derive(Clone, Copy, Debug)]
pub struct ResizeRules {
    pub min_size: f64,
    pub edge_threshold: f64,
    pub size_threshold: f64,
    pub canvas: Bounds,
}

impl ResizeRules {
    pub fn from_config(config: &EngineConfig) -> Self {
        ResizeRules {
            min_size: config.min_image_size,
            edge_threshold: config.edge_snap_threshold,
            size_threshold: config.size_snap_threshold,
            canvas: Bounds::new(0.0, 0.0, config.canvas_width as f64, config.canvas_height as f64),
        }
    }
}

pub fn rotate_point(p: Point, center: Point, degrees: f64) -> Point {
    if degrees == 0.0 { return p; }
    let (sin_r, cos_r) = degrees.to_radians().sin_cos();
    let dx = p.x - center.x;
    let dy = p.y - center.y;
    Point::new(center.x + dx * cos_r - dy * sin_r, center.y + dx * sin_r + dy * cos_r)
}

/// Map a canvas point into the unrotated frame of a box rotated about its center.
pub fn to_local(bounds: &Bounds, rotation: f64, p: Point) -> Point {
    rotate_point(p, bounds.center(), -rotation)
}

pub fn hit_radius(display_scale: f64, base_radius: f64, min_radius: f64) -> f64 {
    let scale = if display_scale.is_finite() && display_scale > 0.0 { display_scale } else { 1.0 };
    min_radius.max(base_radius * scale)
}

pub fn hit_test_body(bounds: &Bounds, rotation: f64, p: Point) -> bool {
    bounds.contains(to_local(bounds, rotation, p))
}

/// First corner within `radius` of the pointer, tested tl, tr, bl, br.
pub fn hit_test_handles(bounds: &Bounds, rotation: f64, p: Point, radius: f64) -> Option<HandleType> {
    let local = to_local(bounds, rotation, p);
    HandleType::ALL
        .into_iter()
        .find(|&h| bounds.corner(h).distance(local) <= radius)
}

pub fn rotate_handle_position(bounds: &Bounds, rotation: f64, offset: f64) -> Point {
    let top_mid = Point::new(bounds.x + bounds.width / 2.0, bounds.y - offset);
    rotate_point(top_mid, bounds.center(), rotation)
}

pub fn hit_test_rotate_handle(bounds: &Bounds, rotation: f64, p: Point, offset: f64, radius: f64) -> bool {
    rotate_handle_position(bounds, rotation, offset).distance(p) <= radius
}

/// Resize `original` by dragging `handle` by `delta`; the opposite corner stays put.
///
/// With `aspect_locked`, the axis with the larger delta drives both sides.
pub fn resize_from_handle(original: &Bounds, handle: HandleType, delta: Vec2, aspect_locked: bool, min_size: f64) -> Bounds {
    let sign_x = if handle.moves_left() { -1.0 } else { 1.0 };
    let sign_y = if handle.moves_top() { -1.0 } else { 1.0 };
    let raw_w = original.width + sign_x * delta.x;
    let raw_h = original.height + sign_y * delta.y;

    let (width, height) = if aspect_locked {
        let aspect = aspect_of(original);
        let (w, h) = if delta.x.abs() >= delta.y.abs() {
            (raw_w, raw_w / aspect)
        } else {
            (raw_h * aspect, raw_h)
        };
        clamp_min_size_locked(w, h, aspect, min_size)
    } else {
        (raw_w.max(min_size), raw_h.max(min_size))
    };

    anchored(original, handle, width, height)
}

/// Snap moving edges that land within the threshold of the canvas boundary.
pub fn snap_to_edges(resized: &Bounds, original: &Bounds, handle: HandleType, aspect_locked: bool, rules: &ResizeRules) -> Bounds {
    let canvas = rules.canvas;
    let t = rules.edge_threshold;

    let snap_w = if handle.moves_left() {
        let d = (resized.x - canvas.x).abs();
        (d < t).then(|| (original.right() - canvas.x, d))
    } else {
        let d = (resized.right() - canvas.right()).abs();
        (d < t).then(|| (canvas.right() - original.x, d))
    };
    let snap_h = if handle.moves_top() {
        let d = (resized.y - canvas.y).abs();
        (d < t).then(|| (original.bottom() - canvas.y, d))
    } else {
        let d = (resized.bottom() - canvas.bottom()).abs();
        (d < t).then(|| (canvas.bottom() - original.y, d))
    };

    let (width, height) = if aspect_locked {
        let aspect = aspect_of(original);
        match (snap_w, snap_h) {
            (Some((w, dw)), Some((h, dh))) => {
                if dw <= dh { (w, w / aspect) } else { (h * aspect, h) }
            }
            (Some((w, _)), None) => (w, w / aspect),
            (None, Some((h, _))) => (h * aspect, h),
            (None, None) => return *resized,
        }
    } else {
        if snap_w.is_none() && snap_h.is_none() { return *resized; }
        (snap_w.map_or(resized.width, |s| s.0), snap_h.map_or(resized.height, |s| s.0))
    };

    if width < rules.min_size || height < rules.min_size {
        return *resized;
    }
    anchored(original, handle, width, height)
}

/// Return `reference` exactly when `candidate` is within `threshold` of it on every component.
pub fn snap_to_original(candidate: &Bounds, reference: &Bounds, threshold: f64) -> Option<Bounds> {
    let close = (candidate.x - reference.x).abs() <= threshold
        && (candidate.y - reference.y).abs() <= threshold
        && (candidate.width - reference.width).abs() <= threshold
        && (candidate.height - reference.height).abs() <= threshold;
    close.then_some(*reference)
}

/// Full resize pipeline: handle math, then snap back to any of `references`,
/// and only when nothing snaps back, edge snap.
///
/// Snap-back sees the raw handle result, so a box resting near the canvas
/// edge still returns to itself after a small jitter.
pub fn resize_with_snaps(
    original: &Bounds,
    handle: HandleType,
    delta: Vec2,
    aspect_locked: bool,
    rules: &ResizeRules,
    references: &[Bounds],
) -> Bounds {
    let resized = resize_from_handle(original, handle, delta, aspect_locked, rules.min_size);
    let snap_back = |b: &Bounds| references.iter().find_map(|r| snap_to_original(b, r, rules.size_threshold));
    if let Some(back) = snap_back(&resized) {
        return back;
    }
    let snapped = snap_to_edges(&resized, original, handle, aspect_locked, rules);
    snap_back(&snapped).unwrap_or(snapped)
}

/// Scale a box about its center, keeping aspect and the minimum size.
pub fn scale_about_center(original: &Bounds, factor: f64, min_size: f64) -> Bounds {
    let factor = if factor.is_finite() && factor > 0.0 { factor } else { 1.0 };
    let (w, h) = clamp_min_size_locked(original.width * factor, original.height * factor, aspect_of(original), min_size);
    let c = original.center();
    Bounds::new(c.x - w / 2.0, c.y - h / 2.0, w, h)
}

/// Grow each side independently up to `min_size`, keeping the origin.
pub fn clamp_min_size(b: &Bounds, min_size: f64) -> Bounds {
    Bounds { width: b.width.max(min_size), height: b.height.max(min_size), ..*b }
}

pub fn normalize_degrees(deg: f64) -> f64 {
    if !deg.is_finite() { return 0.0; }
    let d = deg.rem_euclid(360.0);
    if d >= 360.0 { 0.0 } else { d }
}

pub fn snap_rotation(deg: f64, tolerance: f64) -> f64 {
    let d = normalize_degrees(deg);
    CARDINALS
        .iter()
        .find(|&&c| (d - c).abs() <= tolerance)
        .map(|&c| normalize_degrees(c))
        .unwrap_or(d)
}

/// Angle of the pointer around `center`; straight up is 0 degrees.
pub fn rotation_from_pointer(center: Point, p: Point, tolerance: f64) -> f64 {
    let v = p - center;
    if v.hypot() < f64::EPSILON { return 0.0; }
    let deg = v.y.atan2(v.x).to_degrees() + 90.0;
    snap_rotation(deg, tolerance)
}

fn aspect_of(b: &Bounds) -> f64 {
    if b.width > 0.0 && b.height > 0.0 { b.width / b.height } else { 1.0 }
}

fn clamp_min_size_locked(w: f64, h: f64, aspect: f64, min_size: f64) -> (f64, f64) {
    if w.min(h) >= min_size {
        (w, h)
    } else if aspect >= 1.0 {
        (min_size * aspect, min_size)
    } else {
        (min_size, min_size / aspect)
    }
}

fn anchored(original: &Bounds, handle: HandleType, width: f64, height: f64) -> Bounds {
    let x = if handle.moves_left() { original.right() - width } else { original.x };
    let y = if handle.moves_top() { original.bottom() - height } else { original.y };
    Bounds::new(x, y, width, height)
}
