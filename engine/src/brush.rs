use serde::{Serialize, Deserialize};
use kurbo::{BezPath, ParamCurve, ParamCurveArclen, Point};
use image::{Rgba, RgbaImage};

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct Brush {
    pub color: [u8; 4],
    pub size: f64,
    pub spacing: f64,           // fraction of size, e.g., 0.25
    pub pressure_enabled: bool,
    pub min_size_fraction: f64, // 0.0 to 1.0
}

impl Default for Brush {
    fn default() -> Self {
        Brush { color: [0, 0, 0, 255], size: 8.0, spacing: 0.25, pressure_enabled: true, min_size_fraction: 0.3 }
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct StrokePoint {
    pub x: f64,
    pub y: f64,
    pub pressure: f64,
}

/// A freehand stroke in canvas space, rasterized onto the base layer when it ends.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Stroke {
    pub brush: Brush,
    pub points: Vec<StrokePoint>,
}

impl Stroke {
    pub fn new(brush: Brush) -> Self {
        Stroke { brush, points: Vec::new() }
    }

    pub fn push(&mut self, x: f64, y: f64, pressure: f64) {
        let pressure = if pressure.is_finite() { pressure.clamp(0.0, 1.0) } else { 1.0 };
        self.points.push(StrokePoint { x, y, pressure });
    }

    fn path(&self) -> BezPath {
        let mut path = BezPath::new();
        for (i, p) in self.points.iter().enumerate() {
            if i == 0 { path.move_to((p.x, p.y)); } else { path.line_to((p.x, p.y)); }
        }
        path
    }

    fn dab_size(&self, pressure: f64) -> f64 {
        let b = &self.brush;
        if b.pressure_enabled {
            b.size * (b.min_size_fraction + (1.0 - b.min_size_fraction) * pressure)
        } else {
            b.size
        }
    }

    /// Stamp round dabs along the stroke at `size * spacing` intervals.
    pub fn rasterize(&self, target: &mut RgbaImage) {
        let Some(first) = self.points.first() else { return; };
        if self.points.len() == 1 {
            stamp(target, Point::new(first.x, first.y), self.dab_size(first.pressure), self.brush.color);
            return;
        }

        let step = (self.brush.size * self.brush.spacing).max(1.0);
        let mut dist_remaining = 0.0;
        let path = self.path();

        for (i, seg) in path.segments().enumerate() {
            let seg_len = seg.arclen(0.1);
            let (p0, p1) = (self.points[i].pressure, self.points[i + 1].pressure);
            let mut t_dist = dist_remaining;

            while t_dist <= seg_len {
                let t = if seg_len > 0.0 { seg.inv_arclen(t_dist, 0.1) } else { 0.0 };
                let pressure = p0 + (p1 - p0) * t;
                stamp(target, seg.eval(t), self.dab_size(pressure), self.brush.color);
                t_dist += step;
            }
            dist_remaining = t_dist - seg_len;
        }
    }
}

fn stamp(target: &mut RgbaImage, center: Point, size: f64, color: [u8; 4]) {
    let r = (size / 2.0).max(0.5);
    let (w, h) = (target.width() as i64, target.height() as i64);
    let min_x = ((center.x - r).floor() as i64).max(0);
    let max_x = ((center.x + r).ceil() as i64).min(w - 1);
    let min_y = ((center.y - r).floor() as i64).max(0);
    let max_y = ((center.y + r).ceil() as i64).min(h - 1);

    for py in min_y..=max_y {
        for px in min_x..=max_x {
            let d = Point::new(px as f64 + 0.5, py as f64 + 0.5).distance(center);
            let coverage = (r - d + 0.5).clamp(0.0, 1.0);
            if coverage <= 0.0 { continue; }
            let pixel = target.get_pixel_mut(px as u32, py as u32);
            blend_over(pixel, color, coverage);
        }
    }
}

fn blend_over(dst: &mut Rgba<u8>, src: [u8; 4], coverage: f64) {
    let sa = src[3] as f64 / 255.0 * coverage;
    let da = dst[3] as f64 / 255.0;
    let out_a = sa + da * (1.0 - sa);
    if out_a <= 0.0 {
        return;
    }
    for c in 0..3 {
        let v = (src[c] as f64 * sa + dst[c] as f64 * da * (1.0 - sa)) / out_a;
        dst[c] = v.round().clamp(0.0, 255.0) as u8;
    }
    dst[3] = (out_a * 255.0).round().clamp(0.0, 255.0) as u8;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stroke_paints_along_its_path() {
        let mut raster = RgbaImage::new(64, 64);
        let mut stroke = Stroke::new(Brush { pressure_enabled: false, ..Brush::default() });
        stroke.push(8.0, 32.0, 1.0);
        stroke.push(56.0, 32.0, 1.0);
        stroke.rasterize(&mut raster);
        for x in [8, 20, 32, 44, 55] {
            assert_eq!(raster.get_pixel(x, 32)[3], 255, "x = {}", x);
        }
        assert_eq!(raster.get_pixel(32, 5)[3], 0);
    }

    #[test]
    fn single_point_stamps_one_dab() {
        let mut raster = RgbaImage::new(16, 16);
        let mut stroke = Stroke::new(Brush::default());
        stroke.push(8.0, 8.0, 1.0);
        stroke.rasterize(&mut raster);
        assert_eq!(*raster.get_pixel(8, 8), Rgba([0, 0, 0, 255]));
    }

    #[test]
    fn dabs_outside_raster_are_clipped() {
        let mut raster = RgbaImage::new(8, 8);
        let mut stroke = Stroke::new(Brush::default());
        stroke.push(-50.0, -50.0, 1.0);
        stroke.push(-40.0, 100.0, f64::NAN);
        stroke.rasterize(&mut raster);
        assert!(raster.pixels().all(|p| p[3] == 0));
    }
}
