use wasm_bindgen::prelude::*;
use wasm_bindgen::{Clamped, JsCast};
use serde::Serialize;
use web_sys::{CanvasRenderingContext2d, HtmlCanvasElement, ImageData};
use crate::brush::Stroke;
use crate::engine::CanvasEngine;
use crate::geometry;
use crate::objects::AreaSelection;
use crate::studio::CanvasCore;
use crate::types::{Bounds, HandleType};
use crate::viewport::Viewport;

#[derive(Serialize, Clone, Debug, PartialEq)]
pub struct BaseMarker {
    pub width: u32,
    pub height: u32,
    /// Changes whenever the base raster does.
    pub revision: u64,
}

#[derive(Serialize, Clone, Debug, PartialEq)]
pub struct RenderImage {
    pub id: u32,
    pub layer_id: u32,
    pub source: String,
    pub bounds: Bounds,
    pub rotation: f64,
    pub selected: bool,
}

#[derive(Serialize, Clone, Debug, PartialEq)]
pub struct RenderPlaceholder {
    pub id: String,
    pub bounds: Bounds,
    pub failed: bool,
    pub error: Option<String>,
}

/// Everything needed to draw one frame, in composite order.
#[derive(Serialize, Clone, Debug, PartialEq)]
pub struct RenderFrame {
    pub base: BaseMarker,
    pub images: Vec<RenderImage>,
    pub placeholders: Vec<RenderPlaceholder>,
    pub stroke: Option<Stroke>,
    pub area: Option<AreaSelection>,
    pub viewport: Viewport,
    pub gesture: &'static str,
}

impl CanvasCore {
    pub fn render_list(&self) -> RenderFrame {
        let images = self
            .model
            .render_order()
            .filter(|l| l.visible)
            .flat_map(|l| {
                l.images.iter().map(move |img| RenderImage {
                    id: img.id,
                    layer_id: l.id,
                    source: img.source.clone(),
                    bounds: img.bounds(),
                    rotation: img.rotation,
                    selected: img.selected,
                })
            })
            .collect();
        let placeholders = self
            .jobs
            .placeholders()
            .iter()
            .map(|p| RenderPlaceholder { id: p.id.clone(), bounds: p.target, failed: p.failed, error: p.error.clone() })
            .collect();

        RenderFrame {
            base: BaseMarker { width: self.base.width(), height: self.base.height(), revision: self.base_revision },
            images,
            placeholders,
            stroke: self.gesture.stroke.clone(),
            area: self.area.clone(),
            viewport: self.viewport,
            gesture: self.gesture.state.name(),
        }
    }
}

const SELECTION_COLOR: &str = "#4facfe";
const PLACEHOLDER_COLOR: &str = "#8a8f98";
const FAILED_COLOR: &str = "#e5484d";

#[wasm_bindgen]
impl CanvasEngine {
    pub fn render(&mut self, ctx: &CanvasRenderingContext2d) -> Result<(), JsValue> {
        self.sync_base_canvas()?;
        let frame = self.core.render_list();
        let vp = frame.viewport;

        ctx.save();
        ctx.set_transform(1.0, 0.0, 0.0, 1.0, 0.0, 0.0)?;
        let surface = ctx.canvas();
        if let Some(surface) = surface {
            ctx.clear_rect(0.0, 0.0, surface.width() as f64, surface.height() as f64);
        }
        ctx.translate(vp.pan_x, vp.pan_y)?;
        ctx.scale(vp.zoom, vp.zoom)?;

        if let Some(base) = &self.base_canvas {
            ctx.draw_image_with_html_canvas_element(base, 0.0, 0.0)?;
        }

        for img in &frame.images {
            self.render_image(ctx, img)?;
        }
        for p in &frame.placeholders {
            render_placeholder(ctx, p, vp.zoom)?;
        }
        if let Some(stroke) = &frame.stroke {
            render_stroke_preview(ctx, stroke);
        }
        if let Some(area) = &frame.area {
            render_area(ctx, area, vp.zoom)?;
        }
        if let Some(selected) = frame.images.iter().find(|i| i.selected) {
            self.render_selection_chrome(ctx, selected, vp.zoom)?;
        }

        ctx.restore();
        Ok(())
    }

    /// Copy the base raster into the offscreen canvas when it has changed.
    fn sync_base_canvas(&mut self) -> Result<(), JsValue> {
        let revision = self.core.base_revision();
        if self.base_canvas.is_some() && self.base_drawn_revision == Some(revision) {
            return Ok(());
        }
        let base = self.core.base();
        let canvas = match self.base_canvas.take() {
            Some(c) => c,
            None => {
                let document = web_sys::window()
                    .and_then(|w| w.document())
                    .ok_or_else(|| JsValue::from_str("no document"))?;
                document.create_element("canvas")?.dyn_into::<HtmlCanvasElement>()?
            }
        };
        canvas.set_width(base.width());
        canvas.set_height(base.height());
        let offscreen = canvas
            .get_context("2d")?
            .ok_or_else(|| JsValue::from_str("no 2d context"))?
            .dyn_into::<CanvasRenderingContext2d>()?;
        let data = ImageData::new_with_u8_clamped_array_and_sh(Clamped(base.as_raw().as_slice()), base.width(), base.height())?;
        offscreen.put_image_data(&data, 0.0, 0.0)?;

        self.base_canvas = Some(canvas);
        self.base_drawn_revision = Some(revision);
        Ok(())
    }

    fn render_image(&self, ctx: &CanvasRenderingContext2d, img: &RenderImage) -> Result<(), JsValue> {
        let b = img.bounds;
        ctx.save();
        ctx.translate(b.x + b.width / 2.0, b.y + b.height / 2.0)?;
        ctx.rotate(img.rotation.to_radians())?;
        match self.image_elements.get(&img.source) {
            Some(el) if el.complete() => {
                ctx.draw_image_with_html_image_element_and_dw_and_dh(el, -b.width / 2.0, -b.height / 2.0, b.width, b.height)?;
            }
            _ => {
                ctx.set_fill_style_str("rgba(128,128,128,0.15)");
                ctx.fill_rect(-b.width / 2.0, -b.height / 2.0, b.width, b.height);
            }
        }
        ctx.restore();
        Ok(())
    }

    fn render_selection_chrome(&self, ctx: &CanvasRenderingContext2d, img: &RenderImage, zoom: f64) -> Result<(), JsValue> {
        let b = img.bounds;
        let config = self.core.config();
        ctx.save();
        ctx.translate(b.x + b.width / 2.0, b.y + b.height / 2.0)?;
        ctx.rotate(img.rotation.to_radians())?;
        ctx.translate(-b.width / 2.0, -b.height / 2.0)?;
        ctx.set_stroke_style_str(SELECTION_COLOR);
        ctx.set_line_width(1.5 / zoom);
        ctx.set_line_dash(&js_sys::Array::new())?;
        ctx.stroke_rect(0.0, 0.0, b.width, b.height);

        let local = Bounds::new(0.0, 0.0, b.width, b.height);
        let size = 8.0 / zoom;
        ctx.set_fill_style_str("#ffffff");
        for h in HandleType::ALL {
            let c = local.corner(h);
            ctx.fill_rect(c.x - size / 2.0, c.y - size / 2.0, size, size);
            ctx.stroke_rect(c.x - size / 2.0, c.y - size / 2.0, size, size);
        }

        let knob = geometry::rotate_handle_position(&local, 0.0, config.rotate_handle_offset);
        ctx.begin_path();
        ctx.move_to(b.width / 2.0, 0.0);
        ctx.line_to(knob.x, knob.y);
        ctx.stroke();
        ctx.begin_path();
        ctx.arc(knob.x, knob.y, size / 2.0, 0.0, std::f64::consts::TAU)?;
        ctx.fill();
        ctx.stroke();
        ctx.restore();
        Ok(())
    }
}

fn dashed(ctx: &CanvasRenderingContext2d, zoom: f64) -> Result<(), JsValue> {
    let dash = js_sys::Array::new();
    dash.push(&JsValue::from_f64(6.0 / zoom));
    dash.push(&JsValue::from_f64(4.0 / zoom));
    ctx.set_line_dash(&dash)
}

fn render_placeholder(ctx: &CanvasRenderingContext2d, p: &RenderPlaceholder, zoom: f64) -> Result<(), JsValue> {
    let b = p.bounds;
    let color = if p.failed { FAILED_COLOR } else { PLACEHOLDER_COLOR };
    ctx.save();
    dashed(ctx, zoom)?;
    ctx.set_line_width(2.0 / zoom);
    ctx.set_stroke_style_str(color);
    ctx.stroke_rect(b.x, b.y, b.width, b.height);
    if p.failed {
        ctx.set_fill_style_str("rgba(229,72,77,0.08)");
        ctx.fill_rect(b.x, b.y, b.width, b.height);
    }
    ctx.restore();
    Ok(())
}

fn render_stroke_preview(ctx: &CanvasRenderingContext2d, stroke: &Stroke) {
    let [r, g, b, a] = stroke.brush.color;
    ctx.save();
    ctx.set_stroke_style_str(&format!("rgba({},{},{},{})", r, g, b, a as f64 / 255.0));
    ctx.set_line_width(stroke.brush.size);
    ctx.set_line_cap("round");
    ctx.set_line_join("round");
    ctx.begin_path();
    for (i, p) in stroke.points.iter().enumerate() {
        if i == 0 { ctx.move_to(p.x, p.y); } else { ctx.line_to(p.x, p.y); }
    }
    ctx.stroke();
    ctx.restore();
}

fn render_area(ctx: &CanvasRenderingContext2d, area: &AreaSelection, zoom: f64) -> Result<(), JsValue> {
    let b = area.bounds;
    ctx.save();
    dashed(ctx, zoom)?;
    ctx.set_line_width(1.0 / zoom);
    ctx.set_stroke_style_str(SELECTION_COLOR);
    ctx.set_fill_style_str("rgba(79,172,254,0.08)");
    ctx.fill_rect(b.x, b.y, b.width, b.height);
    ctx.stroke_rect(b.x, b.y, b.width, b.height);
    ctx.restore();
    Ok(())
}
