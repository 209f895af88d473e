use wasm_bindgen::prelude::*;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use crate::brush::Brush;
use crate::engine::CanvasEngine;
use crate::error::{CanvasError, Result};
use crate::geometry;
use crate::model::LayerDirection;
use crate::objects::{AreaSelection, Layer, Placeholder};
use crate::studio::CanvasCore;
use crate::types::{Bounds, Tool, ViewMode};
use crate::viewport::Viewport;

#[derive(Deserialize)]
struct Command {
    action: String,
    #[serde(default)]
    params: Value,
}

#[derive(Deserialize)]
struct IdParams {
    id: u32,
}

#[derive(Deserialize)]
struct AddImageParams {
    #[serde(default)]
    layer_id: Option<u32>,
    source: String,
    bounds: Bounds,
}

#[derive(Deserialize)]
struct MoveParams {
    id: u32,
    dx: f64,
    dy: f64,
}

#[derive(Deserialize)]
struct ResizeParams {
    id: u32,
    bounds: Bounds,
}

#[derive(Deserialize)]
struct RotateParams {
    id: u32,
    degrees: f64,
}

#[derive(Deserialize)]
struct SelectImageParams {
    #[serde(default)]
    id: Option<u32>,
}

#[derive(Deserialize)]
struct ReorderParams {
    index: usize,
    direction: LayerDirection,
}

#[derive(Deserialize)]
struct RenameParams {
    id: u32,
    name: String,
}

#[derive(Deserialize)]
struct ToolParams {
    tool: Tool,
}

#[derive(Deserialize)]
struct ViewModeParams {
    mode: ViewMode,
}

#[derive(Deserialize)]
struct AreaParams {
    bounds: Bounds,
}

#[derive(Deserialize)]
struct PlaceholderParams {
    id: String,
}

/// Snapshot of the editor for the shell's panels.
#[derive(Serialize)]
struct StateView<'a> {
    layers: &'a [Layer],
    selected_layer_id: Option<u32>,
    selected_image_id: Option<u32>,
    tool: Tool,
    brush: &'a Brush,
    view_mode: ViewMode,
    viewport: Viewport,
    area: Option<&'a AreaSelection>,
    placeholders: &'a [Placeholder],
    gesture: &'static str,
    can_undo: bool,
    can_redo: bool,
}

fn params<T: for<'de> Deserialize<'de>>(value: Value) -> Result<T> {
    Ok(serde_json::from_value(value)?)
}

fn ok() -> Value {
    json!({ "ok": true })
}

impl CanvasCore {
    /// JSON command entry point. Replies with a JSON object, or `{"error": ...}`.
    pub fn execute_command(&mut self, cmd_json: &str) -> String {
        let cmd: Command = match serde_json::from_str(cmd_json) {
            Ok(c) => c,
            Err(e) => return CanvasError::from(e).to_json(),
        };
        match self.dispatch(&cmd.action, cmd.params) {
            Ok(reply) => reply.to_string(),
            Err(e) => {
                if e.is_invariant_violation() {
                    log::info!("{} rejected: {}", cmd.action, e);
                } else {
                    log::warn!("{} failed: {}", cmd.action, e);
                }
                e.to_json()
            }
        }
    }

    fn dispatch(&mut self, action: &str, raw: Value) -> Result<Value> {
        match action {
            "add_image" => {
                let p: AddImageParams = params(raw)?;
                let layer_id = match p.layer_id.or_else(|| self.model.selected_layer_id()) {
                    Some(id) => id,
                    None => self.model.ensure_target_layer(),
                };
                let id = self.model.add_image(layer_id, &p.source, p.bounds)?;
                Ok(json!({ "id": id, "layer_id": layer_id }))
            }
            "move_image" => {
                let p: MoveParams = params(raw)?;
                self.model.move_image(p.id, p.dx, p.dy)?;
                Ok(ok())
            }
            "resize_image" => {
                let p: ResizeParams = params(raw)?;
                self.model.resize_image(p.id, p.bounds)?;
                Ok(ok())
            }
            "rotate_image" => {
                let p: RotateParams = params(raw)?;
                let degrees = geometry::snap_rotation(p.degrees, self.config.rotation_snap_tolerance_deg);
                self.model.rotate_image(p.id, degrees)?;
                Ok(json!({ "rotation": degrees }))
            }
            "delete_image" => {
                let p: IdParams = params(raw)?;
                let removed = self.delete_image(p.id)?;
                Ok(json!({ "deleted": removed.id }))
            }
            "select_image" => {
                let p: SelectImageParams = params(raw)?;
                self.model.select_image(p.id)?;
                Ok(ok())
            }
            "add_layer" => {
                let id = self.model.add_layer();
                Ok(json!({ "id": id }))
            }
            "delete_layer" => {
                let p: IdParams = params(raw)?;
                let removed = self.delete_layer(p.id)?;
                Ok(json!({ "deleted": removed.id }))
            }
            "reorder_layer" => {
                let p: ReorderParams = params(raw)?;
                let moved = self.model.reorder_layer(p.index, p.direction)?;
                Ok(json!({ "moved": moved }))
            }
            "toggle_layer_visibility" => {
                let p: IdParams = params(raw)?;
                let visible = self.model.toggle_layer_visibility(p.id)?;
                Ok(json!({ "visible": visible }))
            }
            "rename_layer" => {
                let p: RenameParams = params(raw)?;
                self.model.rename_layer(p.id, &p.name)?;
                Ok(ok())
            }
            "select_layer" => {
                let p: IdParams = params(raw)?;
                self.model.select_layer(p.id)?;
                Ok(ok())
            }
            "set_tool" => {
                let p: ToolParams = params(raw)?;
                let actions = self.set_tool(p.tool);
                Ok(json!({ "ok": true, "actions": actions }))
            }
            "set_brush" => {
                let brush: Brush = params(raw)?;
                self.set_brush(brush);
                Ok(ok())
            }
            "set_view_mode" => {
                let p: ViewModeParams = params(raw)?;
                self.set_view_mode(p.mode);
                Ok(ok())
            }
            "set_viewport" => {
                let vp: Viewport = params(raw)?;
                self.set_viewport(vp);
                Ok(json!({ "viewport": self.viewport }))
            }
            "set_area" => {
                let p: AreaParams = params(raw)?;
                self.set_area(p.bounds);
                Ok(ok())
            }
            "clear_area" => {
                self.clear_area();
                Ok(ok())
            }
            "dismiss_placeholder" => {
                let p: PlaceholderParams = params(raw)?;
                self.dismiss_placeholder(&p.id)?;
                Ok(ok())
            }
            "get_state" => Ok(serde_json::to_value(self.state_view())?),
            other => Err(CanvasError::UnknownCommand(other.to_string())),
        }
    }

    fn state_view(&self) -> StateView<'_> {
        StateView {
            layers: self.model.layers(),
            selected_layer_id: self.model.selected_layer_id(),
            selected_image_id: self.model.selected_image().map(|i| i.id),
            tool: self.tool,
            brush: &self.brush,
            view_mode: self.view_mode,
            viewport: self.viewport,
            area: self.area.as_ref(),
            placeholders: self.jobs.placeholders(),
            gesture: self.gesture.state.name(),
            can_undo: self.history.can_undo(),
            can_redo: self.history.can_redo(),
        }
    }
}

#[wasm_bindgen]
impl CanvasEngine {
    pub fn execute_command(&mut self, cmd_json: &str) -> String {
        let reply = self.core.execute_command(cmd_json);
        self.emit_events();
        reply
    }
}
