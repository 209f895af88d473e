use serde::{Serialize, Deserialize};
use crate::types::{AreaHandle, AreaMode, Bounds};

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct LayerImage {
    pub id: u32,
    pub name: String,
    /// URL, `data:` URL, or `store:` reference.
    pub source: String,
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
    pub rotation: f64, // in degrees
    pub selected: bool,
    /// Box before any resize; a resize landing close to it snaps back exactly.
    pub base_box: Bounds,
    /// Generation job that produced this image.
    #[serde(default)]
    pub source_job: Option<String>,
}

impl LayerImage {
    pub fn bounds(&self) -> Bounds {
        Bounds::new(self.x, self.y, self.width, self.height)
    }

    pub(crate) fn set_bounds(&mut self, b: Bounds) {
        self.x = b.x;
        self.y = b.y;
        self.width = b.width;
        self.height = b.height;
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Layer {
    pub id: u32,
    pub name: String,
    pub images: Vec<LayerImage>,
    pub is_base_layer: bool,
    pub visible: bool,
    pub selected: bool,
}

impl Layer {
    pub fn new(id: u32, name: &str, is_base_layer: bool) -> Self {
        Layer { id, name: name.to_string(), images: Vec::new(), is_base_layer, visible: true, selected: false }
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct AreaSelection {
    pub bounds: Bounds,
    pub mode: AreaMode,
    pub active_handle: Option<AreaHandle>,
}

impl AreaSelection {
    pub fn idle(bounds: Bounds) -> Self {
        AreaSelection { bounds, mode: AreaMode::Idle, active_handle: None }
    }
}

/// Local stand-in for a generation that has not landed yet.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Placeholder {
    pub id: String,
    pub target: Bounds,
    pub failed: bool,
    #[serde(default)]
    pub job_id: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}
