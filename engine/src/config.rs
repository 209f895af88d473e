use serde::{Serialize, Deserialize};

/// Tunables for the canvas engine. Thresholds are in canvas units and do not
/// scale with zoom.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct EngineConfig {
    pub canvas_width: u32,
    pub canvas_height: u32,
    pub history_cap: usize,
    pub min_image_size: f64,
    pub edge_snap_threshold: f64,
    pub size_snap_threshold: f64,
    pub rotation_snap_tolerance_deg: f64,
    pub handle_base_radius: f64,
    pub handle_min_radius: f64,
    pub rotate_handle_offset: f64,
    pub min_zoom: f64,
    pub max_zoom: f64,
    pub persist_debounce_ms: f64,
    pub poll_interval_ms: f64,
    pub thumbnail_size: u32,
    pub max_stored_image_dim: u32,
    pub placement_gap: f64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            canvas_width: 1024,
            canvas_height: 1024,
            history_cap: 50,
            min_image_size: 20.0,
            edge_snap_threshold: 80.0,
            size_snap_threshold: 12.0,
            rotation_snap_tolerance_deg: 5.0,
            handle_base_radius: 12.0,
            handle_min_radius: 8.0,
            rotate_handle_offset: 30.0,
            min_zoom: 0.1,
            max_zoom: 8.0,
            persist_debounce_ms: 1500.0,
            poll_interval_ms: 3500.0,
            thumbnail_size: 256,
            max_stored_image_dim: 2048,
            placement_gap: 24.0,
        }
    }
}

impl EngineConfig {
    pub fn from_json(json: &str) -> crate::Result<Self> {
        let config: EngineConfig = serde_json::from_str(json)?;
        Ok(config.sanitized())
    }

    /// Clamp nonsensical values instead of rejecting them.
    pub fn sanitized(mut self) -> Self {
        self.canvas_width = self.canvas_width.max(1);
        self.canvas_height = self.canvas_height.max(1);
        self.history_cap = self.history_cap.max(1);
        self.min_image_size = self.min_image_size.max(1.0);
        if self.max_zoom < self.min_zoom {
            std::mem::swap(&mut self.min_zoom, &mut self.max_zoom);
        }
        self.min_zoom = self.min_zoom.max(0.01);
        self.thumbnail_size = self.thumbnail_size.max(16);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_json_keeps_defaults() {
        let cfg = EngineConfig::from_json(r#"{"canvas_width": 512, "history_cap": 10}"#).unwrap();
        assert_eq!(cfg.canvas_width, 512);
        assert_eq!(cfg.history_cap, 10);
        assert_eq!(cfg.canvas_height, 1024);
        assert_eq!(cfg.edge_snap_threshold, 80.0);
    }

    #[test]
    fn sanitize_clamps_zero_cap_and_swapped_zoom() {
        let cfg = EngineConfig::from_json(r#"{"history_cap": 0, "min_zoom": 4.0, "max_zoom": 0.5}"#).unwrap();
        assert_eq!(cfg.history_cap, 1);
        assert_eq!(cfg.min_zoom, 0.5);
        assert_eq!(cfg.max_zoom, 4.0);
    }
}
