use serde::{Serialize, Deserialize};
use crate::error::{CanvasError, Result};
use crate::geometry::{clamp_min_size, normalize_degrees};
use crate::objects::{Layer, LayerImage};
use crate::types::Bounds;

#[derive(Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Debug)]
#[serde(rename_all = "lowercase")]
pub enum LayerDirection {
    Up,
    Down,
}

/// Layers and the images they own.
///
/// `layers[0]` is always the base layer. The rest are object layers in
/// z-order, bottom first. At most one image is selected across all layers.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct CanvasModel {
    layers: Vec<Layer>,
    next_id: u32,
    min_image_size: f64,
    #[serde(skip)]
    dirty: bool,
}

impl Default for CanvasModel {
    fn default() -> Self {
        CanvasModel::new(20.0)
    }
}

impl CanvasModel {
    pub fn new(min_image_size: f64) -> Self {
        let base = Layer::new(1, "Background", true);
        let mut first = Layer::new(2, "Layer 1", false);
        first.selected = true;
        CanvasModel { layers: vec![base, first], next_id: 3, min_image_size, dirty: false }
    }

    /// Rebuild from persisted layers, repairing the base-layer invariant.
    pub fn from_layers(mut layers: Vec<Layer>, next_id: u32, min_image_size: f64) -> Self {
        let base_pos = layers.iter().position(|l| l.is_base_layer);
        match base_pos {
            Some(pos) => {
                let base = layers.remove(pos);
                layers.insert(0, base);
            }
            None => layers.insert(0, Layer::new(0, "Background", true)),
        }
        for l in layers.iter_mut().skip(1) {
            l.is_base_layer = false;
        }
        let max_id = layers
            .iter()
            .flat_map(|l| std::iter::once(l.id).chain(l.images.iter().map(|i| i.id)))
            .max()
            .unwrap_or(0);
        let mut model = CanvasModel { layers, next_id: next_id.max(max_id + 1), min_image_size, dirty: false };
        if model.layers.len() == 1 {
            model.add_layer();
            model.dirty = false;
        }
        if model.selected_layer_id().is_none() {
            let top = model.layers.last().map(|l| l.id);
            if let Some(id) = top {
                model.select_layer(id).ok();
            }
        }
        let selected: Vec<u32> = model.all_images().filter(|i| i.selected).map(|i| i.id).collect();
        if selected.len() > 1 {
            model.select_image(selected.last().copied()).ok();
        }
        model.dirty = false;
        model
    }

    pub fn layers(&self) -> &[Layer] { &self.layers }
    pub fn next_id(&self) -> u32 { self.next_id }
    pub fn min_image_size(&self) -> f64 { self.min_image_size }

    pub fn base_layer(&self) -> &Layer { &self.layers[0] }

    pub fn layer(&self, id: u32) -> Option<&Layer> {
        self.layers.iter().find(|l| l.id == id)
    }

    pub fn selected_layer_id(&self) -> Option<u32> {
        self.layers.iter().find(|l| l.selected).map(|l| l.id)
    }

    pub fn all_images(&self) -> impl Iterator<Item = &LayerImage> {
        self.layers.iter().flat_map(|l| l.images.iter())
    }

    pub fn image(&self, id: u32) -> Option<&LayerImage> {
        self.all_images().find(|i| i.id == id)
    }

    fn image_mut(&mut self, id: u32) -> Result<&mut LayerImage> {
        self.layers
            .iter_mut()
            .flat_map(|l| l.images.iter_mut())
            .find(|i| i.id == id)
            .ok_or(CanvasError::ImageNotFound(id))
    }

    pub fn layer_of_image(&self, id: u32) -> Option<u32> {
        self.layers.iter().find(|l| l.images.iter().any(|i| i.id == id)).map(|l| l.id)
    }

    pub fn selected_image(&self) -> Option<&LayerImage> {
        self.all_images().find(|i| i.selected)
    }

    pub fn find_image_by_source(&self, source: &str) -> Option<&LayerImage> {
        self.all_images().find(|i| i.source == source)
    }

    /// Visible layers in composite order, base layer first.
    pub fn render_order(&self) -> impl Iterator<Item = &Layer> {
        self.layers.iter().filter(|l| l.visible)
    }

    pub fn is_dirty(&self) -> bool { self.dirty }
    pub fn mark_dirty(&mut self) { self.dirty = true; }

    pub fn take_dirty(&mut self) -> bool {
        std::mem::replace(&mut self.dirty, false)
    }

    fn alloc_id(&mut self) -> u32 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    // --- Images ---

    pub fn add_image(&mut self, layer_id: u32, source: &str, bounds: Bounds) -> Result<u32> {
        let idx = self.layers.iter().position(|l| l.id == layer_id).ok_or(CanvasError::LayerNotFound(layer_id))?;
        if self.layers[idx].is_base_layer {
            return Err(CanvasError::BaseLayerProtected);
        }
        let id = self.alloc_id();
        let b = clamp_min_size(&bounds, self.min_image_size);
        self.layers[idx].images.push(LayerImage {
            id,
            name: format!("Image {}", id),
            source: source.to_string(),
            x: b.x,
            y: b.y,
            width: b.width,
            height: b.height,
            rotation: 0.0,
            selected: false,
            base_box: b,
            source_job: None,
        });
        self.dirty = true;
        Ok(id)
    }

    pub fn set_image_job(&mut self, id: u32, job_id: &str) -> Result<()> {
        self.image_mut(id)?.source_job = Some(job_id.to_string());
        self.dirty = true;
        Ok(())
    }

    pub fn move_image(&mut self, id: u32, dx: f64, dy: f64) -> Result<()> {
        let img = self.image_mut(id)?;
        let b = img.bounds().translate(dx, dy);
        img.set_bounds(b);
        img.base_box = img.base_box.translate(dx, dy);
        self.dirty = true;
        Ok(())
    }

    pub fn resize_image(&mut self, id: u32, bounds: Bounds) -> Result<()> {
        let min = self.min_image_size;
        let img = self.image_mut(id)?;
        img.set_bounds(clamp_min_size(&bounds, min));
        self.dirty = true;
        Ok(())
    }

    /// Put an image back exactly as it was (gesture cancel).
    pub(crate) fn restore_image(&mut self, snapshot: &LayerImage) -> Result<()> {
        let img = self.image_mut(snapshot.id)?;
        img.set_bounds(snapshot.bounds());
        img.rotation = snapshot.rotation;
        img.base_box = snapshot.base_box;
        self.dirty = true;
        Ok(())
    }

    pub fn rotate_image(&mut self, id: u32, degrees: f64) -> Result<()> {
        self.image_mut(id)?.rotation = normalize_degrees(degrees);
        self.dirty = true;
        Ok(())
    }

    pub fn delete_image(&mut self, id: u32) -> Result<LayerImage> {
        for layer in &mut self.layers {
            if let Some(pos) = layer.images.iter().position(|i| i.id == id) {
                self.dirty = true;
                return Ok(layer.images.remove(pos));
            }
        }
        Err(CanvasError::ImageNotFound(id))
    }

    /// Select one image (or none), deselecting every other image on every layer.
    pub fn select_image(&mut self, id: Option<u32>) -> Result<()> {
        let owner = match id {
            Some(id) => Some(self.layer_of_image(id).ok_or(CanvasError::ImageNotFound(id))?),
            None => None,
        };
        for img in self.layers.iter_mut().flat_map(|l| l.images.iter_mut()) {
            img.selected = Some(img.id) == id;
        }
        if let Some(layer_id) = owner {
            for l in &mut self.layers {
                l.selected = l.id == layer_id;
            }
        }
        self.dirty = true;
        Ok(())
    }

    // --- Layers ---

    pub fn add_layer(&mut self) -> u32 {
        let id = self.alloc_id();
        let count = self.layers.len();
        let mut layer = Layer::new(id, &format!("Layer {}", count), false);
        layer.selected = true;
        for l in &mut self.layers {
            l.selected = false;
        }
        self.layers.push(layer);
        self.dirty = true;
        id
    }

    pub fn delete_layer(&mut self, id: u32) -> Result<Layer> {
        let idx = self.layers.iter().position(|l| l.id == id).ok_or(CanvasError::LayerNotFound(id))?;
        if self.layers[idx].is_base_layer {
            return Err(CanvasError::BaseLayerProtected);
        }
        if self.layers.len() <= 2 {
            return Err(CanvasError::LastLayer);
        }
        let removed = self.layers.remove(idx);
        if removed.selected {
            if let Some(top) = self.layers.last_mut() {
                top.selected = true;
            }
        }
        self.dirty = true;
        Ok(removed)
    }

    /// Swap the layer at `index` with its neighbour. Nothing moves into or out of slot 0.
    pub fn reorder_layer(&mut self, index: usize, direction: LayerDirection) -> Result<bool> {
        if index >= self.layers.len() {
            return Ok(false);
        }
        if index == 0 {
            return Err(CanvasError::BaseLayerProtected);
        }
        let target = match direction {
            LayerDirection::Up => index + 1,
            LayerDirection::Down => index - 1,
        };
        if target == 0 || target >= self.layers.len() {
            return Ok(false);
        }
        self.layers.swap(index, target);
        self.dirty = true;
        Ok(true)
    }

    pub fn toggle_layer_visibility(&mut self, id: u32) -> Result<bool> {
        let layer = self.layers.iter_mut().find(|l| l.id == id).ok_or(CanvasError::LayerNotFound(id))?;
        layer.visible = !layer.visible;
        let visible = layer.visible;
        self.dirty = true;
        Ok(visible)
    }

    pub fn rename_layer(&mut self, id: u32, name: &str) -> Result<()> {
        let layer = self.layers.iter_mut().find(|l| l.id == id).ok_or(CanvasError::LayerNotFound(id))?;
        layer.name = name.to_string();
        self.dirty = true;
        Ok(())
    }

    pub fn select_layer(&mut self, id: u32) -> Result<()> {
        if !self.layers.iter().any(|l| l.id == id) {
            return Err(CanvasError::LayerNotFound(id));
        }
        for l in &mut self.layers {
            l.selected = l.id == id;
            if l.id != id {
                for img in &mut l.images {
                    img.selected = false;
                }
            }
        }
        self.dirty = true;
        Ok(())
    }

    /// Layer that generated results land on: the selected object layer, else the topmost one.
    pub fn ensure_target_layer(&mut self) -> u32 {
        if let Some(l) = self.layers.iter().find(|l| l.selected && !l.is_base_layer) {
            return l.id;
        }
        if let Some(l) = self.layers.iter().rev().find(|l| !l.is_base_layer) {
            return l.id;
        }
        let id = self.alloc_id();
        self.layers.push(Layer::new(id, "Generated", false));
        self.dirty = true;
        id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn model_with_images() -> (CanvasModel, u32, u32, u32) {
        let mut m = CanvasModel::default();
        let l1 = m.selected_layer_id().unwrap();
        let l2 = m.add_layer();
        let a = m.add_image(l1, "a.png", Bounds::new(0.0, 0.0, 100.0, 100.0)).unwrap();
        let b = m.add_image(l2, "b.png", Bounds::new(50.0, 50.0, 100.0, 100.0)).unwrap();
        let c = m.add_image(l2, "c.png", Bounds::new(90.0, 90.0, 10.0, 10.0)).unwrap();
        (m, a, b, c)
    }

    #[test]
    fn at_most_one_image_selected() {
        let (mut m, a, b, c) = model_with_images();
        for id in [a, b, c, a, c, b, b] {
            m.select_image(Some(id)).unwrap();
            assert_eq!(m.all_images().filter(|i| i.selected).count(), 1);
            assert_eq!(m.selected_image().map(|i| i.id), Some(id));
        }
        m.select_image(None).unwrap();
        assert_eq!(m.all_images().filter(|i| i.selected).count(), 0);
    }

    #[test]
    fn selecting_image_selects_its_layer() {
        let (mut m, a, _, _) = model_with_images();
        m.select_image(Some(a)).unwrap();
        assert_eq!(m.selected_layer_id(), m.layer_of_image(a));
    }

    #[test]
    fn add_image_clamps_to_min_size_and_rejects_base() {
        let (m, _, _, c) = model_with_images();
        let img = m.image(c).unwrap();
        assert_eq!((img.width, img.height), (20.0, 20.0));

        let mut m = CanvasModel::default();
        let base = m.base_layer().id;
        assert!(matches!(m.add_image(base, "x", Bounds::new(0.0, 0.0, 50.0, 50.0)), Err(CanvasError::BaseLayerProtected)));
    }

    #[test]
    fn base_and_last_layer_cannot_be_deleted() {
        let mut m = CanvasModel::default();
        let base = m.base_layer().id;
        let only = m.selected_layer_id().unwrap();
        let err = m.delete_layer(base).unwrap_err();
        assert!(err.is_invariant_violation());
        assert!(matches!(m.delete_layer(only), Err(CanvasError::LastLayer)));
        assert_eq!(m.layers().len(), 2);

        let extra = m.add_layer();
        m.delete_layer(extra).unwrap();
        assert_eq!(m.layers().len(), 2);
        assert!(m.selected_layer_id().is_some());
    }

    #[test]
    fn reorder_never_touches_base_slot() {
        let mut m = CanvasModel::default();
        let l2 = m.add_layer();
        assert!(matches!(m.reorder_layer(0, LayerDirection::Up), Err(CanvasError::BaseLayerProtected)));
        assert!(!m.reorder_layer(1, LayerDirection::Down).unwrap());
        assert!(m.reorder_layer(2, LayerDirection::Down).unwrap());
        assert_eq!(m.layers()[1].id, l2);
        assert!(m.layers()[0].is_base_layer);
        assert!(!m.reorder_layer(9, LayerDirection::Up).unwrap());
    }

    #[test]
    fn render_order_puts_base_first_and_skips_hidden() {
        let (mut m, _, _, _) = model_with_images();
        let l1 = m.layers()[1].id;
        m.toggle_layer_visibility(l1).unwrap();
        let order: Vec<u32> = m.render_order().map(|l| l.id).collect();
        assert_eq!(order[0], m.base_layer().id);
        assert!(!order.contains(&l1));
    }

    #[test]
    fn move_translates_base_box_and_marks_dirty() {
        let (mut m, a, _, _) = model_with_images();
        m.take_dirty();
        m.move_image(a, 10.0, -5.0).unwrap();
        let img = m.image(a).unwrap();
        assert_eq!(img.bounds(), Bounds::new(10.0, -5.0, 100.0, 100.0));
        assert_eq!(img.base_box, img.bounds());
        assert!(m.take_dirty());
        assert!(!m.is_dirty());
    }

    #[test]
    fn from_layers_repairs_missing_base_and_double_selection() {
        let mut l = Layer::new(7, "Loose", false);
        for id in [8, 9] {
            let b = Bounds::new(0.0, 0.0, 40.0, 40.0);
            l.images.push(LayerImage {
                id, name: String::new(), source: format!("{}.png", id), x: 0.0, y: 0.0, width: 40.0, height: 40.0,
                rotation: 0.0, selected: true, base_box: b, source_job: None,
            });
        }
        let m = CanvasModel::from_layers(vec![l], 1, 20.0);
        assert!(m.layers()[0].is_base_layer);
        assert_eq!(m.all_images().filter(|i| i.selected).count(), 1);
        assert!(m.next_id() > 9);
    }

    #[test]
    fn target_layer_prefers_selected_object_layer() {
        let mut m = CanvasModel::default();
        let l1 = m.selected_layer_id().unwrap();
        assert_eq!(m.ensure_target_layer(), l1);
        let base = m.base_layer().id;
        m.select_layer(base).unwrap();
        assert_eq!(m.ensure_target_layer(), l1);
    }
}
