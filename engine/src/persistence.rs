//! Saving and restoring a canvas session through a key-value store.
//!
//! Layers are stored with image references, never inline pixels: inline
//! sources are downscaled, re-encoded and moved into an [`ImageStore`].

use std::collections::HashMap;
use serde::{Serialize, Deserialize};
use image::{DynamicImage, RgbaImage};
use crate::config::EngineConfig;
use crate::error::{CanvasError, Result};
use crate::image_ops;
use crate::model::CanvasModel;
use crate::objects::{AreaSelection, Layer, Placeholder};
use crate::types::ViewMode;
use crate::viewport::Viewport;

pub const SESSION_VERSION: u32 = 1;
pub const STORE_PREFIX: &str = "store:";

pub trait KeyValueStore {
    fn get(&self, key: &str) -> Result<Option<String>>;
    fn put(&mut self, key: &str, value: String) -> Result<()>;
    fn delete(&mut self, key: &str) -> Result<()>;
}

pub trait ImageStore {
    /// Store encoded image bytes and return a durable reference.
    fn put_image(&mut self, bytes: Vec<u8>) -> Result<String>;
    fn get_image(&self, reference: &str) -> Option<Vec<u8>>;
}

#[derive(Default, Debug)]
pub struct MemoryStore {
    entries: HashMap<String, String>,
    quota_bytes: Option<usize>,
}

impl MemoryStore {
    pub fn new() -> Self {
        MemoryStore::default()
    }

    pub fn with_quota(quota_bytes: usize) -> Self {
        MemoryStore { entries: HashMap::new(), quota_bytes: Some(quota_bytes) }
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.entries.get(key).cloned())
    }

    fn put(&mut self, key: &str, value: String) -> Result<()> {
        if let Some(quota) = self.quota_bytes {
            let used: usize = self.entries.iter().filter(|(k, _)| k.as_str() != key).map(|(_, v)| v.len()).sum();
            if used + value.len() > quota {
                return Err(CanvasError::Storage(format!("quota of {} bytes exceeded", quota)));
            }
        }
        self.entries.insert(key.to_string(), value);
        Ok(())
    }

    fn delete(&mut self, key: &str) -> Result<()> {
        self.entries.remove(key);
        Ok(())
    }
}

/// Content-addressed in-memory image store.
#[derive(Default, Debug)]
pub struct MemoryImageStore {
    images: HashMap<String, Vec<u8>>,
}

impl MemoryImageStore {
    pub fn new() -> Self {
        MemoryImageStore::default()
    }

    pub fn len(&self) -> usize { self.images.len() }
    pub fn is_empty(&self) -> bool { self.images.is_empty() }

    pub fn remove(&mut self, reference: &str) -> bool {
        self.images.remove(reference).is_some()
    }
}

impl ImageStore for MemoryImageStore {
    fn put_image(&mut self, bytes: Vec<u8>) -> Result<String> {
        let reference = content_reference(&bytes);
        self.images.entry(reference.clone()).or_insert(bytes);
        Ok(reference)
    }

    fn get_image(&self, reference: &str) -> Option<Vec<u8>> {
        self.images.get(reference).cloned()
    }
}

/// `store:` reference derived from the bytes, so saving the same image twice reuses one entry.
///
/// Every debounced save re-stores every image, so keys must depend only on
/// content or `localStorage` fills up with copies.
pub fn content_reference(bytes: &[u8]) -> String {
    format!("{}{:016x}", STORE_PREFIX, fnv1a(bytes))
}

fn fnv1a(bytes: &[u8]) -> u64 {
    bytes.iter().fold(0xcbf29ce484222325u64, |h, b| (h ^ *b as u64).wrapping_mul(0x100000001b3))
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct SessionDocument {
    pub version: u32,
    pub canvas_width: u32,
    pub canvas_height: u32,
    pub layers: Vec<Layer>,
    pub next_id: u32,
    pub base_raster: Option<String>,
    pub viewport: Viewport,
    #[serde(default)]
    pub view_mode: ViewMode,
    #[serde(default)]
    pub area: Option<AreaSelection>,
    #[serde(default)]
    pub placeholders: Vec<Placeholder>,
    #[serde(default)]
    pub deleted_results: Vec<String>,
    #[serde(default)]
    pub thumbnail: Option<String>,
}

/// Borrowed view of everything that goes into a save.
pub struct SessionSnapshot<'a> {
    pub model: &'a CanvasModel,
    pub base: &'a RgbaImage,
    pub viewport: Viewport,
    pub view_mode: ViewMode,
    pub area: Option<&'a AreaSelection>,
    pub placeholders: &'a [Placeholder],
    pub deleted_results: Vec<String>,
}

pub struct RestoredSession {
    pub model: CanvasModel,
    pub base: RgbaImage,
    pub viewport: Viewport,
    pub view_mode: ViewMode,
    pub area: Option<AreaSelection>,
    pub placeholders: Vec<Placeholder>,
    pub deleted_results: Vec<String>,
    /// References that could not be resolved and were left out.
    pub dropped: Vec<String>,
}

pub fn serialize_session(snapshot: &SessionSnapshot, images: &mut dyn ImageStore, config: &EngineConfig) -> Result<String> {
    let mut layers: Vec<Layer> = snapshot.model.layers().to_vec();
    let mut overlays: Vec<(DynamicImage, crate::types::Bounds)> = Vec::new();

    for layer in &mut layers {
        for img in &mut layer.images {
            if !image_ops::is_data_url(&img.source) {
                continue;
            }
            match image_ops::decode_data_url(&img.source) {
                Ok(decoded) => {
                    let stored = image_ops::downscale_to(decoded, config.max_stored_image_dim);
                    img.source = images.put_image(image_ops::encode_png(&stored)?)?;
                    if layer.visible {
                        overlays.push((stored, img.bounds()));
                    }
                }
                Err(e) => log::warn!("image {} has an undecodable inline source: {}", img.id, e),
            }
        }
    }

    let base_png = image_ops::encode_png(&DynamicImage::ImageRgba8(snapshot.base.clone()))?;
    let base_raster = Some(images.put_image(base_png)?);

    let thumb = image_ops::compose_thumbnail(snapshot.base, &overlays, config.thumbnail_size);
    let thumbnail = Some(image_ops::png_data_url(&image_ops::encode_png(&DynamicImage::ImageRgba8(thumb))?));

    let doc = SessionDocument {
        version: SESSION_VERSION,
        canvas_width: snapshot.base.width(),
        canvas_height: snapshot.base.height(),
        layers,
        next_id: snapshot.model.next_id(),
        base_raster,
        viewport: snapshot.viewport,
        view_mode: snapshot.view_mode,
        area: snapshot.area.cloned(),
        placeholders: snapshot.placeholders.to_vec(),
        deleted_results: snapshot.deleted_results.clone(),
        thumbnail,
    };
    Ok(serde_json::to_string(&doc)?)
}

/// Turn a stored reference back into something the shell can display.
fn resolve_reference(source: &str, images: &dyn ImageStore) -> Option<String> {
    if source.starts_with(STORE_PREFIX) {
        images.get_image(source).map(|bytes| image_ops::png_data_url(&bytes))
    } else if image_ops::is_data_url(source) || source.starts_with("http://") || source.starts_with("https://") {
        Some(source.to_string())
    } else {
        None
    }
}

pub fn deserialize_session(blob: &str, images: &dyn ImageStore, config: &EngineConfig) -> Result<RestoredSession> {
    let doc: SessionDocument = serde_json::from_str(blob)?;
    let mut dropped = Vec::new();

    let mut layers = doc.layers;
    for layer in &mut layers {
        layer.images.retain_mut(|img| match resolve_reference(&img.source, images) {
            Some(resolved) => {
                img.source = resolved;
                true
            }
            None => {
                log::warn!("dropping image {}: unresolvable reference {}", img.id, img.source);
                dropped.push(img.source.clone());
                false
            }
        });
    }

    let blank = || RgbaImage::new(doc.canvas_width.max(1), doc.canvas_height.max(1));
    let base = match doc.base_raster.as_deref() {
        Some(reference) => match images.get_image(reference).map(|b| image::load_from_memory(&b)) {
            Some(Ok(img)) => img.to_rgba8(),
            _ => {
                log::warn!("base raster {} missing, starting blank", reference);
                dropped.push(reference.to_string());
                blank()
            }
        },
        None => blank(),
    };

    Ok(RestoredSession {
        model: CanvasModel::from_layers(layers, doc.next_id, config.min_image_size),
        base,
        viewport: doc.viewport,
        view_mode: doc.view_mode,
        area: doc.area,
        placeholders: doc.placeholders,
        deleted_results: doc.deleted_results,
        dropped,
    })
}

/// Debounced write timer: a save is due once the model has been idle long enough.
#[derive(Clone, Debug)]
pub struct PersistScheduler {
    debounce_ms: f64,
    dirty_since: Option<f64>,
}

impl PersistScheduler {
    pub fn new(debounce_ms: f64) -> Self {
        PersistScheduler { debounce_ms, dirty_since: None }
    }

    /// Every change restarts the idle timer.
    pub fn mark_dirty(&mut self, now_ms: f64) {
        self.dirty_since = Some(now_ms);
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty_since.is_some()
    }

    pub fn due(&self, now_ms: f64) -> bool {
        self.dirty_since.is_some_and(|t| now_ms - t >= self.debounce_ms)
    }

    pub fn clear(&mut self) {
        self.dirty_since = None;
    }
}
