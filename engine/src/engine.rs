use wasm_bindgen::prelude::*;
use std::collections::HashMap;
use base64::{Engine as _, engine::general_purpose};
use serde::Serialize;
use web_sys::{HtmlCanvasElement, HtmlImageElement, Storage};
use crate::config::EngineConfig;
use crate::error::{CanvasError, Result};
use crate::input::{InputAction, PointerEvent};
use crate::jobs::SubmitResponse;
use crate::persistence::{content_reference, ImageStore, KeyValueStore, MemoryImageStore, MemoryStore, STORE_PREFIX};
use crate::studio::CanvasCore;
use crate::types::{Bounds, PointerSource};

const IMAGE_KEY_PREFIX: &str = "canvas-img:";

/// Key-value and image store over `window.localStorage`.
pub struct WebStorage {
    storage: Storage,
}

impl WebStorage {
    pub fn local() -> Option<WebStorage> {
        let storage = web_sys::window()?.local_storage().ok()??;
        Some(WebStorage { storage })
    }
}

fn image_key(reference: &str) -> Option<String> {
    reference.strip_prefix(STORE_PREFIX).map(|k| format!("{}{}", IMAGE_KEY_PREFIX, k))
}

fn storage_error(e: JsValue) -> CanvasError {
    CanvasError::Storage(e.as_string().unwrap_or_else(|| format!("{:?}", e)))
}

impl KeyValueStore for WebStorage {
    fn get(&self, key: &str) -> Result<Option<String>> {
        self.storage.get_item(key).map_err(storage_error)
    }

    fn put(&mut self, key: &str, value: String) -> Result<()> {
        self.storage.set_item(key, &value).map_err(storage_error)
    }

    fn delete(&mut self, key: &str) -> Result<()> {
        self.storage.remove_item(key).map_err(storage_error)
    }
}

impl ImageStore for WebStorage {
    fn put_image(&mut self, bytes: Vec<u8>) -> Result<String> {
        let reference = content_reference(&bytes);
        let key = image_key(&reference).ok_or_else(|| CanvasError::Storage(reference.clone()))?;
        if self.storage.get_item(&key).map_err(storage_error)?.is_none() {
            self.storage
                .set_item(&key, &general_purpose::STANDARD.encode(&bytes))
                .map_err(storage_error)?;
        }
        Ok(reference)
    }

    fn get_image(&self, reference: &str) -> Option<Vec<u8>> {
        let key = image_key(reference)?;
        let encoded = self.storage.get_item(&key).ok()??;
        general_purpose::STANDARD.decode(encoded).ok()
    }
}

#[wasm_bindgen]
pub struct CanvasEngine {
    pub(crate) core: CanvasCore,
    pub(crate) store: Box<dyn KeyValueStore>,
    pub(crate) images: Box<dyn ImageStore>,
    pub(crate) image_elements: HashMap<String, HtmlImageElement>,
    pub(crate) base_canvas: Option<HtmlCanvasElement>,
    pub(crate) base_drawn_revision: Option<u64>,
    pub(crate) placeholder_callback: Option<js_sys::Function>,
}

fn to_json<T: Serialize>(value: &T) -> String {
    serde_json::to_string(value).unwrap_or_else(|e| CanvasError::from(e).to_json())
}

fn parse_source(source: &str) -> PointerSource {
    match source {
        "touch" => PointerSource::Touch,
        "pen" => PointerSource::Pen,
        _ => PointerSource::Mouse,
    }
}

impl CanvasEngine {
    fn build(config: EngineConfig) -> Result<CanvasEngine> {
        crate::init_logging();
        let core = CanvasCore::new(config)?;
        let (store, images): (Box<dyn KeyValueStore>, Box<dyn ImageStore>) = match (WebStorage::local(), WebStorage::local()) {
            (Some(kv), Some(img)) => (Box::new(kv), Box::new(img)),
            _ => {
                log::warn!("localStorage unavailable, session will not survive a reload");
                (Box::new(MemoryStore::new()), Box::new(MemoryImageStore::new()))
            }
        };
        Ok(CanvasEngine {
            core,
            store,
            images,
            image_elements: HashMap::new(),
            base_canvas: None,
            base_drawn_revision: None,
            placeholder_callback: None,
        })
    }

    /// Forward queued placeholder events to the subscribed callback.
    pub(crate) fn emit_events(&mut self) {
        let events = self.core.drain_events();
        let Some(callback) = &self.placeholder_callback else { return };
        for event in events {
            match serde_wasm_bindgen::to_value(&event) {
                Ok(value) => {
                    if let Err(e) = callback.call1(&JsValue::NULL, &value) {
                        log::warn!("placeholder callback threw: {:?}", e);
                    }
                }
                Err(e) => log::warn!("could not encode placeholder event: {}", e),
            }
        }
    }

    fn pointer(pointer_id: i32, x: f64, y: f64, source: &str, button: i16, pressure: f64) -> PointerEvent {
        PointerEvent { pointer_id, x, y, source: parse_source(source), button, pressure }
    }

    fn actions(actions: Vec<InputAction>) -> String {
        to_json(&actions)
    }
}

#[wasm_bindgen]
impl CanvasEngine {
    #[wasm_bindgen(constructor)]
    pub fn new() -> std::result::Result<CanvasEngine, JsValue> {
        CanvasEngine::build(EngineConfig::default()).map_err(|e| JsValue::from_str(&e.to_string()))
    }

    /// Construct with a partial JSON config; missing fields take defaults.
    pub fn with_config(config_json: &str) -> std::result::Result<CanvasEngine, JsValue> {
        EngineConfig::from_json(config_json)
            .and_then(CanvasEngine::build)
            .map_err(|e| JsValue::from_str(&e.to_string()))
    }

    // --- Input ---

    pub fn pointer_down(&mut self, pointer_id: i32, x: f64, y: f64, source: &str, button: i16, pressure: f64) -> String {
        let actions = self.core.pointer_down(Self::pointer(pointer_id, x, y, source, button, pressure));
        Self::actions(actions)
    }

    pub fn pointer_move(&mut self, pointer_id: i32, x: f64, y: f64, source: &str, pressure: f64) -> String {
        let actions = self.core.pointer_move(Self::pointer(pointer_id, x, y, source, 0, pressure));
        Self::actions(actions)
    }

    pub fn pointer_up(&mut self, pointer_id: i32, x: f64, y: f64, source: &str) -> String {
        let actions = self.core.pointer_up(Self::pointer(pointer_id, x, y, source, 0, 1.0));
        Self::actions(actions)
    }

    pub fn pointer_cancel(&mut self) -> String {
        let actions = self.core.pointer_cancel();
        Self::actions(actions)
    }

    // --- History ---

    pub fn undo(&mut self) -> bool {
        self.core.undo().unwrap_or_else(|e| {
            log::error!("undo failed: {}", e);
            false
        })
    }

    pub fn redo(&mut self) -> bool {
        self.core.redo().unwrap_or_else(|e| {
            log::error!("redo failed: {}", e);
            false
        })
    }

    pub fn can_undo(&self) -> bool {
        self.core.history().can_undo()
    }

    pub fn can_redo(&self) -> bool {
        self.core.history().can_redo()
    }

    // --- Generation ---

    /// Reserve a target and show a placeholder. `requested_json` is a box or empty for the default target.
    pub fn begin_submission(&mut self, requested_json: &str) -> String {
        let requested = if requested_json.trim().is_empty() || requested_json.trim() == "null" {
            None
        } else {
            match serde_json::from_str::<Bounds>(requested_json) {
                Ok(b) => Some(b),
                Err(e) => return CanvasError::from(e).to_json(),
            }
        };
        let submission = self.core.begin_submission(requested);
        self.emit_events();
        to_json(&submission)
    }

    pub fn complete_submission(&mut self, placeholder_id: &str, response: JsValue) -> String {
        let response: SubmitResponse = match serde_wasm_bindgen::from_value(response) {
            Ok(r) => r,
            Err(e) => {
                log::warn!("unparseable submit response for {}: {}", placeholder_id, e);
                SubmitResponse { success: false, error: Some("malformed response".into()), ..SubmitResponse::default() }
            }
        };
        let result = self.core.complete_submission(placeholder_id, &response);
        self.emit_events();
        match result {
            Ok(report) => to_json(&report),
            Err(e) => e.to_json(),
        }
    }

    pub fn fail_submission(&mut self, placeholder_id: &str, reason: &str) -> String {
        let result = self.core.fail_submission(placeholder_id, reason);
        self.emit_events();
        match result {
            Ok(report) => to_json(&report),
            Err(e) => e.to_json(),
        }
    }

    pub fn apply_poll(&mut self, jobs: JsValue, now_ms: f64) -> String {
        let raw: serde_json::Value = serde_wasm_bindgen::from_value(jobs).unwrap_or(serde_json::Value::Null);
        let report = self.core.apply_poll(&raw, now_ms);
        self.emit_events();
        to_json(&report)
    }

    pub fn poll_due(&self, now_ms: f64) -> bool {
        self.core.poll_due(now_ms)
    }

    pub fn set_placeholder_callback(&mut self, callback: Option<js_sys::Function>) {
        self.placeholder_callback = callback;
    }

    // --- Persistence ---

    pub fn tick(&mut self, now_ms: f64) -> String {
        let result = self.core.tick(now_ms, self.store.as_mut(), self.images.as_mut());
        match result {
            Ok(outcome) => to_json(&outcome),
            Err(e) => e.to_json(),
        }
    }

    /// Best-effort synchronous save for `pagehide`.
    pub fn flush(&mut self, now_ms: f64) -> String {
        match self.core.flush(now_ms, self.store.as_mut(), self.images.as_mut()) {
            Ok(saved) => to_json(&serde_json::json!({ "saved": saved })),
            Err(e) => e.to_json(),
        }
    }

    pub fn load(&mut self) -> String {
        let result = self.core.load(self.store.as_ref(), self.images.as_ref());
        self.base_drawn_revision = None;
        match result {
            Ok(Some(dropped)) => to_json(&serde_json::json!({ "loaded": true, "dropped": dropped })),
            Ok(None) => to_json(&serde_json::json!({ "loaded": false, "dropped": [] })),
            Err(e) => e.to_json(),
        }
    }

    // --- Rendering support ---

    /// Make a decoded `<img>` available to `render` under its source reference.
    pub fn register_image(&mut self, source: &str, element: HtmlImageElement) {
        self.image_elements.insert(source.to_string(), element);
    }

    pub fn unregister_image(&mut self, source: &str) {
        self.image_elements.remove(source);
    }

    pub fn render_list(&self) -> String {
        to_json(&self.core.render_list())
    }

    pub fn layout(&self, window_w: f64, window_h: f64) -> String {
        to_json(&self.core.layout(window_w, window_h))
    }

    pub fn fit_to_window(&mut self, window_w: f64, window_h: f64) -> String {
        to_json(&self.core.fit_to_window(window_w, window_h))
    }
}
