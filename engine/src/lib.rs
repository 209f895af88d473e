//! Layered canvas engine: images on object layers over a paintable base
//! layer, gesture handling, base-layer undo, session persistence and
//! reconciliation of server-side generation jobs.
//!
//! [`CanvasCore`] holds all behavior and runs natively. [`CanvasEngine`] is
//! the wasm-bindgen wrapper the browser shell talks to.

pub mod types;
pub mod config;
pub mod error;
pub mod geometry;
pub mod objects;
pub mod model;
pub mod history;
pub mod brush;
pub mod viewport;
pub mod input;
pub mod jobs;
pub mod image_ops;
pub mod persistence;
pub mod studio;
pub mod engine;
pub mod commands;
pub mod render;

pub use config::EngineConfig;
pub use engine::CanvasEngine;
pub use error::{CanvasError, Result};
pub use studio::CanvasCore;
pub use types::*;
pub use objects::*;

/// Route `log` output to the browser console and install the panic hook.
#[cfg(target_arch = "wasm32")]
pub fn init_logging() {
    console_error_panic_hook::set_once();
    // A second engine on the same page finds the logger already installed.
    if console_log::init_with_level(log::Level::Debug).is_err() {
        log::debug!("console logger already installed");
    }
}

#[cfg(not(target_arch = "wasm32"))]
pub fn init_logging() {}
