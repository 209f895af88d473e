use std::io::Cursor;
use base64::{Engine as _, engine::general_purpose};
use image::{imageops, imageops::FilterType, DynamicImage, ImageOutputFormat, RgbaImage};
use crate::error::{CanvasError, Result};
use crate::types::Bounds;

pub fn is_data_url(source: &str) -> bool {
    source.starts_with("data:")
}

pub fn decode_data_url(url: &str) -> Result<DynamicImage> {
    let payload = url
        .strip_prefix("data:")
        .and_then(|rest| rest.split_once(";base64,"))
        .map(|(_, data)| data)
        .ok_or_else(|| CanvasError::DataIntegrity { reference: truncate(url) })?;
    let bytes = general_purpose::STANDARD
        .decode(payload.trim())
        .map_err(|_| CanvasError::DataIntegrity { reference: truncate(url) })?;
    Ok(image::load_from_memory(&bytes)?)
}

pub fn encode_png(img: &DynamicImage) -> Result<Vec<u8>> {
    let mut png_bytes: Vec<u8> = Vec::new();
    img.write_to(&mut Cursor::new(&mut png_bytes), ImageOutputFormat::Png)?;
    Ok(png_bytes)
}

pub fn png_data_url(png_bytes: &[u8]) -> String {
    format!("data:image/png;base64,{}", general_purpose::STANDARD.encode(png_bytes))
}

/// Shrink so the longer side is at most `max_dim`; smaller images pass through.
pub fn downscale_to(img: DynamicImage, max_dim: u32) -> DynamicImage {
    if img.width().max(img.height()) <= max_dim {
        return img;
    }
    img.resize(max_dim, max_dim, FilterType::Triangle)
}

/// Base raster with overlays drawn into their boxes, scaled down to fit `size`.
///
/// Each overlay is cropped to the part of its box inside the canvas and
/// resized straight to thumbnail scale, so box size does not bound the work.
pub fn compose_thumbnail(base: &RgbaImage, overlays: &[(DynamicImage, Bounds)], size: u32) -> RgbaImage {
    let (w, h) = (base.width().max(1), base.height().max(1));
    let ratio = (size as f64 / w as f64).min(size as f64 / h as f64);
    let tw = ((w as f64 * ratio).round() as u32).max(1);
    let th = ((h as f64 * ratio).round() as u32).max(1);
    let mut thumb = imageops::thumbnail(base, tw, th);
    let (sx, sy) = (tw as f64 / w as f64, th as f64 / h as f64);
    let canvas = Bounds::new(0.0, 0.0, w as f64, h as f64);

    for (img, b) in overlays {
        if b.width < 1.0 || b.height < 1.0 {
            continue;
        }
        let Some(visible) = b.intersection(&canvas) else { continue };
        let (iw, ih) = (img.width() as f64, img.height() as f64);
        let cx = ((visible.x - b.x) / b.width * iw).floor();
        let cy = ((visible.y - b.y) / b.height * ih).floor();
        let cw = (visible.width / b.width * iw).ceil().max(1.0);
        let ch = (visible.height / b.height * ih).ceil().max(1.0);
        let crop = img.crop_imm(cx as u32, cy as u32, cw as u32, ch as u32);
        if crop.width() == 0 || crop.height() == 0 {
            continue;
        }
        let dw = ((visible.width * sx).round() as u32).max(1);
        let dh = ((visible.height * sy).round() as u32).max(1);
        let scaled = crop.resize_exact(dw, dh, FilterType::Triangle).to_rgba8();
        imageops::overlay(&mut thumb, &scaled, (visible.x * sx).round() as i64, (visible.y * sy).round() as i64);
    }
    thumb
}

fn truncate(s: &str) -> String {
    s.chars().take(48).collect()
}
