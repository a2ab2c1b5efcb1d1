use std::fs;
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use eframe::egui::{Color32, ColorImage};
use image::{DynamicImage, ImageFormat};

pub const PREVIEW_MAX_DIM: u32 = 320;

/// An image exactly as it will be uploaded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceFile {
    pub name: String,
    pub mime: String,
    pub bytes: Arc<[u8]>,
}

#[derive(Clone)]
pub struct LoadedImage {
    pub preview: ColorImage,
    pub source: SourceFile,
}

pub fn load_slot_image(path: &Path) -> Result<LoadedImage> {
    let bytes = fs::read(path).with_context(|| format!("Could not read {}", path.display()))?;
    let name = path
        .file_name()
        .map(|name| name.to_string_lossy().to_string())
        .unwrap_or_else(|| "image".to_string());
    decode_slot_image(name, bytes)
}

pub fn decode_slot_image(name: String, bytes: Vec<u8>) -> Result<LoadedImage> {
    let format = image::guess_format(&bytes)
        .or_else(|_| ImageFormat::from_path(&name))
        .with_context(|| format!("Could not determine image format of {name}"))?;
    let decoded = image::load_from_memory_with_format(&bytes, format)
        .with_context(|| format!("Could not decode {name}"))?;

    Ok(LoadedImage {
        preview: render_thumbnail(&decoded, PREVIEW_MAX_DIM),
        source: SourceFile {
            name,
            mime: format.to_mime_type().to_string(),
            bytes: bytes.into(),
        },
    })
}

pub fn render_thumbnail(image: &DynamicImage, max_dim: u32) -> ColorImage {
    let scaled = if image.width() > max_dim || image.height() > max_dim {
        image.thumbnail(max_dim, max_dim)
    } else {
        image.clone()
    };
    let rgba = scaled.to_rgba8();
    let width_px = rgba.width() as usize;
    let height_px = rgba.height() as usize;

    let pixels = rgba
        .pixels()
        .map(|pixel| {
            let [r, g, b, a] = pixel.0;
            Color32::from_rgba_unmultiplied(r, g, b, a)
        })
        .collect::<Vec<_>>();

    ColorImage {
        size: [width_px, height_px],
        pixels,
    }
}
