//! Frame handling shared by the capture loop and stream consumers.
//!
//! - `SharedFrame`: single-slot, lock-guarded cache of the latest annotated frame.
//! - `crop` / `vehicle_snapshot`: bounds-safe cropping and JPEG encoding.
//! - `draw_box` / `draw_roi_band`: operator overlay drawn onto output frames
//!   with `imageproc`, the band labelled when an overlay font is loaded.
//!
//! The slot has one writer (the capture loop) and any number of readers. Readers
//! always get a deep copy, so a slow consumer never holds the slot while the
//! writer replaces it.

use ab_glyph::{FontArc, PxScale};
use anyhow::{anyhow, Context, Result};
use image::codecs::jpeg::JpegEncoder;
use image::{imageops, Rgb, RgbImage};
use imageproc::drawing::{draw_hollow_rect_mut, draw_text_mut};
use imageproc::rect::Rect;
use std::path::Path;
use std::sync::{Arc, Mutex};

use crate::detect::BoundingBox;

pub const ROI_COLOR: Rgb<u8> = Rgb([255, 255, 0]);
pub const VEHICLE_COLOR: Rgb<u8> = Rgb([0, 255, 0]);
pub const TOKEN_COLOR: Rgb<u8> = Rgb([0, 255, 255]);
const LINE_THICKNESS: i32 = 2;
const ROI_LABEL: &str = "Detection Zone";
const ROI_LABEL_SIZE: f32 = 20.0;

// ----------------------------------------------------------------------------
// SharedFrame: latest-value slot
// ----------------------------------------------------------------------------

/// Most recent annotated frame. Clones share the same slot.
#[derive(Clone, Debug, Default)]
pub struct SharedFrame {
    slot: Arc<Mutex<Option<RgbImage>>>,
}

impl SharedFrame {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the slot contents.
    pub fn write(&self, frame: RgbImage) -> Result<()> {
        let mut slot = self
            .slot
            .lock()
            .map_err(|_| anyhow!("shared frame lock poisoned"))?;
        *slot = Some(frame);
        Ok(())
    }

    /// Deep copy of the latest frame, or `None` before the first write.
    pub fn read_copy(&self) -> Result<Option<RgbImage>> {
        let slot = self
            .slot
            .lock()
            .map_err(|_| anyhow!("shared frame lock poisoned"))?;
        Ok(slot.clone())
    }

    pub fn has_frame(&self) -> bool {
        self.slot.lock().map(|slot| slot.is_some()).unwrap_or(false)
    }

    /// Latest frame as JPEG bytes. Encoding happens outside the lock.
    pub fn read_jpeg(&self, quality: u8) -> Result<Option<Vec<u8>>> {
        match self.read_copy()? {
            Some(frame) => Ok(Some(encode_jpeg(&frame, quality)?)),
            None => Ok(None),
        }
    }
}

// ----------------------------------------------------------------------------
// Cropping and snapshots
// ----------------------------------------------------------------------------

/// Crop `bbox` out of `frame` after clipping it to the frame.
///
/// Returns the crop and the clipped box, or `None` when nothing is left.
pub fn crop(frame: &RgbImage, bbox: &BoundingBox) -> Option<(RgbImage, BoundingBox)> {
    let clipped = bbox.clip_to(frame.width(), frame.height());
    if clipped.is_empty() {
        return None;
    }
    let image = imageops::crop_imm(
        frame,
        clipped.x1 as u32,
        clipped.y1 as u32,
        clipped.width() as u32,
        clipped.height() as u32,
    )
    .to_image();
    Some((image, clipped))
}

pub fn encode_jpeg(image: &RgbImage, quality: u8) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    let encoder = JpegEncoder::new_with_quality(&mut buf, quality.clamp(1, 100));
    image
        .write_with_encoder(encoder)
        .context("jpeg encode failed")?;
    Ok(buf)
}

/// JPEG crop of a vehicle, grown by `margin` pixels and clipped to the frame.
pub fn vehicle_snapshot(
    frame: &RgbImage,
    bbox: &BoundingBox,
    margin: u32,
    quality: u8,
) -> Result<Vec<u8>> {
    let margin = i32::try_from(margin).unwrap_or(i32::MAX);
    let (image, _) = crop(frame, &bbox.expand(margin))
        .ok_or_else(|| anyhow!("vehicle box {:?} lies outside the frame", bbox))?;
    encode_jpeg(&image, quality)
}

// ----------------------------------------------------------------------------
// Overlay
// ----------------------------------------------------------------------------

/// Load a TrueType/OpenType font for overlay labels.
pub fn load_font(path: &Path) -> Result<FontArc> {
    let data = std::fs::read(path)
        .with_context(|| format!("failed to read overlay font {}", path.display()))?;
    FontArc::try_from_vec(data)
        .map_err(|e| anyhow!("invalid overlay font {}: {}", path.display(), e))
}

/// Draw a hollow rectangle, 2 px thick, clipped to the image.
pub fn draw_box(image: &mut RgbImage, bbox: &BoundingBox, color: Rgb<u8>) {
    let clipped = bbox.clip_to(image.width(), image.height());
    for inset in 0..LINE_THICKNESS {
        let ring = clipped.expand(-inset);
        if ring.is_empty() {
            break;
        }
        let rect = Rect::at(ring.x1, ring.y1).of_size(ring.width() as u32, ring.height() as u32);
        draw_hollow_rect_mut(image, rect, color);
    }
}

/// Draw the full-width detection band between two rows, labelled when a font is given.
pub fn draw_roi_band(image: &mut RgbImage, y_start: i32, y_end: i32, font: Option<&FontArc>) {
    let width = i32::try_from(image.width()).unwrap_or(i32::MAX);
    draw_box(
        image,
        &BoundingBox::new(0, y_start, width, y_end.saturating_add(1)),
        ROI_COLOR,
    );
    if let Some(font) = font {
        let scale = PxScale::from(ROI_LABEL_SIZE);
        let text_y = y_start.saturating_sub(ROI_LABEL_SIZE as i32 + 4).max(0);
        draw_text_mut(image, ROI_COLOR, 10, text_y, scale, font, ROI_LABEL);
    }
}
