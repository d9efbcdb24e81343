use anyhow::Result;
use image::RgbImage;

use crate::detect::result::Detection;

/// The two detector instantiations the pipeline needs.
#[non_exhaustive]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum DetectionCapability {
    /// Vehicle / plate region boxes on the full frame.
    Vehicle,
    /// Character and province glyph tokens on a vehicle crop.
    Character,
}

/// Detector backend trait.
///
/// Backends receive a read-only image and return labelled boxes in the
/// coordinate space of that image. Boxes below `min_confidence` must be
/// dropped by the backend.
pub trait DetectorBackend: Send {
    /// Backend identifier.
    fn name(&self) -> &'static str;

    /// Returns true when the backend supports a capability.
    fn supports(&self, capability: DetectionCapability) -> bool;

    /// Run detection on an image.
    fn detect(&mut self, image: &RgbImage, min_confidence: f32) -> Result<Vec<Detection>>;

    /// Optional warm-up hook.
    fn warm_up(&mut self) -> Result<()> {
        Ok(())
    }
}
