//! Frame sources.
//!
//! A source yields decoded RGB frames until it reaches the end of its stream,
//! then reports `None`. The capture loop rewinds it and keeps going, so a
//! finite source plays back in a loop.
//!
//! - `stub://<name>[?frames=N]`: synthetic frames (testing, demos)
//! - a local directory: still images played in file-name order
//!
//! Only local inputs are accepted; URL schemes other than `stub://` are
//! rejected.

mod image_dir;
mod synthetic;

use anyhow::{anyhow, Result};
use image::RgbImage;

pub use image_dir::ImageDirSource;
pub use synthetic::{SyntheticSource, DEFAULT_SYNTHETIC_FRAMES};

pub trait FrameSource: Send {
    /// Next frame, or `None` at end of stream.
    fn next_frame(&mut self) -> Result<Option<RgbImage>>;

    /// Seek back to the first frame.
    fn rewind(&mut self) -> Result<()>;

    /// Release the underlying handle. Further reads return `None`.
    fn release(&mut self);

    /// Human-readable description for logs.
    fn describe(&self) -> String;
}

/// Open the source named by `uri`.
pub fn open_source(uri: &str) -> Result<Box<dyn FrameSource>> {
    if !is_local_uri(uri) {
        return Err(anyhow!(
            "source {} is not local (only stub:// and filesystem paths are supported)",
            uri
        ));
    }
    if uri.starts_with("stub://") {
        return Ok(Box::new(SyntheticSource::from_uri(uri)?));
    }
    Ok(Box::new(ImageDirSource::open(uri)?))
}

fn is_local_uri(uri: &str) -> bool {
    if uri.trim().is_empty() {
        return false;
    }
    if uri.starts_with("stub://") {
        return true;
    }
    !uri.contains("://")
}
