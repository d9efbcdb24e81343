use anyhow::{anyhow, Result};
use image::{Rgb, RgbImage};

use super::FrameSource;

pub const DEFAULT_SYNTHETIC_FRAMES: u64 = 100;

const WIDTH: u32 = 640;
const HEIGHT: u32 = 480;

/// Synthetic moving-gradient frames for `stub://` URIs.
///
/// Produces a finite pass of frames and then reports end of stream, so the
/// capture loop exercises its rewind path.
pub struct SyntheticSource {
    uri: String,
    frames_per_pass: u64,
    position: u64,
    released: bool,
}

impl SyntheticSource {
    pub fn new(uri: &str, frames_per_pass: u64) -> Self {
        Self {
            uri: uri.to_string(),
            frames_per_pass,
            position: 0,
            released: false,
        }
    }

    /// Parse `stub://<name>[?frames=N]`.
    pub fn from_uri(uri: &str) -> Result<Self> {
        let rest = uri
            .strip_prefix("stub://")
            .ok_or_else(|| anyhow!("not a stub uri: {}", uri))?;
        let mut frames = DEFAULT_SYNTHETIC_FRAMES;
        let (name, query) = rest.split_once('?').unwrap_or((rest, ""));
        for pair in query.split('&').filter(|p| !p.is_empty()) {
            match pair.split_once('=') {
                Some(("frames", value)) => {
                    frames = value
                        .parse()
                        .map_err(|_| anyhow!("invalid frame count in {}", uri))?;
                }
                _ => return Err(anyhow!("unknown stub option '{}' in {}", pair, uri)),
            }
        }
        if frames == 0 {
            return Err(anyhow!("stub source needs at least one frame: {}", uri));
        }
        Ok(Self::new(&format!("stub://{}", name), frames))
    }

    fn render(&self) -> RgbImage {
        let shift = self.position as u32;
        RgbImage::from_fn(WIDTH, HEIGHT, |x, y| {
            Rgb([
                ((x + shift) % 256) as u8,
                ((y + shift) % 256) as u8,
                (shift % 256) as u8,
            ])
        })
    }
}

impl FrameSource for SyntheticSource {
    fn next_frame(&mut self) -> Result<Option<RgbImage>> {
        if self.released || self.position >= self.frames_per_pass {
            return Ok(None);
        }
        let frame = self.render();
        self.position += 1;
        Ok(Some(frame))
    }

    fn rewind(&mut self) -> Result<()> {
        if self.released {
            return Err(anyhow!("{} already released", self.uri));
        }
        self.position = 0;
        Ok(())
    }

    fn release(&mut self) {
        if !self.released {
            log::debug!("{} released after {} frames", self.uri, self.position);
        }
        self.released = true;
    }

    fn describe(&self) -> String {
        format!("synthetic {} ({} frames)", self.uri, self.frames_per_pass)
    }
}
