use anyhow::{anyhow, Context, Result};
use image::RgbImage;
use std::path::{Path, PathBuf};

use super::FrameSource;

const FRAME_EXTENSIONS: [&str; 3] = ["jpg", "jpeg", "png"];

/// Still frames from a local directory, played in file-name order.
pub struct ImageDirSource {
    dir: PathBuf,
    frames: Vec<PathBuf>,
    cursor: usize,
}

impl ImageDirSource {
    pub fn open<P: AsRef<Path>>(dir: P) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        let mut frames = Vec::new();
        for entry in std::fs::read_dir(&dir)
            .with_context(|| format!("failed to read frame directory {}", dir.display()))?
        {
            let path = entry?.path();
            let is_frame = path
                .extension()
                .and_then(|ext| ext.to_str())
                .map(|ext| FRAME_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
                .unwrap_or(false);
            if path.is_file() && is_frame {
                frames.push(path);
            }
        }
        if frames.is_empty() {
            return Err(anyhow!("no jpg/png frames in {}", dir.display()));
        }
        frames.sort();
        log::info!("frame directory {}: {} frames", dir.display(), frames.len());
        Ok(Self {
            dir,
            frames,
            cursor: 0,
        })
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }
}

impl FrameSource for ImageDirSource {
    fn next_frame(&mut self) -> Result<Option<RgbImage>> {
        let Some(path) = self.frames.get(self.cursor) else {
            return Ok(None);
        };
        // Advance first so an undecodable file is skipped on the next read.
        self.cursor += 1;
        let image = image::open(path)
            .with_context(|| format!("failed to decode {}", path.display()))?;
        Ok(Some(image.to_rgb8()))
    }

    fn rewind(&mut self) -> Result<()> {
        if self.frames.is_empty() {
            return Err(anyhow!("{} already released", self.dir.display()));
        }
        self.cursor = 0;
        Ok(())
    }

    fn release(&mut self) {
        self.frames.clear();
        self.cursor = 0;
    }

    fn describe(&self) -> String {
        format!("directory {} ({} frames)", self.dir.display(), self.frames.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    #[test]
    fn plays_frames_in_name_order() {
        let dir = tempfile::tempdir().unwrap();
        RgbImage::from_pixel(4, 2, Rgb([200, 0, 0]))
            .save(dir.path().join("b.png"))
            .unwrap();
        RgbImage::from_pixel(2, 2, Rgb([0, 200, 0]))
            .save(dir.path().join("a.png"))
            .unwrap();
        std::fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let mut source = ImageDirSource::open(dir.path()).unwrap();
        assert_eq!(source.len(), 2);
        assert_eq!(source.next_frame().unwrap().unwrap().dimensions(), (2, 2));
        assert_eq!(source.next_frame().unwrap().unwrap().dimensions(), (4, 2));
        assert!(source.next_frame().unwrap().is_none());

        source.rewind().unwrap();
        assert_eq!(source.next_frame().unwrap().unwrap().dimensions(), (2, 2));

        source.release();
        assert!(source.next_frame().unwrap().is_none());
        assert!(source.rewind().is_err());
    }

    #[test]
    fn broken_frame_is_skipped_after_error() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.jpg"), b"not a jpeg").unwrap();
        RgbImage::new(3, 3).save(dir.path().join("b.png")).unwrap();

        let mut source = ImageDirSource::open(dir.path()).unwrap();
        assert!(source.next_frame().is_err());
        assert!(source.next_frame().unwrap().is_some());
    }

    #[test]
    fn empty_directory_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(ImageDirSource::open(dir.path()).is_err());
    }
}
