use anyhow::{anyhow, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::capture::DEFAULT_FRAME_INTERVAL;
use crate::pipeline::{
    PipelineConfig, DEFAULT_CHARACTER_CONFIDENCE, DEFAULT_COOLDOWN, DEFAULT_JPEG_QUALITY,
    DEFAULT_ROI_Y_END, DEFAULT_ROI_Y_START, DEFAULT_SNAPSHOT_MARGIN, DEFAULT_VEHICLE_CONFIDENCE,
};
use crate::window::{DEFAULT_MERGE_SECONDS, DEFAULT_WINDOW_CAPACITY};

const DEFAULT_DB_PATH: &str = "vehicle.db";
const DEFAULT_SOURCE_URI: &str = "stub://camera";
const DEFAULT_INPUT_SIZE: u32 = 640;
const DEFAULT_PREVIEW_INTERVAL: Duration = Duration::from_millis(1000);

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct PlateWatchConfigFile {
    db_path: Option<String>,
    cooldown_ms: Option<u64>,
    source: Option<SourceConfigFile>,
    roi: Option<RoiConfigFile>,
    detector: Option<DetectorConfigFile>,
    window: Option<WindowConfigFile>,
    snapshot: Option<SnapshotConfigFile>,
    preview: Option<PreviewConfigFile>,
    overlay: Option<OverlayConfigFile>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct SourceConfigFile {
    uri: Option<String>,
    frame_interval_ms: Option<u64>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct RoiConfigFile {
    y_start: Option<f32>,
    y_end: Option<f32>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct DetectorConfigFile {
    vehicle_model: Option<PathBuf>,
    character_model: Option<PathBuf>,
    vehicle_confidence: Option<f32>,
    character_confidence: Option<f32>,
    input_size: Option<u32>,
    vehicle_labels: Option<PathBuf>,
    character_labels: Option<PathBuf>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct WindowConfigFile {
    capacity: Option<usize>,
    merge_seconds: Option<f64>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct SnapshotConfigFile {
    margin_px: Option<u32>,
    jpeg_quality: Option<u8>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct PreviewConfigFile {
    path: Option<PathBuf>,
    interval_ms: Option<u64>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct OverlayConfigFile {
    font: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct PlateWatchConfig {
    pub db_path: String,
    pub cooldown: Duration,
    pub source: SourceSettings,
    pub roi: RoiSettings,
    pub detector: DetectorSettings,
    pub window: WindowSettings,
    pub snapshot: SnapshotSettings,
    pub preview: PreviewSettings,
    pub overlay: OverlaySettings,
}

#[derive(Debug, Clone)]
pub struct SourceSettings {
    pub uri: String,
    pub frame_interval: Duration,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RoiSettings {
    pub y_start: f32,
    pub y_end: f32,
}

#[derive(Debug, Clone)]
pub struct DetectorSettings {
    pub vehicle_model: Option<PathBuf>,
    pub character_model: Option<PathBuf>,
    pub vehicle_confidence: f32,
    pub character_confidence: f32,
    pub input_size: u32,
    pub vehicle_labels: Option<PathBuf>,
    pub character_labels: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WindowSettings {
    pub capacity: usize,
    pub merge_seconds: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SnapshotSettings {
    pub margin_px: u32,
    pub jpeg_quality: u8,
}

#[derive(Debug, Clone)]
pub struct PreviewSettings {
    pub path: Option<PathBuf>,
    pub interval: Duration,
}

/// Font used to label the detection band. No font, no label.
#[derive(Debug, Clone, Default)]
pub struct OverlaySettings {
    pub font: Option<PathBuf>,
}

impl PlateWatchConfig {
    /// Defaults, then the file named by `PLATE_WATCH_CONFIG`, then env overrides.
    pub fn load() -> Result<Self> {
        let config_path = std::env::var("PLATE_WATCH_CONFIG").ok();
        let file_cfg = match config_path.as_deref() {
            Some(path) => Some(read_config_file(Path::new(path))?),
            None => None,
        };
        let mut cfg = Self::from_file(file_cfg.unwrap_or_default());
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: PlateWatchConfigFile) -> Self {
        let source = file.source.unwrap_or_default();
        let roi = file.roi.unwrap_or_default();
        let detector = file.detector.unwrap_or_default();
        let window = file.window.unwrap_or_default();
        let snapshot = file.snapshot.unwrap_or_default();
        let preview = file.preview.unwrap_or_default();
        let overlay = file.overlay.unwrap_or_default();

        Self {
            db_path: file.db_path.unwrap_or_else(|| DEFAULT_DB_PATH.to_string()),
            cooldown: file
                .cooldown_ms
                .map(Duration::from_millis)
                .unwrap_or(DEFAULT_COOLDOWN),
            source: SourceSettings {
                uri: source.uri.unwrap_or_else(|| DEFAULT_SOURCE_URI.to_string()),
                frame_interval: source
                    .frame_interval_ms
                    .map(Duration::from_millis)
                    .unwrap_or(DEFAULT_FRAME_INTERVAL),
            },
            roi: RoiSettings {
                y_start: roi.y_start.unwrap_or(DEFAULT_ROI_Y_START),
                y_end: roi.y_end.unwrap_or(DEFAULT_ROI_Y_END),
            },
            detector: DetectorSettings {
                vehicle_model: detector.vehicle_model,
                character_model: detector.character_model,
                vehicle_confidence: detector
                    .vehicle_confidence
                    .unwrap_or(DEFAULT_VEHICLE_CONFIDENCE),
                character_confidence: detector
                    .character_confidence
                    .unwrap_or(DEFAULT_CHARACTER_CONFIDENCE),
                input_size: detector.input_size.unwrap_or(DEFAULT_INPUT_SIZE),
                vehicle_labels: detector.vehicle_labels,
                character_labels: detector.character_labels,
            },
            window: WindowSettings {
                capacity: window.capacity.unwrap_or(DEFAULT_WINDOW_CAPACITY),
                merge_seconds: window.merge_seconds.unwrap_or(DEFAULT_MERGE_SECONDS),
            },
            snapshot: SnapshotSettings {
                margin_px: snapshot.margin_px.unwrap_or(DEFAULT_SNAPSHOT_MARGIN),
                jpeg_quality: snapshot.jpeg_quality.unwrap_or(DEFAULT_JPEG_QUALITY),
            },
            preview: PreviewSettings {
                path: preview.path,
                interval: preview
                    .interval_ms
                    .map(Duration::from_millis)
                    .unwrap_or(DEFAULT_PREVIEW_INTERVAL),
            },
            overlay: OverlaySettings { font: overlay.font },
        }
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Ok(path) = std::env::var("PLATE_WATCH_DB_PATH") {
            if !path.trim().is_empty() {
                self.db_path = path;
            }
        }
        if let Ok(uri) = std::env::var("PLATE_WATCH_SOURCE") {
            if !uri.trim().is_empty() {
                self.source.uri = uri;
            }
        }
        if let Ok(cooldown) = std::env::var("PLATE_WATCH_COOLDOWN_MS") {
            let millis: u64 = cooldown.trim().parse().map_err(|_| {
                anyhow!("PLATE_WATCH_COOLDOWN_MS must be an integer number of milliseconds")
            })?;
            self.cooldown = Duration::from_millis(millis);
        }
        if let Ok(roi) = std::env::var("PLATE_WATCH_ROI") {
            self.roi = parse_roi(&roi)?;
        }
        if let Ok(path) = std::env::var("PLATE_WATCH_VEHICLE_MODEL") {
            if !path.trim().is_empty() {
                self.detector.vehicle_model = Some(PathBuf::from(path));
            }
        }
        if let Ok(path) = std::env::var("PLATE_WATCH_CHARACTER_MODEL") {
            if !path.trim().is_empty() {
                self.detector.character_model = Some(PathBuf::from(path));
            }
        }
        if let Ok(path) = std::env::var("PLATE_WATCH_PREVIEW_PATH") {
            if !path.trim().is_empty() {
                self.preview.path = Some(PathBuf::from(path));
            }
        }
        if let Ok(path) = std::env::var("PLATE_WATCH_OVERLAY_FONT") {
            if !path.trim().is_empty() {
                self.overlay.font = Some(PathBuf::from(path));
            }
        }
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        let RoiSettings { y_start, y_end } = self.roi;
        if !(0.0..1.0).contains(&y_start) || !(y_start < y_end && y_end <= 1.0) {
            return Err(anyhow!(
                "roi must satisfy 0 <= y_start < y_end <= 1 (got {}..{})",
                y_start,
                y_end
            ));
        }
        for (name, value) in [
            ("vehicle_confidence", self.detector.vehicle_confidence),
            ("character_confidence", self.detector.character_confidence),
        ] {
            if !(value > 0.0 && value <= 1.0) {
                return Err(anyhow!("{} must be in (0, 1], got {}", name, value));
            }
        }
        if self.source.frame_interval.is_zero() {
            return Err(anyhow!("frame interval must be greater than zero"));
        }
        if self.window.capacity == 0 {
            return Err(anyhow!("window capacity must be greater than zero"));
        }
        if !(self.window.merge_seconds >= 0.0) {
            return Err(anyhow!("window merge_seconds must be non-negative"));
        }
        if self.detector.input_size == 0 {
            return Err(anyhow!("detector input_size must be greater than zero"));
        }
        if self.snapshot.jpeg_quality == 0 || self.snapshot.jpeg_quality > 100 {
            return Err(anyhow!("snapshot jpeg_quality must be in 1..=100"));
        }
        Ok(())
    }

    /// Settings consumed by the frame pipeline.
    pub fn pipeline_config(&self) -> PipelineConfig {
        PipelineConfig {
            roi_y_start: self.roi.y_start,
            roi_y_end: self.roi.y_end,
            cooldown: self.cooldown,
            vehicle_confidence: self.detector.vehicle_confidence,
            character_confidence: self.detector.character_confidence,
            window_capacity: self.window.capacity,
            merge_seconds: self.window.merge_seconds,
            snapshot_margin: self.snapshot.margin_px,
            jpeg_quality: self.snapshot.jpeg_quality,
        }
    }
}

fn read_config_file(path: &Path) -> Result<PlateWatchConfigFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let is_toml = path
        .extension()
        .map(|ext| ext.eq_ignore_ascii_case("toml"))
        .unwrap_or(false);
    let cfg = if is_toml {
        toml::from_str(&raw)
            .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    } else {
        serde_json::from_str(&raw)
            .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    };
    Ok(cfg)
}

fn parse_roi(value: &str) -> Result<RoiSettings> {
    let parts = split_csv(value);
    let [start, end] = parts.as_slice() else {
        return Err(anyhow!("PLATE_WATCH_ROI must be \"start,end\", got {:?}", value));
    };
    let parse = |s: &str| {
        s.parse::<f32>()
            .map_err(|_| anyhow!("PLATE_WATCH_ROI bound {:?} is not a number", s))
    };
    Ok(RoiSettings {
        y_start: parse(start.as_str())?,
        y_end: parse(end.as_str())?,
    })
}

fn split_csv(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|entry| entry.trim())
        .filter(|entry| !entry.is_empty())
        .map(|entry| entry.to_string())
        .collect()
}

/// Read a class label file: one label per line, blank lines skipped.
pub fn read_label_file(path: &Path) -> Result<Vec<String>> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read label file {}: {}", path.display(), e))?;
    Ok(raw
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let cfg = PlateWatchConfig::from_file(PlateWatchConfigFile::default());
        cfg.validate().unwrap();
        assert_eq!(cfg.db_path, "vehicle.db");
        assert_eq!(cfg.source.uri, "stub://camera");
        assert_eq!(cfg.pipeline_config(), PipelineConfig::default());
        assert!(cfg.preview.path.is_none());
        assert!(cfg.overlay.font.is_none());
    }

    #[test]
    fn toml_sections_parse() {
        let file: PlateWatchConfigFile = toml::from_str(
            r#"
            cooldown_ms = 250

            [roi]
            y_start = 0.5
            y_end = 0.9

            [window]
            capacity = 4

            [overlay]
            font = "/opt/fonts/label.ttf"
            "#,
        )
        .unwrap();
        let cfg = PlateWatchConfig::from_file(file);
        assert_eq!(cfg.cooldown, Duration::from_millis(250));
        assert_eq!(cfg.roi, RoiSettings { y_start: 0.5, y_end: 0.9 });
        assert_eq!(cfg.window.capacity, 4);
        assert_eq!(cfg.window.merge_seconds, DEFAULT_MERGE_SECONDS);
        assert_eq!(cfg.overlay.font, Some(PathBuf::from("/opt/fonts/label.ttf")));
    }

    #[test]
    fn unknown_keys_are_rejected() {
        assert!(serde_json::from_str::<PlateWatchConfigFile>(r#"{"roi": {"top": 0.1}}"#).is_err());
    }

    #[test]
    fn roi_parsing() {
        assert_eq!(
            parse_roi(" 0.55 , 0.8 ").unwrap(),
            RoiSettings { y_start: 0.55, y_end: 0.8 }
        );
        assert!(parse_roi("0.5").is_err());
        assert!(parse_roi("0.5,x").is_err());
        assert!(parse_roi("0.1,0.2,0.3").is_err());
    }

    #[test]
    fn validation_rejects_bad_values() {
        let base = PlateWatchConfig::from_file(PlateWatchConfigFile::default());

        let mut cfg = base.clone();
        cfg.roi = RoiSettings { y_start: 0.8, y_end: 0.6 };
        assert!(cfg.validate().is_err());

        let mut cfg = base.clone();
        cfg.roi = RoiSettings { y_start: 0.2, y_end: 1.2 };
        assert!(cfg.validate().is_err());

        let mut cfg = base.clone();
        cfg.detector.character_confidence = 0.0;
        assert!(cfg.validate().is_err());

        let mut cfg = base.clone();
        cfg.window.capacity = 0;
        assert!(cfg.validate().is_err());

        let mut cfg = base;
        cfg.source.frame_interval = Duration::ZERO;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn label_file_skips_blank_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("labels.txt");
        std::fs::write(&path, "car\n\n truck \nbus\n").unwrap();
        assert_eq!(read_label_file(&path).unwrap(), vec!["car", "truck", "bus"]);
    }
}
