//! Per-frame detection pipeline.
//!
//! `FramePipeline` owns the detectors, the token normalizer and the storage
//! collaborators. The mutable detection state (cooldown clock and sighting
//! window) sits behind a lock shared with [`PipelineControl`], so an operator
//! surface can read or reset it while the capture thread keeps running. The
//! lock is never held across inference or storage calls.
//!
//! Frames are stamped with a zoned time. The cooldown compares UTC instants,
//! so a local offset change (DST fall-back) does not stall detection, while
//! sighting and record stamps use the local wall-clock reading.

use ab_glyph::FontArc;
use anyhow::{anyhow, Result};
use chrono::{DateTime, FixedOffset, Local, Utc};
use image::RgbImage;
use serde::Serialize;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use crate::detect::{BackendRegistry, BoundingBox, Detection, DetectionCapability};
use crate::frame::{self, TOKEN_COLOR, VEHICLE_COLOR};
use crate::matcher::TIME_OF_DAY_FORMAT;
use crate::normalize::TokenNormalizer;
use crate::storage::{DetectionRecord, PlateStore};
use crate::window::{
    DetectionEvent, DetectionWindow, DEFAULT_MERGE_SECONDS, DEFAULT_WINDOW_CAPACITY,
};

/// Timestamp format of persisted detection rows.
pub const RECORD_TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

pub const DEFAULT_ROI_Y_START: f32 = 0.6;
pub const DEFAULT_ROI_Y_END: f32 = 0.75;
pub const DEFAULT_COOLDOWN: Duration = Duration::from_millis(1000);
pub const DEFAULT_VEHICLE_CONFIDENCE: f32 = 0.4;
pub const DEFAULT_CHARACTER_CONFIDENCE: f32 = 0.3;
pub const DEFAULT_SNAPSHOT_MARGIN: u32 = 20;
pub const DEFAULT_JPEG_QUALITY: u8 = 85;

#[derive(Clone, Debug, PartialEq)]
pub struct PipelineConfig {
    /// Detection band as fractions of frame height.
    pub roi_y_start: f32,
    pub roi_y_end: f32,
    /// Global pause after a successful read.
    pub cooldown: Duration,
    pub vehicle_confidence: f32,
    pub character_confidence: f32,
    pub window_capacity: usize,
    pub merge_seconds: f64,
    pub snapshot_margin: u32,
    pub jpeg_quality: u8,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            roi_y_start: DEFAULT_ROI_Y_START,
            roi_y_end: DEFAULT_ROI_Y_END,
            cooldown: DEFAULT_COOLDOWN,
            vehicle_confidence: DEFAULT_VEHICLE_CONFIDENCE,
            character_confidence: DEFAULT_CHARACTER_CONFIDENCE,
            window_capacity: DEFAULT_WINDOW_CAPACITY,
            merge_seconds: DEFAULT_MERGE_SECONDS,
            snapshot_margin: DEFAULT_SNAPSHOT_MARGIN,
            jpeg_quality: DEFAULT_JPEG_QUALITY,
        }
    }
}

/// Mutable detection state.
#[derive(Debug)]
pub struct PipelineState {
    /// Time of the last frame that produced a reading. `None` disables the cooldown.
    pub last_detection: Option<DateTime<Utc>>,
    pub window: DetectionWindow,
}

/// Pipeline counters.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct PipelineStats {
    pub frames_processed: u64,
    pub cooldown_skips: u64,
    pub detector_failures: u64,
    pub detections: u64,
    pub new_vehicles: u64,
    pub merged_sightings: u64,
    pub store_failures: u64,
}

struct Shared {
    state: Mutex<PipelineState>,
    stats: Mutex<PipelineStats>,
}

impl Shared {
    fn state(&self) -> Result<MutexGuard<'_, PipelineState>> {
        self.state
            .lock()
            .map_err(|_| anyhow!("pipeline state lock poisoned"))
    }

    fn bump(&self, update: impl FnOnce(&mut PipelineStats)) {
        if let Ok(mut stats) = self.stats.lock() {
            update(&mut stats);
        }
    }

    fn stats(&self) -> PipelineStats {
        self.stats
            .lock()
            .map(|stats| stats.clone())
            .unwrap_or_default()
    }
}

/// Operator control surface over a running pipeline.
#[derive(Clone)]
pub struct PipelineControl {
    shared: Arc<Shared>,
}

impl PipelineControl {
    /// Clear the sighting window and the cooldown clock.
    pub fn reset(&self) -> Result<()> {
        let mut state = self.shared.state()?;
        state.window.clear();
        state.last_detection = None;
        log::info!("detection window reset");
        Ok(())
    }

    /// Ordered copy of the window, oldest first.
    pub fn detections(&self) -> Result<Vec<DetectionEvent>> {
        Ok(self.shared.state()?.window.to_vec())
    }

    /// Window contents as a JSON array, snapshots hex-encoded.
    pub fn detections_json(&self) -> Result<String> {
        let events = self.detections()?;
        Ok(serde_json::to_string(&events)?)
    }

    pub fn last_detection(&self) -> Result<Option<DateTime<Utc>>> {
        Ok(self.shared.state()?.last_detection)
    }

    pub fn stats(&self) -> PipelineStats {
        self.shared.stats()
    }
}

/// Result of processing one frame.
#[derive(Clone, Debug)]
pub struct FrameOutcome {
    /// Input frame with the overlay drawn on it.
    pub frame: RgbImage,
    pub plate: String,
    pub province: String,
}

impl FrameOutcome {
    fn empty(frame: RgbImage) -> Self {
        Self {
            frame,
            plate: String::new(),
            province: String::new(),
        }
    }
}

struct Sighting {
    labels: Vec<String>,
    vehicle: Option<BoundingBox>,
}

pub struct FramePipeline {
    config: PipelineConfig,
    detectors: BackendRegistry,
    normalizer: Box<dyn TokenNormalizer>,
    store: Option<Box<dyn PlateStore>>,
    overlay_font: Option<FontArc>,
    shared: Arc<Shared>,
}

impl FramePipeline {
    pub fn new(
        config: PipelineConfig,
        detectors: BackendRegistry,
        normalizer: Box<dyn TokenNormalizer>,
    ) -> Self {
        let window = DetectionWindow::with_limits(config.window_capacity, config.merge_seconds);
        Self {
            config,
            detectors,
            normalizer,
            store: None,
            overlay_font: None,
            shared: Arc::new(Shared {
                state: Mutex::new(PipelineState {
                    last_detection: None,
                    window,
                }),
                stats: Mutex::new(PipelineStats::default()),
            }),
        }
    }

    /// Attach the registry lookup and detection log.
    pub fn with_store(mut self, store: Box<dyn PlateStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Label the detection band with this font.
    pub fn with_overlay_font(mut self, font: FontArc) -> Self {
        self.overlay_font = Some(font);
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn control(&self) -> PipelineControl {
        PipelineControl {
            shared: self.shared.clone(),
        }
    }

    pub fn stats(&self) -> PipelineStats {
        self.shared.stats()
    }

    /// Process a frame stamped with the local clock.
    pub fn process_frame(&mut self, frame: &RgbImage) -> FrameOutcome {
        let now = Local::now();
        self.process_frame_at(frame, now.with_timezone(now.offset()))
    }

    /// Process a frame as if it arrived at `now`.
    ///
    /// Never fails: detector and storage errors are logged, counted and
    /// degrade to an empty reading.
    pub fn process_frame_at(&mut self, frame: &RgbImage, now: DateTime<FixedOffset>) -> FrameOutcome {
        self.shared.bump(|s| s.frames_processed += 1);

        let mut annotated = frame.clone();
        let (roi_start, roi_end) = self.roi_band(frame.height());
        frame::draw_roi_band(&mut annotated, roi_start, roi_end, self.overlay_font.as_ref());

        match self.cooling_down(now.with_timezone(&Utc)) {
            Ok(false) => {}
            Ok(true) => {
                self.shared.bump(|s| s.cooldown_skips += 1);
                return FrameOutcome::empty(annotated);
            }
            Err(e) => {
                log::error!("pipeline state unavailable: {}", e);
                return FrameOutcome::empty(annotated);
            }
        }

        let sighting = match self.read_tokens(frame, &mut annotated, roi_start, roi_end) {
            Ok(sighting) => sighting,
            Err(e) => {
                log::warn!("detector failed, skipping frame: {:#}", e);
                self.shared.bump(|s| s.detector_failures += 1);
                return FrameOutcome::empty(annotated);
            }
        };
        if sighting.labels.is_empty() {
            return FrameOutcome::empty(annotated);
        }

        let (mut provinces, mut others): (Vec<String>, Vec<String>) = sighting
            .labels
            .into_iter()
            .partition(|label| self.normalizer.is_province(label));
        others.append(&mut provinces);
        let (plate, province) = self.normalizer.normalize(&others);
        if plate.is_empty() && province.is_empty() {
            return FrameOutcome::empty(annotated);
        }

        let snapshot = sighting.vehicle.and_then(|bbox| {
            match frame::vehicle_snapshot(
                frame,
                &bbox,
                self.config.snapshot_margin,
                self.config.jpeg_quality,
            ) {
                Ok(bytes) => Some(bytes),
                Err(e) => {
                    log::warn!("vehicle snapshot failed: {:#}", e);
                    None
                }
            }
        });

        if let Err(e) = self.record(&plate, &province, snapshot, now) {
            log::error!("failed to record sighting of {}: {:#}", plate, e);
        }

        FrameOutcome {
            frame: annotated,
            plate,
            province,
        }
    }

    fn roi_band(&self, height: u32) -> (i32, i32) {
        let h = height as f32;
        (
            (h * self.config.roi_y_start) as i32,
            (h * self.config.roi_y_end) as i32,
        )
    }

    fn cooling_down(&self, now: DateTime<Utc>) -> Result<bool> {
        let Some(last) = self.shared.state()?.last_detection else {
            return Ok(false);
        };
        // A UTC clock that stepped backwards keeps the cooldown active.
        Ok(match now.signed_duration_since(last).to_std() {
            Ok(elapsed) => elapsed < self.config.cooldown,
            Err(_) => true,
        })
    }

    /// Run both detection stages and collect token labels in reading order.
    fn read_tokens(
        &self,
        frame: &RgbImage,
        annotated: &mut RgbImage,
        roi_start: i32,
        roi_end: i32,
    ) -> Result<Sighting> {
        let vehicles = self.detectors.detect_with_capability(
            DetectionCapability::Vehicle,
            frame,
            self.config.vehicle_confidence,
        )?;

        let mut sighting = Sighting {
            labels: Vec::new(),
            vehicle: None,
        };
        for vehicle in vehicles {
            let center = vehicle.bbox.center_y();
            if center < roi_start || center > roi_end {
                continue;
            }
            let Some((crop, clipped)) = frame::crop(frame, &vehicle.bbox) else {
                log::debug!("vehicle box {:?} outside frame, skipped", vehicle.bbox);
                continue;
            };
            frame::draw_box(annotated, &vehicle.bbox, VEHICLE_COLOR);
            sighting.vehicle = Some(vehicle.bbox);

            let mut tokens: Vec<Detection> = self
                .detectors
                .detect_with_capability(
                    DetectionCapability::Character,
                    &crop,
                    self.config.character_confidence,
                )?
                .into_iter()
                .map(|mut token| {
                    token.bbox = token.bbox.offset(clipped.x1, clipped.y1);
                    token
                })
                .collect();
            tokens.sort_by_key(|token| token.bbox.x1);

            for token in tokens {
                frame::draw_box(annotated, &token.bbox, TOKEN_COLOR);
                sighting.labels.push(token.label);
            }
        }
        Ok(sighting)
    }

    fn record(
        &mut self,
        plate: &str,
        province: &str,
        snapshot: Option<Vec<u8>>,
        now: DateTime<FixedOffset>,
    ) -> Result<()> {
        let time_of_day = now.format(TIME_OF_DAY_FORMAT).to_string();
        let province = (!province.is_empty()).then(|| province.to_string());

        let mut state = self.shared.state()?;
        state.last_detection = Some(now.with_timezone(&Utc));
        let recorded = state
            .window
            .record_detection(plate, province, &time_of_day, snapshot);
        drop(state);

        let Some((mut event, is_new)) = recorded else {
            log::debug!("province-only reading at {}, not recorded", time_of_day);
            return Ok(());
        };

        event.registered = self.lookup_registration(&event.plate);
        {
            let mut state = self.shared.state()?;
            // A reset between the two lock scopes leaves nothing to flag.
            if let Some(latest) = state.window.latest_mut() {
                if latest.plate == event.plate && latest.timestamp == event.timestamp {
                    latest.registered = event.registered;
                }
            }
        }

        self.shared.bump(|s| {
            s.detections += 1;
            if is_new {
                s.new_vehicles += 1;
            } else {
                s.merged_sightings += 1;
            }
        });
        if is_new {
            log::info!(
                "new vehicle {} {} registered={}",
                event.plate,
                event.province.as_deref().unwrap_or("-"),
                event.registered
            );
        } else {
            log::debug!("merged sighting of {} at {}", event.plate, time_of_day);
        }

        self.persist(&event, now);
        Ok(())
    }

    fn lookup_registration(&mut self, plate: &str) -> bool {
        let Some(store) = self.store.as_mut() else {
            return false;
        };
        match store.is_registered(plate) {
            Ok(registered) => registered,
            Err(e) => {
                log::warn!("registry lookup for {} failed: {:#}", plate, e);
                self.shared.bump(|s| s.store_failures += 1);
                false
            }
        }
    }

    fn persist(&mut self, event: &DetectionEvent, now: DateTime<FixedOffset>) {
        let Some(store) = self.store.as_mut() else {
            return;
        };
        let record = DetectionRecord {
            timestamp: now.format(RECORD_TIMESTAMP_FORMAT).to_string(),
            plate: event.plate.clone(),
            province: event.province.clone(),
            snapshot: event.snapshot.clone(),
            registered: event.registered,
        };
        if let Err(e) = store.log_detection(&record) {
            log::warn!("detection log append for {} failed: {:#}", event.plate, e);
            self.shared.bump(|s| s.store_failures += 1);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::StubBackend;
    use crate::normalize::ThaiPlateNormalizer;
    use crate::storage::InMemoryStore;
    use chrono::NaiveDate;

    fn at(h: u32, m: u32, s: u32) -> DateTime<FixedOffset> {
        NaiveDate::from_ymd_opt(2026, 3, 14)
            .unwrap()
            .and_hms_opt(h, m, s)
            .unwrap()
            .and_local_timezone(FixedOffset::east_opt(7 * 3600).unwrap())
            .single()
            .unwrap()
    }

    fn token(label: &str, x: i32) -> Detection {
        Detection::new(label, 0.9, BoundingBox::new(x, 10, x + 8, 30))
    }

    fn pipeline(vehicles: Vec<Vec<Detection>>, tokens: Vec<Vec<Detection>>) -> FramePipeline {
        let mut registry = BackendRegistry::new();
        registry.register(StubBackend::new(DetectionCapability::Vehicle).with_script(vehicles));
        registry.register(StubBackend::new(DetectionCapability::Character).with_script(tokens));
        FramePipeline::new(
            PipelineConfig::default(),
            registry,
            Box::new(ThaiPlateNormalizer::new()),
        )
    }

    // 200x100 frame: ROI rows 60..=75.
    fn car_in_roi() -> Detection {
        Detection::new("car", 0.8, BoundingBox::new(20, 50, 180, 90))
    }

    #[test]
    fn tokens_are_read_left_to_right_with_province_last() {
        let mut pipeline = pipeline(
            vec![vec![car_in_roi()]],
            vec![vec![
                token("Bangkok", 5),
                token("2", 60),
                token("A01", 10),
                token("1", 50),
            ]],
        );
        let outcome = pipeline.process_frame_at(&RgbImage::new(200, 100), at(9, 0, 0));
        assert_eq!(outcome.plate, "ก12");
        assert_eq!(outcome.province, "กรุงเทพมหานคร");

        let events = pipeline.control().detections().unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].timestamp, "09:00:00");
        assert!(events[0].snapshot.is_some());
    }

    #[test]
    fn vehicles_outside_roi_are_ignored() {
        let high = Detection::new("car", 0.8, BoundingBox::new(20, 0, 180, 20));
        let mut pipeline = pipeline(vec![vec![high]], vec![vec![token("1", 0)]]);
        let outcome = pipeline.process_frame_at(&RgbImage::new(200, 100), at(9, 0, 0));
        assert!(outcome.plate.is_empty());
        assert_eq!(pipeline.control().last_detection().unwrap(), None);
    }

    #[test]
    fn overlay_marks_roi_band() {
        let mut pipeline = pipeline(vec![], vec![]);
        let outcome = pipeline.process_frame_at(&RgbImage::new(200, 100), at(9, 0, 0));
        assert_eq!(outcome.frame.get_pixel(100, 60), &frame::ROI_COLOR);
        assert_eq!(outcome.frame.get_pixel(100, 75), &frame::ROI_COLOR);
    }

    #[test]
    fn registration_flag_comes_from_store() {
        let store = InMemoryStore::new();
        store.register_vehicle("1234", None, None).unwrap();
        let mut pipeline = pipeline(
            vec![vec![car_in_roi()]],
            vec![vec![token("1", 0), token("2", 9), token("3", 18), token("4", 27)]],
        )
        .with_store(Box::new(store.clone()));

        pipeline.process_frame_at(&RgbImage::new(200, 100), at(9, 0, 0));

        let events = pipeline.control().detections().unwrap();
        assert!(events[0].registered);
        let rows = store.detections().unwrap();
        assert_eq!(rows.len(), 1);
        assert!(rows[0].registered);
        assert_eq!(rows[0].timestamp, "2026-03-14T09:00:00");
        assert_eq!(pipeline.stats().new_vehicles, 1);
    }
}
