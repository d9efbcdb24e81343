//! plated - plate sighting daemon
//!
//! This daemon:
//! 1. Loads configuration (file + env overrides)
//! 2. Opens the SQLite vehicle registry / detection log
//! 3. Builds the vehicle and character detectors
//! 4. Runs the capture loop on a background thread
//! 5. Optionally writes the latest annotated frame to a preview JPEG
//! 6. Logs health every 5 seconds until Ctrl-C

use anyhow::{anyhow, Result};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc};
use std::thread::JoinHandle;
use std::time::Duration;

use plate_watch::config::PlateWatchConfig;
use plate_watch::detect::StubBackend;
use plate_watch::frame::load_font;
use plate_watch::{
    open_source, BackendRegistry, BoundingBox, CaptureLoop, Detection, DetectionCapability,
    FramePipeline, SharedFrame, SqliteStore, ThaiPlateNormalizer,
};

const HEALTH_INTERVAL: Duration = Duration::from_secs(5);

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cfg = PlateWatchConfig::load()?;
    let store = SqliteStore::open(&cfg.db_path)?;
    let detectors = build_detectors(&cfg)?;
    detectors.warm_up_all()?;
    let source = open_source(&cfg.source.uri)?;

    let mut pipeline = FramePipeline::new(
        cfg.pipeline_config(),
        detectors,
        Box::new(ThaiPlateNormalizer::new()),
    )
    .with_store(Box::new(store));
    if let Some(path) = &cfg.overlay.font {
        pipeline = pipeline.with_overlay_font(load_font(path)?);
        log::info!("overlay font {}", path.display());
    }

    let shared_frame = SharedFrame::new();
    let capture = CaptureLoop::new(
        source,
        pipeline,
        shared_frame.clone(),
        cfg.source.frame_interval,
    )
    .spawn()?;

    let preview = match &cfg.preview.path {
        Some(path) => Some(PreviewWriter::spawn(
            shared_frame,
            path.clone(),
            cfg.preview.interval,
            cfg.snapshot.jpeg_quality,
        )?),
        None => None,
    };

    log::info!("plated running. writing to {}", cfg.db_path);
    log::info!(
        "source={} roi={}..{} cooldown={}ms",
        cfg.source.uri,
        cfg.roi.y_start,
        cfg.roi.y_end,
        cfg.cooldown.as_millis()
    );

    let (tx, rx) = mpsc::channel();
    ctrlc::set_handler(move || {
        let _ = tx.send(());
    })
    .expect("error setting Ctrl-C handler");

    loop {
        match rx.recv_timeout(HEALTH_INTERVAL) {
            Err(mpsc::RecvTimeoutError::Timeout) => {
                let capture_stats = capture.stats();
                let pipeline_stats = capture.pipeline_stats();
                log::info!(
                    "capture running={} frames={} rewinds={} read_failures={} | processed={} skipped={} detections={} new={} merged={} detector_failures={} store_failures={}",
                    capture.is_running(),
                    capture_stats.frames_captured,
                    capture_stats.rewinds,
                    capture_stats.read_failures,
                    pipeline_stats.frames_processed,
                    pipeline_stats.cooldown_skips,
                    pipeline_stats.detections,
                    pipeline_stats.new_vehicles,
                    pipeline_stats.merged_sightings,
                    pipeline_stats.detector_failures,
                    pipeline_stats.store_failures
                );
            }
            _ => break,
        }
    }

    log::info!("shutdown signal received, stopping capture...");
    if let Some(preview) = preview {
        preview.stop()?;
    }
    let control = capture.control();
    capture.stop()?;
    log::debug!("window at shutdown: {}", control.detections_json()?);
    log::info!("plated stopped");
    Ok(())
}

fn build_detectors(cfg: &PlateWatchConfig) -> Result<BackendRegistry> {
    let detector = &cfg.detector;
    if detector.vehicle_model.is_some() || detector.character_model.is_some() {
        return build_model_detectors(cfg);
    }
    if cfg.source.uri.starts_with("stub://") {
        log::warn!("no detector models configured; using scripted stub detectors");
        return Ok(stub_detectors());
    }
    Err(anyhow!(
        "detector models required for source {} (set PLATE_WATCH_VEHICLE_MODEL and PLATE_WATCH_CHARACTER_MODEL)",
        cfg.source.uri
    ))
}

#[cfg(feature = "backend-tract")]
fn build_model_detectors(cfg: &PlateWatchConfig) -> Result<BackendRegistry> {
    use plate_watch::config::read_label_file;
    use plate_watch::detect::TractBackend;

    let detector = &cfg.detector;
    let (Some(vehicle_model), Some(character_model)) =
        (&detector.vehicle_model, &detector.character_model)
    else {
        return Err(anyhow!("both vehicle_model and character_model must be set"));
    };
    let labels = |path: &Option<PathBuf>, what: &str| -> Result<Vec<String>> {
        let path = path
            .as_ref()
            .ok_or_else(|| anyhow!("detector.{}_labels is required with a model", what))?;
        read_label_file(path)
    };

    let mut registry = BackendRegistry::new();
    registry.register(TractBackend::new(
        vehicle_model,
        DetectionCapability::Vehicle,
        detector.input_size,
        labels(&detector.vehicle_labels, "vehicle")?,
    )?);
    registry.register(TractBackend::new(
        character_model,
        DetectionCapability::Character,
        detector.input_size,
        labels(&detector.character_labels, "character")?,
    )?);
    log::info!("detector backends: {:?}", registry.list());
    Ok(registry)
}

#[cfg(not(feature = "backend-tract"))]
fn build_model_detectors(_cfg: &PlateWatchConfig) -> Result<BackendRegistry> {
    Err(anyhow!("detector models require the backend-tract feature"))
}

/// Scripted detectors for `stub://` sources: one car crossing the default
/// detection band of a 640x480 frame, read fully, partially, then not at all.
fn stub_detectors() -> BackendRegistry {
    let car = Detection::new("car", 0.9, BoundingBox::new(100, 250, 540, 400));
    let token = |label: &str, x: i32| Detection::new(label, 0.8, BoundingBox::new(x, 90, x + 24, 130));
    let full_read = vec![
        token("A01", 150),
        token("A02", 176),
        token("1", 210),
        token("2", 236),
        token("3", 262),
        token("4", 288),
        token("Bangkok", 180),
    ];
    let partial_read = vec![token("2", 236), token("3", 262), token("4", 288)];

    let mut registry = BackendRegistry::new();
    registry.register(StubBackend::new(DetectionCapability::Vehicle).with_script(vec![
        vec![car.clone()],
        vec![car],
        vec![],
    ]));
    registry.register(
        StubBackend::new(DetectionCapability::Character).with_script(vec![full_read, partial_read]),
    );
    registry
}

/// Periodically writes the latest annotated frame to disk.
struct PreviewWriter {
    running: Arc<AtomicBool>,
    join: JoinHandle<()>,
}

impl PreviewWriter {
    fn spawn(frame: SharedFrame, path: PathBuf, interval: Duration, quality: u8) -> Result<Self> {
        let running = Arc::new(AtomicBool::new(true));
        let running_thread = running.clone();
        log::info!("preview frames written to {}", path.display());
        let join = std::thread::Builder::new()
            .name("preview".to_string())
            .spawn(move || {
                while running_thread.load(Ordering::SeqCst) {
                    match frame.read_jpeg(quality) {
                        Ok(Some(jpeg)) => {
                            if let Err(e) = write_atomically(&path, &jpeg) {
                                log::warn!("preview write to {} failed: {}", path.display(), e);
                            }
                        }
                        Ok(None) => {}
                        Err(e) => log::warn!("preview frame unavailable: {}", e),
                    }
                    std::thread::sleep(interval);
                }
            })
            .map_err(|e| anyhow!("failed to spawn preview thread: {}", e))?;
        Ok(Self { running, join })
    }

    fn stop(self) -> Result<()> {
        self.running.store(false, Ordering::SeqCst);
        self.join
            .join()
            .map_err(|_| anyhow!("preview thread panicked"))
    }
}

fn write_atomically(path: &Path, bytes: &[u8]) -> Result<()> {
    let tmp = path.with_extension("tmp");
    std::fs::write(&tmp, bytes)?;
    std::fs::rename(&tmp, path)?;
    Ok(())
}
