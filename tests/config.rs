use std::io::Write;
use std::sync::Mutex;
use std::time::Duration;

use tempfile::NamedTempFile;

use plate_watch::config::PlateWatchConfig;

static ENV_LOCK: Mutex<()> = Mutex::new(());

fn clear_env() {
    for key in [
        "PLATE_WATCH_CONFIG",
        "PLATE_WATCH_DB_PATH",
        "PLATE_WATCH_SOURCE",
        "PLATE_WATCH_COOLDOWN_MS",
        "PLATE_WATCH_ROI",
        "PLATE_WATCH_VEHICLE_MODEL",
        "PLATE_WATCH_CHARACTER_MODEL",
        "PLATE_WATCH_PREVIEW_PATH",
        "PLATE_WATCH_OVERLAY_FONT",
    ] {
        std::env::remove_var(key);
    }
}

#[test]
fn defaults_without_file_or_env() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let cfg = PlateWatchConfig::load().expect("load config");
    assert_eq!(cfg.db_path, "vehicle.db");
    assert_eq!(cfg.source.uri, "stub://camera");
    assert_eq!(cfg.source.frame_interval, Duration::from_millis(50));
    assert_eq!(cfg.cooldown, Duration::from_secs(1));
    assert_eq!(cfg.roi.y_start, 0.6);
    assert_eq!(cfg.roi.y_end, 0.75);
    assert_eq!(cfg.detector.vehicle_confidence, 0.4);
    assert_eq!(cfg.detector.character_confidence, 0.3);
    assert_eq!(cfg.window.capacity, 10);
    assert_eq!(cfg.snapshot.margin_px, 20);
}

#[test]
fn loads_json_file_and_env_overrides() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let mut file = NamedTempFile::new().expect("temp config");
    let json = r#"{
        "db_path": "gate.db",
        "cooldown_ms": 1500,
        "source": { "uri": "/srv/frames", "frame_interval_ms": 40 },
        "detector": { "vehicle_confidence": 0.5, "input_size": 320 },
        "window": { "capacity": 20, "merge_seconds": 3.0 },
        "preview": { "interval_ms": 250 }
    }"#;
    file.write_all(json.as_bytes()).expect("write config");

    std::env::set_var("PLATE_WATCH_CONFIG", file.path());
    std::env::set_var("PLATE_WATCH_SOURCE", "stub://lane2");
    std::env::set_var("PLATE_WATCH_ROI", "0.5,0.7");
    std::env::set_var("PLATE_WATCH_PREVIEW_PATH", "/tmp/preview.jpg");
    std::env::set_var("PLATE_WATCH_OVERLAY_FONT", "/usr/share/fonts/label.ttf");

    let cfg = PlateWatchConfig::load().expect("load config");
    assert_eq!(cfg.db_path, "gate.db");
    assert_eq!(cfg.cooldown, Duration::from_millis(1500));
    assert_eq!(cfg.source.uri, "stub://lane2");
    assert_eq!(cfg.source.frame_interval, Duration::from_millis(40));
    assert_eq!(cfg.roi.y_start, 0.5);
    assert_eq!(cfg.roi.y_end, 0.7);
    assert_eq!(cfg.detector.vehicle_confidence, 0.5);
    assert_eq!(cfg.detector.input_size, 320);
    assert_eq!(cfg.window.capacity, 20);
    assert_eq!(cfg.preview.path.as_deref(), Some(std::path::Path::new("/tmp/preview.jpg")));
    assert_eq!(cfg.preview.interval, Duration::from_millis(250));
    assert_eq!(
        cfg.overlay.font.as_deref(),
        Some(std::path::Path::new("/usr/share/fonts/label.ttf"))
    );

    let pipeline = cfg.pipeline_config();
    assert_eq!(pipeline.window_capacity, 20);
    assert_eq!(pipeline.merge_seconds, 3.0);

    clear_env();
}

#[test]
fn loads_toml_file() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let mut file = tempfile::Builder::new()
        .suffix(".toml")
        .tempfile()
        .expect("temp config");
    let toml = r#"
        db_path = "toml.db"

        [snapshot]
        margin_px = 8
        jpeg_quality = 60
    "#;
    file.write_all(toml.as_bytes()).expect("write config");
    std::env::set_var("PLATE_WATCH_CONFIG", file.path());
    std::env::set_var("PLATE_WATCH_COOLDOWN_MS", "0");

    let cfg = PlateWatchConfig::load().expect("load config");
    assert_eq!(cfg.db_path, "toml.db");
    assert_eq!(cfg.snapshot.margin_px, 8);
    assert_eq!(cfg.snapshot.jpeg_quality, 60);
    assert_eq!(cfg.cooldown, Duration::ZERO);

    clear_env();
}

#[test]
fn rejects_invalid_overrides() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    std::env::set_var("PLATE_WATCH_ROI", "0.9,0.1");
    assert!(PlateWatchConfig::load().is_err());
    clear_env();

    std::env::set_var("PLATE_WATCH_COOLDOWN_MS", "soon");
    assert!(PlateWatchConfig::load().is_err());
    clear_env();

    std::env::set_var("PLATE_WATCH_CONFIG", "/nonexistent/plate-watch.json");
    assert!(PlateWatchConfig::load().is_err());
    clear_env();
}
