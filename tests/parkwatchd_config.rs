use std::sync::Mutex;

use tempfile::NamedTempFile;

use parkwatch::config::ParkwatchConfig;

static ENV_LOCK: Mutex<()> = Mutex::new(());

fn clear_env() {
    for key in [
        "PARKWATCH_CONFIG",
        "PARKWATCH_SOURCE_URL",
        "PARKWATCH_STREAM_ADDR",
        "PARKWATCH_STATUS_PATH",
        "PARKWATCH_ALERT_SOUND",
        "PARKWATCH_ALERT_COOLDOWN_SECS",
    ] {
        std::env::remove_var(key);
    }
}

#[test]
fn loads_config_from_file_and_env_overrides() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let mut file = NamedTempFile::new().expect("temp config");
    let json = r#"{
        "source": {
            "url": "http://camera-1/stream",
            "target_fps": 12,
            "width": 800,
            "height": 600
        },
        "regions": {
            "left": {"x1": 0, "y1": 0, "x2": 400, "y2": 600},
            "right": {"x1": 400, "y1": 0, "x2": 800, "y2": 600}
        },
        "stream": {"addr": "0.0.0.0:9000"},
        "status_path": "status_prod.json",
        "alert": {"cooldown_secs": 10, "sound_path": "sounds/alert.mp3"},
        "detector": {"backend": "stub", "confidence_threshold": 0.5}
    }"#;
    std::io::Write::write_all(&mut file, json.as_bytes()).expect("write config");

    std::env::set_var("PARKWATCH_CONFIG", file.path());
    std::env::set_var("PARKWATCH_STATUS_PATH", "override.json");
    std::env::set_var("PARKWATCH_ALERT_COOLDOWN_SECS", "3");

    let cfg = ParkwatchConfig::load().expect("load config");

    assert_eq!(cfg.source.url, "http://camera-1/stream");
    assert_eq!(cfg.source.target_fps, 12);
    assert_eq!(cfg.source.width, 800);
    assert_eq!(cfg.source.height, 600);
    assert_eq!(cfg.regions.left.x2, 400);
    assert_eq!(cfg.regions.right.x1, 400);
    assert_eq!(cfg.stream_addr, "0.0.0.0:9000");
    assert_eq!(cfg.status_path.to_str().unwrap(), "override.json");
    assert_eq!(cfg.alert.cooldown.as_secs(), 3);
    assert_eq!(
        cfg.alert.sound_path.as_ref().unwrap().to_str().unwrap(),
        "sounds/alert.mp3"
    );
    assert_eq!(cfg.detector.backend, "stub");
    assert_eq!(cfg.detector.confidence_threshold, 0.5);

    clear_env();
}

#[test]
fn defaults_match_the_original_deployment() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let cfg = ParkwatchConfig::load().expect("load config");

    assert_eq!(cfg.source.url, "stub://lot_camera");
    assert_eq!(cfg.source.target_fps, 10);
    assert_eq!(cfg.regions.left.x1, 10);
    assert_eq!(cfg.regions.left.y1, 15);
    assert_eq!(cfg.regions.left.x2, 320);
    assert_eq!(cfg.regions.left.y2, 445);
    assert_eq!(cfg.regions.right.x1, 320);
    assert_eq!(cfg.regions.right.x2, 630);
    assert_eq!(cfg.status_path.to_str().unwrap(), "data.json");
    assert_eq!(cfg.alert.cooldown.as_secs(), 5);
    assert_eq!(cfg.stream_addr, "127.0.0.1:8080");
    assert_eq!(cfg.detector.backend, "stub");

    clear_env();
}

#[test]
fn degenerate_regions_are_rejected_at_load_time() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let mut file = NamedTempFile::new().expect("temp config");
    let json = r#"{
        "regions": {
            "left": {"x1": 400, "y1": 0, "x2": 100, "y2": 600},
            "right": {"x1": 400, "y1": 0, "x2": 800, "y2": 600}
        }
    }"#;
    std::io::Write::write_all(&mut file, json.as_bytes()).expect("write config");
    std::env::set_var("PARKWATCH_CONFIG", file.path());

    assert!(ParkwatchConfig::load().is_err());

    clear_env();
}

#[test]
fn zero_cooldown_is_rejected() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    std::env::set_var("PARKWATCH_ALERT_COOLDOWN_SECS", "0");
    assert!(ParkwatchConfig::load().is_err());

    clear_env();
}
