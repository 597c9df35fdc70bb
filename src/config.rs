use anyhow::{anyhow, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::{Region, RegionPair};

const DEFAULT_SOURCE_URL: &str = "stub://lot_camera";
const DEFAULT_SOURCE_FPS: u32 = 10;
const DEFAULT_SOURCE_WIDTH: u32 = 640;
const DEFAULT_SOURCE_HEIGHT: u32 = 480;
const DEFAULT_STREAM_ADDR: &str = "127.0.0.1:8080";
const DEFAULT_STATUS_PATH: &str = "data.json";
const DEFAULT_ALERT_COOLDOWN_SECS: u64 = 5;
const DEFAULT_DETECTOR_BACKEND: &str = "stub";
const DEFAULT_CONFIDENCE_THRESHOLD: f32 = 0.25;

#[derive(Debug, Deserialize, Default)]
struct ParkwatchConfigFile {
    source: Option<SourceConfigFile>,
    regions: Option<RegionsConfigFile>,
    stream: Option<StreamConfigFile>,
    status_path: Option<String>,
    alert: Option<AlertConfigFile>,
    detector: Option<DetectorConfigFile>,
}

#[derive(Debug, Deserialize, Default)]
struct SourceConfigFile {
    url: Option<String>,
    target_fps: Option<u32>,
    width: Option<u32>,
    height: Option<u32>,
}

#[derive(Debug, Deserialize, Default)]
struct RegionsConfigFile {
    left: Option<Region>,
    right: Option<Region>,
}

#[derive(Debug, Deserialize, Default)]
struct StreamConfigFile {
    addr: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
struct AlertConfigFile {
    cooldown_secs: Option<u64>,
    sound_path: Option<PathBuf>,
}

#[derive(Debug, Deserialize, Default)]
struct DetectorConfigFile {
    backend: Option<String>,
    model_path: Option<PathBuf>,
    confidence_threshold: Option<f32>,
    font_path: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct ParkwatchConfig {
    pub source: SourceSettings,
    pub regions: RegionPair,
    pub stream_addr: String,
    pub status_path: PathBuf,
    pub alert: AlertSettings,
    pub detector: DetectorSettings,
}

#[derive(Debug, Clone)]
pub struct SourceSettings {
    pub url: String,
    pub target_fps: u32,
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Clone)]
pub struct AlertSettings {
    pub cooldown: Duration,
    pub sound_path: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct DetectorSettings {
    pub backend: String,
    pub model_path: Option<PathBuf>,
    pub confidence_threshold: f32,
    pub font_path: Option<PathBuf>,
}

impl ParkwatchConfig {
    /// Load configuration: optional JSON file named by `PARKWATCH_CONFIG`,
    /// then `PARKWATCH_*` environment overrides, then validation.
    pub fn load() -> Result<Self> {
        let config_path = std::env::var("PARKWATCH_CONFIG").ok();
        Self::load_from(config_path.as_deref().map(Path::new))
    }

    /// Load from an explicit config path (CLI override), falling back to the
    /// same env-and-defaults behavior as `load`.
    pub fn load_from(config_path: Option<&Path>) -> Result<Self> {
        let file_cfg = match config_path {
            Some(path) => Some(read_config_file(path)?),
            None => None,
        };
        let mut cfg = Self::from_file(file_cfg.unwrap_or_default())?;
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: ParkwatchConfigFile) -> Result<Self> {
        let source = SourceSettings {
            url: file
                .source
                .as_ref()
                .and_then(|source| source.url.clone())
                .unwrap_or_else(|| DEFAULT_SOURCE_URL.to_string()),
            target_fps: file
                .source
                .as_ref()
                .and_then(|source| source.target_fps)
                .unwrap_or(DEFAULT_SOURCE_FPS),
            width: file
                .source
                .as_ref()
                .and_then(|source| source.width)
                .unwrap_or(DEFAULT_SOURCE_WIDTH),
            height: file
                .source
                .as_ref()
                .and_then(|source| source.height)
                .unwrap_or(DEFAULT_SOURCE_HEIGHT),
        };
        let default_regions = RegionPair::default();
        let regions = RegionPair {
            left: file
                .regions
                .as_ref()
                .and_then(|regions| regions.left)
                .unwrap_or(default_regions.left),
            right: file
                .regions
                .as_ref()
                .and_then(|regions| regions.right)
                .unwrap_or(default_regions.right),
        };
        let stream_addr = file
            .stream
            .as_ref()
            .and_then(|stream| stream.addr.clone())
            .unwrap_or_else(|| DEFAULT_STREAM_ADDR.to_string());
        let status_path = file
            .status_path
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_STATUS_PATH));
        let alert = AlertSettings {
            cooldown: Duration::from_secs(
                file.alert
                    .as_ref()
                    .and_then(|alert| alert.cooldown_secs)
                    .unwrap_or(DEFAULT_ALERT_COOLDOWN_SECS),
            ),
            sound_path: file.alert.and_then(|alert| alert.sound_path),
        };
        let detector = DetectorSettings {
            backend: file
                .detector
                .as_ref()
                .and_then(|detector| detector.backend.clone())
                .unwrap_or_else(|| DEFAULT_DETECTOR_BACKEND.to_string()),
            model_path: file
                .detector
                .as_ref()
                .and_then(|detector| detector.model_path.clone()),
            confidence_threshold: file
                .detector
                .as_ref()
                .and_then(|detector| detector.confidence_threshold)
                .unwrap_or(DEFAULT_CONFIDENCE_THRESHOLD),
            font_path: file.detector.and_then(|detector| detector.font_path),
        };
        Ok(Self {
            source,
            regions,
            stream_addr,
            status_path,
            alert,
            detector,
        })
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Ok(url) = std::env::var("PARKWATCH_SOURCE_URL") {
            if !url.trim().is_empty() {
                self.source.url = url;
            }
        }
        if let Ok(addr) = std::env::var("PARKWATCH_STREAM_ADDR") {
            if !addr.trim().is_empty() {
                self.stream_addr = addr;
            }
        }
        if let Ok(path) = std::env::var("PARKWATCH_STATUS_PATH") {
            if !path.trim().is_empty() {
                self.status_path = PathBuf::from(path);
            }
        }
        if let Ok(path) = std::env::var("PARKWATCH_ALERT_SOUND") {
            if !path.trim().is_empty() {
                self.alert.sound_path = Some(PathBuf::from(path));
            }
        }
        if let Ok(cooldown) = std::env::var("PARKWATCH_ALERT_COOLDOWN_SECS") {
            let seconds: u64 = cooldown.parse().map_err(|_| {
                anyhow!("PARKWATCH_ALERT_COOLDOWN_SECS must be an integer number of seconds")
            })?;
            self.alert.cooldown = Duration::from_secs(seconds);
        }
        Ok(())
    }

    fn validate(&mut self) -> Result<()> {
        self.regions.validate()?;

        if self.alert.cooldown.is_zero() {
            return Err(anyhow!("alert cooldown must be greater than zero"));
        }
        if self.source.width == 0 || self.source.height == 0 {
            return Err(anyhow!("source dimensions must be non-zero"));
        }
        self.stream_addr
            .parse::<std::net::SocketAddr>()
            .map_err(|_| anyhow!("stream addr '{}' is not a socket address", self.stream_addr))?;
        if !(0.0..=1.0).contains(&self.detector.confidence_threshold) {
            return Err(anyhow!("detector confidence threshold must be in 0..=1"));
        }
        Ok(())
    }
}

fn read_config_file(path: &Path) -> Result<ParkwatchConfigFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let cfg = serde_json::from_str(&raw)
        .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?;
    Ok(cfg)
}
