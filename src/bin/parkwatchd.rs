//! parkwatchd - double-parking detection daemon
//!
//! This daemon:
//! 1. Captures frames from the configured source (camera device or HTTP)
//! 2. Runs the configured detector backend on each frame
//! 3. Tests detections against the two watched regions
//! 4. Persists the double-parking flag to the status file after every frame
//! 5. Triggers a rate-limited audio alert when both regions are occupied
//! 6. Streams annotated frames over HTTP as MJPEG

use anyhow::{anyhow, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parkwatch::{
    alert::NullAlertSink, AlertLimiter, Annotator, AudioAlerter, BackendRegistry, CameraConfig,
    CameraSource, FileStatusStore, FramePublisher, FrameProcessor, ParkwatchConfig, StreamConfig,
    StreamServer, StubBackend,
};

#[cfg(feature = "ingest-http")]
use parkwatch::{HttpConfig, HttpSource};

#[derive(Parser, Debug)]
#[command(name = "parkwatchd", about = "Double-parking detection daemon")]
struct Args {
    /// Path to the JSON config file.
    #[arg(long, env = "PARKWATCH_CONFIG")]
    config: Option<PathBuf>,
}

enum Source {
    Camera(CameraSource),
    #[cfg(feature = "ingest-http")]
    Http(HttpSource),
}

impl Source {
    fn connect(&mut self) -> Result<()> {
        match self {
            Source::Camera(source) => source.connect(),
            #[cfg(feature = "ingest-http")]
            Source::Http(source) => source.connect(),
        }
    }

    fn next_frame(&mut self) -> Result<Option<parkwatch::VideoFrame>> {
        match self {
            Source::Camera(source) => source.next_frame(),
            #[cfg(feature = "ingest-http")]
            Source::Http(source) => source.next_frame(),
        }
    }

    fn health_line(&self) -> String {
        match self {
            Source::Camera(source) => {
                let stats = source.stats();
                format!(
                    "camera health={} frames={} device={}",
                    source.is_healthy(),
                    stats.frames_captured,
                    stats.device
                )
            }
            #[cfg(feature = "ingest-http")]
            Source::Http(source) => {
                let stats = source.stats();
                format!(
                    "http health={} frames={} url={}",
                    source.is_healthy(),
                    stats.frames_captured,
                    stats.source
                )
            }
        }
    }
}

fn build_source(cfg: &ParkwatchConfig) -> Result<Source> {
    let url = &cfg.source.url;
    if url.starts_with("http://") || url.starts_with("https://") {
        #[cfg(feature = "ingest-http")]
        {
            return Ok(Source::Http(HttpSource::new(HttpConfig {
                url: url.clone(),
                target_fps: cfg.source.target_fps,
            })?));
        }
        #[cfg(not(feature = "ingest-http"))]
        {
            return Err(anyhow!("http sources require the ingest-http feature"));
        }
    }
    Ok(Source::Camera(CameraSource::new(CameraConfig {
        device: url.clone(),
        target_fps: cfg.source.target_fps,
        width: cfg.source.width,
        height: cfg.source.height,
        frame_limit: None,
    })?))
}

fn build_registry(cfg: &ParkwatchConfig) -> Result<BackendRegistry> {
    let mut registry = BackendRegistry::new();
    registry.register(StubBackend::new());

    match cfg.detector.backend.as_str() {
        "stub" => {}
        "tract" => {
            #[cfg(feature = "backend-tract")]
            {
                let model_path = cfg
                    .detector
                    .model_path
                    .as_ref()
                    .ok_or_else(|| anyhow!("tract backend requires detector.model_path"))?;
                let backend = parkwatch::detect::TractBackend::new(
                    model_path,
                    cfg.source.width,
                    cfg.source.height,
                )?
                .with_threshold(cfg.detector.confidence_threshold);
                registry.register(backend);
                registry.set_default("tract")?;
            }
            #[cfg(not(feature = "backend-tract"))]
            {
                return Err(anyhow!("tract backend requires the backend-tract feature"));
            }
        }
        other => return Err(anyhow!("unknown detector backend '{}'", other)),
    }

    registry.warm_up()?;
    Ok(registry)
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let cfg = ParkwatchConfig::load_from(args.config.as_deref())?;

    let stop = Arc::new(AtomicBool::new(false));
    {
        let stop = stop.clone();
        ctrlc::set_handler(move || {
            stop.store(true, Ordering::SeqCst);
        })?;
    }

    let mut source = build_source(&cfg)?;
    source.connect()?;

    let registry = build_registry(&cfg)?;
    log::info!(
        "detector backends: {:?} (default: {})",
        registry.list(),
        cfg.detector.backend
    );

    let alert_sink: Box<dyn parkwatch::AlertSink> = match &cfg.alert.sound_path {
        Some(path) => {
            log::info!("alert sound: {}", path.display());
            Box::new(AudioAlerter::new(path)?)
        }
        None => {
            log::info!("no alert sound configured; alerts will only be logged");
            Box::new(NullAlertSink)
        }
    };

    let publisher = FramePublisher::new();
    let server = StreamServer::new(
        StreamConfig {
            addr: cfg.stream_addr.clone(),
        },
        publisher.clone(),
    );
    let server_handle = server.spawn()?;
    log::info!("stream listening on http://{}", server_handle.addr);

    let mut processor = FrameProcessor::new(
        cfg.regions,
        registry,
        Box::new(FileStatusStore::new(&cfg.status_path)),
        AlertLimiter::new(cfg.alert.cooldown),
        alert_sink,
        Annotator::new(cfg.regions, cfg.detector.font_path.as_deref()),
    );

    log::info!(
        "parkwatchd running. source={} status={} regions: left=({},{})-({},{}) right=({},{})-({},{})",
        cfg.source.url,
        cfg.status_path.display(),
        cfg.regions.left.x1,
        cfg.regions.left.y1,
        cfg.regions.left.x2,
        cfg.regions.left.y2,
        cfg.regions.right.x1,
        cfg.regions.right.y1,
        cfg.regions.right.x2,
        cfg.regions.right.y2,
    );

    let frame_interval = if cfg.source.target_fps > 0 {
        Duration::from_millis((1000 / cfg.source.target_fps).max(1) as u64)
    } else {
        Duration::ZERO
    };
    let mut last_health_log = Instant::now();

    loop {
        if stop.load(Ordering::SeqCst) {
            log::info!("stop requested; shutting down");
            break;
        }

        let frame = match source.next_frame() {
            Ok(Some(frame)) => frame,
            Ok(None) => {
                log::info!("capture source ended");
                break;
            }
            Err(err) => {
                log::error!("capture failed: {}", err);
                break;
            }
        };

        // One bad frame must not kill the stream.
        match processor.process(frame) {
            Ok(processed) => {
                if processed.double_parked {
                    log::debug!("double parking detected ({} boxes)", processed.detections.len());
                }
                publisher.publish(processed.jpeg);
            }
            Err(err) => {
                log::error!("frame processing failed: {}", err);
            }
        }

        if last_health_log.elapsed() >= Duration::from_secs(5) {
            log::info!("{}", source.health_line());
            last_health_log = Instant::now();
        }

        if !frame_interval.is_zero() {
            std::thread::sleep(frame_interval);
        }
    }

    server_handle.stop()?;
    Ok(())
}
