//! Alert rate limiting and audio dispatch.
//!
//! The processor owns an `AlertLimiter` (explicit cooldown state, fed
//! explicit time values) and an `AlertSink`. `AudioAlerter` is the
//! production sink: a dedicated worker thread owns the audio output objects
//! and is fed through a bounded channel, so playback never blocks frame
//! processing. Triggers arriving while the queue is full are dropped, not
//! queued.

use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc::{self, SyncSender, TrySendError};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{anyhow, Context, Result};

/// Suppression window state for alert triggering.
///
/// `try_fire` returns true and records the timestamp iff no alert has fired
/// yet or the cooldown has elapsed since the last accepted fire. Suppressed
/// attempts do not extend the window.
#[derive(Clone, Copy, Debug)]
pub struct AlertLimiter {
    cooldown: Duration,
    last_fired: Option<Instant>,
}

impl AlertLimiter {
    pub fn new(cooldown: Duration) -> Self {
        Self {
            cooldown,
            last_fired: None,
        }
    }

    pub fn try_fire(&mut self, now: Instant) -> bool {
        match self.last_fired {
            Some(last) if now.duration_since(last) < self.cooldown => false,
            _ => {
                self.last_fired = Some(now);
                true
            }
        }
    }
}

/// Fire-and-forget alert seam. `trigger` must not block.
pub trait AlertSink: Send {
    fn trigger(&self);
}

/// Sink used when no alert sound is configured.
pub struct NullAlertSink;

impl AlertSink for NullAlertSink {
    fn trigger(&self) {
        log::debug!("alert triggered (no sound configured)");
    }
}

/// Audio alert sink backed by a dedicated playback worker.
///
/// The rodio output stream and sink are not `Send`, so they are created
/// inside the worker thread, never on the caller side.
pub struct AudioAlerter {
    tx: SyncSender<()>,
}

impl AudioAlerter {
    pub fn new<P: AsRef<Path>>(sound_path: P) -> Result<Self> {
        let sound_path: PathBuf = sound_path.as_ref().to_path_buf();
        File::open(&sound_path)
            .with_context(|| format!("open alert sound {}", sound_path.display()))?;

        let (tx, rx) = mpsc::sync_channel::<()>(1);
        thread::Builder::new()
            .name("alert-audio".to_string())
            .spawn(move || {
                while rx.recv().is_ok() {
                    if let Err(err) = play_once(&sound_path) {
                        log::warn!("alert playback failed: {}", err);
                    }
                }
            })
            .map_err(|e| anyhow!("spawn alert audio worker: {}", e))?;

        Ok(Self { tx })
    }
}

impl AlertSink for AudioAlerter {
    fn trigger(&self) {
        match self.tx.try_send(()) {
            Ok(()) => {}
            Err(TrySendError::Full(())) => {
                log::debug!("alert suppressed: playback already queued");
            }
            Err(TrySendError::Disconnected(())) => {
                log::warn!("alert suppressed: audio worker is gone");
            }
        }
    }
}

fn play_once(sound_path: &Path) -> Result<()> {
    let (_stream, handle) =
        rodio::OutputStream::try_default().context("open default audio output")?;
    let sink = rodio::Sink::try_new(&handle).context("create audio sink")?;
    let file = File::open(sound_path)
        .with_context(|| format!("open alert sound {}", sound_path.display()))?;
    let source = rodio::Decoder::new(BufReader::new(file)).context("decode alert sound")?;
    sink.append(source);
    sink.sleep_until_end();
    Ok(())
}

/// Test sink counting how many triggers actually fired.
#[derive(Clone, Default)]
pub struct CountingAlertSink {
    count: Arc<AtomicUsize>,
}

impl CountingAlertSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn count(&self) -> usize {
        self.count.load(Ordering::SeqCst)
    }
}

impl AlertSink for CountingAlertSink {
    fn trigger(&self) {
        self.count.fetch_add(1, Ordering::SeqCst);
    }
}
