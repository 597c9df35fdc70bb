//! Frame ingestion sources.
//!
//! This module provides different sources for video frames:
//! - Local capture devices (feature: ingest-v4l2, with a `stub://` synthetic
//!   fallback for tests and demo runs)
//! - HTTP MJPEG/JPEG streams (feature: ingest-http)
//!
//! All sources produce `VideoFrame` instances for the frame processor and
//! share one capture contract: `next_frame` yields `Ok(Some(frame))` per
//! captured frame and `Ok(None)` at end-of-stream, so a finite source
//! terminates the capture loop without an error.
//!
//! The ingestion layer is responsible for:
//! - Assigning strictly increasing frame indices
//! - Rate limiting / frame decimation
//!
//! Sources MUST NOT store frames to disk.

pub mod camera;
#[cfg(feature = "ingest-http")]
pub mod http;

pub use camera::CameraSource;
#[cfg(feature = "ingest-http")]
pub use http::HttpSource;
