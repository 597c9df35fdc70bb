//! parkwatch
//!
//! This crate implements a double-parking detection pipeline for a fixed
//! camera view.
//!
//! # Architecture
//!
//! Frames flow through a single per-frame pipeline:
//!
//! 1. **Ingest**: a frame source produces RGB frames (`ingest`).
//! 2. **Detect**: a pluggable backend reports vehicle bounding boxes (`detect`).
//! 3. **Decide**: detections are tested against two fixed regions; both
//!    occupied at once means double parking (`Region`, `RegionPair`).
//! 4. **Persist**: the current flag is overwritten to a status file (`status`).
//! 5. **Alert**: a rate-limited audio alert is dispatched to a worker (`alert`).
//! 6. **Annotate + stream**: the frame is drawn on, JPEG-encoded, and served
//!    as an MJPEG stream (`annotate`, `stream`).
//!
//! # Module Structure
//!
//! - `ingest`: frame sources (camera device, HTTP streams, synthetic stubs)
//! - `detect`: detector backends and the detection result model
//! - `processor`: the per-frame pipeline tying everything together
//! - Core types: `Region`, `RegionPair`, `RegionOccupancy`

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};

pub mod alert;
pub mod annotate;
pub mod config;
pub mod detect;
pub mod frame;
pub mod ingest;
pub mod processor;
pub mod status;
pub mod stream;

pub use alert::{AlertLimiter, AlertSink, AudioAlerter};
pub use annotate::Annotator;
pub use config::ParkwatchConfig;
pub use detect::{
    BackendRegistry, BoundingBox, Detection, DetectionResult, DetectorBackend, ObjectClass,
    StubBackend,
};
pub use frame::VideoFrame;
pub use ingest::{camera::CameraConfig, CameraSource};
#[cfg(feature = "ingest-http")]
pub use ingest::{http::HttpConfig, HttpSource};
pub use processor::{FrameProcessor, ProcessedFrame};
pub use status::{FileStatusStore, InMemoryStatusStore, ParkingStatus, StatusStore};
pub use stream::{FramePublisher, StreamConfig, StreamServer};

// -------------------- Regions --------------------

/// Fixed rectangular zone of interest in the frame, in pixel coordinates.
///
/// Invariant: `x1 < x2` and `y1 < y2`, enforced at construction. Frame-time
/// code may therefore assume every `Region` is well-formed.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Region {
    pub x1: i32,
    pub y1: i32,
    pub x2: i32,
    pub y2: i32,
}

impl Region {
    pub fn new(x1: i32, y1: i32, x2: i32, y2: i32) -> Result<Self> {
        if x1 >= x2 || y1 >= y2 {
            return Err(anyhow!(
                "region ({},{})-({},{}) is degenerate: requires x1 < x2 and y1 < y2",
                x1,
                y1,
                x2,
                y2
            ));
        }
        Ok(Self { x1, y1, x2, y2 })
    }

    /// Re-check the invariant on a deserialized region.
    pub fn validate(&self) -> Result<()> {
        Self::new(self.x1, self.y1, self.x2, self.y2).map(|_| ())
    }

    /// Axis-aligned rectangle intersection via separating-axis rejection.
    ///
    /// Touching edges count as overlap (non-strict inequalities reject).
    pub fn overlaps(&self, bbox: &detect::BoundingBox) -> bool {
        !(bbox.x2 < self.x1 || bbox.x1 > self.x2 || bbox.y2 < self.y1 || bbox.y1 > self.y2)
    }
}

/// The two process-lifetime zones watched for double parking.
///
/// Defaults reproduce the original deployment: a left and a right half of a
/// 640x480 view, split at x=320.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct RegionPair {
    pub left: Region,
    pub right: Region,
}

impl RegionPair {
    pub fn new(left: Region, right: Region) -> Self {
        Self { left, right }
    }

    pub fn validate(&self) -> Result<()> {
        self.left.validate()?;
        self.right.validate()
    }

    /// Independent OR scans per region; one detection may set both flags.
    pub fn occupancy(&self, detections: &[detect::Detection]) -> RegionOccupancy {
        let left = detections.iter().any(|d| self.left.overlaps(&d.bbox));
        let right = detections.iter().any(|d| self.right.overlaps(&d.bbox));
        RegionOccupancy { left, right }
    }
}

impl Default for RegionPair {
    fn default() -> Self {
        Self {
            left: Region {
                x1: 10,
                y1: 15,
                x2: 320,
                y2: 445,
            },
            right: Region {
                x1: 320,
                y1: 15,
                x2: 630,
                y2: 445,
            },
        }
    }
}

/// Per-frame occupancy verdict. Pure function of one frame's detections;
/// nothing carries across frames.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RegionOccupancy {
    pub left: bool,
    pub right: bool,
}

impl RegionOccupancy {
    pub fn double_parked(&self) -> bool {
        self.left && self.right
    }

    pub fn any(&self) -> bool {
        self.left || self.right
    }
}

// -------------------- Tests --------------------
