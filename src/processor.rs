//! Per-frame pipeline.
//!
//! For each captured frame, in order: detect, test region overlap, decide
//! double parking, persist the flag, trigger a rate-limited alert, annotate,
//! and encode for transport.
//!
//! Fault isolation: a backend error degrades to "no detections" and a status
//! write failure is logged; neither aborts the frame. Only encoding failure
//! propagates, and the caller is expected to log it and continue with the
//! next frame so one bad frame never kills the stream.

use std::time::Instant;

use anyhow::Result;

use crate::alert::{AlertLimiter, AlertSink};
use crate::annotate::Annotator;
use crate::detect::{BackendRegistry, Detection};
use crate::frame::VideoFrame;
use crate::status::{ParkingStatus, StatusStore};
use crate::{RegionOccupancy, RegionPair};

pub struct FrameProcessor {
    regions: RegionPair,
    registry: BackendRegistry,
    status: Box<dyn StatusStore>,
    limiter: AlertLimiter,
    alert: Box<dyn AlertSink>,
    annotator: Annotator,
}

/// Outcome of one frame's pass through the pipeline.
pub struct ProcessedFrame {
    pub occupancy: RegionOccupancy,
    pub double_parked: bool,
    pub detections: Vec<Detection>,
    /// Annotated frame, JPEG-encoded for transport.
    pub jpeg: Vec<u8>,
}

impl FrameProcessor {
    pub fn new(
        regions: RegionPair,
        registry: BackendRegistry,
        status: Box<dyn StatusStore>,
        limiter: AlertLimiter,
        alert: Box<dyn AlertSink>,
        annotator: Annotator,
    ) -> Self {
        Self {
            regions,
            registry,
            status,
            limiter,
            alert,
            annotator,
        }
    }

    /// Process one frame at the current instant.
    pub fn process(&mut self, frame: VideoFrame) -> Result<ProcessedFrame> {
        self.process_at(frame, Instant::now())
    }

    /// Process one frame with an explicit clock reading (tests drive the
    /// alert cooldown through this).
    pub fn process_at(&mut self, mut frame: VideoFrame, now: Instant) -> Result<ProcessedFrame> {
        let detections = match self
            .registry
            .detect(frame.pixels(), frame.width(), frame.height())
        {
            Ok(result) => result.detections,
            Err(err) => {
                log::warn!(
                    "detection failed on frame {}: {}; treating as no detections",
                    frame.index(),
                    err
                );
                Vec::new()
            }
        };

        let occupancy = self.regions.occupancy(&detections);
        let double_parked = occupancy.double_parked();

        let status = ParkingStatus {
            dpark: double_parked,
        };
        if let Err(err) = self.status.write_status(&status) {
            log::error!("status write failed: {}", err);
        }

        if double_parked && self.limiter.try_fire(now) {
            self.alert.trigger();
        }

        self.annotator
            .annotate(frame.image_mut(), &detections, occupancy);
        let jpeg = frame.encode_jpeg()?;

        Ok(ProcessedFrame {
            occupancy,
            double_parked,
            detections,
            jpeg,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alert::CountingAlertSink;
    use crate::detect::{
        BoundingBox, DetectionCapability, DetectionResult, DetectorBackend, ObjectClass,
    };
    use crate::status::InMemoryStatusStore;
    use std::sync::Arc;
    use std::time::Duration;

    /// Backend returning a fixed detection list on every frame.
    struct FixedBackend {
        detections: Vec<Detection>,
    }

    impl DetectorBackend for FixedBackend {
        fn name(&self) -> &'static str {
            "fixed"
        }

        fn supports(&self, capability: DetectionCapability) -> bool {
            matches!(capability, DetectionCapability::ObjectDetection)
        }

        fn detect(&mut self, _pixels: &[u8], _width: u32, _height: u32) -> Result<DetectionResult> {
            Ok(DetectionResult {
                detections: self.detections.clone(),
            })
        }
    }

    /// Backend that always errors, for the degradation path.
    struct BrokenBackend;

    impl DetectorBackend for BrokenBackend {
        fn name(&self) -> &'static str {
            "broken"
        }

        fn supports(&self, _capability: DetectionCapability) -> bool {
            false
        }

        fn detect(&mut self, _pixels: &[u8], _width: u32, _height: u32) -> Result<DetectionResult> {
            anyhow::bail!("model exploded")
        }
    }

    fn det(x1: i32, y1: i32, x2: i32, y2: i32) -> Detection {
        Detection {
            bbox: BoundingBox { x1, y1, x2, y2 },
            class: ObjectClass::Car,
            confidence: 0.9,
        }
    }

    fn processor_with(
        detections: Vec<Detection>,
        cooldown: Duration,
    ) -> (FrameProcessor, Arc<InMemoryStatusStore>, CountingAlertSink) {
        let mut registry = BackendRegistry::new();
        registry.register(FixedBackend { detections });

        let status = Arc::new(InMemoryStatusStore::new());
        let sink = CountingAlertSink::new();
        let processor = FrameProcessor::new(
            RegionPair::default(),
            registry,
            Box::new(status.clone()),
            AlertLimiter::new(cooldown),
            Box::new(sink.clone()),
            Annotator::new(RegionPair::default(), None),
        );
        (processor, status, sink)
    }

    fn frame(index: u64) -> VideoFrame {
        VideoFrame::new(image::RgbImage::new(640, 480), index)
    }

    #[test]
    fn frame_without_detections_persists_false() {
        let (mut processor, status, sink) = processor_with(vec![], Duration::from_secs(5));

        let processed = processor.process(frame(0)).unwrap();

        assert!(!processed.double_parked);
        assert_eq!(status.last(), Some(ParkingStatus { dpark: false }));
        assert_eq!(sink.count(), 0);
        assert!(!processed.jpeg.is_empty());
    }

    #[test]
    fn one_vehicle_per_region_is_double_parking() {
        let (mut processor, status, _sink) = processor_with(
            vec![det(50, 50, 150, 150), det(400, 50, 500, 150)],
            Duration::from_secs(5),
        );

        let processed = processor.process(frame(0)).unwrap();

        assert!(processed.occupancy.left);
        assert!(processed.occupancy.right);
        assert!(processed.double_parked);
        assert_eq!(status.last(), Some(ParkingStatus { dpark: true }));
    }

    #[test]
    fn alerts_within_cooldown_fire_once() {
        let (mut processor, _status, sink) = processor_with(
            vec![det(50, 50, 150, 150), det(400, 50, 500, 150)],
            Duration::from_secs(5),
        );

        let base = Instant::now();
        processor.process_at(frame(0), base).unwrap();
        processor
            .process_at(frame(1), base + Duration::from_secs(2))
            .unwrap();
        assert_eq!(sink.count(), 1);

        processor
            .process_at(frame(2), base + Duration::from_secs(5))
            .unwrap();
        assert_eq!(sink.count(), 2);
    }

    #[test]
    fn backend_errors_degrade_to_no_detections() {
        let mut registry = BackendRegistry::new();
        registry.register(BrokenBackend);

        let status = Arc::new(InMemoryStatusStore::new());
        let mut processor = FrameProcessor::new(
            RegionPair::default(),
            registry,
            Box::new(status.clone()),
            AlertLimiter::new(Duration::from_secs(5)),
            Box::new(CountingAlertSink::new()),
            Annotator::new(RegionPair::default(), None),
        );

        let processed = processor.process(frame(0)).unwrap();

        assert!(processed.detections.is_empty());
        assert!(!processed.double_parked);
        assert_eq!(status.last(), Some(ParkingStatus { dpark: false }));
    }
}
