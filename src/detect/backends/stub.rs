use anyhow::Result;

use crate::detect::backend::{DetectionCapability, DetectorBackend};
use crate::detect::result::{BoundingBox, Detection, DetectionResult, ObjectClass};

/// Frames per sweep cycle.
const SWEEP_PERIOD: u64 = 120;

/// Stub backend for tests and `stub://` demo runs.
///
/// Emits one synthetic vehicle box sweeping horizontally across the frame as
/// a function of an internal frame counter. Over a full sweep the box passes
/// through "outside", "left region only", "both regions", and "right region
/// only" states, so the whole decision pipeline is exercisable without model
/// weights.
pub struct StubBackend {
    frame_count: u64,
}

impl StubBackend {
    pub fn new() -> Self {
        Self { frame_count: 0 }
    }
}

impl Default for StubBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl DetectorBackend for StubBackend {
    fn name(&self) -> &'static str {
        "stub"
    }

    fn supports(&self, capability: DetectionCapability) -> bool {
        matches!(capability, DetectionCapability::ObjectDetection)
    }

    fn detect(&mut self, _pixels: &[u8], width: u32, height: u32) -> Result<DetectionResult> {
        let phase = self.frame_count % SWEEP_PERIOD;
        self.frame_count += 1;

        let width = width as i64;
        let height = height as i64;
        let box_w = (width / 3).max(1);
        let box_h = (height / 3).max(1);

        // Sweep from fully off-screen left to fully off-screen right.
        let travel = width + 2 * box_w;
        let x1 = travel * phase as i64 / SWEEP_PERIOD as i64 - 2 * box_w;
        let x2 = x1 + box_w;

        let mut detections = Vec::new();
        if x2 >= 0 && x1 < width {
            detections.push(Detection {
                bbox: BoundingBox {
                    x1: x1 as i32,
                    y1: (height / 3) as i32,
                    x2: x2 as i32,
                    y2: (2 * height / 3) as i32,
                },
                class: ObjectClass::Car,
                confidence: 0.9,
            });
        }

        Ok(DetectionResult { detections })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::RegionPair;

    #[test]
    fn sweep_starts_off_screen() {
        let mut backend = StubBackend::new();
        let result = backend.detect(&[], 640, 480).unwrap();
        assert!(result.detections.is_empty());
    }

    #[test]
    fn sweep_eventually_occupies_both_regions() {
        let mut backend = StubBackend::new();
        let regions = RegionPair::default();

        let mut saw_left_only = false;
        let mut saw_double = false;
        let mut saw_right_only = false;
        for _ in 0..SWEEP_PERIOD {
            let result = backend.detect(&[], 640, 480).unwrap();
            let occ = regions.occupancy(&result.detections);
            saw_left_only |= occ.left && !occ.right;
            saw_double |= occ.double_parked();
            saw_right_only |= occ.right && !occ.left;
        }

        assert!(saw_left_only);
        assert!(saw_double);
        assert!(saw_right_only);
    }

    #[test]
    fn sweep_is_periodic() {
        let mut a = StubBackend::new();
        let mut b = StubBackend::new();

        // Advance `a` a full period; both should now agree frame-for-frame.
        for _ in 0..SWEEP_PERIOD {
            a.detect(&[], 640, 480).unwrap();
        }
        for _ in 0..10 {
            let ra = a.detect(&[], 640, 480).unwrap();
            let rb = b.detect(&[], 640, 480).unwrap();
            assert_eq!(ra.detections.len(), rb.detections.len());
            if let (Some(da), Some(db)) = (ra.detections.first(), rb.detections.first()) {
                assert_eq!(da.bbox, db.bbox);
            }
        }
    }
}
