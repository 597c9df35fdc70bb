#![cfg(feature = "backend-tract")]

use std::path::Path;

use anyhow::{anyhow, Context, Result};
use tract_ndarray::Axis;
use tract_onnx::prelude::*;

use crate::detect::backend::{DetectionCapability, DetectorBackend};
use crate::detect::result::{BoundingBox, Detection, DetectionResult, ObjectClass};

/// Tract-based backend for ONNX vehicle detection.
///
/// Loads a local model file, normalizes RGB8 frames to NCHW f32, and decodes
/// a YOLO-layout output tensor `[1, 4+nc, N]` (cx, cy, w, h followed by
/// per-class scores) into pixel-space detections. No network I/O.
pub struct TractBackend {
    model: TypedRunnableModel<TypedModel>,
    width: u32,
    height: u32,
    confidence_threshold: f32,
    iou_threshold: f32,
}

impl TractBackend {
    /// Load an ONNX model from disk and prepare it for inference.
    pub fn new<P: AsRef<Path>>(model_path: P, width: u32, height: u32) -> Result<Self> {
        let model_path = model_path.as_ref();
        let model = tract_onnx::onnx()
            .model_for_path(model_path)
            .with_context(|| format!("failed to load ONNX model from {}", model_path.display()))?
            .with_input_fact(
                0,
                InferenceFact::dt_shape(
                    f32::datum_type(),
                    tvec!(1, 3, height as usize, width as usize),
                ),
            )
            .context("failed to set input fact")?
            .into_optimized()
            .context("failed to optimize ONNX model")?
            .into_runnable()
            .context("failed to build runnable ONNX model")?;

        Ok(Self {
            model,
            width,
            height,
            confidence_threshold: 0.25,
            iou_threshold: 0.45,
        })
    }

    /// Override the default confidence threshold.
    pub fn with_threshold(mut self, threshold: f32) -> Self {
        self.confidence_threshold = threshold;
        self
    }

    fn build_input(&self, pixels: &[u8], width: u32, height: u32) -> Result<Tensor> {
        if width != self.width || height != self.height {
            return Err(anyhow!(
                "frame size {}x{} does not match model input {}x{}",
                width,
                height,
                self.width,
                self.height
            ));
        }

        let expected_len = (width as usize)
            .checked_mul(height as usize)
            .and_then(|v| v.checked_mul(3))
            .ok_or_else(|| anyhow!("frame dimensions overflow"))?;

        if pixels.len() != expected_len {
            return Err(anyhow!(
                "expected {} RGB bytes, received {}",
                expected_len,
                pixels.len()
            ));
        }

        let width = width as usize;
        let input = tract_ndarray::Array4::from_shape_fn(
            (1, 3, height as usize, width),
            |(_, channel, y, x)| {
                let idx = (y * width + x) * 3 + channel;
                pixels[idx] as f32 / 255.0
            },
        );

        Ok(input.into_tensor())
    }

    fn decode_output(&self, outputs: TVec<TValue>) -> Result<Vec<Detection>> {
        let output = outputs
            .first()
            .ok_or_else(|| anyhow!("model produced no outputs"))?;
        let view = output
            .to_array_view::<f32>()
            .context("model output tensor was not f32")?;

        // Accept [1, 4+nc, N] or [4+nc, N].
        let preds = match view.ndim() {
            3 => view.index_axis_move(Axis(0), 0),
            2 => view,
            n => return Err(anyhow!("unexpected model output rank {}", n)),
        };
        let rows = preds.shape()[0];
        if rows < 5 {
            return Err(anyhow!(
                "model output has {} rows; expected cx,cy,w,h + class scores",
                rows
            ));
        }
        let class_count = rows - 4;

        let mut candidates = Vec::new();
        for anchor in preds.axis_iter(Axis(1)) {
            let mut class_id = 0usize;
            let mut confidence = f32::NEG_INFINITY;
            for k in 0..class_count {
                let score = anchor[[4 + k]];
                if score > confidence {
                    class_id = k;
                    confidence = score;
                }
            }

            if !confidence.is_finite() || confidence < self.confidence_threshold {
                continue;
            }

            let cx = anchor[[0]];
            let cy = anchor[[1]];
            let w = anchor[[2]];
            let h = anchor[[3]];
            let x1 = (cx - w / 2.0).clamp(0.0, self.width as f32);
            let y1 = (cy - h / 2.0).clamp(0.0, self.height as f32);
            let x2 = (cx + w / 2.0).clamp(0.0, self.width as f32);
            let y2 = (cy + h / 2.0).clamp(0.0, self.height as f32);
            if x2 <= x1 || y2 <= y1 {
                continue;
            }

            candidates.push(Detection {
                bbox: BoundingBox {
                    x1: x1 as i32,
                    y1: y1 as i32,
                    x2: x2 as i32,
                    y2: y2 as i32,
                },
                class: class_for_id(class_id),
                confidence,
            });
        }

        Ok(non_max_suppression(candidates, self.iou_threshold))
    }
}

impl DetectorBackend for TractBackend {
    fn name(&self) -> &'static str {
        "tract"
    }

    fn supports(&self, capability: DetectionCapability) -> bool {
        matches!(
            capability,
            DetectionCapability::ObjectDetection | DetectionCapability::Classification
        )
    }

    fn detect(&mut self, pixels: &[u8], width: u32, height: u32) -> Result<DetectionResult> {
        let input = self.build_input(pixels, width, height)?;
        let outputs = self
            .model
            .run(tvec!(input.into()))
            .context("ONNX inference failed")?;
        let detections = self.decode_output(outputs)?;

        Ok(DetectionResult { detections })
    }

    fn warm_up(&mut self) -> Result<()> {
        let zeros = vec![0u8; (self.width * self.height * 3) as usize];
        let input = self.build_input(&zeros, self.width, self.height)?;
        self.model
            .run(tvec!(input.into()))
            .context("ONNX warm-up inference failed")?;
        Ok(())
    }
}

/// Map COCO-style class ids onto the vehicle classes this pipeline knows.
fn class_for_id(class_id: usize) -> ObjectClass {
    match class_id {
        2 => ObjectClass::Car,
        3 => ObjectClass::Motorcycle,
        5 => ObjectClass::Bus,
        7 => ObjectClass::Truck,
        _ => ObjectClass::Unknown,
    }
}

fn iou(a: &BoundingBox, b: &BoundingBox) -> f32 {
    let ix1 = a.x1.max(b.x1);
    let iy1 = a.y1.max(b.y1);
    let ix2 = a.x2.min(b.x2);
    let iy2 = a.y2.min(b.y2);
    let iw = (ix2 - ix1).max(0) as f32;
    let ih = (iy2 - iy1).max(0) as f32;
    let inter = iw * ih;
    let area_a = ((a.x2 - a.x1) as f32) * ((a.y2 - a.y1) as f32);
    let area_b = ((b.x2 - b.x1) as f32) * ((b.y2 - b.y1) as f32);
    let union = area_a + area_b - inter;
    if union <= 0.0 {
        0.0
    } else {
        inter / union
    }
}

/// Greedy non-max suppression: keep the highest-confidence box, drop anything
/// overlapping it beyond the threshold, repeat.
fn non_max_suppression(mut candidates: Vec<Detection>, iou_threshold: f32) -> Vec<Detection> {
    candidates.sort_by(|a, b| {
        b.confidence
            .partial_cmp(&a.confidence)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let mut kept: Vec<Detection> = Vec::new();
    for candidate in candidates {
        if kept
            .iter()
            .all(|d| iou(&d.bbox, &candidate.bbox) <= iou_threshold)
        {
            kept.push(candidate);
        }
    }
    kept
}
