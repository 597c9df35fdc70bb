/// Axis-aligned bounding box in pixel coordinates, `x1 <= x2`, `y1 <= y2`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BoundingBox {
    pub x1: i32,
    pub y1: i32,
    pub x2: i32,
    pub y2: i32,
}

/// One model-reported object instance.
#[derive(Clone, Debug)]
pub struct Detection {
    pub bbox: BoundingBox,
    pub class: ObjectClass,
    pub confidence: f32,
}

#[non_exhaustive]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ObjectClass {
    Car,
    Truck,
    Bus,
    Motorcycle,
    #[default]
    Unknown,
}

impl ObjectClass {
    /// Stable display label, used for annotation.
    pub fn label(&self) -> &'static str {
        match self {
            ObjectClass::Car => "car",
            ObjectClass::Truck => "truck",
            ObjectClass::Bus => "bus",
            ObjectClass::Motorcycle => "motorcycle",
            ObjectClass::Unknown => "vehicle",
        }
    }
}

/// Result of running detection on a frame.
#[derive(Clone, Debug, Default)]
pub struct DetectionResult {
    /// Bounding boxes in pixel coordinates of the input frame.
    pub detections: Vec<Detection>,
}
