//! Frame annotation.
//!
//! Draws the watched regions, every detection box with its label and
//! confidence, and a status banner onto the RGB frame before it is encoded
//! for the stream. Text rendering needs a TTF font; when none can be found
//! the annotator still draws all geometry and logs a single warning at
//! construction time.

use std::path::Path;

use ab_glyph::{FontVec, PxScale};
use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_hollow_rect_mut, draw_text_mut};
use imageproc::rect::Rect;

use crate::detect::Detection;
use crate::{Region, RegionOccupancy, RegionPair};

const REGION_COLOR: Rgb<u8> = Rgb([0, 0, 255]);
const BOX_COLOR: Rgb<u8> = Rgb([0, 255, 0]);
const DOUBLE_PARK_BANNER_COLOR: Rgb<u8> = Rgb([255, 0, 0]);
const REGION_BANNER_COLOR: Rgb<u8> = Rgb([255, 255, 0]);

const DOUBLE_PARK_BANNER: &str = "Double Parking Detected!";
const REGION_BANNER: &str = "Vehicle Detected in Region!";

const LABEL_SCALE: f32 = 16.0;
const BANNER_SCALE: f32 = 28.0;

/// Fallback font locations probed when no font path is configured.
const FONT_SEARCH_PATHS: &[&str] = &[
    "/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf",
    "/usr/share/fonts/TTF/DejaVuSans.ttf",
    "/usr/share/fonts/dejavu/DejaVuSans.ttf",
    "/System/Library/Fonts/Supplemental/Arial.ttf",
];

pub struct Annotator {
    regions: RegionPair,
    font: Option<FontVec>,
}

impl Annotator {
    pub fn new(regions: RegionPair, font_path: Option<&Path>) -> Self {
        let font = load_font(font_path);
        if font.is_none() {
            log::warn!("no usable font found; stream will carry boxes without labels");
        }
        Self { regions, font }
    }

    /// Draw regions, detection boxes, and the status banner in place.
    pub fn annotate(
        &self,
        image: &mut RgbImage,
        detections: &[Detection],
        occupancy: RegionOccupancy,
    ) {
        self.draw_region(image, &self.regions.left);
        self.draw_region(image, &self.regions.right);

        for detection in detections {
            let b = detection.bbox;
            self.draw_outline(image, b.x1, b.y1, b.x2, b.y2, BOX_COLOR);
            if let Some(font) = &self.font {
                let label = format!("{} ({:.2})", detection.class.label(), detection.confidence);
                let y = (b.y1 - LABEL_SCALE as i32 - 2).max(0);
                draw_text_mut(
                    image,
                    BOX_COLOR,
                    b.x1.max(0),
                    y,
                    PxScale::from(LABEL_SCALE),
                    font,
                    &label,
                );
            }
        }

        let banner = if occupancy.double_parked() {
            Some((DOUBLE_PARK_BANNER, DOUBLE_PARK_BANNER_COLOR))
        } else if occupancy.any() {
            Some((REGION_BANNER, REGION_BANNER_COLOR))
        } else {
            None
        };
        if let (Some((text, color)), Some(font)) = (banner, &self.font) {
            draw_text_mut(image, color, 50, 50, PxScale::from(BANNER_SCALE), font, text);
        }
    }

    fn draw_region(&self, image: &mut RgbImage, region: &Region) {
        self.draw_outline(image, region.x1, region.y1, region.x2, region.y2, REGION_COLOR);
    }

    /// Two-pixel hollow rectangle, clamped to the image bounds.
    fn draw_outline(&self, image: &mut RgbImage, x1: i32, y1: i32, x2: i32, y2: i32, color: Rgb<u8>) {
        let (w, h) = (image.width() as i32, image.height() as i32);
        let x1 = x1.clamp(0, w - 1);
        let y1 = y1.clamp(0, h - 1);
        let x2 = x2.clamp(0, w - 1);
        let y2 = y2.clamp(0, h - 1);
        if x2 <= x1 || y2 <= y1 {
            return;
        }

        // Corners are inclusive: a box (x1,y1)-(x2,y2) paints both corner pixels.
        let outer = Rect::at(x1, y1).of_size((x2 - x1 + 1) as u32, (y2 - y1 + 1) as u32);
        draw_hollow_rect_mut(image, outer, color);
        if x2 - x1 > 2 && y2 - y1 > 2 {
            let inner = Rect::at(x1 + 1, y1 + 1).of_size((x2 - x1 - 1) as u32, (y2 - y1 - 1) as u32);
            draw_hollow_rect_mut(image, inner, color);
        }
    }
}

fn load_font(configured: Option<&Path>) -> Option<FontVec> {
    let mut candidates: Vec<std::path::PathBuf> = Vec::new();
    if let Some(path) = configured {
        candidates.push(path.to_path_buf());
    }
    candidates.extend(FONT_SEARCH_PATHS.iter().map(std::path::PathBuf::from));

    for path in candidates {
        match std::fs::read(&path) {
            Ok(bytes) => match FontVec::try_from_vec(bytes) {
                Ok(font) => {
                    log::debug!("annotation font loaded from {}", path.display());
                    return Some(font);
                }
                Err(err) => {
                    log::warn!("font {} is not usable: {}", path.display(), err);
                }
            },
            Err(_) => continue,
        }
    }
    None
}
