//! Frame container and JPEG transport encoding.
//!
//! `VideoFrame` is the unit handed from the ingest layer to the processor.
//! It owns an RGB8 image plus a monotonically increasing frame index
//! assigned by the source.

use anyhow::{Context, Result};
use image::codecs::jpeg::JpegEncoder;
use image::RgbImage;

/// JPEG quality for the transport stream.
const JPEG_QUALITY: u8 = 80;

/// One captured frame.
pub struct VideoFrame {
    image: RgbImage,
    index: u64,
}

impl VideoFrame {
    pub fn new(image: RgbImage, index: u64) -> Self {
        Self { image, index }
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    /// Source-assigned frame index; strictly increasing per source.
    pub fn index(&self) -> u64 {
        self.index
    }

    /// Raw RGB8 pixels, row-major, 3 bytes per pixel.
    pub fn pixels(&self) -> &[u8] {
        self.image.as_raw()
    }

    pub fn image(&self) -> &RgbImage {
        &self.image
    }

    /// Mutable image access for annotation.
    pub fn image_mut(&mut self) -> &mut RgbImage {
        &mut self.image
    }

    /// Encode the frame as JPEG for transport.
    pub fn encode_jpeg(&self) -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        let encoder = JpegEncoder::new_with_quality(&mut buf, JPEG_QUALITY);
        self.image
            .write_with_encoder(encoder)
            .context("encode frame as jpeg")?;
        Ok(buf)
    }
}

/// Decode a JPEG buffer into an RGB8 image.
pub fn decode_jpeg(bytes: &[u8]) -> Result<RgbImage> {
    let image = image::load_from_memory(bytes).context("decode jpeg")?;
    Ok(image.into_rgb8())
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    #[test]
    fn encode_then_decode_preserves_dimensions() {
        let image = RgbImage::from_pixel(64, 48, Rgb([10, 200, 30]));
        let frame = VideoFrame::new(image, 7);
        assert_eq!(frame.index(), 7);

        let jpeg = frame.encode_jpeg().unwrap();
        // SOI marker.
        assert_eq!(&jpeg[..2], &[0xFF, 0xD8]);

        let decoded = decode_jpeg(&jpeg).unwrap();
        assert_eq!(decoded.width(), 64);
        assert_eq!(decoded.height(), 48);
    }
}
