//! Captured still images.
//!
//! A [`Frame`] is created once per capture event and never mutated afterwards.
//! Handing a frame to the background evidence logger clones it, so the
//! controller is free to capture again immediately.

pub mod source;

#[cfg(feature = "opencv-camera")]
pub mod camera;

use crate::error::{DrishtiError, Result};
use chrono::{DateTime, Local};
use image::{ImageFormat, RgbImage};
use std::io::Cursor;
use std::path::Path;

pub use source::{FrameSource, MockFrameSource, StillImageSource};

/// Byte order of the three colour channels in a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelOrder {
    Rgb,
    /// Native order of most camera drivers.
    Bgr,
}

/// One captured raster image (width × height × 3) plus its capture time.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    width: u32,
    height: u32,
    order: ChannelOrder,
    pixels: Vec<u8>,
    captured_at: DateTime<Local>,
}

impl Frame {
    /// Wrap raw interleaved pixels captured now.
    ///
    /// # Errors
    /// Returns `DrishtiError::CameraCapture` if the buffer length does not
    /// match `width * height * 3` or the frame is empty.
    pub fn new(width: u32, height: u32, order: ChannelOrder, pixels: Vec<u8>) -> Result<Self> {
        Self::with_timestamp(width, height, order, pixels, Local::now())
    }

    /// Wrap raw pixels with an explicit capture timestamp.
    pub fn with_timestamp(
        width: u32,
        height: u32,
        order: ChannelOrder,
        pixels: Vec<u8>,
        captured_at: DateTime<Local>,
    ) -> Result<Self> {
        let expected = width as usize * height as usize * 3;
        if expected == 0 {
            return Err(DrishtiError::CameraCapture {
                message: "empty frame".to_string(),
            });
        }
        if pixels.len() != expected {
            return Err(DrishtiError::CameraCapture {
                message: format!(
                    "frame buffer has {} bytes, expected {} for {}x{}",
                    pixels.len(),
                    expected,
                    width,
                    height
                ),
            });
        }
        Ok(Self {
            width,
            height,
            order,
            pixels,
            captured_at,
        })
    }

    /// A frame of a single colour, given as RGB.
    pub fn filled(width: u32, height: u32, rgb: [u8; 3]) -> Result<Self> {
        let pixels = rgb
            .iter()
            .copied()
            .cycle()
            .take(width as usize * height as usize * 3)
            .collect();
        Self::new(width, height, ChannelOrder::Rgb, pixels)
    }

    /// Load an image file (any format `image` can decode) as an RGB frame.
    pub fn from_image_file(path: &Path) -> Result<Self> {
        let img = image::open(path)?.to_rgb8();
        let (width, height) = img.dimensions();
        Self::new(width, height, ChannelOrder::Rgb, img.into_raw())
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn order(&self) -> ChannelOrder {
        self.order
    }

    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    pub fn timestamp(&self) -> DateTime<Local> {
        self.captured_at
    }

    /// Convert to an RGB image buffer, swapping channels for BGR frames.
    pub fn to_rgb_image(&self) -> Result<RgbImage> {
        let data = match self.order {
            ChannelOrder::Rgb => self.pixels.clone(),
            ChannelOrder::Bgr => self
                .pixels
                .chunks_exact(3)
                .flat_map(|px| [px[2], px[1], px[0]])
                .collect(),
        };
        RgbImage::from_raw(self.width, self.height, data).ok_or_else(|| {
            DrishtiError::CameraCapture {
                message: "frame buffer does not match its dimensions".to_string(),
            }
        })
    }

    /// Write the frame to disk; the format follows the file extension.
    pub fn save(&self, path: &Path) -> Result<()> {
        self.to_rgb_image()?.save(path)?;
        Ok(())
    }

    /// Encode as JPEG in memory.
    pub fn encode_jpeg(&self) -> Result<Vec<u8>> {
        let mut buf = Cursor::new(Vec::new());
        self.to_rgb_image()?.write_to(&mut buf, ImageFormat::Jpeg)?;
        Ok(buf.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_new_rejects_mismatched_buffer() {
        let result = Frame::new(2, 2, ChannelOrder::Rgb, vec![0u8; 11]);
        assert!(matches!(result, Err(DrishtiError::CameraCapture { .. })));
    }

    #[test]
    fn test_new_rejects_empty_frame() {
        let result = Frame::new(0, 10, ChannelOrder::Rgb, vec![]);
        assert!(result.is_err());
    }

    #[test]
    fn test_filled_frame_has_expected_pixels() {
        let frame = Frame::filled(3, 2, [255, 0, 0]).unwrap();
        assert_eq!(frame.pixels().len(), 18);
        assert_eq!(&frame.pixels()[..6], &[255, 0, 0, 255, 0, 0]);
    }

    #[test]
    fn test_bgr_frames_are_swapped_to_rgb() {
        let frame = Frame::new(1, 1, ChannelOrder::Bgr, vec![10, 20, 30]).unwrap();
        let rgb = frame.to_rgb_image().unwrap();
        assert_eq!(rgb.get_pixel(0, 0).0, [30, 20, 10]);
    }

    #[test]
    fn test_save_and_reload_png_keeps_pixels() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("frame.png");
        let frame = Frame::filled(4, 4, [200, 10, 10]).unwrap();

        frame.save(&path).unwrap();
        let loaded = Frame::from_image_file(&path).unwrap();

        assert_eq!(loaded.width(), 4);
        assert_eq!(loaded.height(), 4);
        assert_eq!(loaded.pixels(), frame.pixels());
    }

    #[test]
    fn test_encode_jpeg_produces_jpeg_magic() {
        let frame = Frame::filled(8, 8, [0, 128, 255]).unwrap();
        let jpeg = frame.encode_jpeg().unwrap();
        assert_eq!(&jpeg[..2], &[0xFF, 0xD8]);
    }

    #[test]
    fn test_clone_is_independent_copy() {
        let frame = Frame::filled(2, 2, [1, 2, 3]).unwrap();
        let copy = frame.clone();
        drop(frame);
        assert_eq!(copy.pixels().len(), 12);
    }
}
