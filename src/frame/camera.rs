//! USB webcam capture using OpenCV.

use crate::config::CameraConfig;
use crate::error::{DrishtiError, Result};
use crate::frame::source::{drain_stale, read_with_retries, warm_up};
use crate::frame::{ChannelOrder, Frame, FrameSource};
use opencv::core::Mat;
use opencv::prelude::*;
use opencv::videoio::{CAP_ANY, CAP_PROP_FRAME_HEIGHT, CAP_PROP_FRAME_WIDTH, VideoCapture};
use tracing::{debug, info};

/// Camera opened once and kept for the process lifetime.
pub struct OpenCvCamera {
    capture: VideoCapture,
    stale_frames: u32,
    read_attempts: u32,
    name: String,
}

impl OpenCvCamera {
    /// Open the configured device and discard the warm-up frames.
    ///
    /// # Errors
    /// Returns `DrishtiError::CameraUnavailable` if the device cannot be opened.
    pub fn open(config: &CameraConfig) -> Result<Self> {
        let device = config.index.to_string();
        let unavailable = |e: opencv::Error| DrishtiError::CameraUnavailable {
            device: format!("{} ({})", device, e.message),
        };

        let mut capture = VideoCapture::new(config.index as i32, CAP_ANY).map_err(unavailable)?;
        if !capture.is_opened().map_err(unavailable)? {
            return Err(DrishtiError::CameraUnavailable {
                device: config.index.to_string(),
            });
        }

        if let Some(width) = config.width {
            capture
                .set(CAP_PROP_FRAME_WIDTH, width as f64)
                .map_err(unavailable)?;
        }
        if let Some(height) = config.height {
            capture
                .set(CAP_PROP_FRAME_HEIGHT, height as f64)
                .map_err(unavailable)?;
        }

        let mut camera = Self {
            capture,
            stale_frames: config.stale_frames,
            read_attempts: config.read_attempts,
            name: format!("camera:{}", config.index),
        };

        let failures = warm_up(config.warmup_frames, || camera.read_frame());
        debug!(
            "Discarded {} warm-up frames ({} failed)",
            config.warmup_frames, failures
        );
        info!("Camera {} opened", config.index);

        Ok(camera)
    }

    fn read_frame(&mut self) -> Result<Frame> {
        let mut mat = Mat::default();
        let grabbed = self
            .capture
            .read(&mut mat)
            .map_err(|e| DrishtiError::CameraCapture {
                message: e.message.clone(),
            })?;
        if !grabbed || mat.empty() {
            return Err(DrishtiError::CameraCapture {
                message: "camera returned no frame".to_string(),
            });
        }
        if mat.channels() != 3 {
            return Err(DrishtiError::CameraCapture {
                message: format!("expected 3 channels, got {}", mat.channels()),
            });
        }

        let size = mat.size().map_err(|e| DrishtiError::CameraCapture {
            message: e.message.clone(),
        })?;
        let mat = if mat.is_continuous() {
            mat
        } else {
            mat.try_clone().map_err(|e| DrishtiError::CameraCapture {
                message: e.message.clone(),
            })?
        };
        let pixels = mat
            .data_bytes()
            .map_err(|e| DrishtiError::CameraCapture {
                message: e.message.clone(),
            })?
            .to_vec();

        Frame::new(
            size.width as u32,
            size.height as u32,
            ChannelOrder::Bgr,
            pixels,
        )
    }
}

impl FrameSource for OpenCvCamera {
    fn capture(&mut self) -> Result<Frame> {
        let capture = &mut self.capture;
        let dropped = drain_stale(self.stale_frames, || {
            capture.grab().map_err(|e| DrishtiError::CameraCapture {
                message: e.message.clone(),
            })
        });
        debug!("Dropped {} queued frames", dropped);

        let attempts = self.read_attempts;
        read_with_retries(attempts, || self.read_frame())
    }

    fn name(&self) -> &str {
        &self.name
    }
}

impl Drop for OpenCvCamera {
    fn drop(&mut self) {
        if let Err(e) = self.capture.release() {
            tracing::warn!("Failed to release camera: {}", e.message);
        }
    }
}
