use crate::error::{DrishtiError, Result};
use crate::frame::Frame;
use std::collections::VecDeque;
use std::path::PathBuf;

/// Trait for still-image capture devices.
///
/// This trait allows swapping implementations (real camera vs still image vs mock).
/// The source is owned by the pipeline controller for the whole process lifetime.
pub trait FrameSource: Send {
    /// Capture one usable frame.
    ///
    /// # Errors
    /// `CameraUnavailable` when the device is gone, `CameraReadTimeout` when
    /// no frame arrived within the configured attempts.
    fn capture(&mut self) -> Result<Frame>;

    /// Name for logging/debugging.
    fn name(&self) -> &str;
}

/// Drop the first `count` reads so auto-exposure can settle.
///
/// Errors during warm-up are not fatal; they are counted and returned.
pub fn warm_up<F>(count: u32, mut read: F) -> u32
where
    F: FnMut() -> Result<Frame>,
{
    let mut failures = 0;
    for _ in 0..count {
        if read().is_err() {
            failures += 1;
        }
    }
    failures
}

/// Drop up to `count` frames the driver has already queued, so the next read
/// returns a current image instead of one captured while the camera sat idle.
///
/// Stops at the first failed or empty grab and returns how many were dropped.
pub fn drain_stale<G>(count: u32, mut grab: G) -> u32
where
    G: FnMut() -> Result<bool>,
{
    let mut dropped = 0;
    while dropped < count {
        match grab() {
            Ok(true) => dropped += 1,
            Ok(false) => break,
            Err(e) => {
                tracing::debug!("Grab failed while draining: {}", e);
                break;
            }
        }
    }
    dropped
}

/// Try `attempts` reads and return the first frame.
pub fn read_with_retries<F>(attempts: u32, mut read: F) -> Result<Frame>
where
    F: FnMut() -> Result<Frame>,
{
    let mut last_err = None;
    for _ in 0..attempts {
        match read() {
            Ok(frame) => return Ok(frame),
            Err(e) => {
                tracing::debug!("Camera read failed: {}", e);
                last_err = Some(e);
            }
        }
    }
    match last_err {
        Some(DrishtiError::CameraUnavailable { device }) => {
            Err(DrishtiError::CameraUnavailable { device })
        }
        _ => Err(DrishtiError::CameraReadTimeout { attempts }),
    }
}

/// Serves a fixed image file as the camera frame.
///
/// Used for offline runs and for feeding recorded scenes through the pipeline.
#[derive(Debug, Clone)]
pub struct StillImageSource {
    path: PathBuf,
    name: String,
}

impl StillImageSource {
    pub fn new(path: PathBuf) -> Self {
        let name = format!("still:{}", path.display());
        Self { path, name }
    }
}

impl FrameSource for StillImageSource {
    fn capture(&mut self) -> Result<Frame> {
        if !self.path.exists() {
            return Err(DrishtiError::CameraUnavailable {
                device: self.path.display().to_string(),
            });
        }
        Frame::from_image_file(&self.path).map_err(|e| DrishtiError::CameraCapture {
            message: format!("Failed to read {}: {}", self.path.display(), e),
        })
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// Mock frame source for testing
#[derive(Debug, Clone)]
pub struct MockFrameSource {
    queued: VecDeque<Frame>,
    fallback: Option<Frame>,
    stale: u32,
    should_fail: bool,
    captures: u32,
}

impl MockFrameSource {
    /// Create a mock that always returns a small grey frame
    pub fn new() -> Self {
        Self {
            queued: VecDeque::new(),
            fallback: Frame::filled(4, 4, [128, 128, 128]).ok(),
            stale: 0,
            should_fail: false,
            captures: 0,
        }
    }

    /// Return this frame for every capture
    pub fn with_frame(mut self, frame: Frame) -> Self {
        self.fallback = Some(frame);
        self
    }

    /// Return these frames in order before falling back
    pub fn with_sequence(mut self, frames: Vec<Frame>) -> Self {
        self.queued = frames.into();
        self
    }

    /// Treat the sequence as a driver queue and drop up to `count` queued
    /// frames before each capture, like the camera does
    pub fn with_stale_frames(mut self, count: u32) -> Self {
        self.stale = count;
        self
    }

    /// Configure the mock to fail every capture
    pub fn with_failure(mut self) -> Self {
        self.should_fail = true;
        self
    }

    /// Number of capture calls so far
    pub fn captures(&self) -> u32 {
        self.captures
    }
}

impl Default for MockFrameSource {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameSource for MockFrameSource {
    fn capture(&mut self) -> Result<Frame> {
        self.captures += 1;
        if self.should_fail {
            return Err(DrishtiError::CameraReadTimeout { attempts: 1 });
        }
        let queued = &mut self.queued;
        // Keep at least one frame: a real grab blocks for the next one
        drain_stale(self.stale, || Ok(queued.len() > 1 && queued.pop_front().is_some()));
        if let Some(frame) = self.queued.pop_front() {
            return Ok(frame);
        }
        self.fallback
            .clone()
            .ok_or_else(|| DrishtiError::CameraUnavailable {
                device: "mock".to_string(),
            })
    }

    fn name(&self) -> &str {
        "mock"
    }
}
