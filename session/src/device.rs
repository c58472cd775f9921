//! Capture devices.
//!
//! The orchestrator never talks to a device directly; it goes through [`Camera`],
//! which tracks whether the underlying [`FrameSource`] is open so that acquiring
//! and releasing are both idempotent.

use std::fmt;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use rpsense_logging::Log;

use crate::errors::DeviceError;

/// Something that produces encoded images on demand.
pub trait FrameSource: Send {
    /// Prepares the device. Permission problems must surface here as
    /// `DeviceError::PermissionDenied`.
    fn open(&mut self) -> Result<(), DeviceError>;

    /// Returns one encoded image.
    fn capture(&mut self) -> Result<Vec<u8>, DeviceError>;

    /// Releases the device. Called at most once per successful `open`.
    fn close(&mut self);
}

/// Owns a frame source for the lifetime of a session.
pub struct Camera {
    source: Box<dyn FrameSource>,
    active: bool,
}

impl Camera {
    pub fn new(source: Box<dyn FrameSource>) -> Self {
        Self { source, active: false }
    }

    /// Opens the source if it isn't already.
    pub fn acquire(&mut self) -> Result<(), DeviceError> {
        if self.active {
            return Ok(());
        }

        self.source.open()?;
        self.active = true;

        tracing::info!(target: Log::Capture, "Camera acquired");
        Ok(())
    }

    pub fn capture(&mut self) -> Result<Vec<u8>, DeviceError> {
        if !self.active {
            return Err(DeviceError::NotOpen);
        }

        self.source.capture()
    }

    /// Closes the source if it is open. Safe to call repeatedly.
    pub fn release(&mut self) {
        if !self.active {
            return;
        }

        self.source.close();
        self.active = false;

        tracing::info!(target: Log::Capture, "Camera released");
    }

    pub fn is_active(&self) -> bool {
        self.active
    }
}

impl fmt::Debug for Camera {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Camera").field("active", &self.active).finish_non_exhaustive()
    }
}

impl Drop for Camera {
    fn drop(&mut self) {
        self.release();
    }
}

/// Replays the images in a directory, in file name order, looping forever.
///
/// Useful for headless play and for exercising the pipeline with recorded gestures.
#[derive(Debug)]
pub struct DirectoryFrameSource {
    dir: PathBuf,
    images: Vec<PathBuf>,
    cursor: usize,
}

impl DirectoryFrameSource {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            images: Vec::new(),
            cursor: 0,
        }
    }

    fn is_image(path: &Path) -> bool {
        path.extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| matches!(ext.to_ascii_lowercase().as_str(), "jpg" | "jpeg" | "png"))
    }
}

impl FrameSource for DirectoryFrameSource {
    fn open(&mut self) -> Result<(), DeviceError> {
        let entries = fs::read_dir(&self.dir).map_err(|error| match error.kind() {
            ErrorKind::PermissionDenied => DeviceError::PermissionDenied,
            _ => DeviceError::Unavailable(format!("{}: {error}", self.dir.display())),
        })?;

        let mut images = Vec::new();

        for entry in entries {
            let path = entry?.path();

            if path.is_file() && Self::is_image(&path) {
                images.push(path);
            }
        }

        if images.is_empty() {
            return Err(DeviceError::Unavailable(format!("no images in {}", self.dir.display())));
        }

        images.sort();

        tracing::debug!(target: Log::Capture, dir = ?self.dir, images = images.len(), "Opened frame directory");

        self.images = images;
        self.cursor = 0;

        Ok(())
    }

    fn capture(&mut self) -> Result<Vec<u8>, DeviceError> {
        if self.images.is_empty() {
            return Err(DeviceError::NotOpen);
        }

        let path = &self.images[self.cursor % self.images.len()];
        self.cursor += 1;

        Ok(fs::read(path)?)
    }

    fn close(&mut self) {
        self.images.clear();
        self.cursor = 0;
    }
}
