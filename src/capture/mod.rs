//! Camera access: the backend seam, the session that owns a live stream, and
//! the backends shipped with the crate.
//!
//! A [`CameraBackend`] hands out [`VideoStream`]s; a [`CaptureSession`] owns at
//! most one of them at a time and is the only thing that may stop it.

pub mod sequence;
pub mod session;

use image::DynamicImage;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use sequence::{ImageSequenceBackend, UnsupportedBackend};
pub use session::{CaptureSession, SessionPhase, StreamHandle, VideoSink};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CameraError {
    #[error("camera access was denied")]
    PermissionDenied,

    #[error("no camera device found")]
    NoDeviceFound,

    #[error("camera capture is not supported in this environment")]
    UnsupportedEnvironment,

    #[error("a capture session is already open")]
    SessionBusy,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FacingMode {
    /// Rear sensor, pointing away from the user.
    Environment,
    /// Front sensor.
    User,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CameraConstraints {
    pub facing: FacingMode,
}

impl Default for CameraConstraints {
    fn default() -> Self {
        Self {
            facing: FacingMode::Environment,
        }
    }
}

/// Source of camera streams. Implementations map platform failures onto
/// [`CameraError`] so callers can tell refusal, absence and lack of support apart.
pub trait CameraBackend: Send + Sync {
    fn open(&self, constraints: &CameraConstraints) -> Result<Box<dyn VideoStream>, CameraError>;
}

/// A live video feed bound to one hardware device.
pub trait VideoStream: Send {
    fn label(&self) -> &str;

    /// The most recent frame, or `None` when the device has nothing ready yet.
    fn latest_frame(&mut self) -> Option<DynamicImage>;

    /// Releases the device. Called exactly once by the owning session.
    fn stop(&mut self);
}
