use std::sync::Arc;

use chrono::{DateTime, Utc};
use image::DynamicImage;
use serde::Serialize;
use uuid::Uuid;

use super::{CameraBackend, CameraConstraints, CameraError, VideoStream};
use crate::decode::FrameSample;

// Set to true to enable verbose logging in this module
const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_info, log_warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum SessionPhase {
    Closed,
    Opening,
    Open,
}

/// Describes the stream currently held by a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamHandle {
    pub id: Uuid,
    pub label: String,
    pub opened_at: DateTime<Utc>,
}

/// Where the live stream is bound while a session is open. Only the owning
/// session attaches or clears it; everything else can only sample through it.
#[derive(Default)]
pub struct VideoSink {
    stream: Option<Box<dyn VideoStream>>,
}

impl VideoSink {
    pub fn is_attached(&self) -> bool {
        self.stream.is_some()
    }

    fn attach(&mut self, stream: Box<dyn VideoStream>) {
        debug_assert!(self.stream.is_none(), "video sink already bound");
        self.stream = Some(stream);
    }

    fn clear(&mut self) -> Option<Box<dyn VideoStream>> {
        self.stream.take()
    }

    fn grab(&mut self) -> Option<DynamicImage> {
        self.stream.as_mut()?.latest_frame()
    }
}

/// Owns the camera stream for one scan attempt.
///
/// Lifecycle is `Closed -> Opening -> Open -> Closed`. `close` is idempotent
/// and also runs on drop, so a session can never leak its device.
pub struct CaptureSession {
    backend: Arc<dyn CameraBackend>,
    constraints: CameraConstraints,
    phase: SessionPhase,
    handle: Option<StreamHandle>,
    sink: VideoSink,
    acquired: u64,
    released: u64,
}

impl CaptureSession {
    pub fn new(backend: Arc<dyn CameraBackend>, constraints: CameraConstraints) -> Self {
        Self {
            backend,
            constraints,
            phase: SessionPhase::Closed,
            handle: None,
            sink: VideoSink::default(),
            acquired: 0,
            released: 0,
        }
    }

    pub fn open(&mut self) -> Result<StreamHandle, CameraError> {
        if self.phase != SessionPhase::Closed {
            log_warn!("refusing to open camera: session is {:?}", self.phase);
            return Err(CameraError::SessionBusy);
        }

        self.phase = SessionPhase::Opening;
        log_debug!("requesting camera ({:?} facing)", self.constraints.facing);

        let stream = match self.backend.open(&self.constraints) {
            Ok(stream) => stream,
            Err(err) => {
                self.phase = SessionPhase::Closed;
                log_warn!("camera open failed: {err}");
                return Err(err);
            }
        };

        let handle = StreamHandle {
            id: Uuid::new_v4(),
            label: stream.label().to_string(),
            opened_at: Utc::now(),
        };
        self.sink.attach(stream);
        self.handle = Some(handle.clone());
        self.acquired += 1;
        self.phase = SessionPhase::Open;

        log_info!("capture session {} opened on '{}'", handle.id, handle.label);
        Ok(handle)
    }

    /// Stops the stream and clears the sink. Returns whether a device was released.
    pub fn close(&mut self) -> bool {
        let released = match self.sink.clear() {
            Some(mut stream) => {
                stream.stop();
                self.released += 1;
                true
            }
            None => false,
        };

        if let Some(handle) = self.handle.take() {
            log_info!("capture session {} closed", handle.id);
        }
        self.phase = SessionPhase::Closed;
        released
    }

    /// Pulls the latest frame and rasterizes it; `None` when closed or nothing is ready.
    pub fn sample(&mut self) -> Option<FrameSample> {
        if self.phase != SessionPhase::Open {
            return None;
        }
        let frame = self.sink.grab()?;
        match FrameSample::from_image(&frame) {
            Ok(sample) => Some(sample),
            Err(err) => {
                log_debug!("dropping unusable frame: {err}");
                None
            }
        }
    }

    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    pub fn is_open(&self) -> bool {
        self.phase == SessionPhase::Open
    }

    pub fn handle(&self) -> Option<&StreamHandle> {
        self.handle.as_ref()
    }

    pub fn sink(&self) -> &VideoSink {
        &self.sink
    }

    /// Successful opens over the session's lifetime.
    pub fn acquired(&self) -> u64 {
        self.acquired
    }

    /// Devices released over the session's lifetime.
    pub fn released(&self) -> u64 {
        self.released
    }
}

impl Drop for CaptureSession {
    fn drop(&mut self) {
        self.close();
    }
}
