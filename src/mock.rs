//! Scripted camera and decode doubles for unit tests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use image::DynamicImage;

use crate::capture::{CameraBackend, CameraConstraints, CameraError, FacingMode, VideoStream};
use crate::decode::{DecodeEngine, DecodeError, FrameSample};
use crate::payload::Payload;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameScript {
    /// A fresh frame on every pull.
    Endless,
    /// The device never has a frame ready.
    Starved,
}

#[derive(Debug, Default)]
struct BackendLog {
    opens: usize,
    stops: usize,
    live: usize,
    last_facing: Option<FacingMode>,
}

#[derive(Clone)]
pub struct ScriptedBackend {
    log: Arc<Mutex<BackendLog>>,
    failure: Option<CameraError>,
    script: FrameScript,
}

impl ScriptedBackend {
    pub fn new(script: FrameScript) -> Self {
        Self {
            log: Arc::default(),
            failure: None,
            script,
        }
    }

    pub fn failing(error: CameraError) -> Self {
        Self {
            failure: Some(error),
            ..Self::new(FrameScript::Endless)
        }
    }

    pub fn opens(&self) -> usize {
        self.log.lock().unwrap().opens
    }

    pub fn stops(&self) -> usize {
        self.log.lock().unwrap().stops
    }

    pub fn live_streams(&self) -> usize {
        self.log.lock().unwrap().live
    }

    pub fn last_facing(&self) -> Option<FacingMode> {
        self.log.lock().unwrap().last_facing
    }
}

impl CameraBackend for ScriptedBackend {
    fn open(&self, constraints: &CameraConstraints) -> Result<Box<dyn VideoStream>, CameraError> {
        let mut log = self.log.lock().unwrap();
        log.last_facing = Some(constraints.facing);
        if let Some(err) = &self.failure {
            return Err(err.clone());
        }
        log.opens += 1;
        log.live += 1;
        Ok(Box::new(ScriptedStream {
            log: Arc::clone(&self.log),
            script: self.script,
            stopped: false,
        }))
    }
}

struct ScriptedStream {
    log: Arc<Mutex<BackendLog>>,
    script: FrameScript,
    stopped: bool,
}

impl VideoStream for ScriptedStream {
    fn label(&self) -> &str {
        "scripted camera"
    }

    fn latest_frame(&mut self) -> Option<DynamicImage> {
        match (self.stopped, self.script) {
            (false, FrameScript::Endless) => Some(DynamicImage::new_luma8(4, 4)),
            _ => None,
        }
    }

    fn stop(&mut self) {
        if !self.stopped {
            self.stopped = true;
            let mut log = self.log.lock().unwrap();
            log.stops += 1;
            log.live -= 1;
        }
    }
}

type Script = dyn Fn(usize) -> Result<Option<Payload>, DecodeError> + Send + Sync;

/// Decode engine whose answer depends only on the 1-based call number.
#[derive(Clone)]
pub struct ScriptedEngine {
    calls: Arc<AtomicUsize>,
    script: Arc<Script>,
}

impl ScriptedEngine {
    pub fn from_fn(
        script: impl Fn(usize) -> Result<Option<Payload>, DecodeError> + Send + Sync + 'static,
    ) -> Self {
        Self {
            calls: Arc::default(),
            script: Arc::new(script),
        }
    }

    /// Misses until call `n`, then recognizes `payload` on every later call.
    pub fn recognize_on(n: usize, payload: &str) -> Self {
        let payload = payload.to_string();
        Self::from_fn(move |call| {
            if call >= n {
                Ok(Some(Payload::from(payload.clone())))
            } else {
                Ok(None)
            }
        })
    }

    pub fn never() -> Self {
        Self::from_fn(|_| Ok(None))
    }

    pub fn always_failing() -> Self {
        Self::from_fn(|_| Err(DecodeError::Engine("corrupt frame".into())))
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl DecodeEngine for ScriptedEngine {
    fn decode(&self, _sample: FrameSample) -> Result<Option<Payload>, DecodeError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        (self.script)(call)
    }
}
