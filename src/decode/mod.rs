pub mod engine;
pub mod frame;
pub mod still;

use std::panic::{catch_unwind, AssertUnwindSafe};

use thiserror::Error;

use crate::payload::Payload;

pub use engine::{Inversion, RqrrEngine};
pub use frame::{FrameError, FrameSample, PixelFormat};
pub use still::{decode_file, decode_image, StillImageError};

const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_warn};

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("invalid sample: {0}")]
    InvalidSample(#[from] FrameError),

    #[error("decode engine failure: {0}")]
    Engine(String),
}

/// Pixel-matrix recognizer: a sample in, a payload or nothing out.
pub trait DecodeEngine: Send + Sync {
    fn decode(&self, sample: FrameSample) -> Result<Option<Payload>, DecodeError>;
}

/// Runs one decode attempt, treating engine errors and panics as "not found".
pub fn decode_quietly(engine: &dyn DecodeEngine, sample: FrameSample) -> Option<Payload> {
    match catch_unwind(AssertUnwindSafe(|| engine.decode(sample))) {
        Ok(Ok(found)) => found,
        Ok(Err(err)) => {
            log_debug!("decode attempt failed, treating as miss: {err}");
            None
        }
        Err(_) => {
            log_warn!("decode engine panicked, treating as miss");
            None
        }
    }
}
