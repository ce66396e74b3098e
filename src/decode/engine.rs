use serde::{Deserialize, Serialize};

use super::{DecodeEngine, DecodeError, FrameSample};
use crate::payload::Payload;

/// Whether to retry a frame with inverted luminance (light modules on dark).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Inversion {
    DontInvert,
    AttemptBoth,
}

/// [`DecodeEngine`] backed by `rqrr`. Only the first decodable grid is returned.
#[derive(Debug, Clone)]
pub struct RqrrEngine {
    inversion: Inversion,
}

impl RqrrEngine {
    /// Live-camera configuration: normal polarity only, cheapest per frame.
    pub fn live() -> Self {
        Self {
            inversion: Inversion::DontInvert,
        }
    }

    /// Still-image configuration: also tries inverted codes.
    pub fn still() -> Self {
        Self {
            inversion: Inversion::AttemptBoth,
        }
    }

    pub fn inversion(&self) -> Inversion {
        self.inversion
    }
}

impl Default for RqrrEngine {
    fn default() -> Self {
        Self::live()
    }
}

impl DecodeEngine for RqrrEngine {
    fn decode(&self, sample: FrameSample) -> Result<Option<Payload>, DecodeError> {
        let width = sample.width() as usize;
        let height = sample.height() as usize;
        let luma = sample.luminance();

        let passes: &[bool] = match self.inversion {
            Inversion::DontInvert => &[false],
            Inversion::AttemptBoth => &[false, true],
        };

        let mut last_error = None;
        for &invert in passes {
            match detect(&luma, width, height, invert) {
                Ok(Some(payload)) => return Ok(Some(payload)),
                Ok(None) => {}
                Err(err) => last_error = Some(err),
            }
        }

        match last_error {
            Some(err) => Err(err),
            None => Ok(None),
        }
    }
}

fn detect(
    luma: &[u8],
    width: usize,
    height: usize,
    invert: bool,
) -> Result<Option<Payload>, DecodeError> {
    let mut prepared = rqrr::PreparedImage::prepare_from_greyscale(width, height, |x, y| {
        let value = luma[y * width + x];
        if invert {
            255 - value
        } else {
            value
        }
    });

    let mut last_error = None;
    for grid in prepared.detect_grids() {
        match grid.decode() {
            Ok((_meta, content)) => return Ok(Some(Payload::from(content))),
            Err(err) => last_error = Some(DecodeError::Engine(err.to_string())),
        }
    }

    match last_error {
        Some(err) => Err(err),
        None => Ok(None),
    }
}
