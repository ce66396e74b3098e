use std::path::{Path, PathBuf};

use thiserror::Error;

use super::{decode_quietly, DecodeEngine, FrameSample};
use crate::payload::Payload;

const ENABLE_LOGS: bool = true;

use crate::log_info;

#[derive(Debug, Error)]
pub enum StillImageError {
    #[error("file is not a valid image: {0}")]
    MalformedUpload(#[from] image::ImageError),

    #[error("no QR code found in the image")]
    NotFound,

    #[error("failed to read {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Decodes a single uploaded image: one rasterization, one engine call.
///
/// This never touches a live scan; callers that want the upload to replace a
/// running camera scan must stop it first.
pub fn decode_image(bytes: &[u8], engine: &dyn DecodeEngine) -> Result<Payload, StillImageError> {
    let image = image::load_from_memory(bytes)?;
    log_info!(
        "decoding uploaded image {}x{} ({} bytes)",
        image.width(),
        image.height(),
        bytes.len()
    );

    // A zero-area image cannot hold a code.
    let sample = FrameSample::from_image(&image).map_err(|_| StillImageError::NotFound)?;
    decode_quietly(engine, sample).ok_or(StillImageError::NotFound)
}

pub fn decode_file(path: &Path, engine: &dyn DecodeEngine) -> Result<Payload, StillImageError> {
    let bytes = std::fs::read(path).map_err(|source| StillImageError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    decode_image(&bytes, engine)
}
