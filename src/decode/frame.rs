use std::borrow::Cow;

use chrono::{DateTime, Utc};
use image::DynamicImage;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum FrameError {
    #[error("frame has no pixels ({width}x{height})")]
    Empty { width: u32, height: u32 },

    #[error("frame buffer holds {actual} bytes, expected {expected}")]
    BufferSizeMismatch { expected: usize, actual: usize },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelFormat {
    Luma8,
    Rgb8,
    Rgba8,
}

impl PixelFormat {
    pub fn channels(self) -> usize {
        match self {
            PixelFormat::Luma8 => 1,
            PixelFormat::Rgb8 => 3,
            PixelFormat::Rgba8 => 4,
        }
    }
}

/// One rasterized snapshot handed to a decode engine.
///
/// Samples are immutable and intentionally not `Clone`: the engine takes them
/// by value and they are dropped once it returns, so no frame history builds
/// up while a scan is running.
#[derive(Debug)]
pub struct FrameSample {
    width: u32,
    height: u32,
    format: PixelFormat,
    data: Vec<u8>,
    captured_at: DateTime<Utc>,
}

impl FrameSample {
    pub fn new(
        width: u32,
        height: u32,
        format: PixelFormat,
        data: Vec<u8>,
    ) -> Result<Self, FrameError> {
        if width == 0 || height == 0 {
            return Err(FrameError::Empty { width, height });
        }
        let expected = width as usize * height as usize * format.channels();
        if data.len() != expected {
            return Err(FrameError::BufferSizeMismatch {
                expected,
                actual: data.len(),
            });
        }
        Ok(Self {
            width,
            height,
            format,
            data,
            captured_at: Utc::now(),
        })
    }

    /// Rasterizes a decoded image or video frame into a luminance sample.
    pub fn from_image(image: &DynamicImage) -> Result<Self, FrameError> {
        let luma = image.to_luma8();
        let (width, height) = luma.dimensions();
        Self::new(width, height, PixelFormat::Luma8, luma.into_raw())
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn format(&self) -> PixelFormat {
        self.format
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn captured_at(&self) -> DateTime<Utc> {
        self.captured_at
    }

    /// Row-major 8-bit intensities, one per pixel (ITU-R BT.601 weights for colour input).
    pub fn luminance(&self) -> Cow<'_, [u8]> {
        match self.format {
            PixelFormat::Luma8 => Cow::Borrowed(&self.data),
            PixelFormat::Rgb8 | PixelFormat::Rgba8 => Cow::Owned(
                self.data
                    .chunks_exact(self.format.channels())
                    .map(|px| {
                        let y = 0.299 * px[0] as f32 + 0.587 * px[1] as f32 + 0.114 * px[2] as f32;
                        y.round().clamp(0.0, 255.0) as u8
                    })
                    .collect(),
            ),
        }
    }
}
