use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use image::DynamicImage;

use super::{CameraBackend, CameraConstraints, CameraError, VideoStream};

const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_info, log_warn};

const FRAME_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "webp", "bmp", "gif"];

/// A camera that replays the image files of a directory, in name order, as
/// its video feed. Used for headless scanning and for recorded test feeds.
#[derive(Debug, Clone)]
pub struct ImageSequenceBackend {
    dir: PathBuf,
    repeat: bool,
}

impl ImageSequenceBackend {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            repeat: true,
        }
    }

    /// Stop delivering frames after the last file instead of wrapping around.
    pub fn once(mut self) -> Self {
        self.repeat = false;
        self
    }

    fn list_frames(&self) -> Result<Vec<PathBuf>, CameraError> {
        let entries = std::fs::read_dir(&self.dir).map_err(|err| match err.kind() {
            ErrorKind::PermissionDenied => CameraError::PermissionDenied,
            _ => CameraError::NoDeviceFound,
        })?;

        let mut frames: Vec<PathBuf> = entries
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| path.is_file() && has_frame_extension(path))
            .collect();
        frames.sort();
        Ok(frames)
    }
}

fn has_frame_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| FRAME_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

impl CameraBackend for ImageSequenceBackend {
    fn open(&self, constraints: &CameraConstraints) -> Result<Box<dyn VideoStream>, CameraError> {
        let frames = self.list_frames()?;
        if frames.is_empty() {
            log_warn!("no frames in {}", self.dir.display());
            return Err(CameraError::NoDeviceFound);
        }

        log_info!(
            "replaying {} frames from {} (requested {:?} facing)",
            frames.len(),
            self.dir.display(),
            constraints.facing
        );
        Ok(Box::new(SequenceStream {
            label: format!("image sequence {}", self.dir.display()),
            frames,
            cursor: 0,
            repeat: self.repeat,
            stopped: false,
        }))
    }
}

struct SequenceStream {
    label: String,
    frames: Vec<PathBuf>,
    cursor: usize,
    repeat: bool,
    stopped: bool,
}

impl VideoStream for SequenceStream {
    fn label(&self) -> &str {
        &self.label
    }

    fn latest_frame(&mut self) -> Option<DynamicImage> {
        if self.stopped || (!self.repeat && self.cursor >= self.frames.len()) {
            return None;
        }
        let path = &self.frames[self.cursor % self.frames.len()];
        self.cursor += 1;

        match image::open(path) {
            Ok(frame) => Some(frame),
            Err(err) => {
                log_warn!("skipping unreadable frame {}: {err}", path.display());
                None
            }
        }
    }

    fn stop(&mut self) {
        self.stopped = true;
        log_debug!("{} stopped after {} frames", self.label, self.cursor);
    }
}

/// Backend for hosts without any camera source.
#[derive(Debug, Clone, Copy, Default)]
pub struct UnsupportedBackend;

impl CameraBackend for UnsupportedBackend {
    fn open(&self, _constraints: &CameraConstraints) -> Result<Box<dyn VideoStream>, CameraError> {
        Err(CameraError::UnsupportedEnvironment)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GrayImage, Luma};

    fn write_frames(dir: &Path, count: u8) {
        for i in 0..count {
            let frame = GrayImage::from_pixel(8, 8, Luma([i * 10]));
            frame.save(dir.join(format!("frame_{i:02}.png"))).unwrap();
        }
        std::fs::write(dir.join("notes.txt"), "not a frame").unwrap();
    }

    #[test]
    fn replays_frames_in_name_order_and_wraps() {
        let dir = tempfile::tempdir().unwrap();
        write_frames(dir.path(), 3);

        let backend = ImageSequenceBackend::new(dir.path());
        let mut stream = backend.open(&CameraConstraints::default()).unwrap();
        let first: Vec<u8> = (0..4)
            .map(|_| stream.latest_frame().unwrap().to_luma8().get_pixel(0, 0)[0])
            .collect();
        assert_eq!(first, vec![0, 10, 20, 0]);

        stream.stop();
        assert!(stream.latest_frame().is_none());
    }

    #[test]
    fn once_mode_runs_dry() {
        let dir = tempfile::tempdir().unwrap();
        write_frames(dir.path(), 2);

        let backend = ImageSequenceBackend::new(dir.path()).once();
        let mut stream = backend.open(&CameraConstraints::default()).unwrap();
        assert!(stream.latest_frame().is_some());
        assert!(stream.latest_frame().is_some());
        assert!(stream.latest_frame().is_none());
    }

    #[test]
    fn missing_or_empty_directory_has_no_device() {
        let dir = tempfile::tempdir().unwrap();
        let empty = ImageSequenceBackend::new(dir.path());
        assert_eq!(
            empty.open(&CameraConstraints::default()).err(),
            Some(CameraError::NoDeviceFound)
        );

        let missing = ImageSequenceBackend::new(dir.path().join("absent"));
        assert_eq!(
            missing.open(&CameraConstraints::default()).err(),
            Some(CameraError::NoDeviceFound)
        );
    }

    #[test]
    fn unsupported_backend_reports_environment() {
        assert_eq!(
            UnsupportedBackend.open(&CameraConstraints::default()).err(),
            Some(CameraError::UnsupportedEnvironment)
        );
    }
}
