use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::{Path, PathBuf},
    sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard},
};

use crate::capture::{CameraConstraints, FacingMode};
use crate::render::StyleConfig;

const ENABLE_LOGS: bool = true;

use crate::{log_info, log_warn};

/// Environment variable naming the settings file when `--config` is absent.
pub const CONFIG_ENV: &str = "QRKIT_CONFIG";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ScanSettings {
    pub frame_interval_ms: u64,
    pub prefer_rear_camera: bool,
    /// Clear a scan result automatically after this many milliseconds.
    pub auto_reset_ms: Option<u64>,
}

impl Default for ScanSettings {
    fn default() -> Self {
        Self {
            frame_interval_ms: 16,
            prefer_rear_camera: true,
            auto_reset_ms: None,
        }
    }
}

impl ScanSettings {
    pub fn constraints(&self) -> CameraConstraints {
        CameraConstraints {
            facing: if self.prefer_rear_camera {
                FacingMode::Environment
            } else {
                FacingMode::User
            },
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct UserSettings {
    pub style: StyleConfig,
    pub scan: ScanSettings,
}

/// User settings, optionally backed by a JSON file that is rewritten on every update.
pub struct SettingsStore {
    path: Option<PathBuf>,
    data: RwLock<UserSettings>,
}

impl SettingsStore {
    pub fn new(path: PathBuf) -> Result<Self> {
        let data = if path.exists() {
            let contents = fs::read_to_string(&path)
                .with_context(|| format!("Failed to read settings from {}", path.display()))?;
            serde_json::from_str(&contents).unwrap_or_else(|err| {
                log_warn!("ignoring unreadable settings in {}: {err}", path.display());
                UserSettings::default()
            })
        } else {
            UserSettings::default()
        };

        log_info!("settings loaded from {}", path.display());
        Ok(Self {
            path: Some(path),
            data: RwLock::new(data),
        })
    }

    /// Defaults only; nothing is written to disk.
    pub fn in_memory() -> Self {
        Self {
            path: None,
            data: RwLock::new(UserSettings::default()),
        }
    }

    pub fn open(path: Option<PathBuf>) -> Result<Self> {
        match path {
            Some(path) => Self::new(path),
            None => Ok(Self::in_memory()),
        }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn snapshot(&self) -> UserSettings {
        self.read().clone()
    }

    pub fn style(&self) -> StyleConfig {
        self.read().style.clone()
    }

    pub fn scan(&self) -> ScanSettings {
        self.read().scan.clone()
    }

    pub fn update_style(&self, style: StyleConfig) -> Result<()> {
        let mut guard = self.write();
        guard.style = style;
        self.persist(&guard)
    }

    pub fn update_scan(&self, scan: ScanSettings) -> Result<()> {
        let mut guard = self.write();
        guard.scan = scan;
        self.persist(&guard)
    }

    pub fn reset(&self) -> Result<()> {
        let mut guard = self.write();
        *guard = UserSettings::default();
        self.persist(&guard)
    }

    pub fn reload(&self) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read settings from {}", path.display()))?;
        let data: UserSettings = serde_json::from_str(&contents)
            .with_context(|| format!("Invalid settings in {}", path.display()))?;
        *self.write() = data;
        Ok(())
    }

    fn persist(&self, data: &UserSettings) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let serialized = serde_json::to_string_pretty(data)?;
        fs::write(path, serialized)
            .with_context(|| format!("Failed to write settings to {}", path.display()))
    }

    fn read(&self) -> RwLockReadGuard<'_, UserSettings> {
        self.data.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, UserSettings> {
        self.data.write().unwrap_or_else(PoisonError::into_inner)
    }
}
