use std::{
    fs,
    path::PathBuf,
    sync::{RwLock, RwLockReadGuard, RwLockWriteGuard},
    time::Duration,
};

use anyhow::{bail, Context, Result};
use log::warn;
use serde::{Deserialize, Serialize};

use crate::posture::{DEFAULT_ALERT_THRESHOLD_SECS, DEFAULT_POSTURE_THRESHOLD};

pub const MIN_PREVIEW_FPS: u32 = 1;
pub const MAX_PREVIEW_FPS: u32 = 30;
pub const MIN_ANALYSIS_INTERVAL_MS: u64 = 1_000;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MonitorSettings {
    pub posture_threshold: f64,
    pub analysis_interval_ms: u64,
    pub preview_fps: u32,
    pub alert_threshold_secs: u64,
    pub capture_source: u32,
}

impl Default for MonitorSettings {
    fn default() -> Self {
        Self {
            posture_threshold: DEFAULT_POSTURE_THRESHOLD,
            analysis_interval_ms: 5_000,
            preview_fps: 10,
            alert_threshold_secs: DEFAULT_ALERT_THRESHOLD_SECS,
            capture_source: 0,
        }
    }
}

impl MonitorSettings {
    pub fn validate(&self) -> Result<()> {
        if !(self.posture_threshold > 0.0 && self.posture_threshold <= 1.0) {
            bail!(
                "posture threshold must be in (0, 1], got {}",
                self.posture_threshold
            );
        }
        if !(MIN_PREVIEW_FPS..=MAX_PREVIEW_FPS).contains(&self.preview_fps) {
            bail!(
                "preview rate must be {MIN_PREVIEW_FPS}-{MAX_PREVIEW_FPS} Hz, got {}",
                self.preview_fps
            );
        }
        // The bad posture timer counts whole seconds per tick.
        if self.analysis_interval_ms < MIN_ANALYSIS_INTERVAL_MS
            || self.analysis_interval_ms % 1_000 != 0
        {
            bail!(
                "analysis interval must be a whole number of seconds, got {} ms",
                self.analysis_interval_ms
            );
        }
        if self.alert_threshold_secs == 0 {
            bail!("bad posture alert threshold must be at least 1 second");
        }
        Ok(())
    }

    pub fn analysis_interval(&self) -> Duration {
        Duration::from_millis(self.analysis_interval_ms)
    }

    /// Whole seconds credited to the bad posture timer per analysis tick.
    pub fn analysis_interval_secs(&self) -> u64 {
        self.analysis_interval_ms / 1_000
    }

    pub fn preview_period(&self) -> Duration {
        Duration::from_millis(1_000 / u64::from(self.preview_fps.max(MIN_PREVIEW_FPS)))
    }
}

pub struct SettingsStore {
    path: PathBuf,
    data: RwLock<MonitorSettings>,
}

impl SettingsStore {
    pub fn new(path: PathBuf) -> Result<Self> {
        let data = if path.exists() {
            let contents = fs::read_to_string(&path)
                .with_context(|| format!("Failed to read settings from {}", path.display()))?;
            Self::parse(&contents).unwrap_or_else(|err| {
                warn!("Ignoring settings at {}: {err:#}", path.display());
                MonitorSettings::default()
            })
        } else {
            MonitorSettings::default()
        };

        Ok(Self {
            path,
            data: RwLock::new(data),
        })
    }

    fn parse(contents: &str) -> Result<MonitorSettings> {
        let settings: MonitorSettings = serde_json::from_str(contents)?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn monitor(&self) -> MonitorSettings {
        self.read().clone()
    }

    pub fn update(&self, settings: MonitorSettings) -> Result<()> {
        settings.validate()?;
        let mut guard = self.write();
        self.persist(&settings)?;
        *guard = settings;
        Ok(())
    }

    fn persist(&self, data: &MonitorSettings) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create settings directory {}", parent.display())
            })?;
        }
        let serialized = serde_json::to_string_pretty(data)?;
        fs::write(&self.path, serialized)
            .with_context(|| format!("Failed to write settings to {}", self.path.display()))
    }

    fn read(&self) -> RwLockReadGuard<'_, MonitorSettings> {
        self.data.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, MonitorSettings> {
        self.data.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
