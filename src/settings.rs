use std::{
    env, fs,
    path::{Path, PathBuf},
    sync::{RwLock, RwLockReadGuard, RwLockWriteGuard},
    time::Duration,
};

use anyhow::{anyhow, bail, Context, Result};
use log::warn;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{
    alerts::{AlertConfig, NotificationPreferences},
    maintenance::RetentionPolicy,
    monitor::MonitorConfig,
};

pub const DATA_DIR_ENV: &str = "SPINEBAND_DATA_DIR";
pub const SENSOR_HOST_ENV: &str = "SPINEBAND_SENSOR_HOST";
pub const DEBUG_ENV: &str = "SPINEBAND_DEBUG";

pub const APP_DIR_NAME: &str = "spineband";
pub const DB_FILE_NAME: &str = "spineband.sqlite3";
pub const SETTINGS_FILE_NAME: &str = "settings.json";

pub const DEFAULT_SENSOR_HOST: &str = "10.178.71.26";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct MonitorSettings {
    /// Bare host/IP or full `http://` base URL of the sensor.
    pub sensor_host: String,
    pub poll_interval_ms: u64,
    pub request_timeout_secs: u64,
    pub user_id: i64,
    pub alert_threshold_secs: u64,
    pub alert_cooldown_ms: u64,
    pub alerts_enabled: bool,
    pub vibration_enabled: bool,
    pub sound_enabled: bool,
    pub retention_days: u32,
}

impl Default for MonitorSettings {
    fn default() -> Self {
        Self {
            sensor_host: DEFAULT_SENSOR_HOST.into(),
            poll_interval_ms: 1_000,
            request_timeout_secs: 5,
            user_id: 1,
            alert_threshold_secs: 10,
            alert_cooldown_ms: 30_000,
            alerts_enabled: true,
            vibration_enabled: true,
            sound_enabled: true,
            retention_days: 30,
        }
    }
}

impl MonitorSettings {
    pub fn validate(&self) -> Result<()> {
        if self.sensor_host.trim().is_empty() {
            bail!("sensor_host must not be empty");
        }
        if self.poll_interval_ms == 0 {
            bail!("poll_interval_ms must be greater than zero");
        }
        if self.request_timeout_secs == 0 {
            bail!("request_timeout_secs must be greater than zero");
        }
        if self.retention_days == 0 {
            bail!("retention_days must be greater than zero");
        }
        Ok(())
    }

    /// Applies `SPINEBAND_SENSOR_HOST` when set and non-empty.
    pub fn with_env_overrides(self) -> Self {
        self.with_sensor_host_override(env::var(SENSOR_HOST_ENV).ok())
    }

    fn with_sensor_host_override(mut self, host: Option<String>) -> Self {
        if let Some(host) = host.filter(|h| !h.trim().is_empty()) {
            self.sensor_host = host;
        }
        self
    }

    /// Sets one field by its file key from command-line text. String fields
    /// take the text as is; the rest parse it as JSON (`false`, `45000`).
    pub fn set_field(&mut self, key: &str, raw: &str) -> Result<()> {
        let mut value = serde_json::to_value(&*self)?;
        let slot = value
            .get_mut(key)
            .ok_or_else(|| anyhow!("unknown setting '{key}'"))?;
        *slot = if slot.is_string() {
            Value::String(raw.to_string())
        } else {
            serde_json::from_str(raw).with_context(|| format!("invalid value '{raw}' for {key}"))?
        };
        *self = serde_json::from_value(value)
            .with_context(|| format!("invalid value '{raw}' for {key}"))?;
        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn alert_config(&self) -> AlertConfig {
        AlertConfig {
            threshold_ms: i64::try_from(self.alert_threshold_secs.saturating_mul(1_000))
                .unwrap_or(i64::MAX),
            cooldown_ms: i64::try_from(self.alert_cooldown_ms).unwrap_or(i64::MAX),
        }
    }

    pub fn notification_preferences(&self) -> NotificationPreferences {
        NotificationPreferences {
            vibration_enabled: self.vibration_enabled,
            sound_enabled: self.sound_enabled,
        }
    }

    pub fn monitor_config(&self) -> MonitorConfig {
        MonitorConfig {
            user_id: self.user_id,
            poll_interval: self.poll_interval(),
            alert: self.alert_config(),
            alerts_enabled: self.alerts_enabled,
        }
    }

    pub fn retention_policy(&self) -> RetentionPolicy {
        RetentionPolicy::days(self.retention_days)
    }
}

/// `SPINEBAND_DATA_DIR`, else `<platform data dir>/spineband`.
pub fn resolve_data_dir() -> Result<PathBuf> {
    if let Some(dir) = env::var_os(DATA_DIR_ENV).filter(|dir| !dir.is_empty()) {
        return Ok(PathBuf::from(dir));
    }
    dirs::data_dir()
        .map(|base| base.join(APP_DIR_NAME))
        .ok_or_else(|| anyhow!("could not determine a data directory; set {DATA_DIR_ENV}"))
}

pub fn debug_enabled() -> bool {
    env::var(DEBUG_ENV)
        .map(|value| value == "1" || value.eq_ignore_ascii_case("true"))
        .unwrap_or(false)
}

/// Settings persisted as pretty JSON. A missing or unreadable file yields
/// defaults; the file is only written on [`SettingsStore::update`].
pub struct SettingsStore {
    path: PathBuf,
    data: RwLock<MonitorSettings>,
}

impl SettingsStore {
    pub fn new(path: PathBuf) -> Result<Self> {
        let data = if path.exists() {
            let contents = fs::read_to_string(&path)
                .with_context(|| format!("Failed to read settings from {}", path.display()))?;
            parse_settings(&contents, &path)
        } else {
            MonitorSettings::default()
        };

        Ok(Self {
            path,
            data: RwLock::new(data),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn current(&self) -> MonitorSettings {
        self.read().clone()
    }

    /// Applies `change`, validates the result and writes it to disk. Nothing
    /// is kept if validation or the write fails.
    pub fn update<F>(&self, change: F) -> Result<MonitorSettings>
    where
        F: FnOnce(&mut MonitorSettings),
    {
        let mut guard = self.write();
        let mut updated = guard.clone();
        change(&mut updated);
        updated.validate()?;
        self.persist(&updated)?;
        *guard = updated.clone();
        Ok(updated)
    }

    fn persist(&self, data: &MonitorSettings) -> Result<()> {
        let serialized = serde_json::to_string_pretty(data)?;
        fs::write(&self.path, serialized)
            .with_context(|| format!("Failed to write settings to {}", self.path.display()))
    }

    fn read(&self) -> RwLockReadGuard<'_, MonitorSettings> {
        self.data
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, MonitorSettings> {
        self.data
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

fn parse_settings(contents: &str, path: &Path) -> MonitorSettings {
    let parsed = serde_json::from_str::<MonitorSettings>(contents)
        .map_err(anyhow::Error::from)
        .and_then(|settings| settings.validate().map(|_| settings));

    match parsed {
        Ok(settings) => settings,
        Err(err) => {
            warn!("Ignoring settings at {}: {err}", path.display());
            MonitorSettings::default()
        }
    }
}
