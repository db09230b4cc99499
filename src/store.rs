//! Persisted state shapes
//!
//! The storage itself belongs to the outer application layer (web UI,
//! database, supervisor); this module owns only the shapes the core
//! consumes and produces, and the fallback behavior: a missing or corrupt
//! file loads as defaults, never a startup failure.

use log::warn;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::Path;

use crate::alarm::AlarmScheduleEntry;

/// Manual on/off and brightness at the last command, for restart recovery.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LastState {
    /// Whether the light was on.
    pub on: bool,
    /// Brightness at the last manual command.
    pub brightness_pct: f32,
}

impl Default for LastState {
    fn default() -> Self {
        LastState {
            on: false,
            brightness_pct: 0.0,
        }
    }
}

/// Operator-tunable limits, applied before any level is computed.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoredConfig {
    /// Ceiling on every brightness request, manual or scheduled.
    pub max_brightness_pct: f32,
}

impl Default for StoredConfig {
    fn default() -> Self {
        StoredConfig {
            max_brightness_pct: 100.0,
        }
    }
}

/// Load the weekly schedule, falling back to "no alarms".
pub fn load_schedule(path: &Path) -> Vec<AlarmScheduleEntry> {
    load_or_default(path, "schedule")
}

/// Load last-manual-state, falling back to "lights off".
pub fn load_last_state(path: &Path) -> LastState {
    load_or_default(path, "last state")
}

/// Load stored configuration, falling back to defaults.
pub fn load_config(path: &Path) -> StoredConfig {
    load_or_default(path, "config")
}

/// Write the weekly schedule.
pub fn save_schedule(path: &Path, entries: &[AlarmScheduleEntry]) -> crate::Result<()> {
    save(path, &entries)
}

/// Write last-manual-state.
pub fn save_last_state(path: &Path, state: &LastState) -> crate::Result<()> {
    save(path, state)
}

/// Write stored configuration.
pub fn save_config(path: &Path, config: &StoredConfig) -> crate::Result<()> {
    save(path, config)
}

fn load_or_default<T: DeserializeOwned + Default>(path: &Path, what: &str) -> T {
    let bytes = match fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return T::default(),
        Err(e) => {
            warn!(
                "could not read {} from {}: {}; using defaults",
                what,
                path.display(),
                e
            );
            return T::default();
        }
    };
    match serde_json::from_slice(&bytes) {
        Ok(value) => value,
        Err(e) => {
            warn!(
                "corrupt {} in {}: {}; using defaults",
                what,
                path.display(),
                e
            );
            T::default()
        }
    }
}

fn save<T: Serialize>(path: &Path, value: &T) -> crate::Result<()> {
    let json = serde_json::to_vec_pretty(value)?;
    fs::write(path, json)?;
    Ok(())
}
