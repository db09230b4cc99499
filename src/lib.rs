//! Zero-crossing trailing-edge dimmer with sunrise alarm scheduling
//!
//! Drives household LED lighting by phase-cutting the mains AC waveform:
//! the gate conducts from each zero-crossing and opens after a delay
//! proportional to the requested brightness (trailing edge, which LED driver
//! supplies tolerate far better than a delayed turn-on). A fade scheduler
//! ramps the brightness over wall-clock time for the wake-up light, and the
//! alarm scheduler turns a weekly schedule into sunrise ramps.
//!
//! # Architecture
//! - One dedicated thread owns zero-cross detection and gate firing for the
//!   lifetime of the engine. It is the only consumer of crossing events and
//!   the only writer of the gate output.
//! - A single atomic brightness register is the only state shared between
//!   the firing loop and the brightness producers (manual commands, fades,
//!   the alarm scheduler). Neither side ever blocks on the other.
//! - Fades and alarms run as timer threads with explicit lifecycle handles;
//!   on every exit path the gate is forced inactive before the hardware is
//!   released.
//!
//! # Quick start
//! ## Manual dimming against the simulated line
//! ```no_run
//! use std::time::Duration;
//! use sunrise_dimmer::hal::sim::{RecordingGate, SimulatedLine};
//! use sunrise_dimmer::hal::LineFrequency;
//! use sunrise_dimmer::{Dimmer, DimmerConfig};
//!
//! let line = SimulatedLine::new(LineFrequency::Hz60);
//! let dimmer = Dimmer::new(line, RecordingGate::new(), DimmerConfig::default(), Vec::new()).unwrap();
//! dimmer.start();
//! dimmer.set_brightness(40.0);
//! dimmer.begin_fade(0.0, 100.0, Duration::from_secs(30 * 60));
//! dimmer.stop();
//! ```
//!
//! ## Sunrise alarms from a persisted schedule
//! ```no_run
//! use std::path::Path;
//! use sunrise_dimmer::hal::sim::{RecordingGate, SimulatedLine};
//! use sunrise_dimmer::hal::LineFrequency;
//! use sunrise_dimmer::{store, Dimmer, DimmerConfig};
//!
//! let schedule = store::load_schedule(Path::new("schedule.json"));
//! let line = SimulatedLine::new(LineFrequency::Hz50);
//! let dimmer = Dimmer::new(line, RecordingGate::new(), DimmerConfig::default(), schedule).unwrap();
//! dimmer.start();
//! dimmer.recover(store::load_last_state(Path::new("last_state.json")));
//! ```

#![warn(missing_docs)]

pub mod alarm;
pub mod controller;
pub mod engine;
pub mod fade;
pub mod hal;
pub mod level;
pub mod store;

/// Error types for dimmer operations
#[derive(thiserror::Error, Debug)]
pub enum DimmerError {
    /// IO error from the filesystem
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Persisted state could not be encoded or decoded
    #[error("Persist error: {0}")]
    Persist(#[from] serde_json::Error),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    ConfigError(String),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

impl From<String> for DimmerError {
    fn from(msg: String) -> Self {
        DimmerError::Other(msg)
    }
}

impl From<&str> for DimmerError {
    fn from(msg: &str) -> Self {
        DimmerError::Other(msg.to_string())
    }
}

/// Result type for dimmer operations
pub type Result<T> = std::result::Result<T, DimmerError>;

// Public API exports
pub use alarm::{next_alarm, AlarmScheduleEntry, AlarmScheduler, NextAlarm};
pub use controller::{Dimmer, DimmerConfig, Status};
pub use engine::{firing_delay, Fault, FiringEngine, ZeroCrossMonitor};
pub use fade::{FadeJob, FadeScheduler};
pub use hal::{GateOutput, LineFrequency, ZeroCrossInput};
pub use level::{BrightnessRegister, MAX_LEVEL};
pub use store::{LastState, StoredConfig};
