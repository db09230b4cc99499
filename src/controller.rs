//! Control surface for the outer application layers
//!
//! [`Dimmer`] wires the register, firing engine, fade scheduler and alarm
//! scheduler together behind the handful of operations the web/CLI layer
//! calls. The hardware pair is handed in once; stopping the engine recovers
//! it for a later start, and dropping the controller performs the same
//! force-gate-off shutdown.

use chrono::NaiveDateTime;
use log::{info, warn};
use parking_lot::Mutex;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use crate::alarm::{AlarmScheduleEntry, AlarmScheduler};
use crate::engine::{Fault, FaultFlag, FiringEngine};
use crate::fade::{FadeJob, FadeScheduler};
use crate::hal::{GateOutput, LineFrequency, ZeroCrossInput};
use crate::level::BrightnessRegister;
use crate::store::{self, LastState};
use crate::{DimmerError, Result};

/// Everything the integrator chooses.
#[derive(Debug, Clone)]
pub struct DimmerConfig {
    /// Mains frequency of the AC feed.
    pub line: LineFrequency,
    /// Ceiling applied before any level is computed, manual or scheduled.
    pub max_brightness_pct: f32,
    /// Where to persist last-manual-state, if anywhere.
    pub state_path: Option<PathBuf>,
}

impl Default for DimmerConfig {
    fn default() -> Self {
        DimmerConfig {
            line: LineFrequency::Hz60,
            max_brightness_pct: 100.0,
            state_path: None,
        }
    }
}

/// Point-in-time view for the status endpoint.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Status {
    /// Current brightness percentage.
    pub brightness_pct: f32,
    /// Whether a fade thread currently owns the register.
    pub fade_active: bool,
    /// Next scheduled sunrise trigger, if any.
    pub next_alarm_at: Option<NaiveDateTime>,
    /// Persistent engine fault, if any.
    pub fault: Option<Fault>,
}

enum EngineSlot<Z: ZeroCrossInput, G: GateOutput> {
    Idle { input: Z, gate: G },
    Running(FiringEngine<Z, G>),
    // Transient while start/stop swap states.
    Swapping,
}

/// The dimmer facade: real-time engine, fades and alarms behind one handle.
pub struct Dimmer<Z: ZeroCrossInput + 'static, G: GateOutput + 'static> {
    config: DimmerConfig,
    register: Arc<BrightnessRegister>,
    fault: Arc<FaultFlag>,
    fades: Arc<FadeScheduler>,
    alarms: AlarmScheduler,
    engine: Mutex<EngineSlot<Z, G>>,
}

impl<Z: ZeroCrossInput + 'static, G: GateOutput + 'static> Dimmer<Z, G> {
    /// Build the controller around the hardware pair and the persisted
    /// weekly schedule. The firing engine does not run until [`start`] is
    /// called.
    ///
    /// [`start`]: Dimmer::start
    pub fn new(
        input: Z,
        gate: G,
        config: DimmerConfig,
        schedule: Vec<AlarmScheduleEntry>,
    ) -> Result<Self> {
        if !(0.0..=100.0).contains(&config.max_brightness_pct) {
            return Err(DimmerError::ConfigError(format!(
                "max_brightness_pct {} outside 0-100",
                config.max_brightness_pct
            )));
        }

        let register = Arc::new(BrightnessRegister::new());
        let fades = Arc::new(FadeScheduler::new(Arc::clone(&register)));
        let alarms =
            AlarmScheduler::start(schedule, Arc::clone(&fades), config.max_brightness_pct);

        Ok(Dimmer {
            config,
            register,
            fault: Arc::new(FaultFlag::default()),
            fades,
            alarms,
            engine: Mutex::new(EngineSlot::Idle { input, gate }),
        })
    }

    /// Enable the firing engine. Idempotent.
    pub fn start(&self) {
        let mut slot = self.engine.lock();
        match std::mem::replace(&mut *slot, EngineSlot::Swapping) {
            EngineSlot::Idle { input, gate } => {
                let engine = FiringEngine::start(
                    input,
                    gate,
                    self.config.line.half_cycle(),
                    Arc::clone(&self.register),
                    Arc::clone(&self.fault),
                );
                *slot = EngineSlot::Running(engine);
            }
            other => *slot = other,
        }
    }

    /// Force the gate inactive and halt the firing loop. The hardware is
    /// retained for a later [`start`]. Idempotent.
    ///
    /// [`start`]: Dimmer::start
    pub fn stop(&self) {
        let mut slot = self.engine.lock();
        match std::mem::replace(&mut *slot, EngineSlot::Swapping) {
            EngineSlot::Running(engine) => {
                let (monitor, gate) = engine.stop();
                *slot = EngineSlot::Idle {
                    input: monitor.into_inner(),
                    gate,
                };
            }
            other => *slot = other,
        }
    }

    /// Whether the firing engine is running.
    pub fn is_running(&self) -> bool {
        matches!(&*self.engine.lock(), EngineSlot::Running(_))
    }

    /// Set brightness as a percentage.
    ///
    /// A manual command is the degenerate instant fade: any running ramp is
    /// cancelled before the write. Input is clamped to `[0, 100]` and to
    /// the configured ceiling; the percentage actually applied is returned.
    pub fn set_brightness(&self, pct: f32) -> f32 {
        self.fades.cancel();
        let applied = self.register.set_percent(pct.min(self.config.max_brightness_pct));
        self.persist_last_state(applied);
        applied
    }

    /// Start a brightness ramp. Returns immediately; the ramp runs
    /// asynchronously and supersedes any active fade.
    pub fn begin_fade(&self, start_pct: f32, end_pct: f32, duration: Duration) {
        let ceiling = self.config.max_brightness_pct;
        self.fades.begin(FadeJob::between_percent(
            start_pct.min(ceiling),
            end_pct.min(ceiling),
            duration,
        ));
    }

    /// Replace the weekly schedule; the next trigger is recomputed at once.
    pub fn set_schedule(&self, entries: Vec<AlarmScheduleEntry>) {
        self.alarms.set_schedule(entries);
    }

    /// Reapply persisted manual state after a restart.
    pub fn recover(&self, last: LastState) {
        let pct = if last.on { last.brightness_pct } else { 0.0 };
        let applied = self.set_brightness(pct);
        info!("recovered manual state: {}%", applied);
    }

    /// Snapshot for the status endpoint.
    pub fn get_status(&self) -> Status {
        Status {
            brightness_pct: self.register.percent(),
            fade_active: self.fades.fade_active(),
            next_alarm_at: self.alarms.next_alarm().map(|n| n.trigger_at),
            fault: self.fault.get(),
        }
    }

    fn persist_last_state(&self, pct: f32) {
        let Some(path) = &self.config.state_path else {
            return;
        };
        let state = LastState {
            on: pct > 0.0,
            brightness_pct: pct,
        };
        if let Err(e) = store::save_last_state(path, &state) {
            warn!("could not persist manual state: {e}");
        }
    }
}

impl<Z: ZeroCrossInput + 'static, G: GateOutput + 'static> Drop for Dimmer<Z, G> {
    fn drop(&mut self) {
        self.stop();
    }
}
