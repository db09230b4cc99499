//! Phase-delay firing engine
//!
//! One dedicated thread owns the zero-cross monitor and the gate output for
//! the engine's whole lifetime. For every crossing it snapshots the shared
//! brightness register once, conducts for the proportional delay, and opens
//! the gate: trailing-edge dimming. The loop never blocks on anything but
//! the precise wait and the bounded edge wait, and every exit path forces
//! the gate inactive before the hardware is handed back.

mod monitor;
mod phase;
mod spin_wait;

pub use monitor::{Crossing, ZeroCrossMonitor};
pub use phase::firing_delay;
pub use spin_wait::precise_wait;

use log::{info, warn};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use crate::hal::{GateOutput, ZeroCrossInput};
use crate::level::{BrightnessRegister, MAX_LEVEL};

/// Persistent engine condition surfaced through status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    /// No zero-crossing observed within the expected window; the gate is
    /// forced off until the AC reference returns.
    SignalLoss,
}

/// Fault word shared between the firing thread and status readers.
#[derive(Debug, Default)]
pub struct FaultFlag(AtomicBool);

impl FaultFlag {
    /// Current fault, if any.
    pub fn get(&self) -> Option<Fault> {
        self.0.load(Ordering::Relaxed).then_some(Fault::SignalLoss)
    }

    fn raise(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    fn clear(&self) {
        self.0.store(false, Ordering::Relaxed);
    }
}

/// Handle to a running firing engine.
///
/// Stopping (or dropping) the handle forces the gate inactive and joins the
/// thread before the hardware is released, so the output is never left
/// conducting, even when shutdown lands mid-cycle.
pub struct FiringEngine<Z: ZeroCrossInput, G: GateOutput> {
    running: Arc<AtomicBool>,
    thread: Option<JoinHandle<(ZeroCrossMonitor<Z>, G)>>,
}

impl<Z: ZeroCrossInput + 'static, G: GateOutput + 'static> FiringEngine<Z, G> {
    /// Spawn the firing thread.
    ///
    /// The thread is spawned at normal priority; pin or elevate it from the
    /// integration layer on platforms that support it.
    pub fn start(
        input: Z,
        gate: G,
        half_cycle: Duration,
        register: Arc<BrightnessRegister>,
        fault: Arc<FaultFlag>,
    ) -> Self {
        let running = Arc::new(AtomicBool::new(true));
        let thread_running = Arc::clone(&running);
        let monitor = ZeroCrossMonitor::new(input, half_cycle);
        let thread = std::thread::spawn(move || {
            firing_loop(monitor, gate, half_cycle, register, fault, thread_running)
        });
        FiringEngine {
            running,
            thread: Some(thread),
        }
    }

    /// Signal shutdown and join, recovering the hardware for a later start.
    pub fn stop(mut self) -> (ZeroCrossMonitor<Z>, G) {
        self.running.store(false, Ordering::Relaxed);
        let thread = self.thread.take().expect("firing engine already stopped");
        thread
            .join()
            .expect("firing thread panicked during shutdown")
    }
}

impl<Z: ZeroCrossInput, G: GateOutput> Drop for FiringEngine<Z, G> {
    fn drop(&mut self) {
        self.running.store(false, Ordering::Relaxed);
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

fn firing_loop<Z: ZeroCrossInput, G: GateOutput>(
    mut monitor: ZeroCrossMonitor<Z>,
    mut gate: G,
    half_cycle: Duration,
    register: Arc<BrightnessRegister>,
    fault: Arc<FaultFlag>,
    running: Arc<AtomicBool>,
) -> (ZeroCrossMonitor<Z>, G) {
    info!("firing engine started, half-cycle {:?}", half_cycle);

    while running.load(Ordering::Relaxed) {
        match monitor.wait_crossing() {
            Crossing::Edge(_) => {
                if fault.get().is_some() {
                    fault.clear();
                    info!("zero-cross signal restored");
                }

                // One snapshot per half-cycle; a level change mid-cycle must
                // not tear the pulse.
                let level = register.level();

                if level == 0 {
                    gate.set_active(false);
                    continue;
                }

                gate.set_active(true);
                if level >= MAX_LEVEL {
                    // Full conduction: keep the gate up through the next
                    // crossing instead of blipping it off and on.
                    continue;
                }

                precise_wait(firing_delay(level, half_cycle));
                gate.set_active(false);
            }
            Crossing::SignalLoss => {
                gate.set_active(false);
                if fault.get().is_none() {
                    warn!(
                        "no zero-crossing within {:?}; gate forced off",
                        half_cycle * 2
                    );
                    fault.raise();
                }
            }
        }
    }

    // Scoped shutdown: the gate is never left conducting.
    gate.set_active(false);
    info!("firing engine stopped");
    (monitor, gate)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hal::sim::{RecordingGate, SimulatedLine};
    use crate::hal::LineFrequency;

    fn engine_fixture() -> (
        FiringEngine<SimulatedLine, RecordingGate>,
        RecordingGate,
        Arc<BrightnessRegister>,
        Arc<FaultFlag>,
    ) {
        let line = SimulatedLine::new(LineFrequency::Hz50);
        let gate = RecordingGate::new();
        let observer = gate.clone();
        let register = Arc::new(BrightnessRegister::new());
        let fault = Arc::new(FaultFlag::default());
        let engine = FiringEngine::start(
            line,
            gate,
            LineFrequency::Hz50.half_cycle(),
            Arc::clone(&register),
            Arc::clone(&fault),
        );
        (engine, observer, register, fault)
    }

    #[test]
    fn zero_level_never_asserts_the_gate() {
        let (engine, observer, _register, _fault) = engine_fixture();
        std::thread::sleep(Duration::from_millis(60));
        let (_, gate) = engine.stop();
        assert!(observer.transitions().iter().all(|(_, active)| !active));
        assert!(!gate.is_active());
    }

    #[test]
    fn fires_one_pulse_per_half_cycle() {
        let (engine, observer, register, _fault) = engine_fixture();
        register.set_level(500);
        std::thread::sleep(Duration::from_millis(95));
        engine.stop();

        let transitions = observer.transitions();
        let on_count = transitions.iter().filter(|(_, active)| *active).count();
        // ~9 half-cycles in the window; allow generous scheduler slack.
        assert!(on_count >= 4, "expected several pulses, saw {on_count}");

        // Pulse widths should track the 50% firing delay (5 ms) loosely.
        for pair in transitions.windows(2) {
            if let [(on_at, true), (off_at, false)] = pair {
                let width = *off_at - *on_at;
                assert!(
                    width >= Duration::from_millis(4) && width <= Duration::from_millis(9),
                    "pulse width {width:?} out of range"
                );
            }
        }
    }

    #[test]
    fn stop_forces_gate_inactive_at_any_level() {
        let (engine, observer, register, _fault) = engine_fixture();
        register.set_level(MAX_LEVEL);
        std::thread::sleep(Duration::from_millis(50));
        let (_, gate) = engine.stop();
        assert!(!gate.is_active());
        assert_eq!(observer.transitions().last().map(|(_, a)| *a), Some(false));
    }

    #[test]
    fn signal_loss_raises_fault_and_clears_on_recovery() {
        let line = SimulatedLine::new(LineFrequency::Hz50);
        let power = line.power_switch();
        let gate = RecordingGate::new();
        let observer = gate.clone();
        let register = Arc::new(BrightnessRegister::new());
        let fault = Arc::new(FaultFlag::default());
        register.set_level(800);

        let engine = FiringEngine::start(
            line,
            gate,
            LineFrequency::Hz50.half_cycle(),
            Arc::clone(&register),
            Arc::clone(&fault),
        );

        power.set_on(false);
        std::thread::sleep(Duration::from_millis(80));
        assert_eq!(fault.get(), Some(Fault::SignalLoss));
        assert!(!observer.is_active());

        power.set_on(true);
        std::thread::sleep(Duration::from_millis(80));
        assert_eq!(fault.get(), None);

        engine.stop();
    }
}
