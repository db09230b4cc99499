//! Simulated AC line for host development and tests
//!
//! Stands in for the zero-cross detector and gate driver the same way an
//! emulated chip stands in for silicon: timing-faithful, inspectable, and
//! deterministic enough to assert against.

use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use super::{GateOutput, LineFrequency, ZeroCrossInput};

/// Deterministic zero-crossing source: one rising edge per half-cycle while
/// the line is powered. Cutting the power simulates losing the AC reference.
pub struct SimulatedLine {
    period: Duration,
    next_edge: Instant,
    powered: Arc<AtomicBool>,
}

impl SimulatedLine {
    /// Create a powered line at the given frequency, first edge one
    /// half-cycle from now.
    pub fn new(freq: LineFrequency) -> Self {
        let period = freq.half_cycle();
        SimulatedLine {
            period,
            next_edge: Instant::now() + period,
            powered: Arc::new(AtomicBool::new(true)),
        }
    }

    /// Handle for switching the simulated AC feed on and off from another
    /// thread.
    pub fn power_switch(&self) -> SimPower {
        SimPower(Arc::clone(&self.powered))
    }
}

/// Shared on/off control for a [`SimulatedLine`].
#[derive(Clone)]
pub struct SimPower(Arc<AtomicBool>);

impl SimPower {
    /// Apply or cut the simulated line voltage.
    pub fn set_on(&self, on: bool) {
        self.0.store(on, Ordering::Relaxed);
    }
}

impl ZeroCrossInput for SimulatedLine {
    fn wait_rising_edge(&mut self, timeout: Duration) -> Option<Instant> {
        let deadline = Instant::now() + timeout;

        if !self.powered.load(Ordering::Relaxed) {
            // No line voltage, no edges. Sleep out the caller's window so
            // signal loss is detected, and resynchronize the edge clock for
            // when power returns.
            std::thread::sleep(deadline.saturating_duration_since(Instant::now()));
            self.next_edge = Instant::now() + self.period;
            return None;
        }

        if self.next_edge > deadline {
            std::thread::sleep(deadline.saturating_duration_since(Instant::now()));
            return None;
        }

        let now = Instant::now();
        if self.next_edge > now {
            std::thread::sleep(self.next_edge - now);
        }
        let edge = self.next_edge;
        self.next_edge += self.period;

        // If the consumer fell behind, skip forward rather than replaying
        // stale crossings in a burst.
        let now = Instant::now();
        while self.next_edge <= now {
            self.next_edge += self.period;
        }

        Some(edge)
    }
}

/// Gate output that records every transition for inspection in tests.
///
/// Clones share state, so a test can keep one handle while the firing
/// engine owns the other.
#[derive(Clone, Default)]
pub struct RecordingGate {
    inner: Arc<GateState>,
}

#[derive(Default)]
struct GateState {
    active: AtomicBool,
    transitions: Mutex<Vec<(Instant, bool)>>,
}

impl RecordingGate {
    /// A gate starting inactive with an empty transition log.
    pub fn new() -> Self {
        Self::default()
    }

    /// All `(timestamp, active)` transitions seen so far.
    pub fn transitions(&self) -> Vec<(Instant, bool)> {
        self.inner.transitions.lock().clone()
    }
}

impl GateOutput for RecordingGate {
    fn set_active(&mut self, active: bool) {
        let prev = self.inner.active.swap(active, Ordering::Relaxed);
        if prev != active {
            self.inner.transitions.lock().push((Instant::now(), active));
        }
    }

    fn is_active(&self) -> bool {
        self.inner.active.load(Ordering::Relaxed)
    }
}
