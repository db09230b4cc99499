//! Zero-cross event conditioning
//!
//! Turns the raw zero-cross input into clean, monotonic rising-edge events:
//! debounced against electrical noise near the crossing and bounded by a
//! signal-loss watchdog so the engine never guesses a phase.

use std::time::{Duration, Instant};

use crate::hal::ZeroCrossInput;

/// Outcome of waiting for a crossing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Crossing {
    /// A clean rising edge, with its timestamp.
    Edge(Instant),
    /// No edge within twice the expected half-cycle: the AC reference is
    /// gone and downstream must stop firing.
    SignalLoss,
}

/// Debounced, watchdogged view of a [`ZeroCrossInput`].
pub struct ZeroCrossMonitor<Z> {
    input: Z,
    half_cycle: Duration,
    /// Edges closer than this to the previous accepted edge are bounce.
    lockout: Duration,
    last_edge: Option<Instant>,
}

impl<Z: ZeroCrossInput> ZeroCrossMonitor<Z> {
    /// Wrap `input`, expecting one edge per `half_cycle`.
    pub fn new(input: Z, half_cycle: Duration) -> Self {
        ZeroCrossMonitor {
            input,
            half_cycle,
            lockout: half_cycle / 2,
            last_edge: None,
        }
    }

    /// Block until the next debounced crossing or a signal-loss verdict.
    ///
    /// Accepted timestamps are strictly increasing; each physical edge
    /// yields exactly one event.
    pub fn wait_crossing(&mut self) -> Crossing {
        let deadline = Instant::now() + self.half_cycle * 2;
        loop {
            let now = Instant::now();
            if now >= deadline {
                return Crossing::SignalLoss;
            }
            match self.input.wait_rising_edge(deadline - now) {
                None => return Crossing::SignalLoss,
                Some(ts) => {
                    if let Some(last) = self.last_edge {
                        match ts.checked_duration_since(last) {
                            Some(gap) if gap >= self.lockout => {}
                            // Bounce inside the lockout window, or an input
                            // whose timestamps ran backwards: discard.
                            _ => continue,
                        }
                    }
                    self.last_edge = Some(ts);
                    return Crossing::Edge(ts);
                }
            }
        }
    }

    /// Release the underlying input.
    pub fn into_inner(self) -> Z {
        self.input
    }
}
