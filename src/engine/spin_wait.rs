//! Precise short-interval wait
//!
//! The firing delay must land within tens of microseconds, far below what
//! an OS sleep guarantees. The single function here is the only place the
//! crate busy-waits; swap it for a hardware-timer-backed wait on platforms
//! that offer one.

use std::time::{Duration, Instant};

/// OS sleep is only trusted up to this far before the deadline; the
/// remainder is spun.
const SPIN_GUARD: Duration = Duration::from_micros(300);

/// Wait `duration` with microsecond-scale accuracy.
///
/// Coarse `thread::sleep` covers everything but the final [`SPIN_GUARD`],
/// then a busy-wait on the monotonic clock pins the deadline.
pub fn precise_wait(duration: Duration) {
    let deadline = Instant::now() + duration;
    if duration > SPIN_GUARD {
        std::thread::sleep(duration - SPIN_GUARD);
    }
    while Instant::now() < deadline {
        std::hint::spin_loop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn never_returns_early() {
        for micros in [50, 500, 2_000] {
            let requested = Duration::from_micros(micros);
            let start = Instant::now();
            precise_wait(requested);
            assert!(start.elapsed() >= requested);
        }
    }

    #[test]
    fn zero_duration_returns_immediately() {
        let start = Instant::now();
        precise_wait(Duration::ZERO);
        assert!(start.elapsed() < Duration::from_millis(1));
    }
}
