//! Brightness-ramp scheduling
//!
//! Moves the shared register between two levels over a wall-clock duration.
//! At most one fade runs at a time: starting a new one (or issuing a manual
//! brightness command) cancels and replaces the running job. Last writer
//! wins, nothing queues. Each step derives the level from the elapsed
//! monotonic fraction rather than a step counter, so scheduling overhead
//! never accumulates into drift.

use log::{debug, info};
use parking_lot::{Condvar, Mutex};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use crate::level::{level_from_percent, BrightnessRegister, MAX_LEVEL};

/// Register writes over a full ramp. Tens, not hundreds: smooth enough on a
/// 1000-step scale, few enough to bound wakeups.
const FADE_STEPS: u32 = 50;

/// One brightness ramp.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FadeJob {
    /// Level the ramp starts from.
    pub start_level: u16,
    /// Level the ramp ends at.
    pub end_level: u16,
    /// Wall-clock length of the ramp.
    pub duration: Duration,
    /// After reaching `end_level`, hold this long and then snap to zero.
    /// `None` leaves the light at `end_level`.
    pub hold_then_off: Option<Duration>,
}

impl FadeJob {
    /// Ramp between two percentages with no hold tail.
    pub fn between_percent(start_pct: f32, end_pct: f32, duration: Duration) -> Self {
        FadeJob {
            start_level: level_from_percent(start_pct),
            end_level: level_from_percent(end_pct),
            duration,
            hold_then_off: None,
        }
    }

    /// Add a hold-at-end phase followed by a snap to zero.
    pub fn with_hold(mut self, hold: Duration) -> Self {
        self.hold_then_off = Some(hold);
        self
    }
}

/// Cooperative cancellation signal, one per fade job.
struct CancelSignal {
    cancelled: Mutex<bool>,
    wake: Condvar,
}

impl CancelSignal {
    fn new() -> Arc<Self> {
        Arc::new(CancelSignal {
            cancelled: Mutex::new(false),
            wake: Condvar::new(),
        })
    }

    fn cancel(&self) {
        *self.cancelled.lock() = true;
        self.wake.notify_all();
    }

    /// Sleep until `deadline` or cancellation. Returns true if cancelled.
    fn wait_until(&self, deadline: Instant) -> bool {
        let mut cancelled = self.cancelled.lock();
        while !*cancelled {
            if self.wake.wait_until(&mut cancelled, deadline).timed_out() {
                break;
            }
        }
        *cancelled
    }
}

struct ActiveFade {
    cancel: Arc<CancelSignal>,
    thread: JoinHandle<()>,
}

/// Owner of the single fade slot.
pub struct FadeScheduler {
    register: Arc<BrightnessRegister>,
    active: Mutex<Option<ActiveFade>>,
}

impl FadeScheduler {
    /// A scheduler with no fade running.
    pub fn new(register: Arc<BrightnessRegister>) -> Self {
        FadeScheduler {
            register,
            active: Mutex::new(None),
        }
    }

    /// Whether a fade thread currently owns the register.
    pub fn fade_active(&self) -> bool {
        let mut active = self.active.lock();
        let finished = matches!(&*active, Some(fade) if fade.thread.is_finished());
        if finished {
            *active = None;
        }
        active.is_some()
    }

    /// Start `job`, superseding any running fade. Returns immediately; the
    /// ramp runs on its own thread.
    pub fn begin(&self, job: FadeJob) {
        let mut active = self.active.lock();
        Self::cancel_slot(&mut active);

        let cancel = CancelSignal::new();
        let thread_cancel = Arc::clone(&cancel);
        let register = Arc::clone(&self.register);
        let thread = std::thread::spawn(move || run_fade(job, &register, &thread_cancel));
        *active = Some(ActiveFade { cancel, thread });
    }

    /// Cancel any running fade and wait until it has observed cancellation.
    /// The register keeps whatever value the fade last wrote.
    pub fn cancel(&self) {
        Self::cancel_slot(&mut self.active.lock());
    }

    fn cancel_slot(active: &mut Option<ActiveFade>) {
        if let Some(fade) = active.take() {
            fade.cancel.cancel();
            // The old job must stop writing before a new writer touches the
            // register; the condvar makes this prompt even mid-step.
            let _ = fade.thread.join();
        }
    }
}

impl Drop for FadeScheduler {
    fn drop(&mut self) {
        self.cancel();
    }
}

fn run_fade(job: FadeJob, register: &BrightnessRegister, cancel: &CancelSignal) {
    let started_at = Instant::now();
    info!(
        "fade {} -> {} over {:?}",
        job.start_level, job.end_level, job.duration
    );
    register.set_level(job.start_level);

    for step in 1..=FADE_STEPS {
        let deadline = started_at + job.duration.mul_f64(f64::from(step) / f64::from(FADE_STEPS));
        if cancel.wait_until(deadline) {
            debug!("fade cancelled at level {}", register.level());
            return;
        }
        register.set_level(level_at(&job, elapsed_fraction(started_at, job.duration)));
    }
    register.set_level(job.end_level);

    if let Some(hold) = job.hold_then_off {
        debug!("holding at level {} for {:?}", job.end_level, hold);
        if cancel.wait_until(Instant::now() + hold) {
            return;
        }
        register.set_level(0);
        info!("hold elapsed, light off");
    }
}

/// Target elapsed fraction from the monotonic clock, clamped to 1.
fn elapsed_fraction(started_at: Instant, duration: Duration) -> f64 {
    if duration.is_zero() {
        return 1.0;
    }
    (started_at.elapsed().as_secs_f64() / duration.as_secs_f64()).min(1.0)
}

fn level_at(job: &FadeJob, fraction: f64) -> u16 {
    let start = f64::from(job.start_level.min(MAX_LEVEL));
    let end = f64::from(job.end_level.min(MAX_LEVEL));
    (start + (end - start) * fraction).round() as u16
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scheduler() -> (FadeScheduler, Arc<BrightnessRegister>) {
        let register = Arc::new(BrightnessRegister::new());
        (FadeScheduler::new(Arc::clone(&register)), register)
    }

    #[test]
    fn level_interpolates_between_endpoints() {
        let job = FadeJob::between_percent(0.0, 100.0, Duration::from_secs(1));
        assert_eq!(level_at(&job, 0.0), 0);
        assert_eq!(level_at(&job, 0.5), 500);
        assert_eq!(level_at(&job, 1.0), MAX_LEVEL);

        let down = FadeJob::between_percent(80.0, 20.0, Duration::from_secs(1));
        assert_eq!(level_at(&down, 0.5), 500);
    }

    #[test]
    fn ramp_tracks_wall_clock_fraction() {
        let (fades, register) = scheduler();
        fades.begin(FadeJob::between_percent(0.0, 100.0, Duration::from_millis(400)));

        std::thread::sleep(Duration::from_millis(200));
        let mid = register.level();
        assert!(
            (350..=650).contains(&mid),
            "expected ~half way, got {mid}"
        );

        std::thread::sleep(Duration::from_millis(300));
        assert_eq!(register.level(), MAX_LEVEL);
        assert!(!fades.fade_active());
    }

    #[test]
    fn cancellation_freezes_at_current_level() {
        let (fades, register) = scheduler();
        fades.begin(FadeJob::between_percent(0.0, 100.0, Duration::from_millis(400)));
        std::thread::sleep(Duration::from_millis(150));

        fades.cancel();
        let frozen = register.level();
        assert!(frozen < MAX_LEVEL, "fade should not have completed");

        std::thread::sleep(Duration::from_millis(100));
        assert_eq!(register.level(), frozen);
        assert!(!fades.fade_active());
    }

    #[test]
    fn new_fade_supersedes_running_one() {
        let (fades, register) = scheduler();
        fades.begin(FadeJob::between_percent(0.0, 100.0, Duration::from_secs(30)));
        std::thread::sleep(Duration::from_millis(50));

        fades.begin(FadeJob::between_percent(10.0, 10.0, Duration::ZERO));
        std::thread::sleep(Duration::from_millis(50));
        assert_eq!(register.level(), 100);
    }

    #[test]
    fn instant_fade_jumps_to_end_level() {
        let (fades, register) = scheduler();
        fades.begin(FadeJob::between_percent(0.0, 75.0, Duration::ZERO));
        std::thread::sleep(Duration::from_millis(50));
        assert_eq!(register.level(), 750);
    }

    #[test]
    fn hold_then_off_snaps_to_zero() {
        let (fades, register) = scheduler();
        fades.begin(
            FadeJob::between_percent(0.0, 100.0, Duration::from_millis(50))
                .with_hold(Duration::from_millis(100)),
        );

        std::thread::sleep(Duration::from_millis(100));
        assert_eq!(register.level(), MAX_LEVEL);

        std::thread::sleep(Duration::from_millis(150));
        assert_eq!(register.level(), 0);
    }

    #[test]
    fn cancel_during_hold_keeps_level() {
        let (fades, register) = scheduler();
        fades.begin(
            FadeJob::between_percent(0.0, 100.0, Duration::ZERO)
                .with_hold(Duration::from_secs(30)),
        );
        std::thread::sleep(Duration::from_millis(50));
        fades.cancel();
        assert_eq!(register.level(), MAX_LEVEL);
    }
}
