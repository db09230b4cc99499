//! Sunrise alarm scheduling
//!
//! Turns the weekly schedule into sunrise ramps: a timer thread computes
//! the single next trigger, sleeps until `alarm_time - fade_duration`, and
//! starts a fade that completes exactly at the alarm time. After every
//! firing, and after any schedule change, the next trigger is recomputed
//! from scratch, so the scheduler self-heals across restarts with no
//! in-memory history.

mod schedule;

pub use schedule::{next_alarm, AlarmScheduleEntry, NextAlarm};

use chrono::{Local, NaiveDateTime};
use log::info;
use parking_lot::{Condvar, Mutex};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use crate::fade::{FadeJob, FadeScheduler};

/// How long the light holds at sunrise brightness before snapping off.
const AFTER_SUNRISE_HOLD: Duration = Duration::from_secs(30 * 60);

/// Upper bound on one timer sleep. Re-reading the wall clock at least this
/// often keeps the scheduler honest across DST shifts and NTP steps.
const RECHECK_INTERVAL: Duration = Duration::from_secs(60);

struct State {
    entries: Vec<AlarmScheduleEntry>,
    next: Option<NextAlarm>,
    stop: bool,
}

struct Shared {
    state: Mutex<State>,
    wake: Condvar,
}

/// Handle to the alarm timer thread.
pub struct AlarmScheduler {
    shared: Arc<Shared>,
    thread: Option<JoinHandle<()>>,
}

impl AlarmScheduler {
    /// Spawn the timer thread over `entries`. Sunrise ramps target
    /// `sunrise_target_pct` (the configured brightness ceiling).
    pub fn start(
        entries: Vec<AlarmScheduleEntry>,
        fades: Arc<FadeScheduler>,
        sunrise_target_pct: f32,
    ) -> Self {
        let shared = Arc::new(Shared {
            state: Mutex::new(State {
                entries,
                next: None,
                stop: false,
            }),
            wake: Condvar::new(),
        });
        let thread_shared = Arc::clone(&shared);
        let thread =
            std::thread::spawn(move || alarm_loop(&thread_shared, &fades, sunrise_target_pct));
        AlarmScheduler {
            shared,
            thread: Some(thread),
        }
    }

    /// Replace the schedule; the next trigger is recomputed at once.
    pub fn set_schedule(&self, entries: Vec<AlarmScheduleEntry>) {
        self.shared.state.lock().entries = entries;
        self.shared.wake.notify_all();
    }

    /// The cached next trigger, if any.
    pub fn next_alarm(&self) -> Option<NextAlarm> {
        self.shared.state.lock().next
    }

    fn shutdown(&mut self) {
        self.shared.state.lock().stop = true;
        self.shared.wake.notify_all();
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

impl Drop for AlarmScheduler {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn alarm_loop(shared: &Shared, fades: &FadeScheduler, sunrise_target_pct: f32) {
    info!("alarm scheduler started");

    // Triggers at or before this instant have already fired; without it the
    // scan would re-select an alarm whose ramp is still running.
    let mut fired_until: Option<NaiveDateTime> = None;

    let mut state = shared.state.lock();
    loop {
        if state.stop {
            break;
        }

        let now = Local::now().naive_local();
        let basis = fired_until.map_or(now, |f| now.max(f));
        let next = next_alarm(&state.entries, basis);
        if next != state.next {
            match next {
                Some(n) => info!(
                    "next alarm {} (ramp starts {})",
                    n.trigger_at,
                    n.fade_start()
                ),
                None => info!("no enabled alarms"),
            }
        }
        state.next = next;

        let wait = match next {
            None => RECHECK_INTERVAL,
            Some(n) => match (n.fade_start() - now).to_std() {
                Ok(until_start) if !until_start.is_zero() => until_start.min(RECHECK_INTERVAL),
                _ => {
                    // Inside the ramp window: fire.
                    info!(
                        "alarm firing, sunrise to {}% over {:?}",
                        sunrise_target_pct, n.fade
                    );
                    fades.begin(
                        FadeJob::between_percent(0.0, sunrise_target_pct, n.fade)
                            .with_hold(AFTER_SUNRISE_HOLD),
                    );
                    fired_until = Some(n.trigger_at);
                    continue;
                }
            },
        };

        let _ = shared.wake.wait_for(&mut state, wait);
        // Woken by a schedule change, shutdown, or the timer: recompute.
    }

    info!("alarm scheduler stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::level::{BrightnessRegister, MAX_LEVEL};
    use chrono::{Datelike, Timelike};

    fn entry_at(when: NaiveDateTime, fade_minutes: u32) -> AlarmScheduleEntry {
        AlarmScheduleEntry {
            day_of_week: when.date().weekday().num_days_from_monday() as u8,
            enabled: true,
            alarm_time: when.time(),
            fade_duration_minutes: fade_minutes,
        }
    }

    #[test]
    fn caches_next_trigger_for_status() {
        let register = Arc::new(BrightnessRegister::new());
        let fades = Arc::new(FadeScheduler::new(register));

        let soon = Local::now().naive_local() + chrono::Duration::hours(2);
        let alarms = AlarmScheduler::start(vec![entry_at(soon, 30)], fades, 100.0);

        // Give the timer thread a moment to compute.
        std::thread::sleep(Duration::from_millis(100));
        let next = alarms.next_alarm().expect("trigger should be cached");
        assert_eq!(next.trigger_at.time().hour(), soon.time().hour());
        assert_eq!(next.fade, Duration::from_secs(30 * 60));
    }

    #[test]
    fn schedule_change_recomputes_immediately() {
        let register = Arc::new(BrightnessRegister::new());
        let fades = Arc::new(FadeScheduler::new(register));
        let alarms = AlarmScheduler::start(Vec::new(), fades, 100.0);

        std::thread::sleep(Duration::from_millis(100));
        assert_eq!(alarms.next_alarm(), None);

        let soon = Local::now().naive_local() + chrono::Duration::hours(1);
        alarms.set_schedule(vec![entry_at(soon, 15)]);
        std::thread::sleep(Duration::from_millis(100));
        assert!(alarms.next_alarm().is_some());
    }

    #[test]
    fn due_alarm_starts_the_sunrise_ramp() {
        let register = Arc::new(BrightnessRegister::new());
        let fades = Arc::new(FadeScheduler::new(Arc::clone(&register)));

        // Zero-minute ramp due two seconds from now: the scheduler should
        // fire and jump the register to the sunrise target.
        let soon = Local::now().naive_local() + chrono::Duration::seconds(2);
        let alarms = AlarmScheduler::start(vec![entry_at(soon, 0)], fades, 100.0);

        let deadline = std::time::Instant::now() + Duration::from_secs(5);
        while register.level() != MAX_LEVEL && std::time::Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(50));
        }
        assert_eq!(register.level(), MAX_LEVEL);

        // The fired trigger must not be re-selected as "next".
        std::thread::sleep(Duration::from_millis(100));
        if let Some(next) = alarms.next_alarm() {
            assert!(next.trigger_at > soon);
        }
    }

    #[test]
    fn stop_joins_the_timer_thread() {
        let register = Arc::new(BrightnessRegister::new());
        let fades = Arc::new(FadeScheduler::new(register));
        let alarms = AlarmScheduler::start(Vec::new(), fades, 100.0);
        drop(alarms);
    }
}
