//! Weekly schedule and next-trigger computation

use chrono::{Datelike, Days, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// One day's alarm configuration.
///
/// `day_of_week` is 0-6 for Monday-Sunday, matching both the stored
/// schedule and chrono's `num_days_from_monday` numbering.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AlarmScheduleEntry {
    /// Day this entry applies to, 0 = Monday.
    pub day_of_week: u8,
    /// Disabled entries are skipped entirely.
    pub enabled: bool,
    /// Time of day the light should reach full sunrise brightness.
    pub alarm_time: NaiveTime,
    /// Length of the sunrise ramp, in minutes.
    pub fade_duration_minutes: u32,
}

/// The next trigger derived from the schedule, cached until the schedule
/// changes or the alarm fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NextAlarm {
    /// When the light must be at full sunrise brightness.
    pub trigger_at: NaiveDateTime,
    /// Length of the ramp leading up to `trigger_at`.
    pub fade: Duration,
}

impl NextAlarm {
    /// When the sunrise ramp must begin so it completes at `trigger_at`.
    pub fn fade_start(&self) -> NaiveDateTime {
        let fade = chrono::Duration::from_std(self.fade).unwrap_or_else(|_| chrono::Duration::zero());
        self.trigger_at - fade
    }
}

/// Earliest strictly-future alarm, or `None` if the schedule is empty or
/// fully disabled.
///
/// Scans day offsets 0..7 from `now`'s weekday in order; the in-order scan
/// makes "earliest absolute time" the tie-break.
pub fn next_alarm(entries: &[AlarmScheduleEntry], now: NaiveDateTime) -> Option<NextAlarm> {
    let today = now.date().weekday().num_days_from_monday();

    for offset in 0..7u32 {
        let day = (today + offset) % 7;
        let date = now.date() + Days::new(u64::from(offset));

        let mut best: Option<NextAlarm> = None;
        for entry in entries
            .iter()
            .filter(|e| e.enabled && u32::from(e.day_of_week) == day)
        {
            let trigger_at = date.and_time(entry.alarm_time);
            if trigger_at > now && best.map_or(true, |b| trigger_at < b.trigger_at) {
                best = Some(NextAlarm {
                    trigger_at,
                    fade: Duration::from_secs(u64::from(entry.fade_duration_minutes) * 60),
                });
            }
        }
        if best.is_some() {
            return best;
        }
    }
    None
}
