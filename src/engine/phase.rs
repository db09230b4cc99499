//! Phase-delay computation for trailing-edge firing

use crate::level::MAX_LEVEL;
use std::time::Duration;

/// Conduction time for one half-cycle at the given brightness level.
///
/// Trailing edge: the gate conducts from the zero-crossing for this long,
/// then opens. Level 0 means no conduction at all; [`MAX_LEVEL`] means the
/// entire half-cycle.
pub fn firing_delay(level: u16, half_cycle: Duration) -> Duration {
    let level = u64::from(level.min(MAX_LEVEL));
    let nanos = half_cycle.as_nanos() as u64 * level / u64::from(MAX_LEVEL);
    Duration::from_nanos(nanos)
}
