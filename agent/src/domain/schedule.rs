//! Daily maintenance schedule.

use chrono::{DateTime, Days, TimeZone};

/// The first `hour:00` strictly after `now`, in `now`'s time zone.
///
/// Returns `None` only when `hour` is out of range. On a DST gap the next
/// representable day is used.
#[must_use]
pub fn next_daily_run<Tz: TimeZone>(now: &DateTime<Tz>, hour: u32) -> Option<DateTime<Tz>> {
    let tz = now.timezone();
    let mut day = now.date_naive();
    for _ in 0..3 {
        let at = day.and_hms_opt(hour, 0, 0)?;
        if let Some(candidate) = tz.from_local_datetime(&at).earliest() {
            if candidate > *now {
                return Some(candidate);
            }
        }
        day = day.checked_add_days(Days::new(1))?;
    }
    None
}
