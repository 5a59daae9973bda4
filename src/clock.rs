//! Wall-clock helpers. The only engine that needs calendar time is the
//! schedule-window check (§4.5.1), which wants a `"HH:MM"` local
//! wall-clock string.

use chrono::{Local, Timelike};

/// Current local time as `"HH:MM"`, zero-padded.
pub fn local_hhmm() -> String {
    let now = Local::now();
    format!("{:02}:{:02}", now.hour(), now.minute())
}
