// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Coarse relative-time text for status lines ("12 minutes", "3 hours").

use chrono::Duration;

const HOUR: f64 = 60.0 * 60.0;
const DAY: f64 = HOUR * 24.0;

/// Round `elapsed` to the largest whole unit of minutes, hours, or days.
/// Negative durations read as zero.
pub fn time_ago(elapsed: Duration) -> String {
    let secs = (elapsed.num_milliseconds() as f64 / 1000.0).max(0.0);
    if secs < HOUR {
        format!("{} minutes", (secs / 60.0).round() as i64)
    } else if secs < DAY {
        format!("{} hours", (secs / HOUR).round() as i64)
    } else {
        format!("{} days", (secs / DAY).round() as i64)
    }
}
