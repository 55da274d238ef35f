//! Period keys for scheduled newsletter runs.

use chrono::{DateTime, Datelike, Utc};
use std::time::Duration;

const DAY: Duration = Duration::from_secs(86_400);

/// `2024-W03` for weekly or longer cadences, `2024-01-16` for daily ones,
/// `2024-01-16T0930` below a day.
pub fn period_key_for(now: DateTime<Utc>, cadence: Duration) -> String {
    if cadence >= DAY * 7 {
        let w = now.iso_week();
        format!("{}-W{:02}", w.year(), w.week())
    } else if cadence >= DAY {
        now.format("%Y-%m-%d").to_string()
    } else {
        now.format("%Y-%m-%dT%H%M").to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ts(s: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(s).unwrap().with_timezone(&Utc)
    }

    #[test]
    fn weekly_uses_iso_week_year() {
        let week = Duration::from_secs(7 * 86_400);
        assert_eq!(period_key_for(ts("2024-01-16T09:30:00Z"), week), "2024-W03");
        // 2021-01-03 belongs to ISO week 53 of 2020.
        assert_eq!(period_key_for(ts("2021-01-03T12:00:00Z"), week), "2020-W53");
    }

    #[test]
    fn shorter_cadences() {
        let t = ts("2024-01-16T09:30:00Z");
        assert_eq!(period_key_for(t, DAY), "2024-01-16");
        assert_eq!(period_key_for(t, Duration::from_secs(3600)), "2024-01-16T0930");
    }
}
