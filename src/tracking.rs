// Time tracking helpers

use chrono::{DateTime, Utc};

/// Whole minutes between `start` and `end`, rounded to nearest
///
/// A clock that moved backwards yields zero.
pub fn elapsed_minutes(start: DateTime<Utc>, end: DateTime<Utc>) -> u32 {
    let ms = (end - start).num_milliseconds().max(0);
    ((ms as f64) / 60_000.0).round() as u32
}

/// Render minutes as `45m`, `2h` or `1h 30m`
pub fn format_minutes(minutes: u32) -> String {
    if minutes < 60 {
        return format!("{}m", minutes);
    }
    let hours = minutes / 60;
    let mins = minutes % 60;
    if mins > 0 {
        format!("{}h {}m", hours, mins)
    } else {
        format!("{}h", hours)
    }
}

/// Share of the estimate already spent, capped at 100
pub fn time_progress(actual: u32, estimate: u32) -> f64 {
    if estimate == 0 {
        return 0.0;
    }
    (actual as f64 / estimate as f64 * 100.0).min(100.0)
}

pub fn is_over_time(actual: u32, estimate: u32) -> bool {
    estimate > 0 && actual > estimate
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    #[test]
    fn test_format_minutes() {
        assert_eq!(format_minutes(0), "0m");
        assert_eq!(format_minutes(45), "45m");
        assert_eq!(format_minutes(120), "2h");
        assert_eq!(format_minutes(90), "1h 30m");
    }

    #[test]
    fn test_elapsed_minutes_rounds() {
        let start = Utc.with_ymd_and_hms(2026, 1, 1, 10, 0, 0).unwrap();
        assert_eq!(elapsed_minutes(start, start + Duration::seconds(29)), 0);
        assert_eq!(elapsed_minutes(start, start + Duration::seconds(30)), 1);
        assert_eq!(elapsed_minutes(start, start + Duration::minutes(25) + Duration::seconds(10)), 25);
        assert_eq!(elapsed_minutes(start, start - Duration::minutes(5)), 0);
    }

    #[test]
    fn test_time_progress_and_overtime() {
        assert_eq!(time_progress(30, 0), 0.0);
        assert_eq!(time_progress(30, 60), 50.0);
        assert_eq!(time_progress(90, 60), 100.0);
        assert!(is_over_time(90, 60));
        assert!(!is_over_time(60, 60));
        assert!(!is_over_time(10, 0));
    }
}
