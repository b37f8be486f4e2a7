//! Time-of-day window membership and active-window selection.

use crate::models::Schedule;
use chrono::NaiveTime;

/// Whether `now` falls inside the half-open window `[start_time, end_time)`.
///
/// Windows with `start_time > end_time` cross midnight. Membership depends
/// on the two times alone, so `start_time == end_time` is an empty window.
pub fn contains(schedule: &Schedule, now: NaiveTime) -> bool {
    let (start, end) = (schedule.start_time, schedule.end_time);
    if start <= end {
        now >= start && now < end
    } else {
        now >= start || now < end
    }
}

/// The window in force at `now`, ignoring manual-mode schedules. Overlaps
/// resolve to the earliest `start_time`, then the smallest id.
pub fn select_active(schedules: &[Schedule], now: NaiveTime) -> Option<&Schedule> {
    schedules
        .iter()
        .filter(|s| !s.is_manual_mode && contains(s, now))
        .min_by(|a, b| {
            a.start_time
                .cmp(&b.start_time)
                .then_with(|| a.id.cmp(&b.id))
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    fn schedule(id: &str, start: NaiveTime, hours: i64) -> Schedule {
        let secs = hours * 3600;
        let end = start + chrono::Duration::seconds(secs);
        Schedule {
            id: id.into(),
            energetic_object_id: "obj-1".into(),
            start_time: start,
            end_time: end,
            duration_secs: secs,
            grid_feed_w: 40000,
            battery_level_percent: 20,
            charge_battery_value: 100,
            is_manual_mode: false,
            is_active: false,
        }
    }

    #[test]
    fn test_literal_window_is_half_open() {
        let s = schedule("a", t(8, 0), 4);
        assert!(!contains(&s, t(7, 59)));
        assert!(contains(&s, t(8, 0)));
        assert!(contains(&s, t(11, 59)));
        assert!(!contains(&s, t(12, 0)));
        assert!(!contains(&s, t(20, 0)));
    }

    #[test]
    fn test_midnight_wrap() {
        let s = schedule("a", t(22, 0), 6);
        assert_eq!(s.end_time, t(4, 0));
        assert!(contains(&s, t(22, 0)));
        assert!(contains(&s, t(23, 59)));
        assert!(contains(&s, t(0, 0)));
        assert!(contains(&s, t(2, 30)));
        assert!(!contains(&s, t(4, 0)));
        assert!(!contains(&s, t(12, 0)));
        assert!(!contains(&s, t(21, 59)));
    }

    #[test]
    fn test_day_or_longer_uses_wrapped_end_time() {
        let full = schedule("a", t(6, 0), 24);
        assert_eq!(full.start_time, full.end_time);
        assert!(!contains(&full, t(5, 59)));
        assert!(!contains(&full, t(6, 0)));
        assert!(!contains(&full, t(12, 0)));

        let longer = schedule("b", t(6, 0), 25);
        assert_eq!(longer.end_time, t(7, 0));
        assert!(contains(&longer, t(6, 0)));
        assert!(contains(&longer, t(6, 59)));
        assert!(!contains(&longer, t(7, 0)));
        assert!(!contains(&longer, t(12, 0)));

        let zero = schedule("c", t(6, 0), 0);
        assert!(!contains(&zero, t(6, 0)));
    }

    #[test]
    fn test_manual_mode_never_selected() {
        let mut s = schedule("a", t(0, 0), 12);
        s.is_manual_mode = true;
        assert!(select_active(&[s], t(6, 0)).is_none());
    }

    #[test]
    fn test_overlap_tie_break() {
        let late = schedule("z", t(1, 0), 6);
        let early_b = schedule("b", t(0, 0), 6);
        let early_a = schedule("a", t(0, 0), 6);
        let all = vec![late, early_b, early_a];
        assert_eq!(select_active(&all, t(2, 0)).map(|s| s.id.as_str()), Some("a"));
        assert_eq!(select_active(&all, t(6, 30)).map(|s| s.id.as_str()), Some("z"));
        assert!(select_active(&all, t(8, 0)).is_none());
    }

    #[test]
    fn test_wrapping_window_vs_daytime_window() {
        let night = schedule("night", t(22, 0), 8);
        let morning = schedule("morning", t(5, 0), 3);
        let all = vec![night, morning];
        // 05:30 is inside both; the morning window starts earlier in the day.
        assert_eq!(select_active(&all, t(5, 30)).map(|s| s.id.as_str()), Some("morning"));
        assert_eq!(select_active(&all, t(23, 0)).map(|s| s.id.as_str()), Some("night"));
    }
}
