//! Label churn detection.
//!
//! A label churns when its values keep rotating: every value shows up in
//! exactly one short-lived interval. Selectors pinned to a specific value
//! of such a label are expected to stop matching sooner or later.

use chrono::Duration;

use super::ranges::PresenceIntervalSet;

/// Cardinality and lifespan statistics of one grouping label
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelChurn {
    pub label: String,
    pub distinct_values: usize,
    pub intervals: usize,
    pub avg_life: Duration,
    pub window: Duration,
}

impl LabelChurn {
    /// Measure `label` over a set built from a `count(...) by (label)` query
    pub fn measure(set: &PresenceIntervalSet, label: &str) -> Self {
        Self {
            label: label.to_string(),
            distinct_values: set.label_values(label).len(),
            intervals: set.len(),
            avg_life: set.avg_life(),
            window: set.duration(),
        }
    }

    /// One interval per value, living less than half of the window on average
    pub fn is_high(&self) -> bool {
        self.distinct_values == self.intervals && self.avg_life < self.window / 2
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::ranges::PresenceInterval;
    use chrono::{DateTime, TimeZone, Utc};

    fn at(hours: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap() + Duration::hours(hours)
    }

    fn interval(value: &str, start: i64, end: i64) -> PresenceInterval {
        PresenceInterval {
            labels: [("pod".to_string(), value.to_string())].into_iter().collect(),
            start: at(start),
            end: at(end),
        }
    }

    fn set(intervals: Vec<PresenceInterval>) -> PresenceIntervalSet {
        PresenceIntervalSet {
            uri: "http://prom".to_string(),
            from: at(0),
            until: at(100),
            step: Duration::minutes(5),
            intervals,
        }
    }

    #[test]
    fn test_rotating_values_are_high_churn() {
        let s = set(vec![
            interval("a", 0, 10),
            interval("b", 10, 20),
            interval("c", 20, 30),
        ]);
        let churn = LabelChurn::measure(&s, "pod");
        assert_eq!(churn.distinct_values, 3);
        assert_eq!(churn.intervals, 3);
        assert!(churn.is_high());
    }

    #[test]
    fn test_long_lived_value_is_not_churn() {
        let s = set(vec![interval("a", 0, 60)]);
        assert!(!LabelChurn::measure(&s, "pod").is_high());
    }

    #[test]
    fn test_flapping_value_is_not_churn() {
        let s = set(vec![interval("a", 0, 10), interval("a", 20, 30)]);
        let churn = LabelChurn::measure(&s, "pod");
        assert_eq!(churn.distinct_values, 1);
        assert!(!churn.is_high());
    }
}
