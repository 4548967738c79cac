//! Presence Interval Integration Tests
//!
//! Tests for interval coalescing and churn detection on range query results.

use chrono::{DateTime, Duration, TimeZone, Utc};

use rulelint::adapters::{RangeQueryResult, RangeSeries, Sample};
use rulelint::core::{LabelChurn, TimeRangeBuilder};

fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, 1, 0, 0, 0).unwrap()
}

fn step() -> Duration {
    Duration::minutes(1)
}

fn series(labels: &[(&str, &str)], offsets: &[i64]) -> RangeSeries {
    RangeSeries {
        labels: labels
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect(),
        samples: offsets
            .iter()
            .map(|n| Sample {
                timestamp: t0() + step() * (*n as i32),
                value: 1.0,
            })
            .collect(),
    }
}

fn result(series: Vec<RangeSeries>) -> RangeQueryResult {
    RangeQueryResult {
        uri: "http://prom".to_string(),
        start: t0(),
        end: t0() + Duration::minutes(100),
        series,
    }
}

#[test]
fn test_consecutive_samples_form_one_interval() {
    let set = TimeRangeBuilder::new(step()).build(&result(vec![series(&[], &[0, 1, 2])]));

    assert_eq!(set.len(), 1);
    assert_eq!(set.intervals[0].start, t0());
    assert_eq!(set.intervals[0].end, t0() + step() * 3);
}

#[test]
fn test_gap_larger_than_step_splits() {
    let set = TimeRangeBuilder::new(step()).build(&result(vec![series(&[], &[0, 1, 2, 5])]));

    assert_eq!(set.len(), 2);
    assert_eq!(set.intervals[0].end, t0() + step() * 3);
    assert_eq!(set.intervals[1].start, t0() + step() * 5);
    assert_eq!(set.intervals[1].end, t0() + step() * 6);
}

#[test]
fn test_window_and_uri_come_from_result() {
    let set = TimeRangeBuilder::new(step()).build(&result(vec![]));

    assert!(set.is_empty());
    assert_eq!(set.uri, "http://prom");
    assert_eq!(set.duration(), Duration::minutes(100));
    assert_eq!(set.oldest(), None);
    assert_eq!(set.newest(), None);
    assert!(!set.has_disappeared());
}

#[test]
fn test_rotating_values_are_high_churn() {
    let set = TimeRangeBuilder::new(step()).build(&result(vec![
        series(&[("pod", "a")], &[0, 1, 2]),
        series(&[("pod", "b")], &[10, 11]),
        series(&[("pod", "c")], &[20, 21, 22, 23]),
    ]));
    let churn = LabelChurn::measure(&set, "pod");

    assert_eq!(churn.distinct_values, 3);
    assert_eq!(churn.intervals, 3);
    assert_eq!(churn.avg_life, Duration::minutes(3));
    assert!(churn.is_high());
}

#[test]
fn test_long_lived_interval_is_never_churn() {
    let offsets: Vec<i64> = (0..60).collect();
    let set = TimeRangeBuilder::new(step()).build(&result(vec![series(&[("pod", "a")], &offsets)]));

    assert!(!LabelChurn::measure(&set, "pod").is_high());
}

#[test]
fn test_repeating_value_is_not_churn() {
    let set = TimeRangeBuilder::new(step()).build(&result(vec![series(
        &[("pod", "a")],
        &[0, 1, 10, 11, 20, 21],
    )]));
    let churn = LabelChurn::measure(&set, "pod");

    assert_eq!(churn.distinct_values, 1);
    assert_eq!(churn.intervals, 3);
    assert!(!churn.is_high());
}

#[test]
fn test_since_desc() {
    let set = TimeRangeBuilder::new(step()).build(&result(vec![series(&[], &[0, 1, 2])]));

    assert_eq!(set.since_desc(t0()), "1h40m");
    assert_eq!(set.since_desc(set.until), "0s");
}
