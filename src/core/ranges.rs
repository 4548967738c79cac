//! Presence intervals reconstructed from range query samples.
//!
//! A range query returns one sample per `step` for every series that was
//! present. Consecutive samples no more than one step apart belong to the
//! same interval, so a gap between two intervals of the same label set
//! means at least one sample was missing.

use std::collections::BTreeSet;

use chrono::{DateTime, Duration, Utc};

use crate::adapters::{LabelSet, RangeQueryResult};

use super::duration::describe_age;

/// A contiguous `[start, end)` span during which a label set was observed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PresenceInterval {
    pub labels: LabelSet,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl PresenceInterval {
    pub fn lifespan(&self) -> Duration {
        self.end - self.start
    }
}

/// All presence intervals from one range query
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PresenceIntervalSet {
    /// URI of the server that answered
    pub uri: String,

    pub from: DateTime<Utc>,
    pub until: DateTime<Utc>,
    pub step: Duration,
    pub intervals: Vec<PresenceInterval>,
}

impl PresenceIntervalSet {
    pub fn len(&self) -> usize {
        self.intervals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.intervals.is_empty()
    }

    /// Intervals whose label set carries `name`
    pub fn with_label_name(&self, name: &str) -> Vec<&PresenceInterval> {
        self.intervals
            .iter()
            .filter(|i| i.labels.contains_key(name))
            .collect()
    }

    /// Distinct values of label `name` across all intervals
    pub fn label_values(&self, name: &str) -> BTreeSet<&str> {
        self.intervals
            .iter()
            .filter_map(|i| i.labels.get(name).map(String::as_str))
            .collect()
    }

    /// Length of the query window
    pub fn duration(&self) -> Duration {
        self.until - self.from
    }

    /// Mean interval lifespan, truncated to whole seconds
    pub fn avg_life(&self) -> Duration {
        if self.intervals.is_empty() {
            return Duration::zero();
        }
        let total: i64 = self
            .intervals
            .iter()
            .map(|i| i.lifespan().num_seconds())
            .sum();
        Duration::seconds(total / self.intervals.len() as i64)
    }

    /// Earliest interval start
    pub fn oldest(&self) -> Option<DateTime<Utc>> {
        self.intervals.iter().map(|i| i.start).min()
    }

    /// Latest interval end
    pub fn newest(&self) -> Option<DateTime<Utc>> {
        self.intervals.iter().map(|i| i.end).max()
    }

    /// How long before the end of the window `ts` was, e.g. `3h20m`
    pub fn since_desc(&self, ts: DateTime<Utc>) -> String {
        describe_age(self.until - ts)
    }

    /// Exactly one interval that started with the window and stopped
    /// more than one step before it closed.
    pub fn has_disappeared(&self) -> bool {
        match (self.len(), self.oldest(), self.newest()) {
            (1, Some(oldest), Some(newest)) => {
                oldest <= self.from + self.step && newest < self.until - self.step
            }
            _ => false,
        }
    }

    /// True if the last interval ended less than `min_age` before the window closed
    pub fn last_seen_within(&self, min_age: Duration) -> bool {
        self.newest()
            .is_some_and(|newest| newest >= self.until - min_age)
    }
}

/// Coalesces range query samples into presence intervals
#[derive(Debug, Clone, Copy)]
pub struct TimeRangeBuilder {
    step: Duration,
}

impl TimeRangeBuilder {
    pub fn new(step: Duration) -> Self {
        Self { step }
    }

    /// Build the interval set for a range query result.
    ///
    /// A sample extends an existing interval of the same label set when it
    /// falls inside `[start, end]`, pushing `end` to one step past the
    /// sample. Otherwise it opens a new interval. Samples of each series
    /// must arrive ordered by timestamp.
    pub fn build(&self, result: &RangeQueryResult) -> PresenceIntervalSet {
        let mut intervals: Vec<PresenceInterval> = Vec::new();

        for series in &result.series {
            for sample in &series.samples {
                let ts = sample.timestamp;
                let existing = intervals
                    .iter_mut()
                    .rev()
                    .find(|i| i.labels == series.labels && i.start <= ts && ts <= i.end);

                match existing {
                    Some(interval) => interval.end = ts + self.step,
                    None => intervals.push(PresenceInterval {
                        labels: series.labels.clone(),
                        start: ts,
                        end: ts + self.step,
                    }),
                }
            }
        }

        PresenceIntervalSet {
            uri: result.uri.clone(),
            from: result.start,
            until: result.end,
            step: self.step,
            intervals,
        }
    }
}
