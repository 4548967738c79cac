//! In-memory Prometheus used by integration tests.
//!
//! Responses are keyed by exact query text. Unknown instant queries return
//! no series, unknown range queries return an empty matrix.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};

use rulelint::adapters::{
    InstantQueryResult, InstantSample, PrometheusApi, QueryError, RangeQueryResult, RangeSeries,
    Sample,
};

pub const URI: &str = "http://prom.test:9090";

/// Fixed "now" of the fake server
pub fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 8, 12, 0, 0).unwrap()
}

pub fn step() -> Duration {
    Duration::minutes(5)
}

pub fn lookback() -> Duration {
    Duration::days(7)
}

/// Start of the default lookback window
pub fn window_start() -> DateTime<Utc> {
    now() - lookback()
}

#[derive(Default)]
pub struct FakeProm {
    instant: HashMap<String, Result<f64, QueryError>>,
    range: HashMap<String, Result<Vec<RangeSeries>, QueryError>>,
    calls: Mutex<Vec<String>>,
}

impl FakeProm {
    pub fn new() -> Self {
        Self::default()
    }

    /// Instant `count(...)` query returning `value`
    pub fn instant(mut self, query: &str, value: f64) -> Self {
        self.instant.insert(query.to_string(), Ok(value));
        self
    }

    pub fn instant_error(mut self, query: &str, err: QueryError) -> Self {
        self.instant.insert(query.to_string(), Err(err));
        self
    }

    pub fn range(mut self, query: &str, series: Vec<RangeSeries>) -> Self {
        self.range.insert(query.to_string(), Ok(series));
        self
    }

    pub fn range_error(mut self, query: &str, err: QueryError) -> Self {
        self.range.insert(query.to_string(), Err(err));
        self
    }

    /// Every query received, in order
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self, query: &str) -> usize {
        self.calls().iter().filter(|q| q.as_str() == query).count()
    }

    fn record(&self, query: &str) {
        self.calls.lock().unwrap().push(query.to_string());
    }
}

#[async_trait]
impl PrometheusApi for FakeProm {
    fn name(&self) -> &str {
        "prom"
    }

    async fn query(&self, expr: &str) -> Result<InstantQueryResult, QueryError> {
        self.record(expr);
        let series = match self.instant.get(expr) {
            Some(Ok(value)) => vec![InstantSample {
                labels: Default::default(),
                value: *value,
            }],
            Some(Err(e)) => return Err(e.clone()),
            None => Vec::new(),
        };
        Ok(InstantQueryResult {
            uri: URI.to_string(),
            series,
        })
    }

    async fn range_query(
        &self,
        expr: &str,
        lookback: Duration,
        _step: Duration,
    ) -> Result<RangeQueryResult, QueryError> {
        self.record(expr);
        let series = match self.range.get(expr) {
            Some(Ok(series)) => series.clone(),
            Some(Err(e)) => return Err(e.clone()),
            None => Vec::new(),
        };
        Ok(RangeQueryResult {
            uri: URI.to_string(),
            start: now() - lookback,
            end: now(),
            series,
        })
    }
}

/// A series sampled every step from `from` (inclusive) to `until` (exclusive)
pub fn present(labels: &[(&str, &str)], from: DateTime<Utc>, until: DateTime<Utc>) -> RangeSeries {
    present_spans(labels, &[(from, until)])
}

/// A series present during each of `spans`
pub fn present_spans(
    labels: &[(&str, &str)],
    spans: &[(DateTime<Utc>, DateTime<Utc>)],
) -> RangeSeries {
    let mut samples = Vec::new();
    for (from, until) in spans {
        let mut ts = *from;
        while ts < *until {
            samples.push(Sample {
                timestamp: ts,
                value: 1.0,
            });
            ts += step();
        }
    }
    RangeSeries {
        labels: labels
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect(),
        samples,
    }
}

/// A series present for the whole window up to now
pub fn always(labels: &[(&str, &str)]) -> RangeSeries {
    present(labels, window_start(), now() + step())
}
