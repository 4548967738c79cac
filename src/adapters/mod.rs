//! Query backend interfaces.
//!
//! The series check never talks to the network itself. It calls a
//! [`PrometheusApi`] implementation, which may be a single HTTP client,
//! a failover group of clients, or an in-memory fake in tests.

pub mod prometheus;

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use thiserror::Error;

pub use prometheus::{FailoverGroup, PrometheusClient};

/// A fully resolved label combination of one series
pub type LabelSet = BTreeMap<String, String>;

/// One series returned by an instant query
#[derive(Debug, Clone, PartialEq)]
pub struct InstantSample {
    pub labels: LabelSet,
    pub value: f64,
}

/// Result of an instant query
#[derive(Debug, Clone, PartialEq)]
pub struct InstantQueryResult {
    /// URI of the server that answered
    pub uri: String,

    pub series: Vec<InstantSample>,
}

/// A single timestamped value of a range query series
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sample {
    pub timestamp: DateTime<Utc>,
    pub value: f64,
}

/// One series returned by a range query, samples ordered by timestamp
#[derive(Debug, Clone, PartialEq)]
pub struct RangeSeries {
    pub labels: LabelSet,
    pub samples: Vec<Sample>,
}

/// Result of a range query
#[derive(Debug, Clone, PartialEq)]
pub struct RangeQueryResult {
    /// URI of the server that answered
    pub uri: String,

    /// First timestamp of the query window
    pub start: DateTime<Utc>,

    /// Last timestamp of the query window
    pub end: DateTime<Utc>,

    pub series: Vec<RangeSeries>,
}

/// Errors returned by a query backend
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueryError {
    #[error("connection to {uri} failed: {reason}")]
    Unavailable { uri: String, reason: String },

    #[error("query is too expensive: {message}")]
    TooExpensive { uri: String, message: String },

    #[error("{kind}: {message}")]
    Api {
        uri: String,
        kind: String,
        message: String,
    },

    #[error("failed to decode response: {reason}")]
    Decode { uri: String, reason: String },
}

impl QueryError {
    /// URI of the server that produced this error
    pub fn uri(&self) -> &str {
        match self {
            Self::Unavailable { uri, .. }
            | Self::TooExpensive { uri, .. }
            | Self::Api { uri, .. }
            | Self::Decode { uri, .. } => uri,
        }
    }

    /// True when the server could not be reached at all
    pub fn is_unavailable(&self) -> bool {
        matches!(self, Self::Unavailable { .. })
    }
}

/// Trait for metric query backends
#[async_trait]
pub trait PrometheusApi: Send + Sync {
    /// Human-readable server or group name
    fn name(&self) -> &str;

    /// Run an instant query evaluated at the current time
    async fn query(&self, expr: &str) -> Result<InstantQueryResult, QueryError>;

    /// Run a range query over `[now - lookback, now]` sampled every `step`
    async fn range_query(
        &self,
        expr: &str,
        lookback: Duration,
        step: Duration,
    ) -> Result<RangeQueryResult, QueryError>;
}
