//! Prometheus HTTP API adapter.
//!
//! `PrometheusClient` talks to a single server over `/api/v1/query` and
//! `/api/v1/query_range`. `FailoverGroup` wraps several backends and moves
//! to the next one only when a server is unreachable.

use std::sync::Arc;
use std::time::Duration as StdDuration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::{debug, warn};

use super::{
    InstantQueryResult, InstantSample, LabelSet, PrometheusApi, QueryError, RangeQueryResult,
    RangeSeries, Sample,
};

/// Response envelope shared by all query endpoints
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiResponse<T> {
    status: String,
    data: Option<T>,
    error_type: Option<String>,
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct QueryData<T> {
    result_type: String,
    result: Vec<T>,
}

#[derive(Debug, Deserialize)]
struct VectorItem {
    #[serde(default)]
    metric: LabelSet,
    value: (f64, String),
}

#[derive(Debug, Deserialize)]
struct MatrixItem {
    #[serde(default)]
    metric: LabelSet,
    values: Vec<(f64, String)>,
}

/// Single Prometheus server client
pub struct PrometheusClient {
    name: String,
    uri: String,
    client: reqwest::Client,
}

impl PrometheusClient {
    /// Create a client with a per-request timeout
    pub fn new(name: impl Into<String>, uri: impl Into<String>, timeout: StdDuration) -> Result<Self> {
        let uri = uri.into();
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .with_context(|| format!("Failed to build HTTP client for {}", uri))?;

        Ok(Self {
            name: name.into(),
            uri: uri.trim_end_matches('/').to_string(),
            client,
        })
    }

    /// Server URI without trailing slash
    pub fn uri(&self) -> &str {
        &self.uri
    }

    async fn get<T: DeserializeOwned>(
        &self,
        path: &str,
        params: &[(&str, String)],
    ) -> Result<T, QueryError> {
        let url = format!("{}{}", self.uri, path);

        let response = self
            .client
            .get(&url)
            .query(params)
            .send()
            .await
            .map_err(|e| self.unavailable(e))?;

        let status = response.status().as_u16();
        let body = response.text().await.map_err(|e| self.unavailable(e))?;

        parse_response(&self.uri, status, &body)
    }

    fn unavailable(&self, err: reqwest::Error) -> QueryError {
        QueryError::Unavailable {
            uri: self.uri.clone(),
            reason: err.to_string(),
        }
    }
}

#[async_trait]
impl PrometheusApi for PrometheusClient {
    fn name(&self) -> &str {
        &self.name
    }

    async fn query(&self, expr: &str) -> Result<InstantQueryResult, QueryError> {
        debug!(uri = %self.uri, query = expr, "Running instant query");
        let params = [
            ("query", expr.to_string()),
            ("time", format_timestamp(Utc::now())),
        ];
        let data: QueryData<VectorItem> = self.get("/api/v1/query", &params).await?;

        Ok(InstantQueryResult {
            uri: self.uri.clone(),
            series: vector_series(&self.uri, data)?,
        })
    }

    async fn range_query(
        &self,
        expr: &str,
        lookback: Duration,
        step: Duration,
    ) -> Result<RangeQueryResult, QueryError> {
        let end = Utc::now();
        let start = end - lookback;
        debug!(uri = %self.uri, query = expr, %start, %end, "Running range query");

        let params = [
            ("query", expr.to_string()),
            ("start", format_timestamp(start)),
            ("end", format_timestamp(end)),
            ("step", step.num_seconds().max(1).to_string()),
        ];
        let data: QueryData<MatrixItem> = self.get("/api/v1/query_range", &params).await?;

        Ok(RangeQueryResult {
            uri: self.uri.clone(),
            start,
            end,
            series: matrix_series(&self.uri, data)?,
        })
    }
}

/// Ordered set of backends queried with failover
pub struct FailoverGroup {
    name: String,
    servers: Vec<Arc<dyn PrometheusApi>>,
}

impl FailoverGroup {
    pub fn new(name: impl Into<String>, servers: Vec<Arc<dyn PrometheusApi>>) -> Self {
        Self {
            name: name.into(),
            servers,
        }
    }

    fn no_servers(&self) -> QueryError {
        QueryError::Unavailable {
            uri: String::new(),
            reason: format!("no servers configured for {:?}", self.name),
        }
    }
}

#[async_trait]
impl PrometheusApi for FailoverGroup {
    fn name(&self) -> &str {
        &self.name
    }

    async fn query(&self, expr: &str) -> Result<InstantQueryResult, QueryError> {
        let mut last_error = None;
        for server in &self.servers {
            match server.query(expr).await {
                Err(e) if e.is_unavailable() => {
                    warn!(group = %self.name, uri = e.uri(), error = %e, "Server unavailable, trying next one");
                    last_error = Some(e);
                }
                result => return result,
            }
        }
        Err(last_error.unwrap_or_else(|| self.no_servers()))
    }

    async fn range_query(
        &self,
        expr: &str,
        lookback: Duration,
        step: Duration,
    ) -> Result<RangeQueryResult, QueryError> {
        let mut last_error = None;
        for server in &self.servers {
            match server.range_query(expr, lookback, step).await {
                Err(e) if e.is_unavailable() => {
                    warn!(group = %self.name, uri = e.uri(), error = %e, "Server unavailable, trying next one");
                    last_error = Some(e);
                }
                result => return result,
            }
        }
        Err(last_error.unwrap_or_else(|| self.no_servers()))
    }
}

fn format_timestamp(ts: DateTime<Utc>) -> String {
    format!("{:.3}", ts.timestamp_millis() as f64 / 1000.0)
}

fn parse_response<T: DeserializeOwned>(uri: &str, status: u16, body: &str) -> Result<T, QueryError> {
    if (500..600).contains(&status) {
        let envelope: Option<ApiResponse<serde_json::Value>> = serde_json::from_str(body).ok();
        if let Some(message) = envelope.and_then(|e| e.error) {
            if message.contains("too many samples") {
                return Err(QueryError::TooExpensive {
                    uri: uri.to_string(),
                    message,
                });
            }
        }
        return Err(QueryError::Unavailable {
            uri: uri.to_string(),
            reason: format!("server returned HTTP {}", status),
        });
    }

    let response: ApiResponse<T> = match serde_json::from_str(body) {
        Ok(response) => response,
        Err(e) if (200..300).contains(&status) => {
            return Err(QueryError::Decode {
                uri: uri.to_string(),
                reason: e.to_string(),
            })
        }
        Err(_) => {
            return Err(QueryError::Api {
                uri: uri.to_string(),
                kind: format!("HTTP {}", status),
                message: body.trim().to_string(),
            })
        }
    };

    if response.status != "success" {
        let message = response.error.unwrap_or_default();
        if message.contains("too many samples") {
            return Err(QueryError::TooExpensive {
                uri: uri.to_string(),
                message,
            });
        }
        return Err(QueryError::Api {
            uri: uri.to_string(),
            kind: response.error_type.unwrap_or_else(|| "error".to_string()),
            message,
        });
    }

    response.data.ok_or_else(|| QueryError::Decode {
        uri: uri.to_string(),
        reason: "response is missing data".to_string(),
    })
}

fn vector_series(uri: &str, data: QueryData<VectorItem>) -> Result<Vec<InstantSample>, QueryError> {
    expect_result_type(uri, &data.result_type, "vector")?;
    data.result
        .into_iter()
        .map(|item| {
            Ok(InstantSample {
                labels: item.metric,
                value: parse_value(uri, &item.value.1)?,
            })
        })
        .collect()
}

fn matrix_series(uri: &str, data: QueryData<MatrixItem>) -> Result<Vec<RangeSeries>, QueryError> {
    expect_result_type(uri, &data.result_type, "matrix")?;
    data.result
        .into_iter()
        .map(|item| {
            let samples = item
                .values
                .iter()
                .map(|(ts, value)| {
                    Ok(Sample {
                        timestamp: parse_timestamp(uri, *ts)?,
                        value: parse_value(uri, value)?,
                    })
                })
                .collect::<Result<Vec<_>, QueryError>>()?;
            Ok(RangeSeries {
                labels: item.metric,
                samples,
            })
        })
        .collect()
}

fn expect_result_type(uri: &str, actual: &str, expected: &str) -> Result<(), QueryError> {
    if actual == expected {
        return Ok(());
    }
    Err(QueryError::Decode {
        uri: uri.to_string(),
        reason: format!("expected {} result, got {}", expected, actual),
    })
}

fn parse_timestamp(uri: &str, secs: f64) -> Result<DateTime<Utc>, QueryError> {
    Utc.timestamp_millis_opt((secs * 1000.0).round() as i64)
        .single()
        .ok_or_else(|| QueryError::Decode {
            uri: uri.to_string(),
            reason: format!("invalid timestamp {}", secs),
        })
}

fn parse_value(uri: &str, value: &str) -> Result<f64, QueryError> {
    value.parse().map_err(|_| QueryError::Decode {
        uri: uri.to_string(),
        reason: format!("invalid sample value {:?}", value),
    })
}
