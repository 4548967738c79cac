//! Turning query backend errors into findings.

use crate::adapters::QueryError;
use crate::domain::Severity;

/// Describe a server in finding text
pub fn prom_text(name: &str, uri: &str) -> String {
    if uri.is_empty() {
        format!("prometheus {:?}", name)
    } else {
        format!("prometheus {:?} at {}", name, uri)
    }
}

/// Message and severity for a failed query.
///
/// Connectivity problems and refused expensive queries are Warnings since
/// they say nothing about the rule itself; every other failure gets
/// `default`.
pub fn text_and_severity(
    err: &QueryError,
    reporter: &str,
    prom_name: &str,
    default: Severity,
) -> (String, Severity) {
    let prom = prom_text(prom_name, err.uri());
    match err {
        QueryError::Unavailable { .. } => (
            format!(
                "couldn't run {:?} checks due to {} connection error: {}",
                reporter, prom, err
            ),
            Severity::Warning,
        ),
        QueryError::TooExpensive { .. } => (
            format!(
                "couldn't run {:?} checks on {} because some queries are too expensive: {}",
                reporter, prom, err
            ),
            Severity::Warning,
        ),
        QueryError::Api { .. } | QueryError::Decode { .. } => (
            format!("query using {} failed with: {}", prom, err),
            default,
        ),
    }
}
