//! Core linting logic.
//!
//! This module contains:
//! - Extract: vector selectors referenced by a query
//! - Ranges: presence intervals rebuilt from range query samples
//! - Churn: high churn label detection
//! - Directives: per-selector overrides of check behaviour
//! - SeriesCheck: the selector presence check
//! - Problem: query failures turned into findings
//! - Duration: Prometheus duration parsing and formatting

pub mod churn;
pub mod directives;
pub mod duration;
pub mod extract;
pub mod problem;
pub mod ranges;
pub mod series_check;

use async_trait::async_trait;

use crate::domain::{DirectiveStore, Finding, Rule, RuleEntry};

// Re-export commonly used types
pub use churn::LabelChurn;
pub use directives::{DirectiveResolver, IGNORE_LABEL_VALUE_KEY, MIN_AGE_KEY};
pub use duration::{describe_age, humanize_duration, parse_duration, DurationError};
pub use extract::extract_selectors;
pub use ranges::{PresenceInterval, PresenceIntervalSet, TimeRangeBuilder};
pub use series_check::{SeriesCheck, SeriesSettings, SERIES_CHECK_NAME};

/// A check run against every rule.
///
/// Checks never fail: problems running them, like an unreachable server,
/// are reported as findings.
#[async_trait]
pub trait RuleCheck: Send + Sync {
    /// Reporter name used in findings and directives
    fn reporter(&self) -> &'static str;

    /// Human readable name including the server checked against
    fn describe(&self) -> String;

    /// Check one rule. `entries` is every rule loaded in this run.
    async fn check(
        &self,
        rule: &Rule,
        directives: &dyn DirectiveStore,
        entries: &[RuleEntry],
    ) -> Vec<Finding>;
}
