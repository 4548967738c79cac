//! rulelint - Prometheus rule linter
//!
//! Checks that the selectors used by alerting and recording rules match
//! series that actually exist on a Prometheus server, and explains why
//! when they don't: the metric was never there, a label or label value
//! never existed, the series went away, or it only shows up sometimes.
//!
//! # Modules
//!
//! - `adapters`: Query backends (Prometheus HTTP API, failover groups)
//! - `core`: Checks and the analysis they are built on
//! - `domain`: Data structures (Selector, Rule, Finding, Directive)
//! - `discovery`: Rule file loading
//! - `config`: Configuration file and environment handling
//! - `cli`: Command-line interface
//!
//! # Usage
//!
//! ```bash
//! # Check rules against a server
//! rulelint check --prometheus http://localhost:9090 'rules/*.yaml'
//!
//! # List selectors used by rules
//! rulelint selectors rules/app.yaml
//! ```

pub mod adapters;
pub mod cli;
pub mod config;
pub mod core;
pub mod discovery;
pub mod domain;

// Re-export main types at crate root for convenience
pub use adapters::{FailoverGroup, PrometheusApi, PrometheusClient, QueryError};
pub use core::{RuleCheck, SeriesCheck, SeriesSettings};
pub use domain::{Directive, Directives, Finding, LineRange, Rule, RuleEntry, Selector, Severity};
