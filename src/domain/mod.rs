//! Domain types for rulelint.
//!
//! This module contains the core data structures:
//! - Selector: metric selectors and label matchers
//! - Finding: reported issues with severity and location
//! - Directive: per-rule overrides of check behavior
//! - Rule: alerting and recording rules

pub mod directive;
pub mod finding;
pub mod rule;
pub mod selector;

// Re-export commonly used types
pub use directive::{Directive, DirectiveParseError, DirectiveStore, Directives, Layered, Target};
pub use finding::{Finding, LineRange, Severity};
pub use rule::{Rule, RuleEntry, RuleExpr, RuleKind};
pub use selector::{MatchKind, Matcher, Selector, METRIC_NAME};
