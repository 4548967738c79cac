//! Alerting and recording rules as seen by checks.

use std::path::PathBuf;

use promql_parser::parser::Expr;

use super::directive::Directives;
use super::finding::LineRange;

/// Whether a rule raises alerts or records a new series
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuleKind {
    Alerting { alert: String },
    Recording { record: String },
}

/// A rule's query expression
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleExpr {
    pub query: String,

    /// Lines of the `expr` field
    pub lines: LineRange,

    /// Parser error, if the query is not valid PromQL
    pub syntax_error: Option<String>,
}

impl RuleExpr {
    pub fn new(query: impl Into<String>, lines: LineRange) -> Self {
        let query = query.into();
        let syntax_error = promql_parser::parser::parse(&query).err();
        Self {
            query,
            lines,
            syntax_error,
        }
    }

    /// Parse the query into an expression tree
    pub fn ast(&self) -> Result<Expr, String> {
        promql_parser::parser::parse(&self.query)
    }
}

/// A single rule with its directives
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rule {
    pub kind: RuleKind,
    pub expr: RuleExpr,

    /// Lines of the whole rule
    pub lines: LineRange,

    pub directives: Directives,

    /// Structural problem found while loading, e.g. missing fields
    pub error: Option<String>,
}

impl Rule {
    pub fn alerting(alert: impl Into<String>, expr: RuleExpr, lines: LineRange) -> Self {
        Self {
            kind: RuleKind::Alerting {
                alert: alert.into(),
            },
            expr,
            lines,
            directives: Directives::new(),
            error: None,
        }
    }

    pub fn recording(record: impl Into<String>, expr: RuleExpr, lines: LineRange) -> Self {
        Self {
            kind: RuleKind::Recording {
                record: record.into(),
            },
            expr,
            lines,
            directives: Directives::new(),
            error: None,
        }
    }

    pub fn with_directives(mut self, directives: Directives) -> Self {
        self.directives = directives;
        self
    }

    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }

    /// Alert or record name
    pub fn name(&self) -> &str {
        match &self.kind {
            RuleKind::Alerting { alert } => alert,
            RuleKind::Recording { record } => record,
        }
    }

    pub fn alert_name(&self) -> Option<&str> {
        match &self.kind {
            RuleKind::Alerting { alert } => Some(alert),
            RuleKind::Recording { .. } => None,
        }
    }

    pub fn record_name(&self) -> Option<&str> {
        match &self.kind {
            RuleKind::Recording { record } => Some(record),
            RuleKind::Alerting { .. } => None,
        }
    }

    /// True when the rule loaded without structural errors
    pub fn is_valid(&self) -> bool {
        self.error.is_none()
    }
}

/// A discovered rule and the file it came from
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleEntry {
    pub path: PathBuf,
    pub rule: Rule,
}
