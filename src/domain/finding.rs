//! Findings reported by rule checks.

use std::fmt;

use serde::{Deserialize, Serialize};

/// How serious a finding is, ordered from least to most severe
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Information,
    Warning,
    Bug,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Information => "information",
            Self::Warning => "warning",
            Self::Bug => "bug",
        };
        f.write_str(s)
    }
}

/// Inclusive range of 1-indexed source lines
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct LineRange {
    pub first: usize,
    pub last: usize,
}

impl LineRange {
    pub fn new(first: usize, last: usize) -> Self {
        Self {
            first,
            last: last.max(first),
        }
    }

    pub fn single(line: usize) -> Self {
        Self::new(line, line)
    }
}

impl fmt::Display for LineRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.first == self.last {
            write!(f, "{}", self.first)
        } else {
            write!(f, "{}-{}", self.first, self.last)
        }
    }
}

/// A single reported issue. Never modified once created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Finding {
    /// Offending expression or directive text
    pub fragment: String,

    /// Source lines the finding points at
    pub lines: LineRange,

    /// Name of the check that produced it
    pub reporter: String,

    /// Human-readable description
    pub text: String,

    pub severity: Severity,
}

impl Finding {
    pub fn new(
        reporter: &str,
        fragment: impl Into<String>,
        lines: LineRange,
        severity: Severity,
        text: impl Into<String>,
    ) -> Self {
        Self {
            fragment: fragment.into(),
            lines,
            reporter: reporter.to_string(),
            text: text.into(),
            severity,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_severity_order() {
        assert!(Severity::Bug > Severity::Warning);
        assert!(Severity::Warning > Severity::Information);
        assert_eq!(Severity::Bug.to_string(), "bug");
    }

    #[test]
    fn test_line_range_display() {
        assert_eq!(LineRange::single(4).to_string(), "4");
        assert_eq!(LineRange::new(4, 7).to_string(), "4-7");
        assert_eq!(LineRange::new(9, 2), LineRange::single(9));
    }
}
