//! Metric selectors and label matchers.
//!
//! A selector is a metric name plus a set of label matchers. Its canonical
//! string form sorts the matchers, so two selectors that only differ in
//! matcher order render identically and de-duplicate.

use std::fmt;

use promql_parser::label::{MatchOp, Matcher as PromMatcher};
use promql_parser::parser::{Expr, VectorSelector};
use serde::{Deserialize, Serialize};

/// Reserved label holding the metric name
pub const METRIC_NAME: &str = "__name__";

/// How a label matcher compares values
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchKind {
    Equal,
    NotEqual,
    Regex,
    NotRegex,
}

impl MatchKind {
    /// PromQL operator for this kind
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Equal => "=",
            Self::NotEqual => "!=",
            Self::Regex => "=~",
            Self::NotRegex => "!~",
        }
    }
}

/// A single label matcher
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Matcher {
    pub name: String,
    pub kind: MatchKind,
    pub value: String,
}

impl Matcher {
    pub fn new(kind: MatchKind, name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind,
            value: value.into(),
        }
    }

    /// True for matchers on the metric name label
    pub fn is_metric_name(&self) -> bool {
        self.name == METRIC_NAME
    }
}

impl fmt::Display for Matcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}{:?}", self.name, self.kind.as_str(), self.value)
    }
}

impl From<&PromMatcher> for Matcher {
    fn from(m: &PromMatcher) -> Self {
        let kind = match m.op {
            MatchOp::Equal => MatchKind::Equal,
            MatchOp::NotEqual => MatchKind::NotEqual,
            MatchOp::Re(_) => MatchKind::Regex,
            MatchOp::NotRe(_) => MatchKind::NotRegex,
        };
        Self::new(kind, m.name.clone(), m.value.clone())
    }
}

/// A metric selector without any offset or `@` modifier
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selector {
    /// Metric name, if the selector pins one with an equality match
    pub name: Option<String>,

    /// Label matchers, never including the `__name__` equality already held in `name`
    pub matchers: Vec<Matcher>,
}

impl Selector {
    pub fn new(name: Option<String>, matchers: Vec<Matcher>) -> Self {
        let name = name.filter(|n| !n.is_empty()).or_else(|| {
            matchers
                .iter()
                .find(|m| m.is_metric_name() && m.kind == MatchKind::Equal)
                .map(|m| m.value.clone())
        });

        let matchers = matchers
            .into_iter()
            .filter(|m| {
                !(m.is_metric_name()
                    && m.kind == MatchKind::Equal
                    && Some(m.value.as_str()) == name.as_deref())
            })
            .collect();

        Self { name, matchers }
    }

    /// Convert a parsed vector selector, expanding `or` matcher groups into
    /// one selector per alternative.
    pub fn from_vector_selector(vs: &VectorSelector) -> Vec<Self> {
        let base: Vec<Matcher> = vs.matchers.matchers.iter().map(Matcher::from).collect();

        if vs.matchers.or_matchers.is_empty() {
            return vec![Self::new(vs.name.clone(), base)];
        }

        vs.matchers
            .or_matchers
            .iter()
            .map(|group| {
                let mut matchers = base.clone();
                matchers.extend(group.iter().map(Matcher::from));
                Self::new(vs.name.clone(), matchers)
            })
            .collect()
    }

    /// Parse selector text such as `foo{job="api"}`
    pub fn parse(text: &str) -> Option<Self> {
        match promql_parser::parser::parse(text.trim()) {
            Ok(Expr::VectorSelector(vs)) => {
                let mut selectors = Self::from_vector_selector(&vs);
                if selectors.len() == 1 {
                    selectors.pop()
                } else {
                    None
                }
            }
            _ => None,
        }
    }

    pub fn metric_name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Selector reduced to its metric name constraint only
    pub fn bare(&self) -> Selector {
        Self {
            name: self.name.clone(),
            matchers: self
                .matchers
                .iter()
                .filter(|m| m.is_metric_name())
                .cloned()
                .collect(),
        }
    }

    /// Distinct non-name labels referenced by matchers, in first-seen order
    pub fn label_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = Vec::new();
        for m in self.matchers.iter().filter(|m| !m.is_metric_name()) {
            if !names.contains(&m.name.as_str()) {
                names.push(&m.name);
            }
        }
        names
    }

    /// Copy of this selector with one more matcher
    pub fn with_matcher(&self, matcher: Matcher) -> Selector {
        let mut matchers = self.matchers.clone();
        matchers.push(matcher);
        Self::new(self.name.clone(), matchers)
    }
}

impl fmt::Display for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = self.name.as_deref().unwrap_or_default();
        if self.matchers.is_empty() && !name.is_empty() {
            return f.write_str(name);
        }

        let mut parts: Vec<String> = self.matchers.iter().map(|m| m.to_string()).collect();
        parts.sort();
        write!(f, "{}{{{}}}", name, parts.join(","))
    }
}
