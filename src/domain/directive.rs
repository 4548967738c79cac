//! Per-rule directives that override check behavior.
//!
//! Directives come in two shapes:
//! - `disable <target>` turns a check off for a selector
//! - `rule/set <target> <key> <value>` tunes a check setting
//!
//! A target is a reporter name, optionally scoped to one selector:
//! `promql/series` or `promql/series(foo{job="api"})`.
//!
//! Directives can be written as rule-file comments (text form) or as
//! structured YAML in the config file. Both end up as [`Directive`] values
//! behind the [`DirectiveStore`] interface.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::selector::Selector;

/// Errors parsing a directive's text form
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DirectiveParseError {
    #[error("empty directive")]
    Empty,

    #[error("unknown directive {0:?}")]
    Unknown(String),

    #[error("missing target in {0:?}")]
    MissingTarget(String),

    #[error("unbalanced parentheses in {0:?}")]
    Unbalanced(String),

    #[error("missing setting key in {0:?}")]
    MissingKey(String),
}

/// What a directive applies to
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Target {
    pub reporter: String,

    /// Canonical selector text, `None` for reporter-wide directives
    pub selector: Option<String>,
}

impl Target {
    /// Target covering every selector of a reporter
    pub fn reporter(reporter: &str) -> Self {
        Self {
            reporter: reporter.to_string(),
            selector: None,
        }
    }

    /// Target scoped to one selector
    pub fn selector(reporter: &str, selector: &Selector) -> Self {
        Self {
            reporter: reporter.to_string(),
            selector: Some(selector.to_string()),
        }
    }

    /// Parse a target from the start of `text`, returning it and the unparsed rest
    fn parse_prefix(text: &str) -> Result<(Self, &str), DirectiveParseError> {
        let text = text.trim_start();
        let end = text
            .find(|c: char| c.is_whitespace() || c == '(')
            .unwrap_or(text.len());
        let reporter = &text[..end];
        if reporter.is_empty() {
            return Err(DirectiveParseError::MissingTarget(text.to_string()));
        }

        let rest = &text[end..];
        if !rest.starts_with('(') {
            return Ok((Self::reporter(reporter), rest));
        }

        let close = matching_paren(rest)
            .ok_or_else(|| DirectiveParseError::Unbalanced(text.to_string()))?;
        let inner = rest[1..close].trim();
        let selector = Selector::parse(inner)
            .map(|s| s.to_string())
            .unwrap_or_else(|| inner.to_string());

        Ok((
            Self {
                reporter: reporter.to_string(),
                selector: Some(selector),
            },
            &rest[close + 1..],
        ))
    }
}

/// Byte offset of the parenthesis closing the one at the start of `text`,
/// skipping over quoted strings.
fn matching_paren(text: &str) -> Option<usize> {
    let mut depth = 0usize;
    let mut quote: Option<char> = None;
    let mut escaped = false;

    for (i, c) in text.char_indices() {
        if let Some(q) = quote {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == q {
                quote = None;
            }
            continue;
        }
        match c {
            '"' | '\'' | '`' => quote = Some(c),
            '(' => depth += 1,
            ')' => {
                depth = depth.checked_sub(1)?;
                if depth == 0 {
                    return Some(i);
                }
            }
            _ => {}
        }
    }
    None
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.selector {
            Some(selector) => write!(f, "{}({})", self.reporter, selector),
            None => f.write_str(&self.reporter),
        }
    }
}

impl FromStr for Target {
    type Err = DirectiveParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (target, rest) = Self::parse_prefix(s)?;
        if !rest.trim().is_empty() {
            return Err(DirectiveParseError::Unknown(s.to_string()));
        }
        Ok(target)
    }
}

impl TryFrom<String> for Target {
    type Error = DirectiveParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Target> for String {
    fn from(target: Target) -> Self {
        target.to_string()
    }
}

/// A single directive
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Directive {
    /// Skip the check for the target
    Disable(Target),

    /// Override a check setting for the target
    Set {
        target: Target,
        key: String,
        #[serde(default)]
        value: String,
    },
}

impl Directive {
    pub fn target(&self) -> &Target {
        match self {
            Self::Disable(target) | Self::Set { target, .. } => target,
        }
    }
}

impl fmt::Display for Directive {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Disable(target) => write!(f, "disable {}", target),
            Self::Set { target, key, value } if value.is_empty() => {
                write!(f, "rule/set {} {}", target, key)
            }
            Self::Set { target, key, value } => write!(f, "rule/set {} {} {}", target, key, value),
        }
    }
}

impl FromStr for Directive {
    type Err = DirectiveParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let text = s.trim();
        if text.is_empty() {
            return Err(DirectiveParseError::Empty);
        }

        let (keyword, rest) = text.split_once(char::is_whitespace).unwrap_or((text, ""));
        match keyword {
            "disable" => Ok(Self::Disable(rest.parse()?)),
            "rule/set" => {
                let (target, rest) = Target::parse_prefix(rest)?;
                let mut words = rest.split_whitespace();
                let key = words
                    .next()
                    .ok_or_else(|| DirectiveParseError::MissingKey(text.to_string()))?;
                let value = words.collect::<Vec<_>>().join(" ");
                Ok(Self::Set {
                    target,
                    key: key.to_string(),
                    value,
                })
            }
            _ => Err(DirectiveParseError::Unknown(text.to_string())),
        }
    }
}

/// Lookup interface over a set of directives
pub trait DirectiveStore: Send + Sync {
    /// True if exactly this directive is present
    fn has(&self, directive: &Directive) -> bool;

    /// First `rule/set` directive for `target` and `key`
    fn get(&self, target: &Target, key: &str) -> Option<&Directive>;
}

/// Ordered list of directives.
///
/// In YAML each entry is a single-key map: `- disable: <target>` or
/// `- set: {target, key, value}`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Directives(
    #[serde(with = "serde_yaml::with::singleton_map_recursive")] Vec<Directive>,
);

impl Directives {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, directive: Directive) {
        self.0.push(directive);
    }

    pub fn iter(&self) -> impl Iterator<Item = &Directive> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<Directive> for Directives {
    fn from_iter<I: IntoIterator<Item = Directive>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl DirectiveStore for Directives {
    fn has(&self, directive: &Directive) -> bool {
        self.0.iter().any(|d| d == directive)
    }

    fn get(&self, target: &Target, key: &str) -> Option<&Directive> {
        self.0.iter().find(|d| match d {
            Directive::Set { target: t, key: k, .. } => t == target && k == key,
            Directive::Disable(_) => false,
        })
    }
}

/// Stack of stores probed in order; earlier layers win
pub struct Layered<'a> {
    layers: Vec<&'a dyn DirectiveStore>,
}

impl<'a> Layered<'a> {
    pub fn new(layers: Vec<&'a dyn DirectiveStore>) -> Self {
        Self { layers }
    }
}

impl DirectiveStore for Layered<'_> {
    fn has(&self, directive: &Directive) -> bool {
        self.layers.iter().any(|store| store.has(directive))
    }

    fn get(&self, target: &Target, key: &str) -> Option<&Directive> {
        self.layers.iter().find_map(|store| store.get(target, key))
    }
}
