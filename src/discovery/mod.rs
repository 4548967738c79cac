//! Rule file discovery.
//!
//! Loads Prometheus rule files (`groups[].rules[]`) and turns every rule
//! into a [`RuleEntry`] with source line ranges and inline directives.
//!
//! Directives are YAML comments inside a rule block, or directly above it:
//!
//! ```yaml
//! # rulelint rule/set promql/series min-age 6h
//! - alert: TargetDown
//!   # rulelint disable promql/series(up{job="batch"})
//!   expr: up{job="batch"} == 0
//! ```

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;
use tracing::{debug, warn};

use crate::domain::{Directive, Directives, LineRange, Rule, RuleEntry, RuleExpr};

/// Comment prefix marking a directive
pub const DIRECTIVE_PREFIX: &str = "rulelint ";

/// Rule file schema
#[derive(Debug, Deserialize)]
struct RuleFileDoc {
    #[serde(default)]
    groups: Vec<GroupDoc>,
}

#[derive(Debug, Deserialize)]
struct GroupDoc {
    #[serde(default)]
    rules: Vec<RuleDoc>,
}

#[derive(Debug, Deserialize)]
struct RuleDoc {
    alert: Option<String>,
    record: Option<String>,
    expr: Option<String>,
}

/// Where a rule sits in its file, 0-based line indexes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Block {
    /// First line of the comment run directly above the rule, or `first`
    head: usize,
    first: usize,
    last: usize,
}

impl Block {
    fn lines(&self) -> LineRange {
        LineRange::new(self.first + 1, self.last + 1)
    }
}

/// Expand glob patterns into a sorted, de-duplicated list of files
pub fn expand_patterns(patterns: &[String]) -> Result<Vec<PathBuf>> {
    let mut paths = Vec::new();
    for pattern in patterns {
        let matches =
            glob::glob(pattern).with_context(|| format!("Invalid file pattern: {}", pattern))?;
        let before = paths.len();
        for entry in matches {
            let path = entry.with_context(|| format!("Failed to read match for {}", pattern))?;
            if path.is_file() {
                paths.push(path);
            }
        }
        if paths.len() == before {
            warn!(pattern = pattern.as_str(), "Pattern matched no files");
        }
    }
    paths.sort();
    paths.dedup();
    Ok(paths)
}

/// Load every rule from a list of files
pub fn load_files(paths: &[PathBuf]) -> Result<Vec<RuleEntry>> {
    let mut entries = Vec::new();
    for path in paths {
        entries.extend(load_file(path)?);
    }
    Ok(entries)
}

/// Load every rule from a single file
pub fn load_file(path: &Path) -> Result<Vec<RuleEntry>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read rule file: {}", path.display()))?;
    let rules = parse_rules(&content)
        .with_context(|| format!("Failed to parse rule file: {}", path.display()))?;
    debug!(path = %path.display(), rules = rules.len(), "Loaded rule file");

    Ok(rules
        .into_iter()
        .map(|rule| RuleEntry {
            path: path.to_path_buf(),
            rule,
        })
        .collect())
}

/// Parse rule file content
pub fn parse_rules(content: &str) -> Result<Vec<Rule>> {
    let doc: RuleFileDoc = serde_yaml::from_str(content).context("Invalid rule file YAML")?;
    let lines: Vec<&str> = content.lines().collect();
    let blocks = rule_blocks(&lines);

    let docs: Vec<RuleDoc> = doc.groups.into_iter().flat_map(|g| g.rules).collect();
    if blocks.len() != docs.len() {
        warn!(
            rules = docs.len(),
            blocks = blocks.len(),
            "Could not locate every rule in the file, line numbers will be approximate"
        );
    }

    let whole_file = Block {
        head: 0,
        first: 0,
        last: lines.len().saturating_sub(1),
    };
    Ok(docs
        .into_iter()
        .enumerate()
        .map(|(idx, doc)| {
            let block = blocks.get(idx).copied().unwrap_or(whole_file);
            build_rule(doc, &lines, block)
        })
        .collect())
}

fn build_rule(doc: RuleDoc, lines: &[&str], block: Block) -> Rule {
    let expr_lines = expr_lines(lines, block).unwrap_or_else(|| block.lines());
    let expr = RuleExpr::new(doc.expr.clone().unwrap_or_default(), expr_lines);

    let rule = match (doc.alert, doc.record) {
        (Some(alert), None) => Rule::alerting(alert, expr, block.lines()),
        (None, Some(record)) => Rule::recording(record, expr, block.lines()),
        (Some(alert), Some(_)) => Rule::alerting(alert, expr, block.lines())
            .with_error("rule can't set both alert and record"),
        (None, None) => Rule::recording("", expr, block.lines())
            .with_error("rule must set either alert or record"),
    };
    let rule = if doc.expr.is_none() {
        rule.with_error("missing expr")
    } else {
        rule
    };

    rule.with_directives(directives(lines, block))
}

/// Column of the first non-whitespace character
fn indent(line: &str) -> usize {
    line.len() - line.trim_start().len()
}

/// A list item opening a rule, e.g. `- alert: Foo`
fn is_rule_start(line: &str) -> bool {
    let Some(item) = line.trim_start().strip_prefix("- ") else {
        return false;
    };
    let item = item.trim_start();
    ["alert:", "record:", "expr:"]
        .iter()
        .any(|key| item.starts_with(key))
}

/// Locate each rule block in document order.
///
/// A block runs from its list item line through the last non-blank line
/// indented deeper than the item's dash, stopping at the next rule.
fn rule_blocks(lines: &[&str]) -> Vec<Block> {
    let starts: Vec<usize> = lines
        .iter()
        .enumerate()
        .filter(|(_, line)| is_rule_start(line))
        .map(|(idx, _)| idx)
        .collect();

    starts
        .iter()
        .enumerate()
        .map(|(n, &first)| {
            let limit = starts.get(n + 1).copied().unwrap_or(lines.len());
            Block {
                head: leading_comments(lines, first),
                first,
                last: deeper_until(lines, first, indent(lines[first]), limit),
            }
        })
        .collect()
}

/// Start of the unbroken run of comments directly above `first` that are
/// not indented deeper than it
fn leading_comments(lines: &[&str], first: usize) -> usize {
    let column = indent(lines[first]);
    let mut head = first;
    while head > 0 {
        let line = lines[head - 1];
        if !line.trim_start().starts_with('#') || indent(line) > column {
            break;
        }
        head -= 1;
    }
    head
}

/// Last non-blank line after `from` indented deeper than `column`, before `limit`
fn deeper_until(lines: &[&str], from: usize, column: usize, limit: usize) -> usize {
    let mut last = from;
    for (idx, line) in lines.iter().enumerate().take(limit).skip(from + 1) {
        if line.trim().is_empty() {
            continue;
        }
        if indent(line) <= column {
            break;
        }
        last = idx;
    }
    last
}

/// Lines of the `expr` key, including block scalar continuation lines
fn expr_lines(lines: &[&str], block: Block) -> Option<LineRange> {
    (block.first..=block.last).find_map(|idx| {
        let line = lines[idx];
        let trimmed = line.trim_start();
        let key = trimmed.strip_prefix("- ").unwrap_or(trimmed);
        if !key.starts_with("expr:") {
            return None;
        }
        let column = line.len() - key.len();
        let last = deeper_until(lines, idx, column, block.last + 1);
        Some(LineRange::new(idx + 1, last + 1))
    })
}

/// Directive comments inside a rule block or directly above it
fn directives(lines: &[&str], block: Block) -> Directives {
    let mut directives = Directives::new();
    for (idx, line) in lines
        .iter()
        .enumerate()
        .take(block.last + 1)
        .skip(block.head)
    {
        let Some(comment) = line.trim_start().strip_prefix('#') else {
            continue;
        };
        let Some(text) = comment.trim_start().strip_prefix(DIRECTIVE_PREFIX) else {
            continue;
        };
        match text.parse::<Directive>() {
            Ok(directive) => directives.push(directive),
            Err(e) => warn!(line = idx + 1, error = %e, "Skipping malformed directive comment"),
        }
    }
    directives
}
