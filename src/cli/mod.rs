//! Command-line interface for rulelint.
//!
//! Provides commands for checking rule files against live Prometheus
//! servers, listing the selectors rules depend on, and showing the
//! resolved configuration.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use tracing::{info, warn};

use crate::adapters::{FailoverGroup, PrometheusApi, PrometheusClient};
use crate::config::{self, ResolvedConfig, PROMETHEUS_URL_ENV};
use crate::core::{extract_selectors, humanize_duration, RuleCheck, SeriesCheck};
use crate::discovery::{expand_patterns, load_files};
use crate::domain::{DirectiveStore, Finding, Layered, RuleEntry, Severity};

/// rulelint - Check Prometheus rules against the series that actually exist
#[derive(Parser, Debug)]
#[command(name = "rulelint")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Check rule files against Prometheus
    Check {
        /// Config file (searched for in .rulelint/ if not provided)
        #[arg(short, long, env = "RULELINT_CONFIG")]
        config: Option<PathBuf>,

        /// Prometheus URL, replaces the server named "default"
        #[arg(short, long)]
        prometheus: Option<String>,

        /// Rule files or glob patterns
        #[arg(required = true)]
        files: Vec<String>,
    },

    /// List the selectors each rule queries
    Selectors {
        /// Rule files or glob patterns
        #[arg(required = true)]
        files: Vec<String>,
    },

    /// Show resolved configuration (debug)
    Config {
        /// Config file (searched for in .rulelint/ if not provided)
        #[arg(short, long, env = "RULELINT_CONFIG")]
        config: Option<PathBuf>,
    },
}

impl Cli {
    /// Execute the CLI command
    pub async fn execute(self) -> Result<()> {
        match self.command {
            Commands::Check {
                config,
                prometheus,
                files,
            } => run_check(config, prometheus, &files).await,
            Commands::Selectors { files } => list_selectors(&files),
            Commands::Config { config } => show_config(config),
        }
    }
}

/// A finding together with the file it was found in
#[derive(Debug, Clone)]
pub struct Report {
    pub path: PathBuf,
    pub finding: Finding,
}

impl std::fmt::Display for Report {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}:{} {} {}: {}",
            self.path.display(),
            self.finding.lines,
            self.finding.severity,
            self.finding.reporter,
            self.finding.text
        )
    }
}

/// Build one series check per configured server
pub fn build_checks(config: &ResolvedConfig) -> Result<Vec<Box<dyn RuleCheck>>> {
    let mut checks: Vec<Box<dyn RuleCheck>> = Vec::new();

    for server in &config.servers {
        let mut clients: Vec<Arc<dyn PrometheusApi>> = Vec::new();
        for uri in &server.uris {
            let client = PrometheusClient::new(server.name.as_str(), uri.as_str(), server.timeout)?;
            clients.push(Arc::new(client));
        }
        let group = FailoverGroup::new(server.name.as_str(), clients);
        checks.push(Box::new(
            SeriesCheck::new(Arc::new(group)).with_settings(config.series),
        ));
    }

    Ok(checks)
}

/// Run every check on every loaded rule.
///
/// Rule comments take precedence over config-wide directives.
pub async fn check_entries(
    checks: &[Box<dyn RuleCheck>],
    global: &dyn DirectiveStore,
    entries: &[RuleEntry],
) -> Vec<Report> {
    let mut reports = Vec::new();

    for entry in entries {
        let rule = &entry.rule;
        if let Some(error) = &rule.error {
            warn!(path = %entry.path.display(), rule = rule.name(), error = error.as_str(), "Skipping invalid rule");
            continue;
        }
        if let Some(error) = &rule.expr.syntax_error {
            warn!(path = %entry.path.display(), rule = rule.name(), error = error.as_str(), "Skipping rule with invalid query");
            continue;
        }

        let layers: Vec<&dyn DirectiveStore> = vec![&rule.directives, global];
        let directives = Layered::new(layers);
        for check in checks {
            for finding in check.check(rule, &directives, entries).await {
                reports.push(Report {
                    path: entry.path.clone(),
                    finding,
                });
            }
        }
    }

    reports
}

/// Number of findings per severity
pub fn summarize(reports: &[Report]) -> BTreeMap<Severity, usize> {
    let mut summary = BTreeMap::new();
    for report in reports {
        *summary.entry(report.finding.severity).or_insert(0) += 1;
    }
    summary
}

/// Check rule files against all configured servers
async fn run_check(
    config_path: Option<PathBuf>,
    prometheus: Option<String>,
    patterns: &[String],
) -> Result<()> {
    let mut cfg = config::load_config(config_path.as_deref())?;
    if let Some(url) = prometheus {
        cfg = cfg.with_prometheus_url(&url);
    }
    if cfg.servers.is_empty() {
        bail!(
            "No Prometheus servers configured. Use --prometheus <url>, set {} or add a config file",
            PROMETHEUS_URL_ENV
        );
    }

    let checks = build_checks(&cfg)?;
    let paths = expand_patterns(patterns)?;
    if paths.is_empty() {
        bail!("No rule files matched {:?}", patterns);
    }
    let entries = load_files(&paths)?;

    info!(
        files = paths.len(),
        rules = entries.len(),
        checks = ?checks.iter().map(|c| c.describe()).collect::<Vec<_>>(),
        "Checking rules"
    );

    let reports = check_entries(&checks, &cfg.directives, &entries).await;
    for report in &reports {
        println!("{}", report);
    }

    let summary = summarize(&reports);
    if summary.is_empty() {
        eprintln!("\n[{} rules checked, no problems found]", entries.len());
    } else {
        let counts: Vec<String> = summary
            .iter()
            .rev()
            .map(|(severity, count)| format!("{} {}", count, severity))
            .collect();
        eprintln!("\n[{} rules checked: {}]", entries.len(), counts.join(", "));
    }

    if summary.contains_key(&Severity::Bug) {
        std::process::exit(1);
    }

    Ok(())
}

/// Print the selectors each rule depends on
fn list_selectors(patterns: &[String]) -> Result<()> {
    let paths = expand_patterns(patterns)?;
    let entries = load_files(&paths)?;

    for entry in &entries {
        let rule = &entry.rule;
        println!("{}:{} {}", entry.path.display(), rule.lines, rule.name());
        match rule.expr.ast() {
            Ok(ast) => {
                for selector in extract_selectors(&ast) {
                    println!("  {}", selector);
                }
            }
            Err(e) => println!("  (invalid query: {})", e),
        }
    }

    Ok(())
}

/// Show resolved configuration
fn show_config(config_path: Option<PathBuf>) -> Result<()> {
    let cfg = config::load_config(config_path.as_deref())?;

    println!("rulelint configuration");
    println!();
    println!(
        "Config file: {}",
        cfg.config_file
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "(none - using defaults)".to_string())
    );
    println!();
    println!("Prometheus servers:");
    if cfg.servers.is_empty() {
        println!("  (none)");
    }
    for server in &cfg.servers {
        println!(
            "  {}: {} (timeout {}s)",
            server.name,
            server.uris.join(", "),
            server.timeout.as_secs()
        );
    }
    println!();
    println!("Series check:");
    println!("  Lookback: {}", humanize_duration(cfg.series.lookback));
    println!("  Step:     {}", humanize_duration(cfg.series.step));
    println!("  Min age:  {}", humanize_duration(cfg.series.min_age));
    println!();
    println!("Directives:");
    if cfg.directives.is_empty() {
        println!("  (none)");
    }
    for directive in cfg.directives.iter() {
        println!("  {}", directive);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{LineRange, Rule, RuleExpr};

    fn report(severity: Severity) -> Report {
        Report {
            path: PathBuf::from("rules/app.yaml"),
            finding: Finding::new(
                "promql/series",
                "foo",
                LineRange::new(4, 6),
                severity,
                "something is off",
            ),
        }
    }

    #[test]
    fn test_report_format() {
        assert_eq!(
            report(Severity::Bug).to_string(),
            "rules/app.yaml:4-6 bug promql/series: something is off"
        );
    }

    #[test]
    fn test_summary_counts() {
        let reports = vec![
            report(Severity::Bug),
            report(Severity::Warning),
            report(Severity::Bug),
        ];
        let summary = summarize(&reports);
        assert_eq!(summary.get(&Severity::Bug), Some(&2));
        assert_eq!(summary.get(&Severity::Warning), Some(&1));
        assert_eq!(summary.get(&Severity::Information), None);
    }

    #[tokio::test]
    async fn test_invalid_rules_are_skipped() {
        let checks: Vec<Box<dyn RuleCheck>> = Vec::new();
        let entries = vec![RuleEntry {
            path: PathBuf::from("rules.yaml"),
            rule: Rule::alerting(
                "Broken",
                RuleExpr::new("sum(", LineRange::single(2)),
                LineRange::new(1, 2),
            ),
        }];
        let global = crate::domain::Directives::new();
        assert!(check_entries(&checks, &global, &entries).await.is_empty());
    }

    #[test]
    fn test_cli_parses_check() {
        let cli = Cli::try_parse_from([
            "rulelint",
            "check",
            "--prometheus",
            "http://prom:9090",
            "rules/*.yaml",
        ])
        .unwrap();
        match cli.command {
            Commands::Check {
                prometheus, files, ..
            } => {
                assert_eq!(prometheus.as_deref(), Some("http://prom:9090"));
                assert_eq!(files, vec!["rules/*.yaml".to_string()]);
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }
}
