//! Discovery Integration Tests
//!
//! Tests for loading rule files from disk and checking them end to end.

mod common;

use std::path::Path;
use std::sync::Arc;

use tempfile::TempDir;

use common::{always, FakeProm};
use rulelint::cli::{check_entries, summarize};
use rulelint::core::{RuleCheck, SeriesCheck};
use rulelint::discovery::{expand_patterns, load_file, load_files};
use rulelint::domain::{Directives, LineRange, Severity};

const APP_RULES: &str = r#"groups:
  - name: app
    rules:
      - record: app:requests:rate5m
        expr: sum(rate(http_requests_total[5m])) by (job)

      - alert: AppDown
        # rulelint rule/set promql/series min-age 1h
        expr: |
          sum(app:requests:rate5m{job="app"}) == 0
        for: 10m
"#;

const ALERT_RULES: &str = r#"groups:
  - name: alerts
    rules:
      - alert: HighErrorRate
        expr: rate(http_requests_total{code="500"}[5m]) > 1
      - alert: Paging
        # rulelint disable promql/series(ALERTS)
        expr: ALERTS{alertname="AppDown"}
"#;

fn write(dir: &Path, name: &str, content: &str) {
    std::fs::write(dir.join(name), content).unwrap();
}

#[test]
fn test_expand_patterns() {
    let temp = TempDir::new().unwrap();
    write(temp.path(), "app.yaml", APP_RULES);
    write(temp.path(), "alerts.yaml", ALERT_RULES);
    write(temp.path(), "notes.txt", "not rules");

    let pattern = format!("{}/*.yaml", temp.path().display());
    let exact = temp.path().join("app.yaml").display().to_string();
    let paths = expand_patterns(&[pattern, exact]).unwrap();

    assert_eq!(
        paths,
        vec![temp.path().join("alerts.yaml"), temp.path().join("app.yaml")]
    );
}

#[test]
fn test_load_file() {
    let temp = TempDir::new().unwrap();
    write(temp.path(), "app.yaml", APP_RULES);

    let entries = load_file(&temp.path().join("app.yaml")).unwrap();
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0].path, temp.path().join("app.yaml"));
    assert_eq!(entries[0].rule.record_name(), Some("app:requests:rate5m"));
    assert_eq!(entries[1].rule.alert_name(), Some("AppDown"));
    assert_eq!(entries[1].rule.lines, LineRange::new(7, 11));
    assert_eq!(entries[1].rule.expr.lines, LineRange::new(9, 10));
    assert_eq!(entries[1].rule.directives.len(), 1);
}

#[test]
fn test_load_missing_file() {
    let temp = TempDir::new().unwrap();
    let err = load_file(&temp.path().join("missing.yaml")).unwrap_err();
    assert!(err.to_string().contains("Failed to read rule file"));
}

#[test]
fn test_load_invalid_yaml() {
    let temp = TempDir::new().unwrap();
    write(temp.path(), "bad.yaml", "groups:\n  - name: [\n");
    let err = load_file(&temp.path().join("bad.yaml")).unwrap_err();
    assert!(err.to_string().contains("Failed to parse rule file"));
}

#[tokio::test]
async fn test_check_loaded_rules() {
    let temp = TempDir::new().unwrap();
    write(temp.path(), "app.yaml", APP_RULES);
    write(temp.path(), "alerts.yaml", ALERT_RULES);
    let paths = expand_patterns(&[format!("{}/*.yaml", temp.path().display())]).unwrap();
    let entries = load_files(&paths).unwrap();
    assert_eq!(entries.len(), 4);

    let prom = Arc::new(
        FakeProm::new()
            .instant("count(http_requests_total)", 12.0)
            .range("count(http_requests_total)", vec![always(&[])])
            .range(
                r#"count(http_requests_total{code=~".+"}) by (code)"#,
                vec![always(&[("code", "200")])],
            ),
    );
    let checks: Vec<Box<dyn RuleCheck>> = vec![Box::new(SeriesCheck::new(prom.clone()))];
    let global = Directives::new();
    let reports = check_entries(&checks, &global, &entries).await;

    // alerts.yaml sorts first: HighErrorRate then Paging (disabled)
    assert_eq!(reports.len(), 2);
    assert_eq!(reports[0].path, temp.path().join("alerts.yaml"));
    assert_eq!(reports[0].finding.severity, Severity::Bug);
    assert_eq!(reports[0].finding.fragment, r#"http_requests_total{code="500"}"#);

    // AppDown reads a metric produced by a recording rule in another file
    assert_eq!(reports[1].path, temp.path().join("app.yaml"));
    assert_eq!(reports[1].finding.severity, Severity::Information);
    assert_eq!(reports[1].finding.lines, LineRange::new(9, 10));

    let summary = summarize(&reports);
    assert_eq!(summary.get(&Severity::Bug), Some(&1));
    assert_eq!(summary.get(&Severity::Information), Some(&1));
    assert_eq!(prom.call_count(r#"count(ALERTS{alertname="AppDown"})"#), 0);
}
