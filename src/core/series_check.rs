//! Selector presence check.
//!
//! Verifies that every selector used by a rule returns data, and when it
//! doesn't, looks back over the query history to explain why:
//!
//! 1. selector returns series right now → fine
//! 2. metric never had series in the lookback window → bug (unless a
//!    recording rule produces it)
//! 3. metric exists but never with a used label → bug
//! 4. metric was always there but vanished longer than min-age ago → bug
//! 5. no series ever matched one of the label filters → bug (warning for
//!    high churn labels)
//! 6. series matching a filter vanished longer than min-age ago → bug
//! 7. series matching a filter come and go → warning
//! 8. the metric itself comes and goes → warning
//!
//! Query failures become findings for the selector being evaluated and
//! never stop the rest of the rule from being checked.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Duration;
use tracing::{debug, instrument};

use crate::adapters::{PrometheusApi, QueryError};
use crate::domain::{
    DirectiveStore, Finding, MatchKind, Matcher, Rule, RuleEntry, Selector, Severity,
};

use super::churn::LabelChurn;
use super::directives::{default_min_age, DirectiveResolver};
use super::duration::humanize_duration;
use super::extract::extract_selectors;
use super::problem::{prom_text, text_and_severity};
use super::ranges::{PresenceIntervalSet, TimeRangeBuilder};
use super::RuleCheck;

/// Reporter name of the series check
pub const SERIES_CHECK_NAME: &str = "promql/series";

/// Metrics produced by the alerting engine rather than scraped
const ALERTS_METRICS: [&str; 2] = ["ALERTS", "ALERTS_FOR_STATE"];

/// Time window settings of the series check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SeriesSettings {
    /// How far back to look for historical series
    pub lookback: Duration,

    /// Range query resolution
    pub step: Duration,

    /// Min-age used when no directive overrides it
    pub min_age: Duration,
}

impl Default for SeriesSettings {
    fn default() -> Self {
        Self {
            lookback: Duration::days(7),
            step: Duration::minutes(5),
            min_age: default_min_age(),
        }
    }
}

/// Checks that selectors used in rules match existing series
pub struct SeriesCheck {
    prom: Arc<dyn PrometheusApi>,
    settings: SeriesSettings,
}

impl SeriesCheck {
    pub fn new(prom: Arc<dyn PrometheusApi>) -> Self {
        Self {
            prom,
            settings: SeriesSettings::default(),
        }
    }

    pub fn with_settings(mut self, settings: SeriesSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn settings(&self) -> &SeriesSettings {
        &self.settings
    }

    #[instrument(skip_all, fields(rule = rule.name(), prometheus = self.prom.name()))]
    async fn check_rule(
        &self,
        rule: &Rule,
        directives: &dyn DirectiveStore,
        entries: &[RuleEntry],
    ) -> Vec<Finding> {
        let selectors = match rule.expr.ast() {
            Ok(ast) => extract_selectors(&ast),
            Err(e) => {
                debug!(error = %e, "Skipping rule with invalid query");
                return Vec::new();
            }
        };

        let resolver = DirectiveResolver::new(directives, SERIES_CHECK_NAME)
            .with_default_min_age(self.settings.min_age);

        let mut findings = Vec::new();
        for selector in &selectors {
            if resolver.is_disabled(selector) {
                debug!(%selector, "Check disabled by directive");
                continue;
            }
            let evaluation = Evaluation::new(self, rule, &resolver, selector);
            findings.extend(evaluation.run(entries).await);
        }
        findings
    }
}

#[async_trait]
impl RuleCheck for SeriesCheck {
    fn reporter(&self) -> &'static str {
        SERIES_CHECK_NAME
    }

    fn describe(&self) -> String {
        format!("{}({})", SERIES_CHECK_NAME, self.prom.name())
    }

    async fn check(
        &self,
        rule: &Rule,
        directives: &dyn DirectiveStore,
        entries: &[RuleEntry],
    ) -> Vec<Finding> {
        self.check_rule(rule, directives, entries).await
    }
}

/// State of one selector's evaluation
struct Evaluation<'a> {
    check: &'a SeriesCheck,
    rule: &'a Rule,
    resolver: &'a DirectiveResolver<'a>,
    selector: &'a Selector,
    bare: Selector,

    /// Resolved on first use
    min_age: Option<Duration>,

    findings: Vec<Finding>,
}

impl<'a> Evaluation<'a> {
    fn new(
        check: &'a SeriesCheck,
        rule: &'a Rule,
        resolver: &'a DirectiveResolver<'a>,
        selector: &'a Selector,
    ) -> Self {
        Self {
            check,
            rule,
            resolver,
            selector,
            bare: selector.bare(),
            min_age: None,
            findings: Vec::new(),
        }
    }

    async fn run(mut self, entries: &[RuleEntry]) -> Vec<Finding> {
        self.evaluate(entries).await;
        self.findings
    }

    async fn evaluate(&mut self, entries: &[RuleEntry]) {
        let selector = self.selector;

        if selector
            .metric_name()
            .is_some_and(|name| ALERTS_METRICS.contains(&name))
        {
            self.check_alerts(entries);
            return;
        }

        debug!(%selector, "Checking if selector returns anything");
        let count = match self.instant_count(&format!("count({})", selector)).await {
            Ok(count) => count,
            Err(e) => return self.query_problem(&e, selector.to_string()),
        };
        if count > 0 {
            debug!(%selector, "Found series, skipping further checks");
            return;
        }

        let bare = self.bare.clone();
        debug!(selector = %bare, "Checking if base metric has historical series");
        let metric = match self.time_ranges(&format!("count({})", bare)).await {
            Ok(set) => set,
            Err(e) => return self.query_problem(&e, bare.to_string()),
        };
        if metric.is_empty() {
            self.report_missing_metric(&metric, entries);
            return;
        }

        let Some(high_churn) = self.check_labels().await else {
            return;
        };

        if metric.has_disappeared() {
            self.check_metric_disappeared(&metric);
            return;
        }

        let reported = self.check_matchers(&metric, &high_churn).await;

        if !reported && metric.len() > 1 {
            let text = format!(
                "metric {:?} is only sometimes present on {} with average life span of {} in the last {}",
                bare.to_string(),
                self.prom(&metric.uri),
                humanize_duration(metric.avg_life()),
                metric.since_desc(metric.from)
            );
            self.report(bare.to_string(), Severity::Warning, text);
            debug!(selector = %bare, "Metric only sometimes present");
        }
    }

    /// `ALERTS{alertname="..."}` must refer to an existing alerting rule
    fn check_alerts(&mut self, entries: &[RuleEntry]) {
        let selector = self.selector;
        let alertname = selector
            .matchers
            .iter()
            .filter(|m| m.name == "alertname" && m.kind == MatchKind::Equal)
            .map(|m| m.value.as_str())
            .last();
        let Some(alertname) = alertname else {
            debug!(%selector, "Alerts selector without alertname, nothing to check");
            return;
        };

        let entry = entries
            .iter()
            .find(|e| e.rule.is_valid() && e.rule.alert_name() == Some(alertname));
        match entry {
            Some(entry) => {
                debug!(%selector, path = %entry.path.display(), "Metric is provided by alerting rule");
                self.report(
                    selector.to_string(),
                    Severity::Information,
                    format!(
                        "{} metric is generated by alerts and found alerting rule named {:?}",
                        selector, alertname
                    ),
                );
            }
            None => self.report(
                selector.to_string(),
                Severity::Bug,
                format!(
                    "{} metric is generated by alerts but didn't find any rule named {:?}",
                    selector, alertname
                ),
            ),
        }
    }

    /// No history at all; fine only if a recording rule produces the metric
    fn report_missing_metric(&mut self, metric: &PresenceIntervalSet, entries: &[RuleEntry]) {
        let bare = self.bare.to_string();
        let prom = self.prom(&metric.uri);
        let since = metric.since_desc(metric.from);

        let recording = entries
            .iter()
            .find(|e| e.rule.is_valid() && e.rule.record_name() == Some(bare.as_str()));
        if let Some(entry) = recording {
            debug!(selector = %bare, path = %entry.path.display(), "Metric is provided by recording rule");
            let text = format!(
                "{} didn't have any series for {:?} metric in the last {} but found recording rule that generates it, skipping further checks",
                prom, bare, since
            );
            self.report(bare, Severity::Information, text);
            return;
        }

        let text = format!(
            "{} didn't have any series for {:?} metric in the last {}",
            prom, bare, since
        );
        debug!(selector = %bare, "No historical series for base metric");
        self.report(bare, Severity::Bug, text);
    }

    /// Check that every label used by the selector was ever present on the
    /// metric. Returns the high churn labels, or `None` if anything was
    /// reported and deeper checks should be skipped.
    async fn check_labels(&mut self) -> Option<Vec<String>> {
        let selector = self.selector;
        let reported_before = self.findings.len();
        let mut high_churn = Vec::new();

        for name in selector.label_names() {
            let with_label = self
                .bare
                .with_matcher(Matcher::new(MatchKind::Regex, name, ".+"));
            debug!(selector = %with_label, label = name, "Checking if base metric has historical series with required label");

            let set = match self
                .time_ranges(&format!("count({}) by ({})", with_label, name))
                .await
            {
                Ok(set) => set,
                Err(e) => {
                    self.query_problem(&e, selector.to_string());
                    continue;
                }
            };

            if set.with_label_name(name).is_empty() {
                let text = format!(
                    "{} has {:?} metric but there are no series with {:?} label in the last {}",
                    self.prom(&set.uri),
                    self.bare.to_string(),
                    name,
                    set.since_desc(set.from)
                );
                self.report(selector.to_string(), Severity::Bug, text);
                debug!(selector = %with_label, label = name, "No historical series with label used for the query");
            }

            let churn = LabelChurn::measure(&set, name);
            if churn.is_high() {
                debug!(
                    label = name,
                    values = churn.distinct_values,
                    avg_life = %humanize_duration(churn.avg_life),
                    "Label looks like a high churn label"
                );
                high_churn.push(name.to_string());
            }
        }

        if self.findings.len() > reported_before {
            None
        } else {
            Some(high_churn)
        }
    }

    fn check_metric_disappeared(&mut self, metric: &PresenceIntervalSet) {
        let min_age = self.min_age();
        let Some(newest) = metric.newest() else {
            return;
        };

        if metric.last_seen_within(min_age) {
            debug!(
                selector = %self.selector,
                min_age = %humanize_duration(min_age),
                last_seen = %metric.since_desc(newest),
                "Series disappeared but for less than configured min-age"
            );
            return;
        }

        let bare = self.bare.to_string();
        let text = format!(
            "{} doesn't currently have {:?}, it was last present {} ago",
            self.prom(&metric.uri),
            bare,
            metric.since_desc(newest)
        );
        debug!(selector = %bare, "Series disappeared");
        self.report(bare, Severity::Bug, text);
    }

    /// Per-matcher history checks. Returns true if anything was reported.
    async fn check_matchers(
        &mut self,
        metric: &PresenceIntervalSet,
        high_churn: &[String],
    ) -> bool {
        let selector = self.selector;
        let bare = self.bare.to_string();
        let mut reported = false;

        for matcher in &selector.matchers {
            if matcher.is_metric_name()
                || !matches!(matcher.kind, MatchKind::Equal | MatchKind::Regex)
            {
                continue;
            }
            if self.resolver.is_label_value_ignored(selector, &matcher.name) {
                debug!(%selector, label = %matcher.name, "Label check disabled by directive");
                continue;
            }

            let label_selector = Selector::new(selector.name.clone(), vec![matcher.clone()]);
            debug!(selector = %label_selector, %matcher, "Checking if there are historical series matching filter");

            let set = match self.time_ranges(&format!("count({})", label_selector)).await {
                Ok(set) => set,
                Err(e) => {
                    self.query_problem(&e, label_selector.to_string());
                    reported = true;
                    continue;
                }
            };

            if set.is_empty() {
                let mut text = format!(
                    "{} has {:?} metric with {:?} label but there are no series matching {{{}}} in the last {}",
                    self.prom(&set.uri),
                    bare,
                    matcher.name,
                    matcher,
                    set.since_desc(metric.from)
                );
                let mut severity = Severity::Bug;
                if high_churn.iter().any(|label| *label == matcher.name) {
                    severity = Severity::Warning;
                    text.push_str(&format!(", {:?} looks like a high churn label", matcher.name));
                }
                self.report(selector.to_string(), severity, text);
                debug!(%selector, %matcher, "No historical series matching filter used in the query");
                reported = true;
                continue;
            }

            if set.has_disappeared() {
                let min_age = self.min_age();
                let Some(newest) = set.newest() else {
                    continue;
                };
                if set.last_seen_within(min_age) {
                    debug!(
                        %selector,
                        %matcher,
                        min_age = %humanize_duration(min_age),
                        last_seen = %set.since_desc(newest),
                        "Series matching filter disappeared but for less than configured min-age"
                    );
                    continue;
                }

                let text = format!(
                    "{} has {:?} metric but doesn't currently have series matching {{{}}}, such series was last present {} ago",
                    self.prom(&metric.uri),
                    bare,
                    matcher,
                    set.since_desc(newest)
                );
                self.report(label_selector.to_string(), Severity::Bug, text);
                debug!(%selector, %matcher, "Series matching filter disappeared");
                reported = true;
                continue;
            }

            if set.len() > 1 {
                let text = format!(
                    "metric {:?} with label {{{}}} is only sometimes present on {} with average life span of {}",
                    bare,
                    matcher,
                    self.prom(&metric.uri),
                    humanize_duration(set.avg_life())
                );
                self.report(selector.to_string(), Severity::Warning, text);
                debug!(%selector, %matcher, "Series matching filter are only sometimes present");
                reported = true;
            }
        }

        reported
    }

    fn min_age(&mut self) -> Duration {
        if let Some(min_age) = self.min_age {
            return min_age;
        }
        let (min_age, findings) = self.resolver.min_age(self.selector, self.rule.lines);
        self.findings.extend(findings);
        self.min_age = Some(min_age);
        min_age
    }

    async fn instant_count(&self, query: &str) -> Result<i64, QueryError> {
        let result = self.check.prom.query(query).await?;
        Ok(result.series.iter().map(|s| s.value as i64).sum())
    }

    async fn time_ranges(&self, query: &str) -> Result<PresenceIntervalSet, QueryError> {
        let settings = &self.check.settings;
        let result = self
            .check
            .prom
            .range_query(query, settings.lookback, settings.step)
            .await?;
        Ok(TimeRangeBuilder::new(settings.step).build(&result))
    }

    fn prom(&self, uri: &str) -> String {
        prom_text(self.check.prom.name(), uri)
    }

    fn report(&mut self, fragment: String, severity: Severity, text: String) {
        self.findings.push(Finding::new(
            SERIES_CHECK_NAME,
            fragment,
            self.rule.expr.lines,
            severity,
            text,
        ));
    }

    fn query_problem(&mut self, err: &QueryError, fragment: String) {
        let (text, severity) = text_and_severity(
            err,
            SERIES_CHECK_NAME,
            self.check.prom.name(),
            Severity::Bug,
        );
        debug!(selector = %fragment, error = %err, "Query failed");
        self.report(fragment, severity, text);
    }
}
