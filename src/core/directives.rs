//! Resolution of per-selector check overrides.
//!
//! Every setting is probed at three scopes, least specific first:
//! reporter-wide, bare selector, full selector. A match at a later scope
//! overrides earlier ones.

use chrono::Duration;
use tracing::debug;

use crate::domain::{Directive, DirectiveStore, Finding, LineRange, Selector, Severity, Target};

use super::duration::parse_duration;

/// Setting key for the minimum disappearance age
pub const MIN_AGE_KEY: &str = "min-age";

/// Setting key for labels whose values should not be checked
pub const IGNORE_LABEL_VALUE_KEY: &str = "ignore/label-value";

/// Default minimum age before a vanished series is reported
pub fn default_min_age() -> Duration {
    Duration::hours(2)
}

/// Resolves directives for one reporter
pub struct DirectiveResolver<'a> {
    store: &'a dyn DirectiveStore,
    reporter: &'a str,
    default_min_age: Duration,
}

impl<'a> DirectiveResolver<'a> {
    pub fn new(store: &'a dyn DirectiveStore, reporter: &'a str) -> Self {
        Self {
            store,
            reporter,
            default_min_age: default_min_age(),
        }
    }

    /// Replace the built-in two hour min-age fallback
    pub fn with_default_min_age(mut self, min_age: Duration) -> Self {
        self.default_min_age = min_age;
        self
    }

    /// Targets from least to most specific
    fn scopes(&self, selector: &Selector) -> [Target; 3] {
        [
            Target::reporter(self.reporter),
            Target::selector(self.reporter, &selector.bare()),
            Target::selector(self.reporter, selector),
        ]
    }

    /// True if the check is disabled for the selector or its bare form
    pub fn is_disabled(&self, selector: &Selector) -> bool {
        [
            Target::selector(self.reporter, selector),
            Target::selector(self.reporter, &selector.bare()),
        ]
        .into_iter()
        .any(|target| self.store.has(&Directive::Disable(target)))
    }

    /// Effective min-age for a selector.
    ///
    /// Unparsable values produce a Warning finding and leave the previous
    /// value in place.
    pub fn min_age(&self, selector: &Selector, lines: LineRange) -> (Duration, Vec<Finding>) {
        let mut min_age = self.default_min_age;
        let mut findings = Vec::new();

        for target in self.scopes(selector) {
            let Some(directive) = self.store.get(&target, MIN_AGE_KEY) else {
                continue;
            };
            let Directive::Set { value, .. } = directive else {
                continue;
            };
            match parse_duration(value) {
                Ok(d) => {
                    debug!(%target, min_age = value.as_str(), "Using min-age from directive");
                    min_age = d;
                }
                Err(e) => findings.push(Finding::new(
                    self.reporter,
                    directive.to_string(),
                    lines,
                    Severity::Warning,
                    format!("failed to parse rule directive as duration: {}", e),
                )),
            }
        }

        (min_age, findings)
    }

    /// True if value checks for `label` are switched off for this selector
    pub fn is_label_value_ignored(&self, selector: &Selector, label: &str) -> bool {
        self.scopes(selector).into_iter().any(|target| {
            self.store.has(&Directive::Set {
                target,
                key: IGNORE_LABEL_VALUE_KEY.to_string(),
                value: label.to_string(),
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Directives;

    const REPORTER: &str = "promql/series";

    fn store(lines: &[&str]) -> Directives {
        lines.iter().map(|l| l.parse().unwrap()).collect()
    }

    fn selector() -> Selector {
        Selector::parse(r#"foo{job="api"}"#).unwrap()
    }

    #[test]
    fn test_disable_by_selector_or_bare() {
        let s = store(&[r#"disable promql/series(foo{job="api"})"#]);
        assert!(DirectiveResolver::new(&s, REPORTER).is_disabled(&selector()));

        let s = store(&["disable promql/series(foo)"]);
        assert!(DirectiveResolver::new(&s, REPORTER).is_disabled(&selector()));

        let s = store(&["disable promql/series(bar)"]);
        assert!(!DirectiveResolver::new(&s, REPORTER).is_disabled(&selector()));
    }

    #[test]
    fn test_min_age_default() {
        let s = Directives::new();
        let (min_age, findings) =
            DirectiveResolver::new(&s, REPORTER).min_age(&selector(), LineRange::single(1));
        assert_eq!(min_age, Duration::hours(2));
        assert!(findings.is_empty());
    }

    #[test]
    fn test_min_age_precedence() {
        let lines = LineRange::single(1);

        let s = store(&["rule/set promql/series min-age 3h"]);
        let (min_age, _) = DirectiveResolver::new(&s, REPORTER).min_age(&selector(), lines);
        assert_eq!(min_age, Duration::hours(3));

        let s = store(&[
            "rule/set promql/series(foo) min-age 4h",
            "rule/set promql/series min-age 3h",
        ]);
        let (min_age, _) = DirectiveResolver::new(&s, REPORTER).min_age(&selector(), lines);
        assert_eq!(min_age, Duration::hours(4));

        let s = store(&[
            r#"rule/set promql/series(foo{job="api"}) min-age 5h"#,
            "rule/set promql/series(foo) min-age 4h",
            "rule/set promql/series min-age 3h",
        ]);
        let (min_age, _) = DirectiveResolver::new(&s, REPORTER).min_age(&selector(), lines);
        assert_eq!(min_age, Duration::hours(5));
    }

    #[test]
    fn test_min_age_parse_failure_keeps_previous() {
        let s = store(&[
            "rule/set promql/series min-age 3h",
            "rule/set promql/series(foo) min-age soon",
        ]);
        let (min_age, findings) =
            DirectiveResolver::new(&s, REPORTER).min_age(&selector(), LineRange::new(2, 5));

        assert_eq!(min_age, Duration::hours(3));
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].severity, Severity::Warning);
        assert_eq!(findings[0].fragment, "rule/set promql/series(foo) min-age soon");
        assert_eq!(findings[0].lines, LineRange::new(2, 5));
    }

    #[test]
    fn test_configured_default_min_age() {
        let s = Directives::new();
        let resolver =
            DirectiveResolver::new(&s, REPORTER).with_default_min_age(Duration::minutes(30));
        let (min_age, _) = resolver.min_age(&selector(), LineRange::single(1));
        assert_eq!(min_age, Duration::minutes(30));
    }

    #[test]
    fn test_ignore_label_value() {
        let s = store(&["rule/set promql/series(foo) ignore/label-value job"]);
        let resolver = DirectiveResolver::new(&s, REPORTER);
        assert!(resolver.is_label_value_ignored(&selector(), "job"));
        assert!(!resolver.is_label_value_ignored(&selector(), "instance"));
    }
}
