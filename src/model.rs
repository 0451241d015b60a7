//! Normalized SLO model shared by every spec dialect.
//!
//! Loaders parse their own YAML schemas and converge on the types in this
//! module. The model is immutable after normalization; rule generation only
//! reads it. Validation enforces the invariants every downstream stage relies
//! on: objective range, identifier shape, window shape, SLI exclusivity and
//! uniqueness of `(service, name)` pairs within a group.

use std::{
    collections::{BTreeMap, HashSet},
    sync::LazyLock,
    time::Duration,
};

use regex::Regex;

use crate::error::Error;

/// One day expressed as a [`Duration`].
pub const DAY: Duration = Duration::from_secs(24 * 60 * 60);

/// Time window sizes (in days) the generator provides burn-rate tables for.
pub const SUPPORTED_WINDOW_DAYS: [u64; 5] = [7, 14, 28, 30, 90];

/// Label names owned by the generator. User-supplied labels must not collide
/// with these.
pub const RESERVED_LABELS: [&str; 6] = [
    "sloth_id",
    "sloth_service",
    "sloth_slo",
    "sloth_window",
    "sloth_target",
    "sloth_objective",
];

/// Maximum length accepted for SLO and service names.
const MAX_NAME_LENGTH: usize = 63;

static NAME_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[a-z0-9]([-a-z0-9]*[a-z0-9])?$").expect("valid name regex")
});

static PROM_LABEL_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-zA-Z_][a-zA-Z0-9_]*$").expect("valid label regex"));

/// Service level indicator variants accepted by the generator.
///
/// Exactly one variant describes an SLO; the enum encoding makes the
/// exclusivity invariant structural. Query strings are templates carrying the
/// literal `{{.window}}` placeholder that the generator substitutes per
/// window.
#[derive(Debug, Clone, PartialEq)]
pub enum Sli {
    /// Good/total event queries recorded as a success ratio per window.
    Events(SliEvents),
    /// A single query yielding the error ratio directly.
    Raw(SliRaw),
    /// A reference to a registered SLI plugin that produces the queries.
    Plugin(SliPluginRef)
}

/// Good and total event query templates for an events-based SLI.
#[derive(Debug, Clone, PartialEq)]
pub struct SliEvents {
    /// Query counting good events, `{{.window}}` parameterised.
    pub good_query:  String,
    /// Query counting all events, `{{.window}}` parameterised.
    pub total_query: String
}

/// Raw error-ratio query template for a raw SLI.
#[derive(Debug, Clone, PartialEq)]
pub struct SliRaw {
    /// Query yielding the error ratio in `(0, 1)`, `{{.window}}`
    /// parameterised.
    pub error_ratio_query: String
}

/// Reference to a registered SLI plugin plus its invocation options.
#[derive(Debug, Clone, PartialEq)]
pub struct SliPluginRef {
    /// Registered plugin id.
    pub id:      String,
    /// Options forwarded to the plugin producer.
    pub options: BTreeMap<String, String>
}

/// Page or ticket alert metadata attached to an SLO.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct AlertMeta {
    /// Disables emission of this alert rule.
    pub disable:     bool,
    /// Alert rule name. Required unless the alert is disabled.
    pub name:        String,
    /// Labels attached to the emitted alert rule.
    pub labels:      BTreeMap<String, String>,
    /// Annotations attached to the emitted alert rule.
    pub annotations: BTreeMap<String, String>
}

impl AlertMeta {
    /// Returns disabled alert metadata, the default for dialects that do not
    /// express alerting.
    pub fn disabled() -> Self {
        Self {
            disable: true,
            ..Self::default()
        }
    }
}

/// A normalized service level objective ready for rule generation.
#[derive(Debug, Clone, PartialEq)]
pub struct Slo {
    /// Unique identity, `service + "-" + name` as derived by the loaders.
    pub id:          String,
    /// SLO name within the service.
    pub name:        String,
    /// Service the SLO belongs to.
    pub service:     String,
    /// Free-text description.
    pub description: String,
    /// Full SLO period. Must be a whole number of supported days.
    pub time_window: Duration,
    /// Objective as a percentage in the open interval `(0, 100)`.
    pub objective:   f64,
    /// User labels merged into every generated rule.
    pub labels:      BTreeMap<String, String>,
    /// The service level indicator.
    pub sli:         Sli,
    /// Page alert metadata.
    pub page_alert:  AlertMeta,
    /// Ticket alert metadata.
    pub ticket_alert: AlertMeta
}

/// An ordered collection of SLOs sharing a declared service.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SloGroup {
    /// SLOs in input order.
    pub slos: Vec<Slo>
}

impl Slo {
    /// Validates the SLO against the model invariants.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Validation`](Error::Validation) when the name or
    /// service shape is wrong, the objective falls outside `(0, 100)`, the
    /// time window is not a supported whole number of days, a user label is
    /// malformed or reserved, an enabled alert has no name, or a query fails
    /// the syntactic sanity check.
    pub fn validate(&self) -> Result<(), Error> {
        validate_name(&self.name, "name")?;
        validate_name(&self.service, "service")?;

        if self.id != format!("{}-{}", self.service, self.name)
            && !self.id.starts_with(&format!("{}-{}-", self.service, self.name))
        {
            return Err(Error::validation(format!(
                "SLO id {:?} is not derived from service and name",
                self.id
            )));
        }

        if self.objective <= 0.0 || self.objective >= 100.0 {
            return Err(Error::validation(format!(
                "SLO {:?}: objective must be in the open interval (0, 100), got {}",
                self.id, self.objective
            )));
        }

        validate_time_window(&self.id, self.time_window)?;
        validate_labels(&self.labels)?;
        self.validate_alert_meta(&self.page_alert, "page")?;
        self.validate_alert_meta(&self.ticket_alert, "ticket")?;
        self.validate_sli()
    }

    fn validate_alert_meta(&self, meta: &AlertMeta, kind: &str) -> Result<(), Error> {
        if !meta.disable && meta.name.trim().is_empty() {
            return Err(Error::validation(format!(
                "SLO {:?}: {kind} alert requires a name unless disabled",
                self.id
            )));
        }
        validate_labels(&meta.labels)
    }

    fn validate_sli(&self) -> Result<(), Error> {
        match &self.sli {
            Sli::Events(events) => {
                check_query_syntax(&self.id, &events.good_query)?;
                check_query_syntax(&self.id, &events.total_query)
            }
            Sli::Raw(raw) => check_query_syntax(&self.id, &raw.error_ratio_query),
            Sli::Plugin(plugin) => {
                if plugin.id.trim().is_empty() {
                    return Err(Error::validation(format!(
                        "SLO {:?}: SLI plugin reference requires an id",
                        self.id
                    )));
                }
                Ok(())
            }
        }
    }
}

/// Validates a whole group: every SLO plus uniqueness of `(service, name)`.
///
/// # Errors
///
/// Returns [`Error::Validation`](Error::Validation) when the group is empty,
/// any SLO fails validation, or two SLOs share the same `(service, name)`
/// pair.
pub fn validate_group(group: &SloGroup) -> Result<(), Error> {
    if group.slos.is_empty() {
        return Err(Error::validation("at least one SLO is required"));
    }

    let mut seen = HashSet::with_capacity(group.slos.len());
    for slo in &group.slos {
        slo.validate()?;
        if !seen.insert((slo.service.clone(), slo.name.clone())) {
            return Err(Error::validation(format!(
                "duplicate SLO {:?} in service {:?}",
                slo.name, slo.service
            )));
        }
    }

    Ok(())
}

/// Validates label names for Prometheus shape and reserved-name collisions.
///
/// # Errors
///
/// Returns [`Error::Validation`](Error::Validation) when a label name does
/// not match `[a-zA-Z_][a-zA-Z0-9_]*` or collides with the generator-owned
/// `sloth_*` namespace.
pub fn validate_labels(labels: &BTreeMap<String, String>) -> Result<(), Error> {
    for name in labels.keys() {
        if !PROM_LABEL_REGEX.is_match(name) {
            return Err(Error::validation(format!("invalid label name {name:?}")));
        }
        if RESERVED_LABELS.contains(&name.as_str()) {
            return Err(Error::validation(format!(
                "label {name:?} is reserved for the generator"
            )));
        }
    }

    Ok(())
}

fn validate_name(value: &str, field: &str) -> Result<(), Error> {
    if value.is_empty() {
        return Err(Error::validation(format!("{field} is required")));
    }
    if value.len() > MAX_NAME_LENGTH {
        return Err(Error::validation(format!(
            "{field} {value:?} exceeds {MAX_NAME_LENGTH} characters"
        )));
    }
    if !NAME_REGEX.is_match(value) {
        return Err(Error::validation(format!(
            "{field} {value:?} must match [a-z0-9]([-a-z0-9]*[a-z0-9])?"
        )));
    }

    Ok(())
}

fn validate_time_window(slo_id: &str, window: Duration) -> Result<(), Error> {
    let seconds = window.as_secs();
    if seconds == 0 || window.subsec_nanos() != 0 || seconds % DAY.as_secs() != 0 {
        return Err(Error::validation(format!(
            "SLO {slo_id:?}: time window must be a positive whole number of days"
        )));
    }

    let days = seconds / DAY.as_secs();
    if !SUPPORTED_WINDOW_DAYS.contains(&days) {
        return Err(Error::validation(format!(
            "SLO {slo_id:?}: {days}d time window is not supported (supported: 7, 14, 28, 30, 90)"
        )));
    }

    Ok(())
}

/// Cheap syntactic sanity check over a PromQL expression.
///
/// Verifies that parentheses, braces and brackets balance outside of string
/// literals. This is deliberately not a PromQL parse; malformed expressions
/// that balance correctly surface when Prometheus loads the rules.
fn check_query_syntax(slo_id: &str, query: &str) -> Result<(), Error> {
    if query.trim().is_empty() {
        return Err(Error::validation(format!("SLO {slo_id:?}: query is required")));
    }

    let mut stack = Vec::new();
    let mut literal: Option<char> = None;
    let mut escaped = false;

    for ch in query.chars() {
        if let Some(quote) = literal {
            if escaped {
                escaped = false;
            } else if ch == '\\' {
                escaped = true;
            } else if ch == quote {
                literal = None;
            }
            continue;
        }

        match ch {
            '"' | '\'' => literal = Some(ch),
            '(' | '{' | '[' => stack.push(ch),
            ')' | '}' | ']' => {
                let expected = match ch {
                    ')' => '(',
                    '}' => '{',
                    _ => '['
                };
                if stack.pop() != Some(expected) {
                    return Err(Error::validation(format!(
                        "SLO {slo_id:?}: unbalanced {ch:?} in query"
                    )));
                }
            }
            _ => {}
        }
    }

    if literal.is_some() {
        return Err(Error::validation(format!(
            "SLO {slo_id:?}: unterminated string literal in query"
        )));
    }
    if !stack.is_empty() {
        return Err(Error::validation(format!(
            "SLO {slo_id:?}: unbalanced {:?} in query",
            stack[stack.len() - 1]
        )));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use proptest::prelude::*;

    use super::{
        validate_group, validate_labels, AlertMeta, Sli, SliEvents, SliPluginRef, SliRaw, Slo,
        SloGroup, DAY,
    };
    use crate::error::{Error, ErrorKind};

    fn raw_slo(name: &str) -> Slo {
        Slo {
            id:           format!("svc-{name}"),
            name:         name.to_owned(),
            service:      "svc".to_owned(),
            description:  String::new(),
            time_window:  30 * DAY,
            objective:    99.9,
            labels:       BTreeMap::new(),
            sli:          Sli::Raw(SliRaw {
                error_ratio_query: "sum(rate(errors[{{.window}}])) / sum(rate(total[{{.window}}]))"
                    .to_owned()
            }),
            page_alert:   AlertMeta::disabled(),
            ticket_alert: AlertMeta::disabled()
        }
    }

    #[test]
    fn accepts_valid_raw_slo() {
        raw_slo("latency").validate().expect("expected SLO to validate");
    }

    #[test]
    fn accepts_objective_close_to_hundred() {
        let mut slo = raw_slo("availability");
        slo.objective = 99.9999;
        slo.validate().expect("expected high objective to validate");
    }

    #[test]
    fn rejects_objective_at_bounds() {
        for objective in [0.0, 100.0, -1.0, 120.0] {
            let mut slo = raw_slo("availability");
            slo.objective = objective;
            let error = slo.validate().expect_err("expected objective rejection");
            assert_eq!(error.kind(), ErrorKind::Validation);
        }
    }

    #[test]
    fn rejects_unsupported_window() {
        let mut slo = raw_slo("availability");
        slo.time_window = 31 * DAY;
        assert!(slo.validate().is_err());
    }

    #[test]
    fn rejects_window_off_by_one_second() {
        let mut slo = raw_slo("availability");
        slo.time_window = 30 * DAY + std::time::Duration::from_secs(1);
        assert!(slo.validate().is_err());

        slo.time_window = 30 * DAY - std::time::Duration::from_secs(1);
        assert!(slo.validate().is_err());
    }

    #[test]
    fn accepts_every_supported_window() {
        for days in super::SUPPORTED_WINDOW_DAYS {
            let mut slo = raw_slo("availability");
            slo.time_window = days as u32 * DAY;
            slo.validate().expect("expected supported window to validate");
        }
    }

    #[test]
    fn rejects_uppercase_name() {
        let mut slo = raw_slo("availability");
        slo.name = "Availability".to_owned();
        assert!(slo.validate().is_err());
    }

    #[test]
    fn rejects_name_with_leading_hyphen() {
        let mut slo = raw_slo("availability");
        slo.name = "-availability".to_owned();
        assert!(slo.validate().is_err());
    }

    #[test]
    fn rejects_name_longer_than_limit() {
        let mut slo = raw_slo("availability");
        slo.name = "a".repeat(64);
        assert!(slo.validate().is_err());
    }

    #[test]
    fn rejects_reserved_user_label() {
        let mut slo = raw_slo("availability");
        slo.labels.insert("sloth_slo".to_owned(), "boom".to_owned());
        let error = slo.validate().expect_err("expected reserved label rejection");
        assert!(error.to_string().contains("sloth_slo"));
    }

    #[test]
    fn rejects_malformed_label_name() {
        let mut labels = BTreeMap::new();
        labels.insert("bad-label".to_owned(), "value".to_owned());
        assert!(validate_labels(&labels).is_err());
    }

    #[test]
    fn rejects_enabled_alert_without_name() {
        let mut slo = raw_slo("availability");
        slo.page_alert = AlertMeta::default();
        let error = slo.validate().expect_err("expected alert name requirement");
        assert!(error.to_string().contains("page alert"));
    }

    #[test]
    fn rejects_unbalanced_query() {
        let mut slo = raw_slo("availability");
        slo.sli = Sli::Raw(SliRaw {
            error_ratio_query: "sum(rate(errors[{{.window}}])".to_owned()
        });
        assert!(slo.validate().is_err());
    }

    #[test]
    fn allows_braces_inside_string_literals() {
        let mut slo = raw_slo("availability");
        slo.sli = Sli::Raw(SliRaw {
            error_ratio_query: r#"sum(rate(errors{code=~"(5..|429)"}[{{.window}}]))"#.to_owned()
        });
        slo.validate().expect("expected literal-aware balance check to pass");
    }

    #[test]
    fn rejects_plugin_reference_without_id() {
        let mut slo = raw_slo("availability");
        slo.sli = Sli::Plugin(SliPluginRef {
            id:      "  ".to_owned(),
            options: BTreeMap::new()
        });
        assert!(slo.validate().is_err());
    }

    #[test]
    fn events_queries_are_both_checked() {
        let mut slo = raw_slo("availability");
        slo.sli = Sli::Events(SliEvents {
            good_query:  "sum(rate(good[{{.window}}]))".to_owned(),
            total_query: "sum(rate(total[{{.window}}]".to_owned()
        });
        assert!(slo.validate().is_err());
    }

    #[test]
    fn group_rejects_duplicate_identity() {
        let group = SloGroup {
            slos: vec![raw_slo("availability"), raw_slo("availability")]
        };

        let error = validate_group(&group).expect_err("expected duplicate rejection");
        match error {
            Error::Validation {
                message
            } => {
                assert!(message.contains("duplicate SLO"));
            }
            other => panic!("expected validation error, got {other:?}")
        }
    }

    #[test]
    fn group_accepts_distinct_names() {
        let group = SloGroup {
            slos: vec![raw_slo("availability"), raw_slo("latency")]
        };
        validate_group(&group).expect("expected group to validate");
    }

    #[test]
    fn group_rejects_empty() {
        assert!(validate_group(&SloGroup::default()).is_err());
    }

    proptest! {
        #[test]
        fn valid_name_shapes_always_validate(name in "[a-z0-9]([-a-z0-9]{0,40}[a-z0-9])?") {
            let mut slo = raw_slo("availability");
            slo.name = name.clone();
            slo.id = format!("svc-{name}");
            prop_assert!(slo.validate().is_ok());
        }

        #[test]
        fn objective_inside_open_interval_validates(objective in 0.0001f64..99.9999) {
            let mut slo = raw_slo("availability");
            slo.objective = objective;
            prop_assert!(slo.validate().is_ok());
        }
    }
}
