// SPDX-FileCopyrightText: 2025 RAprogramm <andrey.rozanov.vl@gmail.com>
// SPDX-License-Identifier: MIT

//! Rule generation: SLI recordings, metadata recordings and burn-rate alerts.
//!
//! For every SLO the generator emits three rule groups. The SLI group records
//! the indicator ratio at each catalogue window plus the full period; the
//! metadata group materialises the objective and budget constants; the alert
//! group holds the page and ticket multi-window multi-burn-rate expressions.
//! Output is deterministic: labels live in ordered maps and rules are emitted
//! in a fixed order, so repeated runs are byte-for-byte identical.

use std::collections::BTreeMap;

use serde::Serialize;
use tracing::debug;

use crate::{
    compile::{
        identity_matchers, render_window, CompiledSli, CompiledSource, SliCompiler,
        METRIC_SLI_ERROR, METRIC_SLI_EVENTS_OK,
    },
    error::{Error, SloFailure},
    model::{self, AlertMeta, Slo, SloGroup},
    plugin::SliPluginRegistry,
    windows::{promql_duration, AlertWindow, SloWindows, WindowsRepo},
};

/// Generation mode label value for the Prometheus CLI flow.
pub const MODE_CLI_GEN_PROM: &str = "cli-gen-prom";

/// Generation mode label value for the Kubernetes CLI flow.
pub const MODE_CLI_GEN_K8S: &str = "cli-gen-k8s";

/// A recording rule in the Prometheus `groups:` schema.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecordingRule {
    /// Recorded metric name.
    pub record: String,
    /// PromQL expression to evaluate.
    pub expr:   String,
    /// Labels attached to the recorded series.
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>
}

/// An alerting rule in the Prometheus `groups:` schema.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AlertingRule {
    /// Alert name.
    pub alert:       String,
    /// PromQL condition.
    pub expr:        String,
    /// Optional hold duration. The burn-rate conjunction already debounces,
    /// so the generator never sets it.
    #[serde(rename = "for", skip_serializing_if = "Option::is_none")]
    pub hold:        Option<String>,
    /// Labels attached to the alert.
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub labels:      BTreeMap<String, String>,
    /// Annotations attached to the alert.
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub annotations: BTreeMap<String, String>
}

/// A single rule of either kind.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Rule {
    /// Recording rule.
    Recording(RecordingRule),
    /// Alerting rule.
    Alerting(AlertingRule)
}

/// An ordered, named sequence of rules.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RuleGroup {
    /// Group name.
    pub name:  String,
    /// Rules in emission order.
    pub rules: Vec<Rule>
}

/// Provenance stamped onto the `sloth_slo_info` metadata rule.
#[derive(Debug, Clone)]
pub struct GeneratorInfo {
    /// Generation mode, one of the `MODE_*` constants.
    pub mode:    String,
    /// Source spec dialect version (for example `prometheus/v1`).
    pub spec:    String,
    /// Generator version string.
    pub version: String
}

impl GeneratorInfo {
    /// Creates provenance info for a mode and source dialect, stamping the
    /// crate version.
    pub fn new<M, S>(mode: M, spec: S) -> Self
    where
        M: Into<String>,
        S: Into<String>
    {
        Self {
            mode:    mode.into(),
            spec:    spec.into(),
            version: concat!("v", env!("CARGO_PKG_VERSION")).to_owned()
        }
    }
}

/// The three rule groups generated for one SLO.
#[derive(Debug, Clone, PartialEq)]
pub struct SloRules {
    /// Identity of the SLO the groups belong to.
    pub slo_id:          String,
    /// Per-window SLI recording rules.
    pub sli_recordings:  RuleGroup,
    /// Metadata recording rules.
    pub meta_recordings: RuleGroup,
    /// Page and ticket alert rules. Empty when both alerts are disabled.
    pub alerts:          RuleGroup
}

impl SloRules {
    /// Returns the non-empty rule groups in emission order.
    pub fn groups(&self) -> Vec<&RuleGroup> {
        [&self.sli_recordings, &self.meta_recordings, &self.alerts]
            .into_iter()
            .filter(|group| !group.rules.is_empty())
            .collect()
    }
}

/// Outcome of generating a whole group: the rules of every SLO that
/// succeeded plus the failures of every SLO that did not, both in input
/// order.
#[derive(Debug)]
pub struct GeneratedGroup {
    /// Successfully generated SLOs.
    pub slos:     Vec<SloRules>,
    /// Per-SLO failures.
    pub failures: Vec<SloFailure>
}

impl GeneratedGroup {
    /// Splits the outcome into the generated rules and an optional aggregate
    /// error covering every failed SLO.
    pub fn into_parts(self) -> (Vec<SloRules>, Option<Error>) {
        let error = if self.failures.is_empty() {
            None
        } else {
            Some(Error::group(self.failures))
        };
        (self.slos, error)
    }
}

/// Generates Prometheus rule groups from normalized SLOs.
#[derive(Debug, Default)]
pub struct RulesGenerator {
    windows: WindowsRepo
}

impl RulesGenerator {
    /// Creates a generator with the default burn-rate window tables.
    pub fn new() -> Self {
        Self::default()
    }

    /// Generates the three rule groups for a single compiled SLO.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Generation`](Error::Generation) when no burn-rate
    /// table exists for the SLO period and
    /// [`Error::Compile`](Error::Compile) when a window substitution fails.
    pub fn generate_slo(
        &self,
        slo: &Slo,
        compiled: &CompiledSli,
        info: &GeneratorInfo,
        extra_labels: &BTreeMap<String, String>
    ) -> Result<SloRules, Error> {
        let windows = self.windows.windows_for(&slo.id, slo.time_window)?;

        let rules = SloRules {
            slo_id:          slo.id.clone(),
            sli_recordings:  self.sli_recording_rules(slo, compiled, windows, extra_labels)?,
            meta_recordings: self.meta_recording_rules(slo, compiled, windows, info, extra_labels)?,
            alerts:          self.alert_rules(slo, compiled, windows)?
        };

        debug!("generated rules for SLO {}", slo.id);
        Ok(rules)
    }

    /// Generates rules for a whole group, continuing past per-SLO failures.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Validation`](Error::Validation) when the extra labels
    /// are malformed or reserved; per-SLO failures are collected in the
    /// returned [`GeneratedGroup`] instead of aborting the run.
    pub fn generate_group(
        &self,
        group: &SloGroup,
        registry: &SliPluginRegistry,
        info: &GeneratorInfo,
        extra_labels: &BTreeMap<String, String>
    ) -> Result<GeneratedGroup, Error> {
        model::validate_labels(extra_labels)?;

        let compiler = SliCompiler::new(registry);
        let mut slos = Vec::with_capacity(group.slos.len());
        let mut failures = Vec::new();

        for slo in &group.slos {
            let generated = compiler
                .compile(slo)
                .and_then(|compiled| self.generate_slo(slo, &compiled, info, extra_labels));
            match generated {
                Ok(rules) => slos.push(rules),
                Err(error) => failures.push(SloFailure {
                    slo_id: slo.id.clone(),
                    error:  Box::new(error)
                })
            }
        }

        Ok(GeneratedGroup {
            slos,
            failures
        })
    }

    fn sli_recording_rules(
        &self,
        slo: &Slo,
        compiled: &CompiledSli,
        windows: &SloWindows,
        extra_labels: &BTreeMap<String, String>
    ) -> Result<RuleGroup, Error> {
        let metric = match &compiled.source {
            CompiledSource::Events { .. } => METRIC_SLI_EVENTS_OK,
            CompiledSource::Raw { .. } => METRIC_SLI_ERROR
        };

        let mut rules = Vec::new();
        for window in windows.sli_windows() {
            let expr = if window == windows.period {
                full_window_expr(metric, slo, windows)
            } else {
                match &compiled.source {
                    CompiledSource::Events {
                        good_query,
                        total_query
                    } => format!(
                        "({}) / ({})",
                        render_window(&slo.id, good_query, window)?,
                        render_window(&slo.id, total_query, window)?
                    ),
                    CompiledSource::Raw {
                        error_ratio_query
                    } => render_window(&slo.id, error_ratio_query, window)?
                }
            };

            let mut labels = merged_labels(slo, extra_labels);
            labels.extend(identity_labels(slo));
            labels.insert("sloth_window".to_owned(), promql_duration(window));

            rules.push(Rule::Recording(RecordingRule {
                record: format!("{metric}{}", promql_duration(window)),
                expr,
                labels
            }));
        }

        Ok(RuleGroup {
            name:  format!("sloth-slo-sli-recordings-{}", slo.id),
            rules
        })
    }

    fn meta_recording_rules(
        &self,
        slo: &Slo,
        compiled: &CompiledSli,
        windows: &SloWindows,
        info: &GeneratorInfo,
        extra_labels: &BTreeMap<String, String>
    ) -> Result<RuleGroup, Error> {
        let objective_ratio = slo.objective / 100.0;
        let error_budget = 1.0 - objective_ratio;
        let days = slo.time_window.as_secs() / model::DAY.as_secs();
        let matchers = identity_matchers(slo);

        let current_ratio =
            render_window(&slo.id, &compiled.error_ratio_query, windows.page_quick.short_window)?;
        let period_ratio = render_window(&slo.id, &compiled.error_ratio_query, windows.period)?;

        let base_labels = {
            let mut labels = merged_labels(slo, extra_labels);
            labels.extend(identity_labels(slo));
            labels
        };

        let mut info_labels = base_labels.clone();
        info_labels.insert("sloth_mode".to_owned(), info.mode.clone());
        info_labels.insert("sloth_spec".to_owned(), info.spec.clone());
        info_labels.insert("sloth_version".to_owned(), info.version.clone());
        info_labels.insert("sloth_objective".to_owned(), slo.objective.to_string());

        // Fixed alphabetical emission order.
        let rules = vec![
            Rule::Recording(RecordingRule {
                record: "slo:current_burn_rate:ratio".to_owned(),
                expr:   format!("({current_ratio}) / {error_budget}"),
                labels: base_labels.clone()
            }),
            Rule::Recording(RecordingRule {
                record: "slo:error_budget:ratio".to_owned(),
                expr:   format!("vector({error_budget})"),
                labels: base_labels.clone()
            }),
            Rule::Recording(RecordingRule {
                record: "slo:objective:ratio".to_owned(),
                expr:   format!("vector({objective_ratio})"),
                labels: base_labels.clone()
            }),
            Rule::Recording(RecordingRule {
                record: "slo:period_burn_rate:ratio".to_owned(),
                expr:   format!("({period_ratio}) / {error_budget}"),
                labels: base_labels.clone()
            }),
            Rule::Recording(RecordingRule {
                record: "slo:period_error_budget_remaining:ratio".to_owned(),
                expr:   format!("1 - slo:period_burn_rate:ratio{{{matchers}}}"),
                labels: base_labels.clone()
            }),
            Rule::Recording(RecordingRule {
                record: "slo:time_period:days".to_owned(),
                expr:   format!("vector({days})"),
                labels: base_labels
            }),
            Rule::Recording(RecordingRule {
                record: "sloth_slo_info".to_owned(),
                expr:   "vector(1)".to_owned(),
                labels: info_labels
            }),
        ];

        Ok(RuleGroup {
            name: format!("sloth-slo-meta-recordings-{}", slo.id),
            rules
        })
    }

    fn alert_rules(
        &self,
        slo: &Slo,
        compiled: &CompiledSli,
        windows: &SloWindows
    ) -> Result<RuleGroup, Error> {
        let mut rules = Vec::new();

        if !slo.page_alert.disable {
            rules.push(Rule::Alerting(self.alert_rule(
                slo,
                compiled,
                windows,
                &windows.page_quick,
                &windows.page_slow,
                &slo.page_alert
            )?));
        }
        if !slo.ticket_alert.disable {
            rules.push(Rule::Alerting(self.alert_rule(
                slo,
                compiled,
                windows,
                &windows.ticket_quick,
                &windows.ticket_slow,
                &slo.ticket_alert
            )?));
        }

        Ok(RuleGroup {
            name: format!("sloth-slo-alerts-{}", slo.id),
            rules
        })
    }

    fn alert_rule(
        &self,
        slo: &Slo,
        compiled: &CompiledSli,
        windows: &SloWindows,
        quick: &AlertWindow,
        slow: &AlertWindow,
        meta: &AlertMeta
    ) -> Result<AlertingRule, Error> {
        let error_budget = 1.0 - slo.objective / 100.0;
        let quick_factor = windows.burn_rate_factor(quick);
        let slow_factor = windows.burn_rate_factor(slow);

        let quick_long = render_window(&slo.id, &compiled.error_ratio_query, quick.long_window)?;
        let quick_short = render_window(&slo.id, &compiled.error_ratio_query, quick.short_window)?;
        let slow_long = render_window(&slo.id, &compiled.error_ratio_query, slow.long_window)?;
        let slow_short = render_window(&slo.id, &compiled.error_ratio_query, slow.short_window)?;

        let expr = format!(
            "(({quick_long}) > ({quick_factor} * {error_budget}) and ({quick_short}) > \
             ({quick_factor} * {error_budget})) or (({slow_long}) > ({slow_factor} * \
             {error_budget}) and ({slow_short}) > ({slow_factor} * {error_budget}))"
        );

        let mut labels = BTreeMap::new();
        labels.insert("severity".to_owned(), quick.severity.as_str().to_owned());
        labels.extend(meta.labels.clone());

        Ok(AlertingRule {
            alert: meta.name.clone(),
            expr,
            hold: None,
            labels,
            annotations: meta.annotations.clone()
        })
    }
}

/// Weighted average of the shorter-window recorded metrics, with weights
/// equal to each short window's share of the full period (expressed in
/// seconds, so the denominator is the sum of the short window lengths).
fn full_window_expr(metric: &str, slo: &Slo, windows: &SloWindows) -> String {
    let matchers = identity_matchers(slo);
    let mut terms = Vec::new();
    let mut denominator: u64 = 0;

    for short in windows.short_windows() {
        let seconds = short.as_secs();
        denominator += seconds;
        terms.push(format!(
            "sum without (sloth_window) ({metric}{}{{{matchers}}} * {seconds})",
            promql_duration(short)
        ));
    }

    format!("({}) / {denominator}", terms.join(" + "))
}

fn merged_labels(
    slo: &Slo,
    extra_labels: &BTreeMap<String, String>
) -> BTreeMap<String, String> {
    let mut labels = extra_labels.clone();
    labels.extend(slo.labels.clone());
    labels
}

fn identity_labels(slo: &Slo) -> BTreeMap<String, String> {
    let mut labels = BTreeMap::new();
    labels.insert("sloth_id".to_owned(), slo.id.clone());
    labels.insert("sloth_service".to_owned(), slo.service.clone());
    labels.insert("sloth_slo".to_owned(), slo.name.clone());
    labels
}
