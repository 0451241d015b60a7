//! Native `prometheus/v1` spec dialect: document types, loader and encoder.
//!
//! The native dialect declares a service, default labels and a list of SLOs
//! whose SLI is inline events, inline raw or a plugin reference. The loader
//! normalizes documents into the shared model; the encoder renders a
//! normalized group back into the dialect so native documents round-trip.

use std::{collections::BTreeMap, sync::LazyLock, time::Duration};

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::{
    error::Error,
    model::{AlertMeta, Sli, SliEvents, SliPluginRef, SliRaw, Slo, SloGroup},
};

/// Version marker of the native dialect.
pub const NATIVE_SPEC_VERSION: &str = "prometheus/v1";

static VERSION_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?m)^version: +['"]?prometheus/v1['"]? *$"#).expect("valid version regex")
});

/// Root document of the native dialect.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct NativeSpec {
    /// Dialect version, always `prometheus/v1`.
    pub version: String,
    /// Service every SLO in the document belongs to.
    pub service: String,
    /// Default labels merged into every SLO (SLO labels win).
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels:  BTreeMap<String, String>,
    /// SLO declarations.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub slos:    Vec<NativeSlo>
}

/// One SLO declaration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct NativeSlo {
    /// SLO name within the service.
    pub name:        String,
    /// Free-text description.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
    /// Objective percentage in `(0, 100)`.
    pub objective:   f64,
    /// Labels merged into every generated rule.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels:      BTreeMap<String, String>,
    /// The service level indicator.
    pub sli:         NativeSli,
    /// Alerting metadata. Omitting the block disables both alerts.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alerting:    Option<NativeAlerting>
}

/// SLI declaration holding exactly one variant.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct NativeSli {
    /// Good/total event queries.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub events: Option<NativeSliEvents>,
    /// Raw error-ratio query.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw:    Option<NativeSliRaw>,
    /// Plugin reference.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plugin: Option<NativeSliPlugin>
}

/// Inline events SLI queries.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct NativeSliEvents {
    /// Query counting good events, `{{.window}}` parameterised.
    #[serde(alias = "goodQuery")]
    pub good_query:  String,
    /// Query counting all events, `{{.window}}` parameterised.
    #[serde(alias = "totalQuery")]
    pub total_query: String
}

/// Inline raw SLI query.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct NativeSliRaw {
    /// Query yielding the error ratio, `{{.window}}` parameterised.
    #[serde(alias = "errorRatioQuery")]
    pub error_ratio_query: String
}

/// Plugin SLI reference.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct NativeSliPlugin {
    /// Registered plugin id.
    pub id:      String,
    /// Options forwarded to the plugin producer.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub options: BTreeMap<String, String>
}

/// Alerting metadata shared by the page and ticket alerts.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct NativeAlerting {
    /// Alert name shared by both severities.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name:         String,
    /// Labels shared by both alert rules.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels:       BTreeMap<String, String>,
    /// Annotations shared by both alert rules.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub annotations:  BTreeMap<String, String>,
    /// Page alert overrides.
    #[serde(default, alias = "pageAlert")]
    pub page_alert:   NativeAlertMeta,
    /// Ticket alert overrides.
    #[serde(default, alias = "ticketAlert")]
    pub ticket_alert: NativeAlertMeta
}

/// Per-severity alert overrides.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct NativeAlertMeta {
    /// Disables this alert rule.
    #[serde(default)]
    pub disable:     bool,
    /// Labels merged over the shared alerting labels.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels:      BTreeMap<String, String>,
    /// Annotations merged over the shared alerting annotations.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub annotations: BTreeMap<String, String>
}

/// Loader for the native dialect.
#[derive(Debug, Clone)]
pub struct NativeLoader {
    default_window: Duration
}

impl NativeLoader {
    /// Creates a loader that assigns the provided period to every SLO.
    pub fn new(default_window: Duration) -> Self {
        Self {
            default_window
        }
    }

    /// Cheap syntactic pre-check for the dialect marker.
    ///
    /// A match is only a routing hint; [`load`](Self::load) still performs
    /// full schema validation.
    pub fn matches(&self, data: &str) -> bool {
        VERSION_REGEX.is_match(data)
    }

    /// Parses and normalizes a native document into an [`SloGroup`].
    ///
    /// # Errors
    ///
    /// Returns [`Error::Parse`](Error::Parse) for YAML or version failures
    /// and [`Error::Validation`](Error::Validation) for schema-level
    /// violations such as a missing SLI variant.
    pub fn load(&self, data: &str) -> Result<SloGroup, Error> {
        if data.trim().is_empty() {
            return Err(Error::parse("spec is required"));
        }

        let spec: NativeSpec = serde_yaml::from_str(data)?;
        if spec.version != NATIVE_SPEC_VERSION {
            return Err(Error::parse(format!(
                "invalid spec version {:?}, should be {NATIVE_SPEC_VERSION:?}",
                spec.version
            )));
        }
        if spec.slos.is_empty() {
            return Err(Error::validation("at least one SLO is required"));
        }

        normalize_slos(&spec.service, &spec.labels, &spec.slos, self.default_window)
    }
}

/// Normalizes parsed native SLOs into the shared model.
///
/// Shared across the native and Kubernetes loaders since the Kubernetes
/// dialect embeds the native spec.
pub(crate) fn normalize_slos(
    service: &str,
    group_labels: &BTreeMap<String, String>,
    slos: &[NativeSlo],
    window: Duration
) -> Result<SloGroup, Error> {
    let mut normalized = Vec::with_capacity(slos.len());
    for slo in slos {
        normalized.push(normalize_slo(service, group_labels, slo, window)?);
    }

    Ok(SloGroup {
        slos: normalized
    })
}

fn normalize_slo(
    service: &str,
    group_labels: &BTreeMap<String, String>,
    slo: &NativeSlo,
    window: Duration
) -> Result<Slo, Error> {
    let sli = normalize_sli(service, &slo.name, &slo.sli)?;

    let mut labels = group_labels.clone();
    labels.extend(slo.labels.clone());

    let (page_alert, ticket_alert) = match &slo.alerting {
        Some(alerting) => (
            alert_meta(alerting, &alerting.page_alert),
            alert_meta(alerting, &alerting.ticket_alert)
        ),
        None => (AlertMeta::disabled(), AlertMeta::disabled())
    };

    Ok(Slo {
        id: format!("{service}-{}", slo.name),
        name: slo.name.clone(),
        service: service.to_owned(),
        description: slo.description.clone(),
        time_window: window,
        objective: slo.objective,
        labels,
        sli,
        page_alert,
        ticket_alert
    })
}

fn normalize_sli(service: &str, name: &str, sli: &NativeSli) -> Result<Sli, Error> {
    match (&sli.events, &sli.raw, &sli.plugin) {
        (Some(events), None, None) => Ok(Sli::Events(SliEvents {
            good_query:  events.good_query.clone(),
            total_query: events.total_query.clone()
        })),
        (None, Some(raw), None) => Ok(Sli::Raw(SliRaw {
            error_ratio_query: raw.error_ratio_query.clone()
        })),
        (None, None, Some(plugin)) => Ok(Sli::Plugin(SliPluginRef {
            id:      plugin.id.clone(),
            options: plugin.options.clone()
        })),
        _ => Err(Error::validation(format!(
            "SLO {service:?}/{name:?} must declare exactly one of events, raw or plugin SLI"
        )))
    }
}

fn alert_meta(alerting: &NativeAlerting, meta: &NativeAlertMeta) -> AlertMeta {
    let mut labels = alerting.labels.clone();
    labels.extend(meta.labels.clone());
    let mut annotations = alerting.annotations.clone();
    annotations.extend(meta.annotations.clone());

    AlertMeta {
        disable: meta.disable,
        name: alerting.name.clone(),
        labels,
        annotations
    }
}

/// Renders a normalized group back into a native dialect document.
///
/// Lossy only in layout: group-level default labels are materialised on each
/// SLO and the SLO period is implied by the loader's default, so reloading
/// the output with the same default period yields the same normalized model.
///
/// # Errors
///
/// Returns [`Error::Validation`](Error::Validation) when the group is empty
/// and [`Error::Encoding`](Error::Encoding) when serialization fails.
pub fn encode(group: &SloGroup) -> Result<String, Error> {
    let first = group
        .slos
        .first()
        .ok_or_else(|| Error::validation("cannot encode an empty SLO group"))?;

    let spec = NativeSpec {
        version: NATIVE_SPEC_VERSION.to_owned(),
        service: first.service.clone(),
        labels:  BTreeMap::new(),
        slos:    group.slos.iter().map(encode_slo).collect()
    };

    serde_yaml::to_string(&spec).map_err(crate::error::encoding_error)
}

fn encode_slo(slo: &Slo) -> NativeSlo {
    let sli = match &slo.sli {
        Sli::Events(events) => NativeSli {
            events: Some(NativeSliEvents {
                good_query:  events.good_query.clone(),
                total_query: events.total_query.clone()
            }),
            ..NativeSli::default()
        },
        Sli::Raw(raw) => NativeSli {
            raw: Some(NativeSliRaw {
                error_ratio_query: raw.error_ratio_query.clone()
            }),
            ..NativeSli::default()
        },
        Sli::Plugin(plugin) => NativeSli {
            plugin: Some(NativeSliPlugin {
                id:      plugin.id.clone(),
                options: plugin.options.clone()
            }),
            ..NativeSli::default()
        }
    };

    let alerting = encode_alerting(slo);

    NativeSlo {
        name: slo.name.clone(),
        description: slo.description.clone(),
        objective: slo.objective,
        labels: slo.labels.clone(),
        sli,
        alerting
    }
}

fn encode_alerting(slo: &Slo) -> Option<NativeAlerting> {
    let page = &slo.page_alert;
    let ticket = &slo.ticket_alert;

    let fully_disabled = page.disable
        && ticket.disable
        && page.name.is_empty()
        && ticket.name.is_empty()
        && page.labels.is_empty()
        && ticket.labels.is_empty()
        && page.annotations.is_empty()
        && ticket.annotations.is_empty();
    if fully_disabled {
        return None;
    }

    let name = if !page.disable || ticket.name.is_empty() {
        page.name.clone()
    } else {
        ticket.name.clone()
    };

    Some(NativeAlerting {
        name,
        labels: BTreeMap::new(),
        annotations: BTreeMap::new(),
        page_alert: NativeAlertMeta {
            disable:     page.disable,
            labels:      page.labels.clone(),
            annotations: page.annotations.clone()
        },
        ticket_alert: NativeAlertMeta {
            disable:     ticket.disable,
            labels:      ticket.labels.clone(),
            annotations: ticket.annotations.clone()
        }
    })
}

#[cfg(test)]
mod tests {
    use super::{encode, NativeLoader, NATIVE_SPEC_VERSION};
    use crate::{
        error::ErrorKind,
        model::{Sli, DAY},
    };

    const FULL_SPEC: &str = r#"
version: prometheus/v1
service: myservice
labels:
  owner: myteam
slos:
  - name: requests-availability
    description: Common availability SLO
    objective: 99.9
    labels:
      category: availability
    sli:
      events:
        good_query: sum(rate(http_request_duration_seconds_count{job="myservice",code!~"(5..|429)"}[{{.window}}]))
        total_query: sum(rate(http_request_duration_seconds_count{job="myservice"}[{{.window}}]))
    alerting:
      name: MyServiceHighErrorRate
      labels:
        alert_team: myteam
      annotations:
        summary: High error rate on myservice requests
      page_alert:
        labels:
          severity: pageteam
      ticket_alert:
        labels:
          severity: slack
"#;

    fn loader() -> NativeLoader {
        NativeLoader::new(30 * DAY)
    }

    #[test]
    fn matches_detects_the_version_marker() {
        assert!(loader().matches("version: prometheus/v1\nservice: svc\n"));
        assert!(loader().matches("version: \"prometheus/v1\"\nservice: svc\n"));
        assert!(loader().matches("version: 'prometheus/v1'\nservice: svc\n"));
        assert!(loader().matches("service: svc\nversion:   prometheus/v1  \n"));
    }

    #[test]
    fn matches_rejects_other_dialects() {
        assert!(!loader().matches(""));
        assert!(!loader().matches("apiVersion: openslo/v1\nkind: SLO\n"));
        assert!(!loader().matches("version: prometheus/v2\n"));
        assert!(!loader().matches("# version: prometheus/v1\n"));
    }

    #[test]
    fn loads_a_full_document() {
        let group = loader().load(FULL_SPEC).expect("expected spec to load");

        assert_eq!(group.slos.len(), 1);
        let slo = &group.slos[0];
        assert_eq!(slo.id, "myservice-requests-availability");
        assert_eq!(slo.name, "requests-availability");
        assert_eq!(slo.service, "myservice");
        assert_eq!(slo.objective, 99.9);
        assert_eq!(slo.time_window, 30 * DAY);
        assert_eq!(slo.labels.get("owner").map(String::as_str), Some("myteam"));
        assert_eq!(slo.labels.get("category").map(String::as_str), Some("availability"));

        match &slo.sli {
            Sli::Events(events) => {
                assert!(events.good_query.contains("code!~\"(5..|429)\""));
                assert!(events.total_query.contains("[{{.window}}]"));
            }
            other => panic!("expected events SLI, got {other:?}")
        }

        assert!(!slo.page_alert.disable);
        assert_eq!(slo.page_alert.name, "MyServiceHighErrorRate");
        assert_eq!(
            slo.page_alert.labels.get("alert_team").map(String::as_str),
            Some("myteam")
        );
        assert_eq!(
            slo.page_alert.labels.get("severity").map(String::as_str),
            Some("pageteam")
        );
        assert_eq!(
            slo.ticket_alert.labels.get("severity").map(String::as_str),
            Some("slack")
        );
        assert_eq!(
            slo.page_alert.annotations.get("summary").map(String::as_str),
            Some("High error rate on myservice requests")
        );
    }

    #[test]
    fn slo_labels_win_over_group_labels() {
        let spec = r"
version: prometheus/v1
service: svc
labels:
  owner: group-team
slos:
  - name: availability
    objective: 99.9
    labels:
      owner: slo-team
    sli:
      raw:
        error_ratio_query: 'sum(rate(errors[{{.window}}]))'
";
        let group = loader().load(spec).expect("expected spec to load");
        assert_eq!(
            group.slos[0].labels.get("owner").map(String::as_str),
            Some("slo-team")
        );
    }

    #[test]
    fn missing_alerting_block_disables_both_alerts() {
        let spec = r"
version: prometheus/v1
service: svc
slos:
  - name: availability
    objective: 99.9
    sli:
      raw:
        error_ratio_query: 'sum(rate(errors[{{.window}}]))'
";
        let group = loader().load(spec).expect("expected spec to load");
        assert!(group.slos[0].page_alert.disable);
        assert!(group.slos[0].ticket_alert.disable);
    }

    #[test]
    fn plugin_sli_is_preserved() {
        let spec = r#"
version: prometheus/v1
service: svc
slos:
  - name: availability
    objective: 99.9
    sli:
      plugin:
        id: availability/requests
        options:
          filter: job="svc"
"#;
        let group = loader().load(spec).expect("expected spec to load");
        match &group.slos[0].sli {
            Sli::Plugin(plugin) => {
                assert_eq!(plugin.id, "availability/requests");
                assert_eq!(
                    plugin.options.get("filter").map(String::as_str),
                    Some("job=\"svc\"")
                );
            }
            other => panic!("expected plugin SLI, got {other:?}")
        }
    }

    #[test]
    fn rejects_empty_document() {
        let error = loader().load("  \n").expect_err("expected empty spec rejection");
        assert_eq!(error.kind(), ErrorKind::Parse);
    }

    #[test]
    fn rejects_wrong_version() {
        let spec = "version: prometheus/v2\nservice: svc\nslos:\n  - name: a\n    objective: 99.0\n    sli:\n      raw:\n        error_ratio_query: q\n";
        let error = loader().load(spec).expect_err("expected version rejection");
        assert!(error.to_string().contains(NATIVE_SPEC_VERSION));
    }

    #[test]
    fn rejects_document_without_slos() {
        let spec = "version: prometheus/v1\nservice: svc\nslos: []\n";
        let error = loader().load(spec).expect_err("expected empty slos rejection");
        assert_eq!(error.kind(), ErrorKind::Validation);
    }

    #[test]
    fn rejects_slo_without_sli_variant() {
        let spec = r"
version: prometheus/v1
service: svc
slos:
  - name: availability
    objective: 99.9
    sli: {}
";
        let error = loader().load(spec).expect_err("expected SLI exclusivity rejection");
        assert!(error.to_string().contains("exactly one"));
    }

    #[test]
    fn rejects_slo_with_two_sli_variants() {
        let spec = r"
version: prometheus/v1
service: svc
slos:
  - name: availability
    objective: 99.9
    sli:
      raw:
        error_ratio_query: q
      events:
        good_query: g
        total_query: t
";
        let error = loader().load(spec).expect_err("expected SLI exclusivity rejection");
        assert!(error.to_string().contains("exactly one"));
    }

    #[test]
    fn native_documents_round_trip_through_the_encoder() {
        let original = loader().load(FULL_SPEC).expect("expected spec to load");
        let encoded = encode(&original).expect("expected group to encode");
        let reloaded = loader().load(&encoded).expect("expected encoded spec to reload");

        assert_eq!(original, reloaded);
    }

    #[test]
    fn disabled_alerts_round_trip_through_the_encoder() {
        let spec = r"
version: prometheus/v1
service: svc
slos:
  - name: availability
    objective: 99.9
    sli:
      raw:
        error_ratio_query: 'sum(rate(errors[{{.window}}]))'
";
        let original = loader().load(spec).expect("expected spec to load");
        let encoded = encode(&original).expect("expected group to encode");
        let reloaded = loader().load(&encoded).expect("expected encoded spec to reload");

        assert_eq!(original, reloaded);
    }

    #[test]
    fn encoder_rejects_empty_groups() {
        let error = encode(&crate::model::SloGroup::default())
            .expect_err("expected empty group rejection");
        assert_eq!(error.kind(), ErrorKind::Validation);
    }
}
