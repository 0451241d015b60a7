//! OpenSLO spec dialect: loader and encoder.
//!
//! One OpenSLO document declares a single SLO with N objectives; the loader
//! expands every objective into a distinct normalized SLO. Only ratio and
//! threshold indicators backed by a `prometheus` or `sloth` metric source are
//! accepted, and good/total ratios are translated into a raw error ratio.
//! Alerting is not expressed in this dialect, so both alerts are disabled on
//! expansion.

use std::{collections::BTreeMap, sync::LazyLock, time::Duration};

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::{
    compile::CompiledSource,
    error::Error,
    model::{AlertMeta, Sli, SliRaw, Slo, SloGroup, DAY},
};

/// API version marker of the dialect.
pub const OPENSLO_API_VERSION: &str = "openslo/v1";

/// Annotation enabling the provisional multi-dimensional SLI rewrite.
pub const MULTI_DIMENSION_ENABLED_ANNOTATION: &str = "multi-dimensional-sli.openslo.com/enabled";

/// Annotation naming the second identifying label for multi-dimensional
/// SLIs.
pub const MULTI_DIMENSION_SECOND_DIMENSION_ANNOTATION: &str =
    "multi-dimensional-sli.openslo.com/second-dimension";

/// Metric source key holding the PromQL query.
const METRIC_SOURCE_QUERY_KEY: &str = "query";

static API_VERSION_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?m)^apiVersion: +['"]?openslo/v1['"]? *$"#).expect("valid apiVersion regex")
});

static KIND_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"(?m)^kind: +['"]?SLO['"]? *$"#).expect("valid kind regex"));

static DURATION_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\d+)([wdhsm])$").expect("valid duration regex"));

/// An OpenSLO `SLO` document.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct OpenSloDocument {
    /// Document API version, always `openslo/v1`.
    #[serde(rename = "apiVersion")]
    pub api_version: String,
    /// Document kind, always `SLO`.
    pub kind:        String,
    /// Document metadata.
    #[serde(default)]
    pub metadata:    OpenSloMetadata,
    /// The SLO spec.
    pub spec:        OpenSloSpec
}

/// Metadata block shared by documents and indicators.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct OpenSloMetadata {
    /// Object name.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name:         String,
    /// Optional display name.
    #[serde(default, rename = "displayName", skip_serializing_if = "String::is_empty")]
    pub display_name: String,
    /// Annotations, including the provisional multi-dimension opt-ins.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub annotations:  BTreeMap<String, String>
}

/// The SLO spec payload.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct OpenSloSpec {
    /// Free-text description.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description:      String,
    /// Service the SLO belongs to.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub service:          String,
    /// Budgeting method declared by the document. Parsed but not used by the
    /// generator, which always budgets over rolling occurrences.
    #[serde(default, rename = "budgetingMethod", skip_serializing_if = "String::is_empty")]
    pub budgeting_method: String,
    /// Inline indicator.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub indicator:        Option<OpenSloIndicator>,
    /// Time windows; at most one rolling day-based window is supported.
    #[serde(default, rename = "timeWindow", skip_serializing_if = "Vec::is_empty")]
    pub time_window:      Vec<OpenSloTimeWindow>,
    /// Objectives, each expanded into a distinct SLO.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub objectives:       Vec<OpenSloObjective>
}

/// Inline indicator declaration.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct OpenSloIndicator {
    /// Indicator metadata.
    #[serde(default)]
    pub metadata: OpenSloMetadata,
    /// Indicator spec.
    pub spec:     OpenSloIndicatorSpec
}

/// Indicator spec holding exactly one metric kind.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct OpenSloIndicatorSpec {
    /// Good (or bad) over total ratio metric.
    #[serde(default, rename = "ratioMetric", skip_serializing_if = "Option::is_none")]
    pub ratio_metric:     Option<OpenSloRatioMetric>,
    /// Threshold metric whose query yields a straight ratio.
    #[serde(default, rename = "thresholdMetric", skip_serializing_if = "Option::is_none")]
    pub threshold_metric: Option<OpenSloMetricHolder>
}

/// Ratio metric with good/bad and total event sources.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct OpenSloRatioMetric {
    /// Whether the sources are monotonic counters.
    #[serde(default)]
    pub counter: bool,
    /// Good events source.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub good:    Option<OpenSloMetricHolder>,
    /// Bad events source, accepted in place of `good`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bad:     Option<OpenSloMetricHolder>,
    /// Total events source.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total:   Option<OpenSloMetricHolder>
}

/// Wrapper around a metric source.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct OpenSloMetricHolder {
    /// The metric source.
    #[serde(default, rename = "metricSource")]
    pub metric_source: OpenSloMetricSource
}

/// A typed metric source carrying its query spec.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct OpenSloMetricSource {
    /// Source type; `prometheus` and `sloth` are accepted.
    #[serde(default, rename = "type", skip_serializing_if = "String::is_empty")]
    pub source_type: String,
    /// Source spec; the `query` key holds the PromQL expression.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub spec:        BTreeMap<String, String>
}

/// A single rolling time window declaration.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct OpenSloTimeWindow {
    /// Window duration such as `30d`.
    pub duration:   String,
    /// Whether the window is rolling; calendar windows are rejected.
    #[serde(default, rename = "isRolling")]
    pub is_rolling: bool
}

/// One objective of the document.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct OpenSloObjective {
    /// Optional display name.
    #[serde(default, rename = "displayName", skip_serializing_if = "String::is_empty")]
    pub display_name: String,
    /// Target ratio in `(0, 1)`; multiplied by 100 during normalization.
    #[serde(default)]
    pub target:       f64
}

#[derive(Debug, Clone, Default)]
struct MultiDimension {
    enabled:          bool,
    second_dimension: String
}

/// Loader for the OpenSLO dialect.
#[derive(Debug, Clone)]
pub struct OpenSloLoader {
    window_period: Duration
}

impl OpenSloLoader {
    /// Creates a loader that falls back to the provided period when the
    /// document declares no time window.
    pub fn new(window_period: Duration) -> Self {
        Self {
            window_period
        }
    }

    /// Cheap syntactic pre-check for the `apiVersion` and `kind` markers.
    pub fn matches(&self, data: &str) -> bool {
        API_VERSION_REGEX.is_match(data) && KIND_REGEX.is_match(data)
    }

    /// Parses an OpenSLO document, expanding every objective into a distinct
    /// normalized SLO.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Parse`](Error::Parse) for YAML or version failures
    /// and [`Error::Validation`](Error::Validation) for unsupported
    /// indicators, time windows or objectives.
    pub fn load(&self, data: &str) -> Result<SloGroup, Error> {
        if data.trim().is_empty() {
            return Err(Error::parse("spec is required"));
        }

        let document: OpenSloDocument = serde_yaml::from_str(data)?;
        if document.api_version != OPENSLO_API_VERSION {
            return Err(Error::parse(format!(
                "invalid spec version {:?}, should be {OPENSLO_API_VERSION:?}",
                document.api_version
            )));
        }
        if document.spec.objectives.is_empty() {
            return Err(Error::validation("at least one objective is required"));
        }

        self.validate_time_window(&document.spec)?;
        let multi_dimension = multi_dimension_settings(&document.metadata)?;

        let window = match document.spec.time_window.first() {
            Some(declared) => parse_day_duration(&declared.duration)?,
            None => self.window_period
        };

        let mut slos = Vec::with_capacity(document.spec.objectives.len());
        for (index, objective) in document.spec.objectives.iter().enumerate() {
            let sli = build_sli(&document.spec, objective, &multi_dimension)?;
            slos.push(Slo {
                id: format!("{}-{}-{index}", document.spec.service, document.metadata.name),
                name: format!("{}-{index}", document.metadata.name),
                service: document.spec.service.clone(),
                description: document.spec.description.clone(),
                time_window: window,
                objective: objective.target * 100.0,
                labels: BTreeMap::new(),
                sli,
                page_alert: AlertMeta::disabled(),
                ticket_alert: AlertMeta::disabled()
            });
        }

        Ok(SloGroup {
            slos
        })
    }

    /// Only a single rolling day-based time window is supported; OpenSLO
    /// requires windows, so the shape is checked before expansion.
    fn validate_time_window(&self, spec: &OpenSloSpec) -> Result<(), Error> {
        if spec.time_window.is_empty() {
            return Ok(());
        }
        if spec.time_window.len() > 1 {
            return Err(Error::validation("only 1 time window is supported"));
        }

        let window = &spec.time_window[0];
        if !window.is_rolling {
            return Err(Error::validation("only rolling time windows are supported"));
        }

        let captures = DURATION_REGEX.captures(&window.duration).ok_or_else(|| {
            Error::validation(format!("invalid time window duration {:?}", window.duration))
        })?;
        if &captures[2] != "d" {
            return Err(Error::validation("only days based time windows are supported"));
        }

        Ok(())
    }
}

fn parse_day_duration(duration: &str) -> Result<Duration, Error> {
    let captures = DURATION_REGEX
        .captures(duration)
        .ok_or_else(|| Error::validation(format!("invalid time window duration {duration:?}")))?;
    let days: u64 = captures[1]
        .parse()
        .map_err(|_| Error::validation(format!("invalid time window duration {duration:?}")))?;

    Ok(days as u32 * DAY)
}

fn multi_dimension_settings(metadata: &OpenSloMetadata) -> Result<MultiDimension, Error> {
    let Some(enabled) = metadata.annotations.get(MULTI_DIMENSION_ENABLED_ANNOTATION) else {
        return Ok(MultiDimension::default());
    };

    let enabled: bool = enabled
        .parse()
        .map_err(|_| Error::validation("unable to parse multi dimension SLI annotation"))?;
    if !enabled {
        return Ok(MultiDimension::default());
    }

    let second_dimension = metadata
        .annotations
        .get(MULTI_DIMENSION_SECOND_DIMENSION_ANNOTATION)
        .ok_or_else(|| {
            Error::validation("second dimension is required for multi-dimensional SLIs")
        })?;

    Ok(MultiDimension {
        enabled: true,
        second_dimension: second_dimension.clone()
    })
}

fn build_sli(
    spec: &OpenSloSpec,
    objective: &OpenSloObjective,
    multi_dimension: &MultiDimension
) -> Result<Sli, Error> {
    if objective.target == 0.0 {
        return Err(Error::validation("missing objective target"));
    }

    let indicator = spec
        .indicator
        .as_ref()
        .ok_or_else(|| Error::validation("missing inline SLI indicator"))?;

    let query = match (&indicator.spec.ratio_metric, &indicator.spec.threshold_metric) {
        (Some(ratio), None) => ratio_query(ratio)?,
        (None, Some(threshold)) => {
            source_query(&threshold.metric_source, "threshold")?.to_owned()
        }
        _ => {
            return Err(Error::validation(
                "one and only one of ratioMetric or thresholdMetric must be supplied"
            ))
        }
    };

    let query = if multi_dimension.enabled {
        multi_dimension_query(&query, &multi_dimension.second_dimension)
    } else {
        query
    };

    Ok(Sli::Raw(SliRaw {
        error_ratio_query: query
    }))
}

/// Maps a ratio metric to a raw error-ratio query.
///
/// OpenSLO counts good (or bad) events where the generator expects an error
/// ratio: `good/total` is complemented to `1 - good/total`, while `bad/total`
/// already is the error ratio and is used as-is.
fn ratio_query(ratio: &OpenSloRatioMetric) -> Result<String, Error> {
    let total = ratio
        .total
        .as_ref()
        .ok_or_else(|| Error::validation("ratio metric requires a 'total' source"))?;
    let total_query = source_query(&total.metric_source, "total")?;

    match (&ratio.good, &ratio.bad) {
        (Some(good), None) => {
            let good_query = source_query(&good.metric_source, "good")?;
            Ok(format!("1 - (({good_query}) / ({total_query}))"))
        }
        (None, Some(bad)) => {
            let bad_query = source_query(&bad.metric_source, "bad")?;
            Ok(format!("({bad_query}) / ({total_query})"))
        }
        _ => Err(Error::validation(
            "ratio metric requires exactly one of 'good' or 'bad' sources"
        ))
    }
}

fn source_query<'a>(
    source: &'a OpenSloMetricSource,
    role: &str
) -> Result<&'a str, Error> {
    if source.source_type != "prometheus" && source.source_type != "sloth" {
        return Err(Error::validation(format!(
            "prometheus or sloth query {role:?} source is required"
        )));
    }

    source
        .spec
        .get(METRIC_SOURCE_QUERY_KEY)
        .map(String::as_str)
        .ok_or_else(|| Error::validation(format!("{role:?} source is missing a query")))
}

/// Provisional multi-dimensional SLI rewrite: attaches a second identifying
/// label by joining it into `sloth_slo` and rebuilding `sloth_id`.
fn multi_dimension_query(query: &str, second_dimension: &str) -> String {
    format!(
        "label_join(label_join(max_over_time({query}), 'sloth_slo', '-', 'sloth_slo', \
         '{second_dimension}'), 'sloth_id', '-', 'sloth_service', 'sloth_slo')"
    )
}

/// Renders a normalized SLO as an OpenSLO document.
///
/// Lossy for plugin SLIs, which are materialised through their compiled
/// source: events become a ratio metric, raw queries a threshold metric,
/// both backed by a `sloth` metric source.
pub fn openslo_document(slo: &Slo, source: &CompiledSource) -> OpenSloDocument {
    let indicator_spec = match source {
        CompiledSource::Events {
            good_query,
            total_query
        } => OpenSloIndicatorSpec {
            ratio_metric:     Some(OpenSloRatioMetric {
                counter: true,
                good:    Some(sloth_source(good_query)),
                bad:     None,
                total:   Some(sloth_source(total_query))
            }),
            threshold_metric: None
        },
        CompiledSource::Raw {
            error_ratio_query
        } => OpenSloIndicatorSpec {
            ratio_metric:     None,
            threshold_metric: Some(sloth_source(error_ratio_query))
        }
    };

    let days = slo.time_window.as_secs() / DAY.as_secs();

    OpenSloDocument {
        api_version: OPENSLO_API_VERSION.to_owned(),
        kind:        "SLO".to_owned(),
        metadata:    OpenSloMetadata {
            name: slo.name.clone(),
            ..OpenSloMetadata::default()
        },
        spec:        OpenSloSpec {
            description:      slo.description.clone(),
            service:          slo.service.clone(),
            budgeting_method: "Occurrences".to_owned(),
            indicator:        Some(OpenSloIndicator {
                metadata: OpenSloMetadata::default(),
                spec:     indicator_spec
            }),
            time_window:      vec![OpenSloTimeWindow {
                duration:   format!("{days}d"),
                is_rolling: true
            }],
            objectives:       vec![OpenSloObjective {
                display_name: String::new(),
                target:       slo.objective / 100.0
            }]
        }
    }
}

fn sloth_source(query: &str) -> OpenSloMetricHolder {
    let mut spec = BTreeMap::new();
    spec.insert(METRIC_SOURCE_QUERY_KEY.to_owned(), query.to_owned());

    OpenSloMetricHolder {
        metric_source: OpenSloMetricSource {
            source_type: "sloth".to_owned(),
            spec
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{openslo_document, OpenSloLoader};
    use crate::{
        compile::CompiledSource,
        error::ErrorKind,
        model::{Sli, DAY},
    };

    const TWO_OBJECTIVES: &str = r#"
apiVersion: openslo/v1
kind: SLO
metadata:
  displayName: Ratio
  name: ratio
spec:
  budgetingMethod: Occurrences
  description: A great description of a ratio based SLO
  indicator:
    metadata:
      name: sli1
    spec:
      ratioMetric:
        counter: true
        good:
          metricSource:
            type: prometheus
            spec:
              query: sum(rate(http_request_duration_seconds_count{job="myservice",code!~"(5..|429)"}[{{.window}}]))
        total:
          metricSource:
            type: prometheus
            spec:
              query: sum(rate(http_request_duration_seconds_count{job="myservice"}[{{.window}}]))
  objectives:
    - displayName: painful
      target: 0.98
    - displayName: painful
      target: 0.999
  service: my-test-service
  timeWindow:
    - duration: 30d
      isRolling: true
"#;

    fn loader() -> OpenSloLoader {
        OpenSloLoader::new(30 * DAY)
    }

    fn with_time_window(window: &str) -> String {
        TWO_OBJECTIVES.replace(
            "  timeWindow:\n    - duration: 30d\n      isRolling: true\n",
            window
        )
    }

    #[test]
    fn matches_requires_both_markers() {
        assert!(loader().matches("apiVersion: openslo/v1\nkind: SLO\n"));
        assert!(loader().matches("apiVersion: \"openslo/v1\"\nkind: \"SLO\"\n"));
        assert!(loader().matches("apiVersion: 'openslo/v1'\nkind: 'SLO'\n"));
        assert!(loader().matches("apiVersion:          openslo/v1     \nkind:              SLO     \n"));
    }

    #[test]
    fn matches_rejects_other_documents() {
        assert!(!loader().matches(""));
        assert!(!loader().matches("{"));
        assert!(!loader().matches("apiVersion: openslo/v1balloon\nkind: SLO\n"));
        assert!(!loader().matches("apiVersion: openslo/v1\nkind: service\n"));
    }

    #[test]
    fn expands_every_objective_into_a_distinct_slo() {
        let group = loader().load(TWO_OBJECTIVES).expect("expected document to load");

        assert_eq!(group.slos.len(), 2);
        assert_eq!(group.slos[0].id, "my-test-service-ratio-0");
        assert_eq!(group.slos[0].name, "ratio-0");
        assert_eq!(group.slos[1].id, "my-test-service-ratio-1");
        assert_eq!(group.slos[1].name, "ratio-1");
        assert_eq!(group.slos[0].objective, 98.0);
        assert_eq!(group.slos[1].objective, 99.9);
        assert_eq!(group.slos[0].time_window, 30 * DAY);
        assert_eq!(group.slos[0].sli, group.slos[1].sli);
        assert!(group.slos[0].page_alert.disable);
        assert!(group.slos[0].ticket_alert.disable);
    }

    #[test]
    fn good_total_ratio_is_complemented() {
        let group = loader().load(TWO_OBJECTIVES).expect("expected document to load");
        match &group.slos[0].sli {
            Sli::Raw(raw) => {
                assert!(raw.error_ratio_query.starts_with("1 - (("));
                assert!(raw.error_ratio_query.contains("code!~\"(5..|429)\""));
            }
            other => panic!("expected raw SLI, got {other:?}")
        }
    }

    #[test]
    fn bad_total_ratio_is_used_without_complement() {
        let document = TWO_OBJECTIVES.replace("        good:", "        bad:");
        let group = loader().load(&document).expect("expected document to load");
        match &group.slos[0].sli {
            Sli::Raw(raw) => {
                assert!(!raw.error_ratio_query.starts_with("1 -"));
                assert!(raw.error_ratio_query.starts_with("(sum(rate("));
            }
            other => panic!("expected raw SLI, got {other:?}")
        }
    }

    #[test]
    fn objectives_round_trip_through_percentages() {
        let group = loader().load(TWO_OBJECTIVES).expect("expected document to load");
        let document = openslo_document(
            &group.slos[1],
            &CompiledSource::Raw {
                error_ratio_query: "q[{{.window}}]".to_owned()
            }
        );

        let target = document.spec.objectives[0].target;
        assert!((target - 0.999).abs() < 1e-9);
    }

    #[test]
    fn rejects_empty_document() {
        assert_eq!(loader().load("").expect_err("expected failure").kind(), ErrorKind::Parse);
    }

    #[test]
    fn rejects_invalid_yaml() {
        assert!(loader().load(":").is_err());
    }

    #[test]
    fn rejects_wrong_api_version() {
        let document = TWO_OBJECTIVES.replace("openslo/v1", "openslo/v99");
        let error = loader().load(&document).expect_err("expected version rejection");
        assert_eq!(error.kind(), ErrorKind::Parse);
    }

    #[test]
    fn rejects_document_without_objectives() {
        let document = TWO_OBJECTIVES.replace(
            "  objectives:\n    - displayName: painful\n      target: 0.98\n    - displayName: \
             painful\n      target: 0.999\n",
            "  objectives: []\n"
        );
        let error = loader().load(&document).expect_err("expected objectives rejection");
        assert_eq!(error.kind(), ErrorKind::Validation);
    }

    #[test]
    fn rejects_zero_target() {
        let document = TWO_OBJECTIVES.replace("target: 0.98", "target: 0.0");
        let error = loader().load(&document).expect_err("expected target rejection");
        assert!(error.to_string().contains("target"));
    }

    #[test]
    fn rejects_non_day_time_window() {
        let document =
            with_time_window("  timeWindow:\n    - duration: 72h\n      isRolling: true\n");
        let error = loader().load(&document).expect_err("expected unit rejection");
        assert!(error.to_string().contains("days based"));
    }

    #[test]
    fn rejects_malformed_time_window() {
        let document =
            with_time_window("  timeWindow:\n    - duration: 72i\n      isRolling: true\n");
        assert!(loader().load(&document).is_err());
    }

    #[test]
    fn rejects_calendar_time_window() {
        let document =
            with_time_window("  timeWindow:\n    - duration: 30d\n      isRolling: false\n");
        let error = loader().load(&document).expect_err("expected rolling rejection");
        assert!(error.to_string().contains("rolling"));
    }

    #[test]
    fn rejects_multiple_time_windows() {
        let document = with_time_window(
            "  timeWindow:\n    - duration: 30d\n      isRolling: true\n    - duration: 7d\n      isRolling: true\n"
        );
        let error = loader().load(&document).expect_err("expected count rejection");
        assert!(error.to_string().contains("1 time window"));
    }

    #[test]
    fn missing_time_window_falls_back_to_the_default() {
        let document = with_time_window("");
        let group = loader().load(&document).expect("expected document to load");
        assert_eq!(group.slos[0].time_window, 30 * DAY);

        let group = OpenSloLoader::new(28 * DAY)
            .load(&document)
            .expect("expected document to load");
        assert_eq!(group.slos[0].time_window, 28 * DAY);
    }

    #[test]
    fn rejects_missing_indicator() {
        let mut document = with_time_window("");
        let indicator_start = document.find("  indicator:").expect("indicator block");
        let objectives_start = document.find("  objectives:").expect("objectives block");
        document.replace_range(indicator_start..objectives_start, "");

        let error = loader().load(&document).expect_err("expected indicator rejection");
        assert!(error.to_string().contains("missing inline SLI"));
    }

    #[test]
    fn rejects_ratio_without_good_or_bad() {
        let document = TWO_OBJECTIVES.replace(
            "        good:\n          metricSource:\n            type: prometheus\n            spec:\n              query: sum(rate(http_request_duration_seconds_count{job=\"myservice\",code!~\"(5..|429)\"}[{{.window}}]))\n",
            ""
        );
        let error = loader().load(&document).expect_err("expected source rejection");
        assert!(error.to_string().contains("'good' or 'bad'"));
    }

    #[test]
    fn rejects_ratio_without_total() {
        let document = TWO_OBJECTIVES.replace(
            "        total:\n          metricSource:\n            type: prometheus\n            spec:\n              query: sum(rate(http_request_duration_seconds_count{job=\"myservice\"}[{{.window}}]))\n",
            ""
        );
        let error = loader().load(&document).expect_err("expected total rejection");
        assert!(error.to_string().contains("total"));
    }

    #[test]
    fn rejects_unsupported_metric_source_type() {
        let document = TWO_OBJECTIVES.replace("type: prometheus", "type: datadog");
        let error = loader().load(&document).expect_err("expected source type rejection");
        assert!(error.to_string().contains("prometheus or sloth"));
    }

    #[test]
    fn accepts_threshold_metric_indicators() {
        let document = r#"
apiVersion: openslo/v1
kind: SLO
metadata:
  name: latency
spec:
  service: my-test-service
  indicator:
    spec:
      thresholdMetric:
        metricSource:
          type: prometheus
          spec:
            query: histogram_error_ratio[{{.window}}]
  objectives:
    - target: 0.95
"#;
        let group = loader().load(document).expect("expected document to load");
        match &group.slos[0].sli {
            Sli::Raw(raw) => {
                assert_eq!(raw.error_ratio_query, "histogram_error_ratio[{{.window}}]");
            }
            other => panic!("expected raw SLI, got {other:?}")
        }
    }

    #[test]
    fn multi_dimension_annotation_wraps_the_query() {
        let document = TWO_OBJECTIVES.replace(
            "metadata:\n  displayName: Ratio\n  name: ratio\n",
            "metadata:\n  displayName: Ratio\n  name: ratio\n  annotations:\n    multi-dimensional-sli.openslo.com/enabled: \"true\"\n    multi-dimensional-sli.openslo.com/second-dimension: \"region\"\n"
        );
        let group = loader().load(&document).expect("expected document to load");

        match &group.slos[0].sli {
            Sli::Raw(raw) => {
                assert!(raw.error_ratio_query.starts_with("label_join(label_join(max_over_time("));
                assert!(raw.error_ratio_query.contains("'region'"));
                assert!(raw.error_ratio_query.ends_with("'sloth_service', 'sloth_slo')"));
            }
            other => panic!("expected raw SLI, got {other:?}")
        }
    }

    #[test]
    fn multi_dimension_annotation_requires_second_dimension() {
        let document = TWO_OBJECTIVES.replace(
            "metadata:\n  displayName: Ratio\n  name: ratio\n",
            "metadata:\n  displayName: Ratio\n  name: ratio\n  annotations:\n    multi-dimensional-sli.openslo.com/enabled: \"true\"\n"
        );
        let error = loader().load(&document).expect_err("expected second dimension rejection");
        assert!(error.to_string().contains("second dimension"));
    }

    #[test]
    fn encoded_documents_reload() {
        let group = loader().load(TWO_OBJECTIVES).expect("expected document to load");
        let document = openslo_document(
            &group.slos[0],
            &CompiledSource::Raw {
                error_ratio_query: "sum(rate(errors[{{.window}}]))".to_owned()
            }
        );

        let rendered = serde_yaml::to_string(&document).expect("expected serialization");
        let reloaded = loader().load(&rendered).expect("expected encoded document to reload");

        assert_eq!(reloaded.slos.len(), 1);
        assert!((reloaded.slos[0].objective - 98.0).abs() < 1e-9);
        assert_eq!(reloaded.slos[0].time_window, 30 * DAY);
    }
}
