//! SLO burn rate rules generation for Prometheus.
//!
//! The library ingests service level objective specifications in three
//! dialects (the native `prometheus/v1` dialect, the Kubernetes
//! `PrometheusServiceLevel` custom resource and OpenSLO), normalizes them
//! into a shared model and compiles every SLO into Prometheus recording and
//! alerting rules implementing multi-window multi-burn-rate error budget
//! alerting. All public APIs are documented with invariants, error semantics
//! and minimal examples to facilitate integration in automation tooling.
//!
//! # Examples
//!
//! Load a native document, generate its rules and render them as a
//! Prometheus rules file:
//!
//! ```
//! use std::collections::BTreeMap;
//!
//! use isbg::{
//!     prometheus_document, validate_group, GeneratorInfo, RulesGenerator, SliPluginRegistry,
//!     SpecLoader, DAY, MODE_CLI_GEN_PROM,
//! };
//!
//! # fn main() -> Result<(), isbg::Error> {
//! let yaml = r#"
//! version: prometheus/v1
//! service: myservice
//! slos:
//!   - name: requests-availability
//!     objective: 99.9
//!     sli:
//!       events:
//!         good_query: sum(rate(http_requests_total{code!~"5.."}[{{.window}}]))
//!         total_query: sum(rate(http_requests_total[{{.window}}]))
//!     alerting:
//!       name: MyServiceHighErrorRate
//! "#;
//!
//! let specs = SpecLoader::new(30 * DAY).load_all(yaml)?;
//! validate_group(&specs[0].group)?;
//!
//! let registry = SliPluginRegistry::new();
//! let info = GeneratorInfo::new(MODE_CLI_GEN_PROM, specs[0].dialect.api_version());
//! let generated =
//!     RulesGenerator::new().generate_group(&specs[0].group, &registry, &info, &BTreeMap::new())?;
//!
//! let (slos, failed) = generated.into_parts();
//! assert!(failed.is_none());
//!
//! let document = prometheus_document(&slos)?;
//! assert!(document.contains("sloth-slo-sli-recordings-myservice-requests-availability"));
//! # Ok(())
//! # }
//! ```

mod compile;
mod encode;
mod error;
mod kubernetes;
mod loader;
mod model;
mod native;
mod openslo;
mod plugin;
mod rules;
mod windows;

pub use compile::{
    CompiledSli, CompiledSource, SliCompiler, MAX_PLUGIN_DEPTH, METRIC_SLI_ERROR,
    METRIC_SLI_EVENTS_OK, WINDOW_PLACEHOLDER,
};
pub use encode::{kubernetes_document, prometheus_document, PrometheusDocument};
pub use error::{encoding_error, io_error, Error, ErrorKind, SloFailure};
pub use kubernetes::{
    prometheus_rule, K8sObjectMeta, KubernetesLoader, PrometheusRule, PrometheusRuleSpec,
    K8S_API_VERSION, K8S_KIND,
};
pub use loader::{Dialect, LoadedSpec, SpecLoader};
pub use model::{
    validate_group, validate_labels, AlertMeta, Sli, SliEvents, SliPluginRef, SliRaw, Slo,
    SloGroup, DAY, RESERVED_LABELS, SUPPORTED_WINDOW_DAYS,
};
pub use native::{encode as encode_native, NativeLoader, NativeSpec, NATIVE_SPEC_VERSION};
pub use openslo::{openslo_document, OpenSloDocument, OpenSloLoader, OPENSLO_API_VERSION};
pub use plugin::{
    PluginRequest, PluginSloMeta, SliPlugin, SliPluginRegistry, TemplatedSliPlugin,
};
pub use rules::{
    AlertingRule, GeneratedGroup, GeneratorInfo, RecordingRule, Rule, RuleGroup, RulesGenerator,
    SloRules, MODE_CLI_GEN_K8S, MODE_CLI_GEN_PROM,
};
pub use windows::{promql_duration, AlertWindow, Severity, SloWindows, WindowsRepo};
