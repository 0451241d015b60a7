//! SLI compilation: plugin resolution and window templating.
//!
//! Compilation turns the SLI declared on an SLO into the query templates the
//! rules generator consumes. Plugin references are resolved through the
//! registry (chains are bounded, cycles fail), and the canonical error-ratio
//! template over the recorded SLI metric is derived here so metadata and
//! alert rules read recorded series instead of re-executing raw queries.

use std::time::Duration;

use crate::{
    error::Error,
    model::{Sli, Slo},
    plugin::{PluginRequest, PluginSloMeta, SliPluginRegistry},
    windows::promql_duration,
};

/// Literal placeholder substituted with a PromQL duration per window.
pub const WINDOW_PLACEHOLDER: &str = "{{.window}}";

/// Recorded metric name prefix for events-based SLIs (good/total ratio).
pub const METRIC_SLI_EVENTS_OK: &str = "sloth_sli_events_ok:ratio_rate";

/// Recorded metric name prefix for raw SLIs (error ratio).
pub const METRIC_SLI_ERROR: &str = "sloth_sli_error:ratio_rate";

/// Maximum number of plugin invocations while resolving one SLI.
pub const MAX_PLUGIN_DEPTH: usize = 10;

/// Query templates evaluated per window by the SLI recording rules.
#[derive(Debug, Clone, PartialEq)]
pub enum CompiledSource {
    /// Good and total event query templates retained for per-window rules.
    Events {
        /// Query counting good events.
        good_query:  String,
        /// Query counting all events.
        total_query: String
    },
    /// Raw error-ratio query template kept verbatim.
    Raw {
        /// Query yielding the error ratio directly.
        error_ratio_query: String
    }
}

/// A fully compiled SLI ready for rule generation.
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledSli {
    /// Per-window query templates for the SLI recording rules.
    pub source:            CompiledSource,
    /// Canonical `{{.window}}`-parameterised error ratio over the recorded
    /// SLI metric, identity matchers included. Metadata and alert rules are
    /// built exclusively from this template.
    pub error_ratio_query: String
}

/// Compiles SLIs against a plugin registry.
#[derive(Debug)]
pub struct SliCompiler<'a> {
    registry: &'a SliPluginRegistry
}

impl<'a> SliCompiler<'a> {
    /// Creates a compiler backed by the provided registry.
    pub fn new(registry: &'a SliPluginRegistry) -> Self {
        Self {
            registry
        }
    }

    /// Compiles the SLI of the provided SLO.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Compile`](Error::Compile) when a referenced plugin is
    /// unknown, the plugin chain exceeds [`MAX_PLUGIN_DEPTH`], or a producer
    /// fails.
    pub fn compile(&self, slo: &Slo) -> Result<CompiledSli, Error> {
        let resolved = self.resolve(slo, slo.sli.clone(), MAX_PLUGIN_DEPTH)?;
        let matchers = identity_matchers(slo);

        let compiled = match resolved {
            Sli::Events(events) => CompiledSli {
                source:            CompiledSource::Events {
                    good_query:  events.good_query,
                    total_query: events.total_query
                },
                error_ratio_query: format!(
                    "1 - {METRIC_SLI_EVENTS_OK}{WINDOW_PLACEHOLDER}{{{matchers}}}"
                )
            },
            Sli::Raw(raw) => CompiledSli {
                source:            CompiledSource::Raw {
                    error_ratio_query: raw.error_ratio_query
                },
                error_ratio_query: format!(
                    "{METRIC_SLI_ERROR}{WINDOW_PLACEHOLDER}{{{matchers}}}"
                )
            },
            Sli::Plugin(_) => unreachable!("resolve only returns concrete SLI variants")
        };

        Ok(compiled)
    }

    fn resolve(&self, slo: &Slo, sli: Sli, remaining: usize) -> Result<Sli, Error> {
        let reference = match sli {
            Sli::Plugin(reference) => reference,
            concrete => return Ok(concrete)
        };

        if remaining == 0 {
            return Err(Error::compile(
                &slo.id,
                format!("plugin recursion limit of {MAX_PLUGIN_DEPTH} exceeded")
            ));
        }

        let plugin = self.registry.get(&reference.id).ok_or_else(|| {
            Error::compile(&slo.id, format!("unknown plugin {:?}", reference.id))
        })?;

        let request = PluginRequest {
            options: &reference.options,
            meta:    PluginSloMeta {
                service:   &slo.service,
                slo:       &slo.name,
                objective: slo.objective,
                window:    slo.time_window
            }
        };
        let produced = plugin
            .produce(&request)
            .map_err(|error| Error::compile(&slo.id, error.to_display_string()))?;

        self.resolve(slo, produced, remaining - 1)
    }
}

/// Substitutes the `{{.window}}` placeholder with a concrete duration.
///
/// # Errors
///
/// Returns [`Error::Compile`](Error::Compile) when the template does not
/// contain the placeholder, since substitution would leave the expression
/// unchanged where a window is required.
pub fn render_window(slo_id: &str, template: &str, window: Duration) -> Result<String, Error> {
    if !template.contains(WINDOW_PLACEHOLDER) {
        return Err(Error::compile(
            slo_id,
            format!("query template is missing the {WINDOW_PLACEHOLDER} placeholder")
        ));
    }

    Ok(template.replace(WINDOW_PLACEHOLDER, &promql_duration(window)))
}

/// Renders the identity label matchers every generated vector selector
/// carries.
pub(crate) fn identity_matchers(slo: &Slo) -> String {
    format!(
        "sloth_id=\"{}\", sloth_service=\"{}\", sloth_slo=\"{}\"",
        slo.id, slo.service, slo.name
    )
}
