// SPDX-FileCopyrightText: 2025 RAprogramm <andrey.rozanov.vl@gmail.com>
// SPDX-License-Identifier: MIT

//! Output encoders for generated rule groups.
//!
//! The Prometheus encoder renders a standalone rules file in the `groups:`
//! schema; the Kubernetes encoder wraps the same groups in a
//! `PrometheusRule` resource. Both prepend a generated-file banner and both
//! are deterministic for a given input.

use serde::Serialize;

use crate::{
    error::{encoding_error, Error},
    kubernetes::{prometheus_rule, K8sObjectMeta},
    rules::{RuleGroup, SloRules},
};

/// A standalone Prometheus rules document.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PrometheusDocument {
    /// Non-empty rule groups in emission order.
    pub groups: Vec<RuleGroup>
}

fn banner() -> String {
    format!(
        "---\n# Code generated by {} {}: SLO burn rate rules.\n# DO NOT EDIT.\n\n",
        env!("CARGO_PKG_NAME"),
        concat!("v", env!("CARGO_PKG_VERSION"))
    )
}

fn collect_groups(slos: &[SloRules]) -> Vec<RuleGroup> {
    slos.iter().flat_map(|slo| slo.groups().into_iter().cloned()).collect()
}

/// Renders generated SLOs as a Prometheus rules document.
///
/// Empty rule groups (for example the alert group of an SLO with both alerts
/// disabled) are omitted.
///
/// # Errors
///
/// Returns [`Error::Encoding`](Error::Encoding) when serialization fails.
pub fn prometheus_document(slos: &[SloRules]) -> Result<String, Error> {
    let document = PrometheusDocument {
        groups: collect_groups(slos)
    };
    let rendered = serde_yaml::to_string(&document).map_err(encoding_error)?;

    Ok(format!("{}{rendered}", banner()))
}

/// Renders generated SLOs as a Kubernetes `PrometheusRule` resource carrying
/// the provided object metadata.
///
/// # Errors
///
/// Returns [`Error::Encoding`](Error::Encoding) when serialization fails.
pub fn kubernetes_document(
    metadata: &K8sObjectMeta,
    slos: &[SloRules]
) -> Result<String, Error> {
    let resource = prometheus_rule(metadata, slos);
    let rendered = serde_yaml::to_string(&resource).map_err(encoding_error)?;

    Ok(format!("{}{rendered}", banner()))
}
