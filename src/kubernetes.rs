// SPDX-FileCopyrightText: 2025 RAprogramm <andrey.rozanov.vl@gmail.com>
// SPDX-License-Identifier: MIT

//! Kubernetes spec dialect: the `PrometheusServiceLevel` custom resource and
//! the `PrometheusRule` output it generates into.
//!
//! The custom resource embeds the native dialect's spec and adds standard
//! object metadata, which the loader preserves so the encoder can stamp it
//! onto the emitted `PrometheusRule`.

use std::{collections::BTreeMap, sync::LazyLock, time::Duration};

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::{
    error::Error,
    model::SloGroup,
    native::{self, NativeSlo},
    rules::{RuleGroup, SloRules},
};

/// API version of the custom resource.
pub const K8S_API_VERSION: &str = "sloth.slok.dev/v1";

/// Kind of the custom resource.
pub const K8S_KIND: &str = "PrometheusServiceLevel";

/// API version of the emitted `PrometheusRule` resource.
pub const PROMETHEUS_RULE_API_VERSION: &str = "monitoring.coreos.com/v1";

/// Kind of the emitted `PrometheusRule` resource.
pub const PROMETHEUS_RULE_KIND: &str = "PrometheusRule";

static API_VERSION_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?m)^apiVersion: +['"]?sloth\.slok\.dev/v1['"]? *$"#)
        .expect("valid apiVersion regex")
});

static KIND_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?m)^kind: +['"]?PrometheusServiceLevel['"]? *$"#).expect("valid kind regex")
});

/// Standard Kubernetes object metadata preserved for rule emission.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct K8sObjectMeta {
    /// Resource name.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name:        String,
    /// Resource namespace.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub namespace:   String,
    /// Resource labels.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels:      BTreeMap<String, String>,
    /// Resource annotations.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub annotations: BTreeMap<String, String>
}

/// The `PrometheusServiceLevel` custom resource document.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct K8sSpecDocument {
    /// Resource API version, always `sloth.slok.dev/v1`.
    #[serde(rename = "apiVersion")]
    pub api_version: String,
    /// Resource kind, always `PrometheusServiceLevel`.
    pub kind:        String,
    /// Object metadata.
    #[serde(default)]
    pub metadata:    K8sObjectMeta,
    /// Embedded native spec.
    pub spec:        K8sSpec
}

/// The embedded spec, equal to the native dialect's spec without a version
/// marker.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct K8sSpec {
    /// Service every SLO in the resource belongs to.
    pub service: String,
    /// Default labels merged into every SLO (SLO labels win).
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels:  BTreeMap<String, String>,
    /// SLO declarations.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub slos:    Vec<NativeSlo>
}

/// Loader for the Kubernetes dialect.
#[derive(Debug, Clone)]
pub struct KubernetesLoader {
    default_window: Duration
}

impl KubernetesLoader {
    /// Creates a loader that assigns the provided period to every SLO.
    pub fn new(default_window: Duration) -> Self {
        Self {
            default_window
        }
    }

    /// Cheap syntactic pre-check for the `apiVersion` and `kind` markers.
    pub fn matches(&self, data: &str) -> bool {
        API_VERSION_REGEX.is_match(data) && KIND_REGEX.is_match(data)
    }

    /// Parses and normalizes a custom resource into an [`SloGroup`],
    /// returning the preserved object metadata alongside it.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Parse`](Error::Parse) for YAML, version or kind
    /// failures and [`Error::Validation`](Error::Validation) for
    /// schema-level violations.
    pub fn load(&self, data: &str) -> Result<(SloGroup, K8sObjectMeta), Error> {
        if data.trim().is_empty() {
            return Err(Error::parse("spec is required"));
        }

        let document: K8sSpecDocument = serde_yaml::from_str(data)?;
        if document.api_version != K8S_API_VERSION {
            return Err(Error::parse(format!(
                "invalid apiVersion {:?}, should be {K8S_API_VERSION:?}",
                document.api_version
            )));
        }
        if document.kind != K8S_KIND {
            return Err(Error::parse(format!(
                "invalid kind {:?}, should be {K8S_KIND:?}",
                document.kind
            )));
        }
        if document.spec.slos.is_empty() {
            return Err(Error::validation("at least one SLO is required"));
        }

        let group = native::normalize_slos(
            &document.spec.service,
            &document.spec.labels,
            &document.spec.slos,
            self.default_window
        )?;

        Ok((group, document.metadata))
    }
}

/// A `PrometheusRule` custom resource wrapping generated rule groups.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PrometheusRule {
    /// Resource API version, always `monitoring.coreos.com/v1`.
    #[serde(rename = "apiVersion")]
    pub api_version: String,
    /// Resource kind, always `PrometheusRule`.
    pub kind:        String,
    /// Object metadata carried over from the source resource.
    pub metadata:    K8sObjectMeta,
    /// Rule groups payload.
    pub spec:        PrometheusRuleSpec
}

/// Spec payload of a `PrometheusRule` resource.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PrometheusRuleSpec {
    /// Non-empty rule groups in emission order.
    pub groups: Vec<RuleGroup>
}

/// Wraps generated rule groups into a `PrometheusRule` resource carrying the
/// source resource's metadata.
///
/// The generator stamps its ownership labels; metadata labels from the
/// source resource win on conflict.
pub fn prometheus_rule(metadata: &K8sObjectMeta, slos: &[SloRules]) -> PrometheusRule {
    let mut labels = BTreeMap::new();
    labels.insert("app.kubernetes.io/component".to_owned(), "SLO".to_owned());
    labels.insert(
        "app.kubernetes.io/managed-by".to_owned(),
        env!("CARGO_PKG_NAME").to_owned()
    );
    labels.extend(metadata.labels.clone());

    let groups = slos
        .iter()
        .flat_map(|slo| slo.groups().into_iter().cloned())
        .collect();

    PrometheusRule {
        api_version: PROMETHEUS_RULE_API_VERSION.to_owned(),
        kind:        PROMETHEUS_RULE_KIND.to_owned(),
        metadata:    K8sObjectMeta {
            name: metadata.name.clone(),
            namespace: metadata.namespace.clone(),
            labels,
            annotations: metadata.annotations.clone()
        },
        spec:        PrometheusRuleSpec {
            groups
        }
    }
}
