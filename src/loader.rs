//! Spec loader dispatch across the three input dialects.
//!
//! Documents may concatenate multiple specs with `---` separators; every
//! sub-document is routed independently through the loaders' cheap regex
//! pre-checks in a fixed order (native, Kubernetes, OpenSLO). The first
//! loader that claims a document parses it; a document no loader claims is
//! rejected.

use std::{sync::LazyLock, time::Duration};

use regex::Regex;
use tracing::debug;

use crate::{
    error::Error,
    kubernetes::{K8sObjectMeta, KubernetesLoader, K8S_API_VERSION},
    model::SloGroup,
    native::{NativeLoader, NATIVE_SPEC_VERSION},
    openslo::{OpenSloLoader, OPENSLO_API_VERSION},
};

static DOCUMENT_SEPARATOR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^---\s*$").expect("valid separator regex"));

/// The input dialect a document was loaded from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dialect {
    /// Native `prometheus/v1` dialect.
    Native,
    /// Kubernetes `PrometheusServiceLevel` custom resource.
    Kubernetes,
    /// OpenSLO `SLO` document.
    OpenSlo
}

impl Dialect {
    /// Returns the dialect's version marker, stamped onto the
    /// `sloth_slo_info` metadata rule.
    pub fn api_version(self) -> &'static str {
        match self {
            Self::Native => NATIVE_SPEC_VERSION,
            Self::Kubernetes => K8S_API_VERSION,
            Self::OpenSlo => OPENSLO_API_VERSION
        }
    }
}

/// A normalized group plus the provenance needed for encoding.
#[derive(Debug)]
pub struct LoadedSpec {
    /// Dialect the document was loaded from.
    pub dialect:         Dialect,
    /// The normalized SLO group.
    pub group:           SloGroup,
    /// Object metadata preserved from Kubernetes documents.
    pub kubernetes_meta: Option<K8sObjectMeta>
}

/// Dispatching loader over the three dialects.
#[derive(Debug, Clone)]
pub struct SpecLoader {
    native:     NativeLoader,
    kubernetes: KubernetesLoader,
    openslo:    OpenSloLoader
}

impl SpecLoader {
    /// Creates a dispatcher whose loaders default to the provided SLO
    /// period.
    pub fn new(default_window: Duration) -> Self {
        Self {
            native:     NativeLoader::new(default_window),
            kubernetes: KubernetesLoader::new(default_window),
            openslo:    OpenSloLoader::new(default_window)
        }
    }

    /// Routes and loads a single spec document.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Parse`](Error::Parse) when no loader claims the
    /// document, plus whatever the claiming loader reports.
    pub fn load(&self, data: &str) -> Result<LoadedSpec, Error> {
        if self.native.matches(data) {
            debug!("document matched the native dialect");
            return Ok(LoadedSpec {
                dialect:         Dialect::Native,
                group:           self.native.load(data)?,
                kubernetes_meta: None
            });
        }
        if self.kubernetes.matches(data) {
            debug!("document matched the Kubernetes dialect");
            let (group, metadata) = self.kubernetes.load(data)?;
            return Ok(LoadedSpec {
                dialect:         Dialect::Kubernetes,
                group,
                kubernetes_meta: Some(metadata)
            });
        }
        if self.openslo.matches(data) {
            debug!("document matched the OpenSLO dialect");
            return Ok(LoadedSpec {
                dialect:         Dialect::OpenSlo,
                group:           self.openslo.load(data)?,
                kubernetes_meta: None
            });
        }

        Err(Error::parse("unknown spec type"))
    }

    /// Splits concatenated YAML documents and routes each sub-document.
    ///
    /// Blank sub-documents are skipped.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Parse`](Error::Parse) when the input holds no spec
    /// documents at all, plus whatever [`load`](Self::load) reports per
    /// sub-document.
    pub fn load_all(&self, data: &str) -> Result<Vec<LoadedSpec>, Error> {
        let mut specs = Vec::new();
        for document in DOCUMENT_SEPARATOR.split(data) {
            if document.trim().is_empty() {
                continue;
            }
            specs.push(self.load(document)?);
        }

        if specs.is_empty() {
            return Err(Error::parse("no SLO spec documents found"));
        }

        Ok(specs)
    }
}
