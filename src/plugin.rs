// SPDX-FileCopyrightText: 2025 RAprogramm <andrey.rozanov.vl@gmail.com>
// SPDX-License-Identifier: MIT

//! SLI plugin protocol: registry, discovery and templated producers.
//!
//! A plugin is a producer of SLI queries keyed by a stable id. Producers can
//! be registered programmatically through the [`SliPlugin`] trait or
//! discovered from plugin manifest files (`plugin.yaml`) found recursively
//! under caller-supplied directories. Manifest queries are PromQL templates
//! that may reference invocation options and SLO metadata; the `{{.window}}`
//! placeholder is left untouched for the rules generator.

use std::{
    collections::BTreeMap,
    fs,
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};

use serde::Deserialize;
use tracing::{debug, info};

use crate::{
    error::Error,
    model::{Sli, SliEvents, SliPluginRef, SliRaw},
};

/// Manifest file names recognised during plugin discovery.
const MANIFEST_FILE_NAMES: [&str; 2] = ["plugin.yaml", "plugin.yml"];

/// SLO metadata handed to a plugin invocation.
#[derive(Debug, Clone, Copy)]
pub struct PluginSloMeta<'a> {
    /// Service the SLO belongs to.
    pub service:   &'a str,
    /// SLO name within the service.
    pub slo:       &'a str,
    /// Objective percentage.
    pub objective: f64,
    /// Full SLO period.
    pub window:    Duration
}

/// A single plugin invocation request.
#[derive(Debug, Clone, Copy)]
pub struct PluginRequest<'a> {
    /// Options declared on the SLI plugin reference.
    pub options: &'a BTreeMap<String, String>,
    /// Metadata of the SLO being compiled.
    pub meta:    PluginSloMeta<'a>
}

/// A producer of SLI queries.
///
/// Producers must be pure functions of the request: the registry hands out
/// shared references and the compiler may invoke them repeatedly while
/// resolving plugin chains.
pub trait SliPlugin: Send + Sync {
    /// Stable id the producer registers under.
    fn id(&self) -> &str;

    /// Produces an SLI for the request.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Plugin`](Error::Plugin) when the request options are
    /// incompatible with the producer.
    fn produce(&self, request: &PluginRequest<'_>) -> Result<Sli, Error>;
}

/// Registry of SLI plugins keyed by id.
#[derive(Default)]
pub struct SliPluginRegistry {
    plugins: BTreeMap<String, Arc<dyn SliPlugin>>
}

impl std::fmt::Debug for SliPluginRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SliPluginRegistry")
            .field("ids", &self.plugins.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl SliPluginRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a producer under its declared id.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Plugin`](Error::Plugin) when the id is empty or a
    /// producer is already registered under it.
    pub fn register(&mut self, plugin: Arc<dyn SliPlugin>) -> Result<(), Error> {
        let id = plugin.id().to_owned();
        if id.trim().is_empty() {
            return Err(Error::plugin("plugin id cannot be empty"));
        }
        if id.chars().any(char::is_whitespace) {
            return Err(Error::plugin(format!("plugin id {id:?} cannot contain whitespace")));
        }
        if self.plugins.contains_key(&id) {
            return Err(Error::plugin(format!("plugin {id:?} is already registered")));
        }

        debug!("registered SLI plugin {}", id);
        self.plugins.insert(id, plugin);
        Ok(())
    }

    /// Looks up a producer by id.
    pub fn get(&self, id: &str) -> Option<&Arc<dyn SliPlugin>> {
        self.plugins.get(id)
    }

    /// Returns the number of registered producers.
    pub fn len(&self) -> usize {
        self.plugins.len()
    }

    /// Returns `true` when no producer is registered.
    pub fn is_empty(&self) -> bool {
        self.plugins.is_empty()
    }

    /// Discovers manifest plugins under the provided directories.
    ///
    /// Every directory is scanned recursively; each `plugin.yaml` (or
    /// `plugin.yml`) file declares exactly one producer. Returns the number
    /// of producers registered.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Plugin`](Error::Plugin) when a directory cannot be
    /// read, a manifest fails to parse, or two manifests declare the same id.
    pub fn discover(&mut self, dirs: &[PathBuf]) -> Result<usize, Error> {
        let mut manifests = Vec::new();
        for dir in dirs {
            collect_manifests(dir, &mut manifests)?;
        }
        manifests.sort();

        let mut registered = 0;
        for path in manifests {
            let plugin = TemplatedSliPlugin::from_file(&path)?;
            self.register(Arc::new(plugin)).map_err(|error| {
                Error::plugin(format!("{} (manifest {})", error.to_display_string(), path.display()))
            })?;
            registered += 1;
        }

        info!("discovered {} SLI plugin(s)", registered);
        Ok(registered)
    }
}

fn collect_manifests(dir: &Path, manifests: &mut Vec<PathBuf>) -> Result<(), Error> {
    let entries = fs::read_dir(dir).map_err(|source| {
        Error::plugin(format!("could not read plugin directory {}: {source}", dir.display()))
    })?;

    for entry in entries {
        let entry = entry.map_err(|source| {
            Error::plugin(format!("could not read plugin directory {}: {source}", dir.display()))
        })?;
        let path = entry.path();
        if path.is_dir() {
            collect_manifests(&path, manifests)?;
            continue;
        }

        let is_manifest = path
            .file_name()
            .and_then(|name| name.to_str())
            .is_some_and(|name| MANIFEST_FILE_NAMES.contains(&name));
        if is_manifest {
            manifests.push(path);
        }
    }

    Ok(())
}

/// Raw manifest document describing one templated producer.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct PluginManifest {
    /// Stable id the producer registers under.
    id:  String,
    /// The SLI template the producer yields.
    sli: ManifestSli
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
struct ManifestSli {
    #[serde(default)]
    events: Option<ManifestEvents>,
    #[serde(default)]
    raw:    Option<ManifestRaw>,
    #[serde(default)]
    plugin: Option<ManifestPluginRef>
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
struct ManifestEvents {
    good_query:  String,
    total_query: String
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
struct ManifestRaw {
    error_ratio_query: String
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
struct ManifestPluginRef {
    id:      String,
    #[serde(default)]
    options: BTreeMap<String, String>
}

impl ManifestSli {
    fn into_sli(self, manifest_id: &str) -> Result<Sli, Error> {
        match (self.events, self.raw, self.plugin) {
            (Some(events), None, None) => Ok(Sli::Events(SliEvents {
                good_query:  events.good_query,
                total_query: events.total_query
            })),
            (None, Some(raw), None) => Ok(Sli::Raw(SliRaw {
                error_ratio_query: raw.error_ratio_query
            })),
            (None, None, Some(plugin)) => Ok(Sli::Plugin(SliPluginRef {
                id:      plugin.id,
                options: plugin.options
            })),
            _ => Err(Error::plugin(format!(
                "plugin {manifest_id:?} must declare exactly one of events, raw or plugin"
            )))
        }
    }
}

/// Manifest-backed producer that substitutes options and SLO metadata into
/// its query templates.
#[derive(Debug, Clone)]
pub struct TemplatedSliPlugin {
    id:  String,
    sli: Sli
}

impl TemplatedSliPlugin {
    /// Loads a producer from a manifest file.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Plugin`](Error::Plugin) when the file cannot be read
    /// or the manifest is malformed.
    pub fn from_file(path: &Path) -> Result<Self, Error> {
        let contents = fs::read_to_string(path).map_err(|source| {
            Error::plugin(format!("could not read plugin manifest {}: {source}", path.display()))
        })?;
        Self::from_manifest(&contents).map_err(|error| {
            Error::plugin(format!("{} (manifest {})", error.to_display_string(), path.display()))
        })
    }

    /// Parses a producer from manifest contents.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Plugin`](Error::Plugin) when the YAML is invalid or
    /// the SLI declaration is not exactly one variant.
    pub fn from_manifest(contents: &str) -> Result<Self, Error> {
        let manifest: PluginManifest = serde_yaml::from_str(contents)
            .map_err(|source| Error::plugin(format!("invalid plugin manifest: {source}")))?;
        let sli = manifest.sli.into_sli(&manifest.id)?;

        Ok(Self {
            id: manifest.id,
            sli
        })
    }
}

impl SliPlugin for TemplatedSliPlugin {
    fn id(&self) -> &str {
        &self.id
    }

    fn produce(&self, request: &PluginRequest<'_>) -> Result<Sli, Error> {
        let sli = match &self.sli {
            Sli::Events(events) => Sli::Events(SliEvents {
                good_query:  substitute(&self.id, &events.good_query, request)?,
                total_query: substitute(&self.id, &events.total_query, request)?
            }),
            Sli::Raw(raw) => Sli::Raw(SliRaw {
                error_ratio_query: substitute(&self.id, &raw.error_ratio_query, request)?
            }),
            Sli::Plugin(chained) => {
                let mut options = BTreeMap::new();
                for (key, value) in &chained.options {
                    options.insert(key.clone(), substitute(&self.id, value, request)?);
                }
                Sli::Plugin(SliPluginRef {
                    id: chained.id.clone(),
                    options
                })
            }
        };

        Ok(sli)
    }
}

/// Substitutes `{{.options.<key>}}` and SLO metadata placeholders into a
/// query template, leaving `{{.window}}` untouched.
fn substitute(plugin_id: &str, template: &str, request: &PluginRequest<'_>) -> Result<String, Error> {
    let mut rendered = template.to_owned();
    for (key, value) in request.options {
        rendered = rendered.replace(&format!("{{{{.options.{key}}}}}"), value);
    }
    rendered = rendered.replace("{{.service}}", request.meta.service);
    rendered = rendered.replace("{{.slo}}", request.meta.slo);
    rendered = rendered.replace("{{.objective}}", &request.meta.objective.to_string());

    if let Some(position) = rendered.find("{{.options.") {
        let tail = &rendered[position..];
        let placeholder = tail.split_once("}}").map_or(tail, |(head, _)| head);
        return Err(Error::plugin(format!(
            "plugin {plugin_id:?}: unresolved option placeholder {placeholder}}}}}"
        )));
    }

    Ok(rendered)
}
