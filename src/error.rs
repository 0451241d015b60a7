#![allow(non_shorthand_field_patterns)]
#![doc = "Error handling primitives shared across the generator crate."]
// SPDX-FileCopyrightText: 2025 RAprogramm <andrey.rozanov.vl@gmail.com>
//
// SPDX-License-Identifier: MIT

//! The derive emitted by [`masterror::Error`] expands pattern matches that
//! trigger the `non_shorthand_field_patterns` lint. The lint is disabled for
//! the module to keep the generated implementations warning-free while still
//! exposing a thoroughly documented error surface for library consumers.

use std::path::{Path, PathBuf};

/// Unified error type returned by the spec loaders, the SLI compiler, the
/// rules generator and the CLI.
///
/// Each variant corresponds to one failure kind of the generation pipeline
/// and captures sufficient context for diagnostics, including the offending
/// SLO id where one exists. Instances are typically constructed through the
/// helper constructors or by converting from serde error types via the
/// provided `From` implementations.
#[derive(Debug, masterror::Error)]
pub enum Error {
    /// Wraps I/O errors that occur while reading specification files.
    #[error("failed to read specification from {path:?}: {source}")]
    Io {
        /// Location of the specification file.
        path:   PathBuf,
        /// Underlying I/O error.
        source: std::io::Error
    },
    /// YAML decoding or schema failure in a spec loader.
    #[error("failed to parse specification: {message}")]
    Parse {
        /// Human readable message describing the parse problem.
        message: String
    },
    /// Returned when a normalized SLO violates the model invariants.
    #[error("invalid SLO: {message}")]
    Validation {
        /// Human readable message describing the validation problem.
        message: String
    },
    /// SLI compilation failed for a specific SLO.
    #[error("could not compile SLI for SLO {slo_id:?}: {message}")]
    Compile {
        /// Identity of the SLO whose SLI failed to compile.
        slo_id:  String,
        /// Human readable message describing the compilation failure.
        message: String
    },
    /// Internal rule generation failure for a specific SLO.
    #[error("could not generate rules for SLO {slo_id:?}: {message}")]
    Generation {
        /// Identity of the SLO whose rules failed to generate.
        slo_id:  String,
        /// Human readable message describing the generation failure.
        message: String
    },
    /// Wraps serialization errors when writing generated rules.
    #[error("failed to encode generated output: {source}")]
    Encoding {
        /// Underlying serialization error.
        source: serde_yaml::Error
    },
    /// Plugin discovery or invocation failure.
    #[error("plugin error: {message}")]
    Plugin {
        /// Human readable message describing the plugin failure.
        message: String
    },
    /// Aggregate failure for a multi-SLO group.
    ///
    /// Generation continues past per-SLO failures; this variant collects
    /// every failed SLO so callers can report them all at once while still
    /// emitting the rules of the SLOs that succeeded.
    #[error("{message}")]
    Group {
        /// Pre-rendered summary naming every failed SLO.
        message:  String,
        /// Individual per-SLO failures in input order.
        failures: Vec<SloFailure>
    }
}

/// A single failed SLO inside an aggregate [`Error::Group`].
#[derive(Debug)]
pub struct SloFailure {
    /// Identity of the SLO that failed.
    pub slo_id: String,
    /// The failure itself.
    pub error:  Box<Error>
}

/// Failure kind discriminator mirroring the [`Error`] variants.
///
/// Callers that only need to branch on the category of a failure can use
/// [`Error::kind`] instead of matching the full variant payloads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Specification file could not be read.
    Io,
    /// YAML or schema failure in a loader.
    Parse,
    /// Invariant violation on the normalized model.
    Validation,
    /// SLI compilation failed.
    Compile,
    /// Internal generator failure.
    Generation,
    /// Output serialization failed.
    Encoding,
    /// Plugin discovery or invocation failure.
    Plugin,
    /// Aggregate failure for a multi-SLO group.
    Group
}

impl Error {
    /// Constructs a parse error from the provided displayable value.
    pub fn parse<M>(message: M) -> Self
    where
        M: Into<String>
    {
        Self::Parse {
            message: message.into()
        }
    }

    /// Constructs a validation error from the provided displayable value.
    pub fn validation<M>(message: M) -> Self
    where
        M: Into<String>
    {
        Self::Validation {
            message: message.into()
        }
    }

    /// Constructs a compile error scoped to the offending SLO id.
    pub fn compile<I, M>(slo_id: I, message: M) -> Self
    where
        I: Into<String>,
        M: Into<String>
    {
        Self::Compile {
            slo_id:  slo_id.into(),
            message: message.into()
        }
    }

    /// Constructs a generation error scoped to the offending SLO id.
    pub fn generation<I, M>(slo_id: I, message: M) -> Self
    where
        I: Into<String>,
        M: Into<String>
    {
        Self::Generation {
            slo_id:  slo_id.into(),
            message: message.into()
        }
    }

    /// Constructs a plugin error from the provided displayable value.
    pub fn plugin<M>(message: M) -> Self
    where
        M: Into<String>
    {
        Self::Plugin {
            message: message.into()
        }
    }

    /// Constructs an aggregate group error from per-SLO failures.
    ///
    /// The summary message lists every failed SLO id so the error remains
    /// useful when displayed as a single line.
    pub fn group(failures: Vec<SloFailure>) -> Self {
        let ids: Vec<&str> = failures.iter().map(|failure| failure.slo_id.as_str()).collect();
        Self::Group {
            message: format!(
                "rule generation failed for {} SLO(s): {}",
                failures.len(),
                ids.join(", ")
            ),
            failures
        }
    }

    /// Returns the failure kind discriminator for this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Io { .. } => ErrorKind::Io,
            Self::Parse { .. } => ErrorKind::Parse,
            Self::Validation { .. } => ErrorKind::Validation,
            Self::Compile { .. } => ErrorKind::Compile,
            Self::Generation { .. } => ErrorKind::Generation,
            Self::Encoding { .. } => ErrorKind::Encoding,
            Self::Plugin { .. } => ErrorKind::Plugin,
            Self::Group { .. } => ErrorKind::Group
        }
    }

    /// Formats the error for diagnostics without the variant name.
    ///
    /// This method is primarily intended for CLI contexts where the variant
    /// name does not add value to end users. The returned string matches the
    /// [`std::fmt::Display`] implementation.
    pub fn to_display_string(&self) -> String {
        format!("{self}")
    }
}

impl From<serde_yaml::Error> for Error {
    fn from(source: serde_yaml::Error) -> Self {
        Self::Parse {
            message: source.to_string()
        }
    }
}

/// Creates an [`Error::Io`] variant capturing the failing path and source.
pub fn io_error(path: &Path, source: std::io::Error) -> Error {
    Error::Io {
        path: path.to_path_buf(),
        source
    }
}

/// Creates an [`Error::Encoding`] variant from a serialization failure.
pub fn encoding_error(source: serde_yaml::Error) -> Error {
    Error::Encoding {
        source
    }
}
