//! Typed failures surfaced by resolution, configuration and scripting.
//!
//! Plumbing failures (I/O, HTTP, JSON) travel as `anyhow::Error`; the kinds
//! below are the ones callers dispatch on. They survive being wrapped in
//! `anyhow` and are recovered with `downcast_ref::<Error>()`.

use std::path::PathBuf;

use crate::package::PackageIdentifier;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The name is unknown, or (with `version` set) the exact version is not
    /// in the package's index.
    #[error("{}", package_not_found_message(.name, .version))]
    PackageNotFound {
        name: String,
        version: Option<String>,
    },

    /// The name is registered but no version has been published.
    #[error("No versions of template '{name}' found")]
    NoVersionsFound { name: String },

    /// The identifier should exist but could not be materialized locally.
    #[error("{}", not_in_cache_message(.id, .source_location, .reason))]
    PackageNotInCache {
        id: PackageIdentifier,
        source_location: Option<String>,
        reason: String,
    },

    #[error("The configuration setting '{name}' is not recognized")]
    UnknownSetting { name: String },

    #[error("The value '{value}' for configuration setting '{name}' is invalid")]
    InvalidSetting { name: String, value: String },

    #[error("The post-install script {} failed", .script.display())]
    ScriptExecutionFailed {
        script: PathBuf,
        #[source]
        source: anyhow::Error,
    },

    #[error("The directory '{}' already exists and is not empty", .path.display())]
    FileAlreadyExists { path: PathBuf },
}

impl Error {
    pub fn package_not_found(name: impl Into<String>) -> Self {
        Error::PackageNotFound {
            name: name.into(),
            version: None,
        }
    }

    pub fn version_not_found(name: impl Into<String>, version: impl Into<String>) -> Self {
        Error::PackageNotFound {
            name: name.into(),
            version: Some(version.into()),
        }
    }

    pub fn invalid_setting(name: impl Into<String>, value: impl ToString) -> Self {
        Error::InvalidSetting {
            name: name.into(),
            value: value.to_string(),
        }
    }

    pub fn unknown_setting(name: impl Into<String>) -> Self {
        Error::UnknownSetting { name: name.into() }
    }
}

fn package_not_found_message(name: &str, version: &Option<String>) -> String {
    match version {
        Some(v) => format!("No version '{}' of template '{}' found", v, name),
        None => format!("No template found with name '{}'", name),
    }
}

fn not_in_cache_message(
    id: &PackageIdentifier,
    source: &Option<String>,
    reason: &str,
) -> String {
    match source {
        Some(url) => format!(
            "Template {} is not in the local cache and could not be fetched from {}: {}",
            id, url, reason
        ),
        None => format!(
            "Template {} is not in the local cache and could not be fetched: {}",
            id, reason
        ),
    }
}
