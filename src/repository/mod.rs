//! Remote template repositories.
//!
//! A repository is a base URL serving static files:
//!
//! - `{base}/index.json` - catalogue of package names
//! - `{base}/{name}/versions.json` - published versions of one package
//! - `{base}/{name}/{name}-{version}.zip` - the package itself
//!
//! `http`/`https` bases are served by [`HttpRepository`], `file` bases by
//! [`LocalRepository`].

mod http;
mod local;

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use log::warn;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::http::HttpClient;
use crate::package::{PackageIdentifier, Version, VersionIndex};
use crate::runtime::Runtime;

pub use http::HttpRepository;
pub use local::LocalRepository;

/// Contents of `{name}/versions.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PackageListing {
    pub name: String,
    #[serde(default)]
    pub versions: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner: Option<String>,
}

impl PackageListing {
    pub fn new<I, S>(name: impl Into<String>, versions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: name.into(),
            versions: versions.into_iter().map(Into::into).collect(),
            description: None,
            owner: None,
        }
    }

    /// The listed versions that can name a cache entry.
    pub fn index(&self) -> VersionIndex {
        let versions = self.versions.iter().filter(|version| {
            let safe = Version::is_file_safe(version);
            if !safe {
                warn!(
                    "Ignoring version '{}' of template '{}': not a valid file name",
                    version, self.name
                );
            }
            safe
        });
        VersionIndex::new(&self.name, versions)
    }
}

/// Contents of `index.json`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub(crate) struct Catalogue {
    #[serde(default)]
    pub packages: Vec<String>,
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Repository: Send + Sync {
    /// Base URL, for messages.
    fn url(&self) -> &str;

    /// All package names this repository publishes.
    async fn list_packages(&self) -> Result<Vec<String>>;

    /// The listing for `name`, or `None` if this repository does not know it.
    async fn list_versions(&self, name: &str) -> Result<Option<PackageListing>>;

    /// Write the package for a resolved identifier to `dest`. Returns the
    /// number of bytes written.
    async fn download(&self, id: &PackageIdentifier, dest: &Path) -> Result<u64>;
}

/// `{name}-{version}.zip`
pub fn package_file_name(name: &str, version: &str) -> String {
    format!("{}-{}.zip", name, version)
}

/// Join relative path segments onto a base URL, keeping the base's own path.
pub(crate) fn join_url(base: &Url, segments: &[&str]) -> String {
    let mut url = base.as_str().trim_end_matches('/').to_string();
    for segment in segments {
        url.push('/');
        url.push_str(segment);
    }
    url
}

/// Pick the implementation for a repository URL.
pub fn repository_for<R: Runtime + 'static>(
    url: &Url,
    http_client: &HttpClient,
    runtime: Arc<R>,
) -> Result<Arc<dyn Repository>> {
    match url.scheme() {
        "http" | "https" => Ok(Arc::new(HttpRepository::new(
            url.clone(),
            http_client.clone(),
            runtime,
        ))),
        "file" => Ok(Arc::new(LocalRepository::new(url, runtime)?)),
        scheme => anyhow::bail!("Unsupported repository URL scheme '{}' in {}", scheme, url),
    }
}

/// Download a package straight from a URL, bypassing any repository.
#[tracing::instrument(skip(runtime, http_client))]
pub async fn download_url<R: Runtime>(
    runtime: &R,
    http_client: &HttpClient,
    url: &Url,
    dest: &Path,
) -> Result<u64> {
    match url.scheme() {
        "file" => {
            let source = url
                .to_file_path()
                .map_err(|_| anyhow::anyhow!("Invalid file URL: {}", url))?;
            local::copy_file(runtime, &source, dest)
        }
        _ => {
            http_client
                .download_file(url.as_str(), || {
                    runtime
                        .create_file(dest)
                        .with_context(|| format!("Failed to create {}", dest.display()))
                })
                .await
        }
    }
}
