//! Repository served over HTTP(S).

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use log::debug;
use url::Url;

use super::{Catalogue, PackageListing, Repository, join_url, package_file_name};
use crate::http::HttpClient;
use crate::package::PackageIdentifier;
use crate::runtime::Runtime;

pub struct HttpRepository<R: Runtime> {
    base_url: Url,
    http_client: HttpClient,
    runtime: Arc<R>,
}

impl<R: Runtime> HttpRepository<R> {
    pub fn new(base_url: Url, http_client: HttpClient, runtime: Arc<R>) -> Self {
        Self {
            base_url,
            http_client,
            runtime,
        }
    }
}

#[async_trait]
impl<R: Runtime + 'static> Repository for HttpRepository<R> {
    fn url(&self) -> &str {
        self.base_url.as_str()
    }

    async fn list_packages(&self) -> Result<Vec<String>> {
        let url = join_url(&self.base_url, &["index.json"]);
        debug!("Fetching catalogue from {}...", url);
        let catalogue: Catalogue = self.http_client.get_json(&url).await?;
        Ok(catalogue.packages)
    }

    async fn list_versions(&self, name: &str) -> Result<Option<PackageListing>> {
        let url = join_url(&self.base_url, &[name, "versions.json"]);
        debug!("Fetching versions of {} from {}...", name, url);
        self.http_client.get_json_optional(&url).await
    }

    async fn download(&self, id: &PackageIdentifier, dest: &Path) -> Result<u64> {
        let version = id
            .version()
            .with_context(|| format!("Cannot download unresolved template {}", id))?;
        let url = join_url(
            &self.base_url,
            &[id.name(), &package_file_name(id.name(), version)],
        );
        debug!("Downloading {} from {}...", id, url);

        let runtime = self.runtime.clone();
        self.http_client
            .download_file(&url, move || {
                runtime
                    .create_file(dest)
                    .with_context(|| format!("Failed to create {}", dest.display()))
            })
            .await
    }
}
