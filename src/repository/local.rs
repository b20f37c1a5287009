//! Repository laid out in a local directory (`file://` URLs).

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use log::debug;
use url::Url;

use super::{Catalogue, PackageListing, Repository, package_file_name};
use crate::package::PackageIdentifier;
use crate::runtime::Runtime;

pub struct LocalRepository<R: Runtime> {
    url: String,
    root: PathBuf,
    runtime: Arc<R>,
}

impl<R: Runtime> LocalRepository<R> {
    pub fn new(url: &Url, runtime: Arc<R>) -> Result<Self> {
        let root = url
            .to_file_path()
            .map_err(|_| anyhow::anyhow!("Invalid file URL: {}", url))?;
        Ok(Self {
            url: url.to_string(),
            root,
            runtime,
        })
    }

    fn read_json<T: serde::de::DeserializeOwned>(&self, path: &Path) -> Result<T> {
        let content = self.runtime.read_to_string(path)?;
        serde_json::from_str(&content).with_context(|| format!("Failed to parse {}", path.display()))
    }
}

#[async_trait]
impl<R: Runtime + 'static> Repository for LocalRepository<R> {
    fn url(&self) -> &str {
        &self.url
    }

    async fn list_packages(&self) -> Result<Vec<String>> {
        let index = self.root.join("index.json");
        if !self.runtime.exists(&index) {
            anyhow::bail!("Repository {} has no index.json", self.url);
        }
        let catalogue: Catalogue = self.read_json(&index)?;
        Ok(catalogue.packages)
    }

    async fn list_versions(&self, name: &str) -> Result<Option<PackageListing>> {
        if !self.runtime.is_dir(&self.root) {
            anyhow::bail!("Repository directory {} does not exist", self.root.display());
        }
        let path = self.root.join(name).join("versions.json");
        if !self.runtime.exists(&path) {
            debug!("{} not found", path.display());
            return Ok(None);
        }
        self.read_json(&path).map(Some)
    }

    async fn download(&self, id: &PackageIdentifier, dest: &Path) -> Result<u64> {
        let version = id
            .version()
            .with_context(|| format!("Cannot download unresolved template {}", id))?;
        let source = self
            .root
            .join(id.name())
            .join(package_file_name(id.name(), version));
        copy_file(self.runtime.as_ref(), &source, dest)
    }
}

/// Copy a file through the runtime's streams.
pub(crate) fn copy_file<R: Runtime + ?Sized>(runtime: &R, source: &Path, dest: &Path) -> Result<u64> {
    let mut reader = runtime.open(source)?;
    let mut writer = runtime.create_file(dest)?;
    let bytes = std::io::copy(&mut reader, &mut writer)
        .with_context(|| format!("Failed to copy {} to {}", source.display(), dest.display()))?;
    writer.flush().context("Failed to flush copy")?;
    Ok(bytes)
}
