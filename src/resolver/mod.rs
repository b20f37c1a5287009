//! Resolution of a template name and optional exact version to a cached,
//! retrievable package.
//!
//! Precedence of failures: an unknown name beats an empty version set, which
//! beats a version missing from the index, which beats a failure to
//! materialize the package locally.

use std::path::PathBuf;
use std::sync::Arc;

use log::{debug, info, warn};

use crate::cache::Cache;
use crate::error::Error;
use crate::package::PackageIdentifier;
use crate::repository::{PackageListing, Repository};
use crate::runtime::Runtime;

/// A package present in the cache.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedPackage {
    pub id: PackageIdentifier,
    pub location: PathBuf,
}

/// Where a version index came from.
pub struct IndexSource {
    pub listing: PackageListing,
    /// The repository that published the listing, or `None` when it came from
    /// the cache manifest.
    pub repository: Option<Arc<dyn Repository>>,
}

pub struct Resolver<R: Runtime> {
    cache: Cache<R>,
    repositories: Vec<Arc<dyn Repository>>,
    offline: bool,
}

impl<R: Runtime> Resolver<R> {
    pub fn new(cache: Cache<R>, repositories: Vec<Arc<dyn Repository>>, offline: bool) -> Self {
        Self {
            cache,
            repositories,
            offline,
        }
    }

    pub fn cache(&self) -> &Cache<R> {
        &self.cache
    }

    pub fn repositories(&self) -> &[Arc<dyn Repository>] {
        &self.repositories
    }

    pub fn is_offline(&self) -> bool {
        self.offline
    }

    /// Resolve `name` (and an exact `version`, if given) to a cached package,
    /// fetching it when necessary.
    #[tracing::instrument(skip(self))]
    pub async fn resolve(
        &self,
        name: &str,
        version: Option<&str>,
    ) -> Result<ResolvedPackage, Error> {
        if let Some(version) = version {
            let id = PackageIdentifier::with_version(name, version);
            if let Some(location) = self.cache.lookup(&id) {
                debug!("Using cached {} without consulting any repository", id);
                return Ok(ResolvedPackage { id, location });
            }
        }

        let source = self.version_index(name, version).await?;
        let index = source.listing.index();

        let chosen = match (version, index.latest()) {
            (_, None) => {
                return Err(Error::NoVersionsFound {
                    name: name.to_string(),
                });
            }
            (Some(version), Some(_)) => index
                .find(version)
                .ok_or_else(|| Error::version_not_found(name, version))?,
            (None, Some(latest)) => latest,
        };

        let id = PackageIdentifier::with_version(name, chosen.as_str());
        info!("Resolved {} to {}", name, id);

        if let Some(location) = self.cache.lookup(&id) {
            return Ok(ResolvedPackage { id, location });
        }

        match source.repository {
            Some(repository) => self.fetch(repository.as_ref(), id).await,
            None => Err(Error::PackageNotInCache {
                id,
                source_location: None,
                reason: if self.offline {
                    "offline mode is enabled".to_string()
                } else {
                    "no repository could be reached".to_string()
                },
            }),
        }
    }

    /// Find the version index for `name`.
    ///
    /// Online, the first repository that knows the name wins and its listing
    /// is recorded in the cache manifest. When no repository knows it, the
    /// manifest is the fallback. Offline, the manifest is the only source.
    /// `constraint` only shapes the error when nothing can be consulted.
    #[tracing::instrument(skip(self))]
    pub async fn version_index(
        &self,
        name: &str,
        constraint: Option<&str>,
    ) -> Result<IndexSource, Error> {
        if self.offline {
            debug!("Offline: reading versions of {} from the cache manifest", name);
            return match self.manifest(name) {
                Some(listing) => Ok(IndexSource {
                    listing,
                    repository: None,
                }),
                None => Err(Error::package_not_found(name)),
            };
        }

        let mut unreachable: Vec<(String, anyhow::Error)> = Vec::new();
        for repository in &self.repositories {
            match repository.list_versions(name).await {
                Ok(Some(mut listing)) => {
                    debug!("{} knows {}", repository.url(), name);
                    listing.name = name.to_string();
                    if let Err(e) = self.cache.record_listing(&listing) {
                        warn!("Failed to record versions of {} in cache: {:#}", name, e);
                    }
                    return Ok(IndexSource {
                        listing,
                        repository: Some(repository.clone()),
                    });
                }
                Ok(None) => debug!("{} does not know {}", repository.url(), name),
                Err(e) => {
                    warn!("Repository {} is unreachable: {:#}", repository.url(), e);
                    unreachable.push((repository.url().to_string(), e));
                }
            }
        }

        if let Some(listing) = self.manifest(name) {
            info!("Using cached versions of {}", name);
            return Ok(IndexSource {
                listing,
                repository: None,
            });
        }

        match unreachable.into_iter().next() {
            None => Err(Error::package_not_found(name)),
            Some((url, e)) => Err(Error::PackageNotInCache {
                id: PackageIdentifier::from_parts(name, constraint),
                source_location: Some(url),
                reason: format!("{:#}", e),
            }),
        }
    }

    fn manifest(&self, name: &str) -> Option<PackageListing> {
        match self.cache.manifest(name) {
            Ok(listing) => listing,
            Err(e) => {
                warn!("Failed to read cached versions of {}: {:#}", name, e);
                None
            }
        }
    }

    /// Download `id` from `repository` and publish it into the cache. A
    /// single attempt; any failure leaves the cache unchanged.
    async fn fetch(
        &self,
        repository: &dyn Repository,
        id: PackageIdentifier,
    ) -> Result<ResolvedPackage, Error> {
        let not_in_cache = |id: &PackageIdentifier, e: anyhow::Error| Error::PackageNotInCache {
            id: id.clone(),
            source_location: Some(repository.url().to_string()),
            reason: format!("{:#}", e),
        };

        info!("Downloading {} from {}...", id, repository.url());
        let pending = self
            .cache
            .begin_publish(&id)
            .map_err(|e| not_in_cache(&id, e))?;

        repository
            .download(&id, pending.temp_path())
            .await
            .map_err(|e| not_in_cache(&id, e))?;

        let location = pending.commit().map_err(|e| not_in_cache(&id, e))?;
        Ok(ResolvedPackage { id, location })
    }
}
