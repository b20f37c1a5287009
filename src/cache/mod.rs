//! Persistent local template cache.
//!
//! ```text
//! <root>/
//!   .tmp/                         in-flight downloads (*.part)
//!   <name>/versions.json          last listing seen for the package
//!   <name>/<name>-<version>.zip   cache entry
//! ```
//!
//! Entries only appear through [`PendingEntry::commit`], which verifies the
//! downloaded archive and renames it into place, so readers never see a
//! partial entry.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::{Context, Result};
use log::{debug, info, warn};

use crate::archive::ZipExtractor;
use crate::package::{PackageIdentifier, Version, VersionIndex};
use crate::repository::{PackageListing, package_file_name};
use crate::runtime::Runtime;

const TEMP_DIR: &str = ".tmp";
const MANIFEST_FILE: &str = "versions.json";

static TEMP_SEQUENCE: AtomicU64 = AtomicU64::new(0);

pub struct Cache<R: Runtime> {
    runtime: Arc<R>,
    root: PathBuf,
}

impl<R: Runtime> Cache<R> {
    pub fn new(runtime: Arc<R>, root: PathBuf) -> Self {
        Self { runtime, root }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Where the entry for a resolved identifier lives (whether or not it
    /// exists yet).
    pub fn entry_path(&self, id: &PackageIdentifier) -> Result<PathBuf> {
        let version = id
            .version()
            .with_context(|| format!("Template {} has no version", id))?;
        if !Version::is_file_safe(version) {
            anyhow::bail!("Invalid version '{}' of template '{}'", version, id.name());
        }
        Ok(self
            .package_dir(id.name())?
            .join(package_file_name(id.name(), version)))
    }

    /// Location of a cached entry, if present.
    #[tracing::instrument(skip(self))]
    pub fn lookup(&self, id: &PackageIdentifier) -> Option<PathBuf> {
        let path = self.entry_path(id).ok()?;
        if self.runtime.exists(&path) {
            debug!("Cache hit for {} at {:?}", id, path);
            Some(path)
        } else {
            debug!("Cache miss for {}", id);
            None
        }
    }

    /// The last listing recorded for `name`. An unreadable manifest is
    /// treated as absent.
    #[tracing::instrument(skip(self))]
    pub fn manifest(&self, name: &str) -> Result<Option<PackageListing>> {
        let path = self.package_dir(name)?.join(MANIFEST_FILE);
        if !self.runtime.exists(&path) {
            return Ok(None);
        }
        let content = self.runtime.read_to_string(&path)?;
        match serde_json::from_str::<PackageListing>(&content) {
            Ok(listing) => Ok(Some(listing)),
            Err(e) => {
                warn!("Ignoring unreadable cache manifest {:?}: {}", path, e);
                Ok(None)
            }
        }
    }

    /// Store a listing as the manifest of its package.
    #[tracing::instrument(skip(self, listing))]
    pub fn record_listing(&self, listing: &PackageListing) -> Result<()> {
        let dir = self.package_dir(&listing.name)?;
        self.runtime.create_dir_all(&dir)?;
        self.runtime.create_dir_all(&self.temp_dir())?;

        let json = serde_json::to_string_pretty(listing)?;
        let tmp_path = self.temp_path(&format!("{}.versions", listing.name));
        self.runtime.write(&tmp_path, json.as_bytes())?;
        if let Err(e) = self.runtime.rename(&tmp_path, &dir.join(MANIFEST_FILE)) {
            let _ = self.runtime.remove_file(&tmp_path);
            return Err(e);
        }
        debug!(
            "Recorded {} version(s) of {} in cache manifest",
            listing.versions.len(),
            listing.name
        );
        Ok(())
    }

    /// Start publishing the entry for `id`. Content is written to
    /// [`PendingEntry::temp_path`] and only becomes visible on commit.
    #[tracing::instrument(skip(self))]
    pub fn begin_publish(&self, id: &PackageIdentifier) -> Result<PendingEntry<'_, R>> {
        let entry_path = self.entry_path(id)?;
        self.runtime.create_dir_all(&self.temp_dir())?;

        let version = id.version().unwrap_or_default();
        let temp_path = self.temp_path(&format!("{}-{}", id.name(), version));
        debug!("Publishing {} via {:?}", id, temp_path);

        Ok(PendingEntry {
            runtime: self.runtime.as_ref(),
            id: id.clone(),
            temp_path,
            entry_path,
            committed: false,
        })
    }

    /// A fresh path under the cache's temp directory for downloads that are
    /// never published. The caller removes the file.
    pub fn scratch_path(&self, stem: &str) -> Result<PathBuf> {
        self.runtime.create_dir_all(&self.temp_dir())?;
        Ok(self.temp_path(stem))
    }

    /// Every cached package with the versions present on disk, by name.
    #[tracing::instrument(skip(self))]
    pub fn cached_packages(&self) -> Result<Vec<VersionIndex>> {
        if !self.runtime.is_dir(&self.root) {
            return Ok(Vec::new());
        }

        let mut packages = Vec::new();
        for dir in self.runtime.read_dir(&self.root)? {
            let Some(name) = dir.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            if name.starts_with('.') || !self.runtime.is_dir(&dir) {
                continue;
            }

            let prefix = format!("{}-", name);
            let versions: Vec<String> = self
                .runtime
                .read_dir(&dir)?
                .iter()
                .filter_map(|file| file.file_name().and_then(|n| n.to_str()))
                .filter_map(|file| file.strip_prefix(&prefix)?.strip_suffix(".zip"))
                .filter(|version| !version.is_empty())
                .map(String::from)
                .collect();

            if !versions.is_empty() {
                packages.push(VersionIndex::new(name, versions));
            }
        }
        packages.sort_by(|a, b| a.package_name().cmp(b.package_name()));
        Ok(packages)
    }

    /// Evict one package, or the whole cache when `name` is `None`.
    /// Returns whether anything was removed.
    #[tracing::instrument(skip(self))]
    pub fn clear(&self, name: Option<&str>) -> Result<bool> {
        let target = match name {
            Some(name) => self.package_dir(name)?,
            None => self.root.clone(),
        };
        if !self.runtime.exists(&target) {
            return Ok(false);
        }
        self.runtime.remove_dir_all(&target)?;
        info!("Removed {}", target.display());
        Ok(true)
    }

    fn package_dir(&self, name: &str) -> Result<PathBuf> {
        if name.is_empty()
            || name.starts_with('.')
            || name.contains(['/', '\\'])
            || Path::new(name).components().count() != 1
        {
            anyhow::bail!("Invalid template name '{}'", name);
        }
        Ok(self.root.join(name))
    }

    fn temp_dir(&self) -> PathBuf {
        self.root.join(TEMP_DIR)
    }

    /// A temp file name unique to this process and moment.
    fn temp_path(&self, stem: &str) -> PathBuf {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos())
            .unwrap_or_default();
        let seq = TEMP_SEQUENCE.fetch_add(1, Ordering::Relaxed);
        self.temp_dir().join(format!(
            "{}.{}.{}-{}.part",
            stem,
            std::process::id(),
            nanos,
            seq
        ))
    }
}

/// An entry being downloaded. Dropping it without [`PendingEntry::commit`]
/// removes the temp file.
pub struct PendingEntry<'c, R: Runtime> {
    runtime: &'c R,
    id: PackageIdentifier,
    temp_path: PathBuf,
    entry_path: PathBuf,
    committed: bool,
}

impl<R: Runtime> PendingEntry<'_, R> {
    pub fn temp_path(&self) -> &Path {
        &self.temp_path
    }

    /// Verify the downloaded archive and move it into place. An existing entry
    /// for the same identifier is replaced.
    #[tracing::instrument(skip(self), fields(id = %self.id))]
    pub fn commit(mut self) -> Result<PathBuf> {
        ZipExtractor
            .verify(self.runtime, &self.temp_path)
            .with_context(|| format!("Downloaded package for {} is not a valid archive", self.id))?;

        if let Some(parent) = self.entry_path.parent() {
            self.runtime.create_dir_all(parent)?;
        }
        self.runtime.rename(&self.temp_path, &self.entry_path)?;
        self.committed = true;

        info!("Cached {} at {}", self.id, self.entry_path.display());
        Ok(self.entry_path.clone())
    }
}

impl<R: Runtime> Drop for PendingEntry<'_, R> {
    fn drop(&mut self) {
        if self.committed || !self.runtime.exists(&self.temp_path) {
            return;
        }
        debug!("Discarding incomplete download {:?}", self.temp_path);
        if let Err(e) = self.runtime.remove_file(&self.temp_path) {
            warn!("Failed to remove {:?}: {}", self.temp_path, e);
        }
    }
}
