use crate::runtime::Runtime;
use anyhow::{Context, Result, anyhow};
use log::{debug, info};
use std::io::{Cursor, Read};
use std::path::{Path, PathBuf};
use zip::ZipArchive;

/// Staging directory created inside the target while unpacking.
const STAGING_DIR: &str = ".skelly-unpack";

/// Verifies and unpacks `.zip` template packages.
pub struct ZipExtractor;

impl ZipExtractor {
    /// Check that `archive_path` is a readable zip with at least one entry.
    /// Returns the number of entries.
    #[tracing::instrument(skip(self, runtime))]
    pub fn verify<R: Runtime + ?Sized>(&self, runtime: &R, archive_path: &Path) -> Result<usize> {
        let archive = open_archive(runtime, archive_path)?;
        if archive.len() == 0 {
            return Err(anyhow!("Archive {} is empty", archive_path.display()));
        }
        Ok(archive.len())
    }

    /// Unpack `archive_path` into `extract_to`, which must exist.
    ///
    /// When every entry lives under one top-level directory, that directory's
    /// contents are placed directly in `extract_to`.
    #[tracing::instrument(skip(self, runtime))]
    pub fn extract<R: Runtime + ?Sized>(
        &self,
        runtime: &R,
        archive_path: &Path,
        extract_to: &Path,
    ) -> Result<()> {
        debug!("Extracting zip archive to {:?}...", extract_to);
        let mut archive = open_archive(runtime, archive_path)?;

        let staging = extract_to.join(STAGING_DIR);
        if runtime.exists(&staging) {
            runtime.remove_dir_all(&staging)?;
        }
        runtime.create_dir_all(&staging)?;

        let result = unpack_entries(runtime, &mut archive, &staging)
            .and_then(|_| promote(runtime, &staging, extract_to));

        if runtime.exists(&staging)
            && let Err(e) = runtime.remove_dir_all(&staging)
        {
            debug!("Failed to remove staging directory {:?}: {}", staging, e);
        }
        result?;

        info!("Extraction complete.");
        Ok(())
    }
}

fn open_archive<R: Runtime + ?Sized>(
    runtime: &R,
    archive_path: &Path,
) -> Result<ZipArchive<Cursor<Vec<u8>>>> {
    let mut reader = runtime
        .open(archive_path)
        .with_context(|| format!("Failed to open archive at {:?}", archive_path))?;

    // ZipArchive needs Seek; Runtime::open only gives Read
    let mut buffer = Vec::new();
    reader
        .read_to_end(&mut buffer)
        .with_context(|| format!("Failed to read archive {:?}", archive_path))?;

    ZipArchive::new(Cursor::new(buffer))
        .with_context(|| format!("Failed to parse ZIP archive {:?}", archive_path))
}

fn unpack_entries<R: Runtime + ?Sized>(
    runtime: &R,
    archive: &mut ZipArchive<Cursor<Vec<u8>>>,
    staging: &Path,
) -> Result<()> {
    for i in 0..archive.len() {
        let mut entry = archive
            .by_index(i)
            .with_context(|| format!("Failed to read ZIP entry {}", i))?;

        let entry_path = match entry.enclosed_name() {
            Some(path) => path.to_path_buf(),
            None => {
                debug!("Skipping entry with unsafe path {:?}", entry.name());
                continue;
            }
        };

        let full_path = staging.join(&entry_path);

        if entry.is_dir() {
            runtime.create_dir_all(&full_path)?;
            continue;
        }

        if let Some(parent) = full_path.parent() {
            runtime.create_dir_all(parent)?;
        }
        let mut dest_file = runtime.create_file(&full_path)?;
        std::io::copy(&mut entry, &mut dest_file)
            .with_context(|| format!("Failed to extract file {:?}", full_path))?;

        #[cfg(unix)]
        if let Some(mode) = entry.unix_mode()
            && let Err(e) = runtime.set_permissions(&full_path, mode)
        {
            debug!("Failed to set permissions on {:?}: {}", full_path, e);
        }
    }
    Ok(())
}

/// Move the staged contents into place, unwrapping a single top-level
/// directory.
fn promote<R: Runtime + ?Sized>(runtime: &R, staging: &Path, extract_to: &Path) -> Result<()> {
    let entries = runtime
        .read_dir(staging)
        .context("Failed to read staging directory")?;

    let source_dir: PathBuf = match entries.as_slice() {
        [] => return Err(anyhow!("Archive appears to be empty.")),
        [single] if runtime.is_dir(single) => single.clone(),
        _ => staging.to_path_buf(),
    };

    debug!("Moving contents from {:?} to {:?}", source_dir, extract_to);
    for item in runtime.read_dir(&source_dir)? {
        let name = item
            .file_name()
            .with_context(|| format!("Invalid entry {:?}", item))?;
        runtime.rename(&item, &extract_to.join(name))?;
    }
    Ok(())
}
