//! File system operations (read, write, directory, permissions).

use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};

use super::RealRuntime;

impl RealRuntime {
    #[tracing::instrument(skip(self, contents))]
    pub(crate) fn write_impl(&self, path: &Path, contents: &[u8]) -> Result<()> {
        fs::write(path, contents)
            .with_context(|| format!("Failed to write to {}", path.display()))?;
        Ok(())
    }

    #[tracing::instrument(skip(self))]
    pub(crate) fn read_to_string_impl(&self, path: &Path) -> Result<String> {
        fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))
    }

    #[tracing::instrument(skip(self))]
    pub(crate) fn rename_impl(&self, from: &Path, to: &Path) -> Result<()> {
        fs::rename(from, to).with_context(|| {
            format!("Failed to rename {} to {}", from.display(), to.display())
        })?;
        Ok(())
    }

    #[tracing::instrument(skip(self))]
    pub(crate) fn create_dir_all_impl(&self, path: &Path) -> Result<()> {
        fs::create_dir_all(path)
            .with_context(|| format!("Failed to create directory {}", path.display()))?;
        Ok(())
    }

    #[tracing::instrument(skip(self))]
    pub(crate) fn remove_file_impl(&self, path: &Path) -> Result<()> {
        fs::remove_file(path).with_context(|| format!("Failed to remove {}", path.display()))?;
        Ok(())
    }

    #[tracing::instrument(skip(self))]
    pub(crate) fn remove_dir_all_impl(&self, path: &Path) -> Result<()> {
        fs::remove_dir_all(path)
            .with_context(|| format!("Failed to remove directory {}", path.display()))?;
        Ok(())
    }

    #[tracing::instrument(skip(self))]
    pub(crate) fn exists_impl(&self, path: &Path) -> bool {
        path.exists()
    }

    #[tracing::instrument(skip(self))]
    pub(crate) fn is_dir_impl(&self, path: &Path) -> bool {
        path.is_dir()
    }

    #[tracing::instrument(skip(self))]
    pub(crate) fn read_dir_impl(&self, path: &Path) -> Result<Vec<PathBuf>> {
        fs::read_dir(path)
            .with_context(|| format!("Failed to list {}", path.display()))?
            .map(|entry| Ok(entry?.path()))
            .collect()
    }

    #[tracing::instrument(skip(self))]
    pub(crate) fn create_file_impl(&self, path: &Path) -> Result<Box<dyn std::io::Write + Send>> {
        let file = fs::File::create(path)
            .with_context(|| format!("Failed to create {}", path.display()))?;
        Ok(Box::new(file))
    }

    #[tracing::instrument(skip(self))]
    pub(crate) fn open_impl(&self, path: &Path) -> Result<Box<dyn std::io::Read + Send>> {
        let file =
            fs::File::open(path).with_context(|| format!("Failed to open {}", path.display()))?;
        Ok(Box::new(file))
    }

    #[tracing::instrument(skip(self))]
    pub(crate) fn set_permissions_impl(&self, path: &Path, mode: u32) -> Result<()> {
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let permissions = fs::Permissions::from_mode(mode);
            fs::set_permissions(path, permissions).context("Failed to set permissions")?;
        }
        #[cfg(not(unix))]
        {
            let _ = (path, mode);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::runtime::{RealRuntime, Runtime};
    use std::io::{Read, Write};
    use tempfile::tempdir;

    #[test]
    fn test_real_runtime_file_ops() {
        let runtime = RealRuntime;
        let dir = tempdir().unwrap();
        let file_path = dir.path().join("versions.json");

        runtime.write(&file_path, b"{}").unwrap();
        assert!(runtime.exists(&file_path));
        assert_eq!(runtime.read_to_string(&file_path).unwrap(), "{}");

        let new_path = dir.path().join("renamed.json");
        runtime.rename(&file_path, &new_path).unwrap();
        assert!(!runtime.exists(&file_path));
        assert!(runtime.exists(&new_path));

        runtime.remove_file(&new_path).unwrap();
        assert!(!runtime.exists(&new_path));
    }

    #[test]
    fn test_real_runtime_dir_ops() {
        let runtime = RealRuntime;
        let dir = tempdir().unwrap();
        let sub_dir = dir.path().join("foo/nested");

        runtime.create_dir_all(&sub_dir).unwrap();
        assert!(runtime.is_dir(&sub_dir));

        let parent = dir.path().join("foo");
        let entries = runtime.read_dir(&parent).unwrap();
        assert_eq!(entries.len(), 1);
        assert!(entries[0].ends_with("nested"));

        runtime.remove_dir_all(&parent).unwrap();
        assert!(!runtime.exists(&parent));
    }

    #[test]
    fn test_real_runtime_create_file_and_open() {
        let runtime = RealRuntime;
        let dir = tempdir().unwrap();
        let file_path = dir.path().join("stream.part");

        {
            let mut writer = runtime.create_file(&file_path).unwrap();
            writer.write_all(b"streamed content").unwrap();
        }

        let mut reader = runtime.open(&file_path).unwrap();
        let mut content = String::new();
        reader.read_to_string(&mut content).unwrap();
        assert_eq!(content, "streamed content");
    }

    #[cfg(unix)]
    #[test]
    fn test_real_runtime_set_permissions() {
        use std::os::unix::fs::PermissionsExt;

        let runtime = RealRuntime;
        let dir = tempdir().unwrap();
        let script = dir.path().join("post-install.sh");
        runtime.write(&script, b"#!/bin/sh\n").unwrap();

        runtime.set_permissions(&script, 0o755).unwrap();
        let mode = std::fs::metadata(&script).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o755);
    }

    #[test]
    fn test_real_runtime_errors() {
        let runtime = RealRuntime;
        let missing = std::path::Path::new("/nonexistent/path/file.txt");

        let err = runtime.read_to_string(missing).unwrap_err();
        assert!(err.to_string().contains("/nonexistent/path/file.txt"));
        assert!(runtime.remove_file(missing).is_err());
        assert!(runtime.read_dir(missing).is_err());
    }
}
