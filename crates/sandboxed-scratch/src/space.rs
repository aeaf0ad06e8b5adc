//! Core scratch space implementation.

use crate::{
    error::{Result, ScratchError},
    security::{
        set_secure_permissions, validate_entry_name, validate_namespace,
        validate_path_within_root,
    },
};

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::{
    io::ErrorKind,
    path::{Path, PathBuf},
};
use tokio::fs;

/// Information about one entry in the scratch space.
#[derive(Debug, Clone, Serialize)]
pub struct EntryInfo {
    pub name: String,
    pub file_path: PathBuf,
    pub size_bytes: u64,
    pub modified_at: Option<DateTime<Utc>>,
}

/// A sandboxed scratch directory.
///
/// Cloning is cheap; clones refer to the same root on disk.
#[derive(Clone, Debug)]
pub struct ScratchSpace {
    root: PathBuf,
    secure_permissions: bool,
}

impl ScratchSpace {
    /// Create a new builder for configuring the scratch space.
    #[must_use]
    pub fn builder() -> ScratchSpaceBuilder {
        ScratchSpaceBuilder::new()
    }

    /// The directory holding the entries (base directory plus namespace).
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Create the root directory if it does not exist yet.
    ///
    /// Safe to call concurrently from several tasks or processes: whoever loses the race
    /// finds the directory already present and succeeds too.
    ///
    /// # Errors
    /// Returns an error if the directory cannot be created or secured.
    pub async fn provision(&self) -> Result<()> {
        match fs::create_dir_all(&self.root).await {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::AlreadyExists && self.root.is_dir() => {}
            Err(e) => {
                return Err(ScratchError::DirectoryCreation {
                    path: self.root.clone(),
                    source: e,
                });
            }
        }

        if self.secure_permissions {
            set_secure_permissions(&self.root).await?;
        }

        tracing::trace!("Scratch root provisioned: {}", self.root.display());
        Ok(())
    }

    /// Write an entry, replacing any previous content atomically.
    ///
    /// Provisions the root first. The content goes to a hidden temp file in the same
    /// directory and is renamed over the target, so a concurrent `read` sees either the
    /// old entry, the new one, or `NotFound`, never a partial write.
    ///
    /// # Errors
    /// Returns an error if the name is invalid, provisioning fails or the write fails.
    pub async fn write<P: AsRef<str>, C: AsRef<[u8]>>(&self, name: P, contents: C) -> Result<u64> {
        let name = name.as_ref();
        let target = self.validate_and_get_path(name)?;
        self.provision().await?;

        if let Some(parent) = target.parent()
            && parent != self.root
        {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| ScratchError::DirectoryCreation {
                    path: parent.to_path_buf(),
                    source: e,
                })?;
        }
        validate_path_within_root(&target, &self.root)?;

        let file_name = target
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("entry");
        let temp_path = target.with_file_name(format!(
            ".{file_name}.{}.tmp",
            uuid::Uuid::new_v4().simple()
        ));

        let contents = contents.as_ref();
        fs::write(&temp_path, contents)
            .await
            .map_err(|e| ScratchError::io(&temp_path, e))?;

        if let Err(e) = fs::rename(&temp_path, &target).await {
            if let Err(cleanup) = fs::remove_file(&temp_path).await {
                tracing::warn!(
                    "Failed to remove temp file {}: {}",
                    temp_path.display(),
                    cleanup
                );
            }
            return Err(ScratchError::io(&target, e));
        }

        tracing::debug!(
            "Scratch entry written name={} bytes={}",
            name,
            contents.len()
        );
        Ok(contents.len() as u64)
    }

    /// Read an entry's full content.
    ///
    /// # Errors
    /// Returns `ScratchError::NotFound` if the entry (or the whole root) is absent.
    pub async fn read<P: AsRef<str>>(&self, name: P) -> Result<Vec<u8>> {
        let name = name.as_ref();
        let path = self.validate_and_get_path(name)?;
        validate_path_within_root(&path, &self.root)?;

        match fs::read(&path).await {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == ErrorKind::NotFound => Err(ScratchError::NotFound {
                name: name.to_string(),
            }),
            Err(e) => Err(ScratchError::io(path, e)),
        }
    }

    /// Check whether an entry exists.
    ///
    /// # Errors
    /// Returns an error if the name is invalid or the check itself fails.
    pub async fn exists<P: AsRef<str>>(&self, name: P) -> Result<bool> {
        let path = self.validate_and_get_path(name.as_ref())?;
        fs::try_exists(&path)
            .await
            .map_err(|e| ScratchError::io(path, e))
    }

    /// Remove one entry.
    ///
    /// # Errors
    /// Returns `ScratchError::NotFound` if the entry is absent.
    pub async fn remove<P: AsRef<str>>(&self, name: P) -> Result<()> {
        let name = name.as_ref();
        let path = self.validate_and_get_path(name)?;
        validate_path_within_root(&path, &self.root)?;

        match fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Err(ScratchError::NotFound {
                name: name.to_string(),
            }),
            Err(e) => Err(ScratchError::io(path, e)),
        }
    }

    /// List the files directly under the root, sorted by name.
    ///
    /// In-flight temp files are hidden. An unprovisioned root lists as empty.
    ///
    /// # Errors
    /// Returns an error if the directory cannot be read.
    pub async fn list(&self) -> Result<Vec<EntryInfo>> {
        let mut entries = match fs::read_dir(&self.root).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(ScratchError::io(&self.root, e)),
        };

        let mut listed = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| ScratchError::io(&self.root, e))?
        {
            let file_path = entry.path();
            let Some(name) = file_path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            if name.starts_with('.') {
                continue;
            }
            let metadata = entry
                .metadata()
                .await
                .map_err(|e| ScratchError::io(&file_path, e))?;
            if !metadata.is_file() {
                continue;
            }

            listed.push(EntryInfo {
                name: name.to_string(),
                size_bytes: metadata.len(),
                modified_at: metadata.modified().ok().map(DateTime::<Utc>::from),
                file_path: file_path.clone(),
            });
        }

        listed.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(listed)
    }

    /// Remove the root and everything in it.
    ///
    /// Returns `false` if there was nothing to remove. A later `write` provisions the
    /// root again.
    ///
    /// # Errors
    /// Returns an error if the removal fails for any reason other than absence.
    pub async fn purge(&self) -> Result<bool> {
        match fs::remove_dir_all(&self.root).await {
            Ok(()) => {
                tracing::debug!("Scratch root purged: {}", self.root.display());
                Ok(true)
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(ScratchError::io(&self.root, e)),
        }
    }

    fn validate_and_get_path(&self, name: &str) -> Result<PathBuf> {
        let relative = validate_entry_name(name)?;
        Ok(self.root.join(relative))
    }
}

/// Builder for configuring a `ScratchSpace`.
pub struct ScratchSpaceBuilder {
    base_directory: Option<PathBuf>,
    namespace: Option<String>,
    secure_permissions: bool,
}

impl ScratchSpaceBuilder {
    fn new() -> Self {
        Self {
            base_directory: None,
            namespace: None,
            secure_permissions: true,
        }
    }

    /// Set the base directory for the scratch space.
    #[must_use]
    pub fn base_directory<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.base_directory = Some(path.into());
        self
    }

    /// Place the root in a single-segment subdirectory of the base directory.
    #[must_use]
    pub fn namespace<S: Into<String>>(mut self, namespace: S) -> Self {
        self.namespace = Some(namespace.into());
        self
    }

    /// Apply 0700 permissions to the root when provisioning (Unix only). Default: on.
    #[must_use]
    pub fn secure_permissions(mut self, enabled: bool) -> Self {
        self.secure_permissions = enabled;
        self
    }

    /// Build the `ScratchSpace`. Nothing is created on disk.
    ///
    /// # Errors
    /// Returns an error if the base directory is missing or the namespace is invalid.
    pub fn build(self) -> Result<ScratchSpace> {
        let base_dir = self
            .base_directory
            .ok_or_else(|| ScratchError::Configuration {
                message: "Base directory is required".to_string(),
            })?;

        let root = match self.namespace {
            Some(namespace) => {
                validate_namespace(&namespace)?;
                base_dir.join(namespace)
            }
            None => base_dir,
        };

        tracing::debug!(
            "ScratchSpace configured - root: {:?}, secure_permissions: {}",
            root,
            self.secure_permissions
        );

        Ok(ScratchSpace {
            root,
            secure_permissions: self.secure_permissions,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    type TestResult = std::result::Result<(), Box<dyn std::error::Error>>;

    fn scratch_in(dir: &Path) -> ScratchSpace {
        ScratchSpace::builder()
            .base_directory(dir.join("tmp"))
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn test_write_then_read() -> TestResult {
        let temp_dir = tempfile::tempdir()?;
        let scratch = scratch_in(temp_dir.path());

        let written = scratch.write("data_vids.csv", "a,b\n1,2\n").await?;
        assert_eq!(written, 8);
        assert_eq!(scratch.read("data_vids.csv").await?, b"a,b\n1,2\n");
        assert!(scratch.exists("data_vids.csv").await?);
        Ok(())
    }

    #[tokio::test]
    async fn test_build_is_lazy() -> TestResult {
        let temp_dir = tempfile::tempdir()?;
        let scratch = scratch_in(temp_dir.path());

        assert!(!scratch.root().exists());
        assert!(scratch.list().await?.is_empty());

        scratch.write("first.csv", "x").await?;
        assert!(scratch.root().is_dir());
        Ok(())
    }

    #[tokio::test]
    async fn test_read_missing_is_not_found() -> TestResult {
        let temp_dir = tempfile::tempdir()?;
        let scratch = scratch_in(temp_dir.path());

        let err = scratch.read("missing.csv").await.unwrap_err();
        assert!(err.is_not_found(), "unexpected error: {err}");

        scratch.write("other.csv", "x").await?;
        let err = scratch.read("missing.csv").await.unwrap_err();
        assert!(err.is_not_found(), "unexpected error: {err}");
        Ok(())
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_first_writes_all_provision() -> TestResult {
        let temp_dir = tempfile::tempdir()?;
        let scratch = scratch_in(temp_dir.path());

        let mut handles = Vec::new();
        for i in 0..8 {
            let scratch = scratch.clone();
            handles.push(tokio::spawn(async move {
                scratch.write(format!("entry_{i}.csv"), format!("{i}")).await
            }));
        }
        for handle in handles {
            handle.await??;
        }

        assert_eq!(scratch.list().await?.len(), 8);
        Ok(())
    }

    #[tokio::test]
    async fn test_purge_is_idempotent_and_root_reprovisions() -> TestResult {
        let temp_dir = tempfile::tempdir()?;
        let scratch = scratch_in(temp_dir.path());

        assert!(!scratch.purge().await?);

        scratch.write("a.csv", "1").await?;
        scratch.write("b.csv", "2").await?;
        assert!(scratch.purge().await?);
        assert!(!scratch.root().exists());
        assert!(!scratch.purge().await?);

        scratch.write("c.csv", "3").await?;
        let names: Vec<String> = scratch.list().await?.into_iter().map(|e| e.name).collect();
        assert_eq!(names, vec!["c.csv".to_string()]);
        Ok(())
    }

    #[tokio::test]
    async fn test_list_sorted_and_hides_temp_files() -> TestResult {
        let temp_dir = tempfile::tempdir()?;
        let scratch = scratch_in(temp_dir.path());

        scratch.write("b.csv", "2").await?;
        scratch.write("a.csv", "1").await?;
        std::fs::write(scratch.root().join(".a.csv.deadbeef.tmp"), "partial")?;

        let listed = scratch.list().await?;
        let names: Vec<&str> = listed.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["a.csv", "b.csv"]);
        assert_eq!(listed[0].size_bytes, 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_overwrite_replaces_content() -> TestResult {
        let temp_dir = tempfile::tempdir()?;
        let scratch = scratch_in(temp_dir.path());

        scratch.write("a.csv", "old content").await?;
        scratch.write("a.csv", "new").await?;
        assert_eq!(scratch.read("a.csv").await?, b"new");
        assert_eq!(scratch.list().await?.len(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_remove_entry() -> TestResult {
        let temp_dir = tempfile::tempdir()?;
        let scratch = scratch_in(temp_dir.path());

        scratch.write("a.csv", "1").await?;
        scratch.remove("a.csv").await?;
        assert!(!scratch.exists("a.csv").await?);
        assert!(scratch.remove("a.csv").await.unwrap_err().is_not_found());
        Ok(())
    }

    #[tokio::test]
    async fn test_rejects_traversal_and_absolute_names() -> TestResult {
        let temp_dir = tempfile::tempdir()?;
        let scratch = scratch_in(temp_dir.path());

        for name in ["../escape.csv", "/etc/passwd", "", "a\0b"] {
            let result = scratch.write(name, "evil").await;
            assert!(
                matches!(result, Err(ScratchError::PathValidation { .. })),
                "name should be rejected: {name:?}"
            );
        }
        assert!(!temp_dir.path().join("escape.csv").exists());
        Ok(())
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_symlink_escaping_root_is_rejected() -> TestResult {
        let temp_dir = tempfile::tempdir()?;
        let outside_dir = tempfile::tempdir()?;
        let outside = outside_dir.path().join("secret.csv");
        std::fs::write(&outside, "secret")?;

        let scratch = scratch_in(temp_dir.path());
        scratch.provision().await?;
        std::os::unix::fs::symlink(&outside, scratch.root().join("link.csv"))?;

        let result = scratch.read("link.csv").await;
        assert!(matches!(result, Err(ScratchError::PathValidation { .. })));
        Ok(())
    }

    #[tokio::test]
    async fn test_namespaces_are_isolated() -> TestResult {
        let temp_dir = tempfile::tempdir()?;
        let run_a = ScratchSpace::builder()
            .base_directory(temp_dir.path())
            .namespace("run-a")
            .build()?;
        let run_b = ScratchSpace::builder()
            .base_directory(temp_dir.path())
            .namespace("run-b")
            .build()?;

        run_a.write("data.csv", "a").await?;
        assert!(run_b.read("data.csv").await.unwrap_err().is_not_found());

        run_b.write("data.csv", "b").await?;
        run_a.purge().await?;
        assert_eq!(run_b.read("data.csv").await?, b"b");
        Ok(())
    }

    #[test]
    fn test_builder_requires_base_directory_and_valid_namespace() {
        assert!(matches!(
            ScratchSpace::builder().build(),
            Err(ScratchError::Configuration { .. })
        ));
        assert!(matches!(
            ScratchSpace::builder()
                .base_directory("/tmp/x")
                .namespace("a/b")
                .build(),
            Err(ScratchError::Configuration { .. })
        ));
    }
}
