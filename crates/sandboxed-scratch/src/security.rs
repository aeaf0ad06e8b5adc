//! Security utilities for entry name validation and sandboxing.

use crate::error::{Result, ScratchError};
use std::path::{Component, Path, PathBuf};

/// Sets secure permissions on a directory (Unix only).
pub async fn set_secure_permissions(path: &Path) -> Result<()> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let perms = std::fs::Permissions::from_mode(0o700);
        tokio::fs::set_permissions(path, perms)
            .await
            .map_err(|_e| ScratchError::Permission {
                operation: "set secure permissions".to_string(),
                path: path.to_path_buf(),
            })?;
    }

    #[cfg(not(unix))]
    {
        if !path.exists() {
            return Err(ScratchError::PathValidation {
                path: path.to_path_buf(),
                reason: "Directory does not exist".to_string(),
            });
        }
    }

    Ok(())
}

/// Validates an entry name lexically and returns it as a relative path.
///
/// Only plain (`Normal`) components are accepted, so the result can never climb out of
/// the directory it is joined onto.
pub fn validate_entry_name(name: &str) -> Result<PathBuf> {
    let reject = |reason: &str| ScratchError::PathValidation {
        path: PathBuf::from(name),
        reason: reason.to_string(),
    };

    if name.is_empty() {
        return Err(reject("Entry name cannot be empty"));
    }
    if name.contains('\0') {
        return Err(reject("Entry name contains null bytes"));
    }

    let path = Path::new(name);
    if path.is_absolute() {
        return Err(reject(
            "Absolute paths not allowed - use names relative to the scratch root",
        ));
    }

    let mut relative = PathBuf::new();
    for component in path.components() {
        match component {
            Component::Normal(part) => relative.push(part),
            Component::CurDir => {}
            Component::ParentDir => return Err(reject("Parent directory references not allowed")),
            Component::RootDir | Component::Prefix(_) => {
                return Err(reject("Rooted paths not allowed"));
            }
        }
    }

    if relative.as_os_str().is_empty() {
        return Err(reject("Entry name resolves to the scratch root itself"));
    }

    Ok(relative)
}

/// Validates a namespace: exactly one plain path segment.
pub fn validate_namespace(namespace: &str) -> Result<()> {
    let relative = validate_entry_name(namespace).map_err(|_| ScratchError::Configuration {
        message: format!("Invalid namespace '{namespace}'"),
    })?;
    if relative.components().count() != 1 {
        return Err(ScratchError::Configuration {
            message: format!("Namespace '{namespace}' must be a single path segment"),
        });
    }
    Ok(())
}

/// Validates that an existing path resolves inside the sandbox root.
///
/// Catches symlinks planted inside the root that point elsewhere. Paths that do not
/// exist yet are accepted: lexical validation already keeps them inside the root.
pub fn validate_path_within_root(path: &Path, root: &Path) -> Result<()> {
    if !path.exists() {
        return Ok(());
    }

    let canonical_root = root
        .canonicalize()
        .map_err(|e| ScratchError::PathValidation {
            path: root.to_path_buf(),
            reason: format!("Failed to resolve scratch root: {e}"),
        })?;
    let canonical_path = path
        .canonicalize()
        .map_err(|e| ScratchError::PathValidation {
            path: path.to_path_buf(),
            reason: format!("Failed to resolve path: {e}"),
        })?;

    if !canonical_path.starts_with(&canonical_root) {
        return Err(ScratchError::PathValidation {
            path: path.to_path_buf(),
            reason: format!(
                "Path escapes sandbox: resolves to '{}' (outside '{}')",
                canonical_path.display(),
                canonical_root.display()
            ),
        });
    }

    Ok(())
}
