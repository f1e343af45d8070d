use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use tracing::debug;

use crate::pipeline::transfer::{CollaboratorError, StorageSink};

/// Stores blobs as files under `root`. Paths are relative, `/`-separated,
/// and may not escape the root.
pub struct LocalStorageSink {
    root: PathBuf,
}

impl LocalStorageSink {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Resolve a storage path to a file under the root.
    pub fn resolve(&self, path: &str) -> Result<PathBuf, CollaboratorError> {
        if path.trim().is_empty() {
            return Err(CollaboratorError::Rejected("empty storage path".into()));
        }
        let relative = Path::new(path);
        for component in relative.components() {
            match component {
                Component::Normal(_) | Component::CurDir => {}
                _ => {
                    return Err(CollaboratorError::Rejected(format!(
                        "storage path escapes root: {path}"
                    )))
                }
            }
        }
        Ok(self.root.join(relative))
    }
}

#[async_trait]
impl StorageSink for LocalStorageSink {
    async fn put(&self, path: &str, bytes: &[u8]) -> Result<(), CollaboratorError> {
        let target = self.resolve(path)?;
        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(|e| {
                CollaboratorError::Rejected(format!("cannot create {}: {e}", parent.display()))
            })?;
        }
        tokio::fs::write(&target, bytes).await.map_err(|e| {
            CollaboratorError::Rejected(format!("cannot write {}: {e}", target.display()))
        })?;
        debug!(path = %target.display(), size = bytes.len(), "Stored blob");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn writes_nested_paths() {
        let dir = tempfile::tempdir().unwrap();
        let sink = LocalStorageSink::new(dir.path());
        sink.put("founder-1/batch/deck.pdf", b"%PDF").await.unwrap();

        let written = std::fs::read(dir.path().join("founder-1/batch/deck.pdf")).unwrap();
        assert_eq!(written, b"%PDF");
    }

    #[tokio::test]
    async fn rejects_traversal_and_absolute_paths() {
        let dir = tempfile::tempdir().unwrap();
        let sink = LocalStorageSink::new(dir.path());
        for bad in ["../escape.pdf", "a/../../b.pdf", "/etc/passwd", ""] {
            let err = sink.put(bad, b"x").await.unwrap_err();
            assert!(matches!(err, CollaboratorError::Rejected(_)), "{bad}");
        }
    }
}
