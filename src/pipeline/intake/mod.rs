pub mod format;
pub mod policy;
pub mod validator;

pub use format::*;
pub use policy::*;
pub use validator::*;

use std::path::Path;

use serde::Serialize;
use thiserror::Error;

use crate::models::SourceDocument;

/// Why a candidate file was turned away. Per candidate, never fatal to the
/// rest of a submission.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RejectionReason {
    #[error("Unsupported file type: {media_type}")]
    UnsupportedType { media_type: String },

    #[error("File too large: {size_bytes} bytes exceeds {max_mb}MB limit")]
    TooLarge { size_bytes: u64, max_mb: u64 },

    #[error("Too many files: at most {max_files} per submission")]
    TooMany { max_files: usize },

    #[error("Duplicate file: {name} is already queued")]
    Duplicate { name: String },

    #[error("Cannot read file: {reason}")]
    Unreadable { reason: String },
}

/// A rejected candidate with the name it was offered under.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize)]
#[error("{name}: {reason}")]
pub struct Rejection {
    pub name: String,
    pub reason: RejectionReason,
}

#[derive(Error, Debug)]
pub enum IntakeError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Not a file: {0}")]
    NotAFile(String),
}

/// Read a file from disk into a `SourceDocument`: sanitized name, media type
/// inferred from content then extension.
pub fn load_document(path: &Path) -> Result<SourceDocument, IntakeError> {
    let metadata = std::fs::metadata(path)?;
    if !metadata.is_file() {
        return Err(IntakeError::NotAFile(path.display().to_string()));
    }
    let bytes = std::fs::read(path)?;
    let name = sanitize_filename(&path.to_string_lossy());
    let media_type = infer_media_type(&name, &bytes);

    tracing::debug!(
        file = %name,
        media_type = %media_type,
        size = bytes.len(),
        "Intake: loaded document from disk"
    );
    Ok(SourceDocument::new(name, media_type, bytes))
}

/// Load every path in order. Files that cannot be read come back as
/// `Unreadable` rejections instead of being dropped.
pub fn load_documents<'a, I>(paths: I) -> (Vec<SourceDocument>, Vec<Rejection>)
where
    I: IntoIterator<Item = &'a Path>,
{
    let mut documents = Vec::new();
    let mut rejected = Vec::new();
    for path in paths {
        match load_document(path) {
            Ok(document) => documents.push(document),
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "Intake: unreadable file");
                rejected.push(Rejection {
                    name: sanitize_filename(&path.to_string_lossy()),
                    reason: RejectionReason::Unreadable {
                        reason: e.to_string(),
                    },
                });
            }
        }
    }
    (documents, rejected)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_document_sniffs_and_sanitizes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pitch.bin");
        std::fs::write(&path, b"%PDF-1.7 minimal").unwrap();

        let doc = load_document(&path).unwrap();
        assert_eq!(doc.name(), "pitch.bin");
        assert_eq!(doc.media_type(), "application/pdf");
        assert_eq!(doc.size_bytes(), 16);
    }

    #[test]
    fn load_document_rejects_directories() {
        let dir = tempfile::tempdir().unwrap();
        let err = load_document(dir.path()).unwrap_err();
        assert!(matches!(err, IntakeError::NotAFile(_)));
    }

    #[test]
    fn load_document_missing_file_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = load_document(&dir.path().join("nope.pdf")).unwrap_err();
        assert!(matches!(err, IntakeError::Io(_)));
    }

    #[test]
    fn rejection_reason_serializes_with_kind() {
        let json = serde_json::to_value(RejectionReason::TooMany { max_files: 15 }).unwrap();
        assert_eq!(json["kind"], "too_many");
        assert_eq!(json["max_files"], 15);
    }

    #[test]
    fn unreadable_paths_become_rejections() {
        let dir = tempfile::tempdir().unwrap();
        let good = dir.path().join("deck.pdf");
        std::fs::write(&good, b"%PDF-1.7 minimal").unwrap();
        let missing = dir.path().join("gone.pdf");

        let (documents, rejected) =
            load_documents([good.as_path(), missing.as_path(), dir.path()]);

        assert_eq!(documents.len(), 1);
        assert_eq!(documents[0].name(), "deck.pdf");
        assert_eq!(rejected.len(), 2);
        assert_eq!(rejected[0].name, "gone.pdf");
        assert!(rejected
            .iter()
            .all(|r| matches!(r.reason, RejectionReason::Unreadable { .. })));
    }
}
