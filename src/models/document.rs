use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// A file offered for intake. Immutable once built; clones share the bytes.
#[derive(Debug, Clone)]
pub struct SourceDocument {
    name: String,
    media_type: String,
    size_bytes: u64,
    content: Arc<[u8]>,
}

impl SourceDocument {
    /// Build from in-memory bytes. `media_type` is the declared MIME type;
    /// the validator decides whether it is acceptable.
    pub fn new(name: impl Into<String>, media_type: impl Into<String>, bytes: Vec<u8>) -> Self {
        let content: Arc<[u8]> = Arc::from(bytes);
        Self {
            name: name.into(),
            media_type: media_type.into(),
            size_bytes: content.len() as u64,
            content,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn media_type(&self) -> &str {
        &self.media_type
    }

    pub fn size_bytes(&self) -> u64 {
        self.size_bytes
    }

    pub fn content(&self) -> &[u8] {
        &self.content
    }

    /// Shared handle to the bytes, for moving into blocking tasks.
    pub fn shared_content(&self) -> Arc<[u8]> {
        Arc::clone(&self.content)
    }

    /// Duplicate-detection key within a batch.
    pub fn identity(&self) -> (&str, u64) {
        (&self.name, self.size_bytes)
    }
}

/// Who is submitting, threaded explicitly from the intake call site down to
/// every record the transfer creates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallerContext {
    pub caller_id: String,
    pub referral_code: Option<String>,
}

impl CallerContext {
    pub fn new(caller_id: impl Into<String>) -> Self {
        Self {
            caller_id: caller_id.into(),
            referral_code: None,
        }
    }

    pub fn with_referral(mut self, code: impl Into<String>) -> Self {
        let code = code.into();
        self.referral_code = if code.trim().is_empty() {
            None
        } else {
            Some(code.trim().to_string())
        };
        self
    }
}
