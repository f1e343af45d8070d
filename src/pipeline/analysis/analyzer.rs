use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;

use super::extract::EncodedPage;

/// Payload for the generative analysis service.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisRequest {
    pub file_name: String,
    pub caller_id: String,
    pub pages: Vec<EncodedPage>,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AnalyzerError {
    #[error("Cannot reach analysis service at {0}")]
    Connection(String),

    #[error("Analysis request timed out after {0}s")]
    Timeout(u64),

    #[error("Analysis service returned {status}: {message}")]
    Service { status: u16, message: String },

    #[error("Unreadable analysis response: {0}")]
    InvalidResponse(String),
}

/// The external model that turns page images into a raw snapshot.
///
/// Output is untrusted JSON; the Score stage validates it.
#[async_trait]
pub trait GenerativeAnalyzer: Send + Sync {
    async fn analyze(&self, request: &AnalysisRequest) -> Result<serde_json::Value, AnalyzerError>;
}

// ── Mock for testing ──────────────────────────────────────

/// Returns a fixed response and counts calls.
pub struct MockAnalyzer {
    response: Result<serde_json::Value, AnalyzerError>,
    calls: AtomicUsize,
    last_page_count: Mutex<Option<usize>>,
}

impl MockAnalyzer {
    pub fn new(response: serde_json::Value) -> Self {
        Self {
            response: Ok(response),
            calls: AtomicUsize::new(0),
            last_page_count: Mutex::new(None),
        }
    }

    pub fn failing(error: AnalyzerError) -> Self {
        Self {
            response: Err(error),
            calls: AtomicUsize::new(0),
            last_page_count: Mutex::new(None),
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn last_page_count(&self) -> Option<usize> {
        self.last_page_count.lock().ok().and_then(|g| *g)
    }
}

#[async_trait]
impl GenerativeAnalyzer for MockAnalyzer {
    async fn analyze(&self, request: &AnalysisRequest) -> Result<serde_json::Value, AnalyzerError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut last) = self.last_page_count.lock() {
            *last = Some(request.pages.len());
        }
        self.response.clone()
    }
}
