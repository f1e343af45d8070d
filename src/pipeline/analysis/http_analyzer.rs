use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

use super::analyzer::{AnalysisRequest, AnalyzerError, GenerativeAnalyzer};

/// HTTP client for the generative analysis service.
///
/// `POST {base_url}/analyze` with an `AnalysisRequest` body. A 2xx response
/// body is returned as-is for validation; anything else becomes
/// `AnalyzerError::Service` carrying the service's `error` message.
pub struct HttpAnalyzer {
    base_url: String,
    client: reqwest::Client,
    timeout_secs: u64,
}

/// Error body shape: `{"error": "..."}`.
#[derive(Deserialize)]
struct ServiceErrorBody {
    error: String,
}

impl HttpAnalyzer {
    pub fn new(base_url: &str, timeout_secs: u64) -> Result<Self, AnalyzerError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| AnalyzerError::Connection(format!("HTTP client setup failed: {e}")))?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
            timeout_secs,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

#[async_trait]
impl GenerativeAnalyzer for HttpAnalyzer {
    async fn analyze(&self, request: &AnalysisRequest) -> Result<serde_json::Value, AnalyzerError> {
        let url = format!("{}/analyze", self.base_url);
        debug!(url = %url, pages = request.pages.len(), "Sending analysis request");

        let response = self
            .client
            .post(&url)
            .json(request)
            .send()
            .await
            .map_err(|e| {
                if e.is_connect() {
                    AnalyzerError::Connection(self.base_url.clone())
                } else if e.is_timeout() {
                    AnalyzerError::Timeout(self.timeout_secs)
                } else {
                    AnalyzerError::InvalidResponse(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ServiceErrorBody>(&body)
                .map(|b| b.error)
                .unwrap_or(body);
            return Err(AnalyzerError::Service {
                status: status.as_u16(),
                message,
            });
        }

        response.json::<serde_json::Value>().await.map_err(|e| {
            if e.is_timeout() {
                AnalyzerError::Timeout(self.timeout_secs)
            } else {
                AnalyzerError::InvalidResponse(e.to_string())
            }
        })
    }
}
