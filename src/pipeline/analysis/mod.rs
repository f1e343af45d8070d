//! Single-document analysis: Convert → Extract → Analyze → Score.
//!
//! Each run yields exactly one `Snapshot` or exactly one classified failure
//! tagged with the stage it happened in.

pub mod analyzer;
pub mod convert;
pub mod extract;
pub mod http_analyzer;
pub mod orchestrator;
pub mod pdfium;
pub mod run;
pub mod score;

pub use analyzer::*;
pub use convert::*;
pub use extract::*;
pub use http_analyzer::*;
pub use orchestrator::*;
pub use pdfium::*;
pub use run::*;
pub use score::*;

use thiserror::Error;

use crate::models::Stage;
use crate::pipeline::cancel::Interruption;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum PipelineError {
    #[error("Conversion failed: {0}")]
    ConversionFailed(String),

    #[error("Extraction failed: {0}")]
    ExtractionFailed(String),

    #[error("Analyzer error: {0}")]
    Analyzer(#[from] AnalyzerError),

    #[error("Malformed analyzer response: {0}")]
    MalformedResponse(String),

    #[error("Analysis interrupted: {0}")]
    Cancelled(Interruption),
}

impl PipelineError {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::ConversionFailed(_) => "conversion_failed",
            Self::ExtractionFailed(_) => "extraction_failed",
            Self::Analyzer(_) => "analyzer_error",
            Self::MalformedResponse(_) => "malformed_response",
            Self::Cancelled(_) => "cancelled",
        }
    }
}

/// Terminal failure of an analysis run.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("{stage} stage failed: {error}")]
pub struct AnalysisFailure {
    pub stage: Stage,
    pub error: PipelineError,
}
