//! Drives one document through Convert → Extract → Analyze → Score.
//!
//! CPU-bound stages run on blocking threads. Every await is guarded by the
//! caller's `CancelSignal`. Nothing is persisted here: the snapshot goes back
//! to the caller, who decides whether to hand it off.

use std::sync::Arc;

use tracing::{info, warn};

use super::{
    encode_pages, score, AnalysisFailure, AnalysisRequest, AnalysisRun, ConversionLimits,
    EncodedPage, GenerativeAnalyzer, PageRasterizer, PipelineError, RenderedPage, StageEvent,
};
use crate::models::{CallerContext, Snapshot, SourceDocument};
use crate::pipeline::cancel::CancelSignal;
use crate::pipeline::intake::MediaType;

/// Observer callback type used by `AnalysisPipeline::analyze`.
pub type StageObserver<'a> = &'a (dyn Fn(StageEvent) + Send + Sync);

pub struct AnalysisPipeline {
    rasterizer: Arc<dyn PageRasterizer>,
    analyzer: Arc<dyn GenerativeAnalyzer>,
    limits: ConversionLimits,
}

impl AnalysisPipeline {
    pub fn new(
        rasterizer: Arc<dyn PageRasterizer>,
        analyzer: Arc<dyn GenerativeAnalyzer>,
        limits: ConversionLimits,
    ) -> Self {
        Self {
            rasterizer,
            analyzer,
            limits,
        }
    }

    /// Run all four stages. The observer sees the run start, every stage
    /// change, and the terminal state, in that order.
    pub async fn analyze(
        &self,
        document: &SourceDocument,
        caller: &CallerContext,
        signal: &CancelSignal,
        observer: Option<StageObserver<'_>>,
    ) -> Result<Snapshot, AnalysisFailure> {
        let mut run = AnalysisRun::new();
        info!(
            file = %document.name(),
            caller = %caller.caller_id,
            size_bytes = document.size_bytes(),
            "Analysis: starting run"
        );
        emit(observer, run.event());

        match self
            .run_stages(&mut run, document, caller, signal, observer)
            .await
        {
            Ok(snapshot) => {
                run.succeed();
                emit(observer, run.event());
                info!(
                    file = %document.name(),
                    company = %snapshot.company_name,
                    score = snapshot.deal_quality.score,
                    "Analysis: run succeeded"
                );
                Ok(snapshot)
            }
            Err(error) => {
                let stage = run.fail().unwrap_or_else(|| run.current_stage());
                emit(observer, run.event());
                warn!(
                    file = %document.name(),
                    stage = %stage,
                    kind = error.kind(),
                    error = %error,
                    "Analysis: run failed"
                );
                Err(AnalysisFailure { stage, error })
            }
        }
    }

    async fn run_stages(
        &self,
        run: &mut AnalysisRun,
        document: &SourceDocument,
        caller: &CallerContext,
        signal: &CancelSignal,
        observer: Option<StageObserver<'_>>,
    ) -> Result<Snapshot, PipelineError> {
        let pages = self.convert(document, signal).await?;
        if pages.is_empty() {
            return Err(PipelineError::ConversionFailed(format!(
                "No pages could be produced from {}",
                document.name()
            )));
        }
        step(run, observer);

        let encoded = self.extract(pages, signal).await?;
        step(run, observer);

        let request = AnalysisRequest {
            file_name: document.name().to_string(),
            caller_id: caller.caller_id.clone(),
            pages: encoded,
        };
        let raw = signal
            .guard(self.analyzer.analyze(&request))
            .await
            .map_err(PipelineError::Cancelled)??;
        step(run, observer);

        signal.check().map_err(PipelineError::Cancelled)?;
        score(raw)
    }

    async fn convert(
        &self,
        document: &SourceDocument,
        signal: &CancelSignal,
    ) -> Result<Vec<RenderedPage>, PipelineError> {
        let media_type = MediaType::from_mime(document.media_type()).ok_or_else(|| {
            PipelineError::ConversionFailed(format!(
                "Unsupported media type: {}",
                document.media_type()
            ))
        })?;

        let rasterizer = Arc::clone(&self.rasterizer);
        let bytes = document.shared_content();
        let limits = self.limits;
        let task = tokio::task::spawn_blocking(move || {
            rasterizer.rasterize(media_type, &bytes, &limits)
        });

        let pages = signal
            .guard(task)
            .await
            .map_err(PipelineError::Cancelled)?
            .map_err(|e| PipelineError::ConversionFailed(format!("Conversion task failed: {e}")))??;

        info!(
            file = %document.name(),
            media_type = %media_type,
            pages = pages.len(),
            "Analysis: converted document"
        );
        Ok(pages)
    }

    async fn extract(
        &self,
        pages: Vec<RenderedPage>,
        signal: &CancelSignal,
    ) -> Result<Vec<EncodedPage>, PipelineError> {
        let quality = self.limits.jpeg_quality;
        let task = tokio::task::spawn_blocking(move || encode_pages(&pages, quality));

        signal
            .guard(task)
            .await
            .map_err(PipelineError::Cancelled)?
            .map_err(|e| PipelineError::ExtractionFailed(format!("Extraction task failed: {e}")))?
    }
}

fn step(run: &mut AnalysisRun, observer: Option<StageObserver<'_>>) {
    if run.advance().is_some() {
        emit(observer, run.event());
    }
}

fn emit(observer: Option<StageObserver<'_>>, event: StageEvent) {
    if let Some(observer) = observer {
        observer(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{RunState, Stage};
    use crate::pipeline::analysis::{AnalyzerError, MockAnalyzer, MockRasterizer};
    use crate::pipeline::cancel::Interruption;
    use async_trait::async_trait;
    use serde_json::{json, Value};
    use std::sync::Mutex;
    use std::time::Duration;

    fn deck() -> SourceDocument {
        SourceDocument::new("deck.pdf", "application/pdf", b"%PDF-1.4 test".to_vec())
    }

    fn caller() -> CallerContext {
        CallerContext::new("founder-1")
    }

    fn good_response() -> Value {
        json!({
            "companyName": "Acme Robotics",
            "tagline": "Warehouse picking arms",
            "dealQuality": { "score": 78, "verdict": "Promising" },
            "tags": { "stage": "Seed", "revenue": { "isPreRevenue": true } },
            "debrief": "Strong team.\n\nEarly market.",
            "keyStrengths": ["team"],
            "keyRisks": ["competition"]
        })
    }

    fn pipeline(pages: usize, analyzer: Arc<dyn GenerativeAnalyzer>) -> AnalysisPipeline {
        AnalysisPipeline::new(
            Arc::new(MockRasterizer::new(pages)),
            analyzer,
            ConversionLimits::default(),
        )
    }

    fn collect_events() -> (Arc<Mutex<Vec<StageEvent>>>, impl Fn(StageEvent) + Send + Sync) {
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&events);
        (events, move |e| sink.lock().unwrap().push(e))
    }

    /// Never answers; used to exercise deadlines.
    struct StalledAnalyzer;

    #[async_trait]
    impl GenerativeAnalyzer for StalledAnalyzer {
        async fn analyze(&self, _request: &AnalysisRequest) -> Result<Value, AnalyzerError> {
            std::future::pending().await
        }
    }

    #[tokio::test]
    async fn four_page_deck_yields_snapshot() {
        let analyzer = Arc::new(MockAnalyzer::new(good_response()));
        let pipeline = pipeline(4, analyzer.clone());
        let (events, observer) = collect_events();

        let snapshot = pipeline
            .analyze(&deck(), &caller(), &CancelSignal::new(), Some(&observer))
            .await
            .unwrap();

        assert_eq!(snapshot.company_name, "Acme Robotics");
        assert_eq!(snapshot.deal_quality.score, 78);
        assert_eq!(snapshot.tags.revenue.label(), "Pre-revenue");
        assert_eq!(analyzer.call_count(), 1);
        assert_eq!(analyzer.last_page_count(), Some(4));

        let events = events.lock().unwrap();
        let stages: Vec<Stage> = events.iter().map(|e| e.stage).collect();
        assert_eq!(
            stages,
            vec![Stage::Convert, Stage::Extract, Stage::Analyze, Stage::Score, Stage::Score]
        );
        assert_eq!(events.last().unwrap().state, RunState::Succeeded);
        assert_eq!(events.last().unwrap().label(), "step 4 of 4");
    }

    #[tokio::test]
    async fn stage_progress_never_moves_backwards() {
        let pipeline = pipeline(2, Arc::new(MockAnalyzer::new(good_response())));
        let (events, observer) = collect_events();
        pipeline
            .analyze(&deck(), &caller(), &CancelSignal::new(), Some(&observer))
            .await
            .unwrap();

        let steps: Vec<usize> = events.lock().unwrap().iter().map(|e| e.step).collect();
        assert!(steps.windows(2).all(|w| w[0] <= w[1]));
    }

    #[tokio::test]
    async fn missing_deal_quality_fails_at_score() {
        let analyzer = Arc::new(MockAnalyzer::new(json!({ "companyName": "Acme" })));
        let pipeline = pipeline(3, analyzer.clone());
        let (events, observer) = collect_events();

        let failure = pipeline
            .analyze(&deck(), &caller(), &CancelSignal::new(), Some(&observer))
            .await
            .unwrap_err();

        assert_eq!(failure.stage, Stage::Score);
        assert!(matches!(failure.error, PipelineError::MalformedResponse(_)));
        assert_eq!(analyzer.call_count(), 1);
        let last = *events.lock().unwrap().last().unwrap();
        assert_eq!((last.stage, last.state), (Stage::Score, RunState::Failed));
    }

    #[tokio::test]
    async fn zero_pages_stop_before_extract() {
        let analyzer = Arc::new(MockAnalyzer::new(good_response()));
        let pipeline = pipeline(0, analyzer.clone());
        let (events, observer) = collect_events();

        let failure = pipeline
            .analyze(&deck(), &caller(), &CancelSignal::new(), Some(&observer))
            .await
            .unwrap_err();

        assert_eq!(failure.stage, Stage::Convert);
        assert!(matches!(failure.error, PipelineError::ConversionFailed(_)));
        assert_eq!(analyzer.call_count(), 0);
        assert!(events
            .lock()
            .unwrap()
            .iter()
            .all(|e| e.stage == Stage::Convert));
    }

    #[tokio::test]
    async fn unsupported_media_type_fails_conversion() {
        let analyzer = Arc::new(MockAnalyzer::new(good_response()));
        let document = SourceDocument::new("notes.txt", "text/plain", b"hello".to_vec());

        let failure = pipeline(1, analyzer.clone())
            .analyze(&document, &caller(), &CancelSignal::new(), None)
            .await
            .unwrap_err();

        assert_eq!(failure.stage, Stage::Convert);
        assert_eq!(failure.error.kind(), "conversion_failed");
        assert_eq!(analyzer.call_count(), 0);
    }

    #[tokio::test]
    async fn analyzer_error_fails_at_analyze() {
        let analyzer = Arc::new(MockAnalyzer::failing(AnalyzerError::Service {
            status: 503,
            message: "overloaded".into(),
        }));

        let failure = pipeline(2, analyzer)
            .analyze(&deck(), &caller(), &CancelSignal::new(), None)
            .await
            .unwrap_err();

        assert_eq!(failure.stage, Stage::Analyze);
        assert!(matches!(
            failure.error,
            PipelineError::Analyzer(AnalyzerError::Service { status: 503, .. })
        ));
        assert_eq!(
            failure.to_string(),
            "analyze stage failed: Analyzer error: Analysis service returned 503: overloaded"
        );
    }

    #[tokio::test]
    async fn page_cap_bounds_the_request() {
        let analyzer = Arc::new(MockAnalyzer::new(good_response()));
        pipeline(10, analyzer.clone())
            .analyze(&deck(), &caller(), &CancelSignal::new(), None)
            .await
            .unwrap();
        assert_eq!(analyzer.last_page_count(), Some(6));
    }

    #[tokio::test]
    async fn cancelled_run_never_reaches_analyzer() {
        let analyzer = Arc::new(MockAnalyzer::new(good_response()));
        let signal = CancelSignal::new();
        signal.cancel();

        let failure = pipeline(3, analyzer.clone())
            .analyze(&deck(), &caller(), &signal, None)
            .await
            .unwrap_err();

        assert_eq!(failure.stage, Stage::Convert);
        assert_eq!(
            failure.error,
            PipelineError::Cancelled(Interruption::Cancelled)
        );
        assert_eq!(analyzer.call_count(), 0);
    }

    #[tokio::test]
    async fn deadline_interrupts_stalled_analyzer() {
        let signal = CancelSignal::new().with_timeout(Duration::from_millis(50));

        let failure = pipeline(1, Arc::new(StalledAnalyzer))
            .analyze(&deck(), &caller(), &signal, None)
            .await
            .unwrap_err();

        assert_eq!(failure.stage, Stage::Analyze);
        assert_eq!(
            failure.error,
            PipelineError::Cancelled(Interruption::DeadlineExceeded)
        );
    }
}
