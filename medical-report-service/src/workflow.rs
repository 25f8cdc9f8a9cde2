use chrono::Utc;
use session_flow::{PerformanceMonitor, TtlCache};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, warn};

use crate::error::{ReportError, Result};
use crate::extract::{FileKind, content_digest, extract_document};
use crate::literature::PubMedClient;
use crate::llm::LlmFacade;
use crate::models::{
    ExtractedText, QaRecord, SearchOutcome, SummarizeOutcome, SummaryResult, Translation,
    UploadedDocument,
};
use crate::session::ReportSession;
use crate::translate::{AUTO_DETECT, OutputLanguage, Translator};

pub const TIMER_EXTRACTION: &str = "text_extraction";
pub const TIMER_SUMMARY: &str = "summary_generation";
pub const TIMER_TRANSLATION: &str = "translation";
pub const TIMER_ANSWER: &str = "question_answering";
pub const TIMER_LITERATURE: &str = "literature_search";

/// Upper bound accepted for `max_results` on literature requests
pub const MAX_RESULTS_LIMIT: usize = 100;

/// The user actions of the assistant. Holds no per-user state: the caller owns the
/// [`ReportSession`] and passes it into each handler.
pub struct ReportAssistant {
    extraction_cache: TtlCache<String, ExtractedText>,
    llm: LlmFacade,
    translator: Arc<dyn Translator>,
    literature: PubMedClient,
    monitor: Arc<PerformanceMonitor>,
}

impl ReportAssistant {
    pub fn new(
        llm: LlmFacade,
        translator: Arc<dyn Translator>,
        literature: PubMedClient,
        extraction_cache: TtlCache<String, ExtractedText>,
    ) -> Self {
        Self {
            extraction_cache,
            llm,
            translator,
            literature,
            monitor: Arc::new(PerformanceMonitor::new()),
        }
    }

    pub fn monitor(&self) -> &PerformanceMonitor {
        &self.monitor
    }

    /// Extract the upload and make it the session's current report.
    /// Re-uploading identical content within the cache TTL skips extraction.
    pub async fn ingest(
        &self,
        session: &mut ReportSession,
        document: UploadedDocument,
    ) -> Result<ExtractedText> {
        info!(
            "Ingesting {} ({} bytes)",
            document.filename,
            document.bytes.len()
        );
        FileKind::from_filename(&document.filename)?;

        let key = content_digest(&document.filename, &document.bytes);
        let filename = document.filename.clone();
        let extracted = self
            .extraction_cache
            .get_or_try_compute(key, || {
                self.monitor
                    .time(TIMER_EXTRACTION, extract_off_runtime(document))
            })
            .await
            .inspect_err(|e| warn!("Extraction of {} failed: {}", filename, e))?;

        session.record_extraction(extracted.clone());
        Ok(extracted)
    }

    /// Summarize the loaded report, then translate unless `language` is English.
    ///
    /// The English summary is stored before translation starts, so a translation failure
    /// is reported in the outcome without losing it.
    pub async fn summarize(
        &self,
        session: &mut ReportSession,
        language: OutputLanguage,
    ) -> Result<SummarizeOutcome> {
        let report = session.report()?;
        let document_id = report.document_id.clone();

        let summary = self
            .monitor
            .time(TIMER_SUMMARY, self.llm.summarize(&report.text))
            .await?;

        let mut result = SummaryResult {
            document_id,
            summary,
            translation: None,
            created_at: Utc::now(),
        };
        session.record_summary(result.clone());

        if !language.needs_translation() {
            return Ok(SummarizeOutcome {
                summary: result,
                translation_error: None,
            });
        }

        let translated = self
            .monitor
            .time(
                TIMER_TRANSLATION,
                self.translator
                    .translate(&result.summary, AUTO_DETECT, language.code()),
            )
            .await;

        match translated {
            Ok(text) => {
                result.translation = Some(Translation { language, text });
                session.record_summary(result.clone());
                Ok(SummarizeOutcome {
                    summary: result,
                    translation_error: None,
                })
            }
            Err(e) => {
                warn!("Translation to {} failed, keeping English summary: {}", language, e);
                Ok(SummarizeOutcome {
                    summary: result,
                    translation_error: Some(e),
                })
            }
        }
    }

    /// Answer a question about the loaded report and append it to the history
    pub async fn ask(&self, session: &mut ReportSession, question: &str) -> Result<QaRecord> {
        let question = question.trim();
        if question.is_empty() {
            return Err(ReportError::InvalidInput("question must not be empty".to_string()));
        }
        let report = session.report()?;

        let answer = self
            .monitor
            .time(TIMER_ANSWER, self.llm.answer(&report.text, question))
            .await?;

        Ok(session.record_answer(question, answer).clone())
    }

    pub async fn search_literature(
        &self,
        topic: &str,
        max_results: usize,
    ) -> Result<SearchOutcome> {
        let topic = topic.trim();
        if topic.is_empty() {
            return Err(ReportError::InvalidInput("search topic must not be empty".to_string()));
        }
        validate_max_results(max_results)?;

        Ok(self
            .monitor
            .time(TIMER_LITERATURE, self.literature.search(topic, max_results))
            .await)
    }

    pub async fn search_ids_batch(
        &self,
        queries: &[String],
        max_results: usize,
    ) -> Result<HashMap<String, Vec<String>>> {
        if queries.iter().all(|q| q.trim().is_empty()) {
            return Err(ReportError::InvalidInput(
                "at least one non-empty query is required".to_string(),
            ));
        }
        validate_max_results(max_results)?;

        let queries: Vec<String> = queries
            .iter()
            .filter(|q| !q.trim().is_empty())
            .cloned()
            .collect();
        Ok(self.literature.search_ids_batch(&queries, max_results).await)
    }

    pub fn clear_caches(&self) {
        self.extraction_cache.clear();
        self.literature.clear_caches();
        info!("All caches cleared");
    }
}

/// PDF parsing is CPU-bound, so it runs on the blocking pool
async fn extract_off_runtime(document: UploadedDocument) -> Result<ExtractedText> {
    tokio::task::spawn_blocking(move || extract_document(&document))
        .await
        .map_err(|e| ReportError::DecodeFailure(format!("extraction task failed: {e}")))?
}

fn validate_max_results(max_results: usize) -> Result<()> {
    if !(1..=MAX_RESULTS_LIMIT).contains(&max_results) {
        return Err(ReportError::InvalidInput(format!(
            "max_results must be between 1 and {MAX_RESULTS_LIMIT}"
        )));
    }
    Ok(())
}
