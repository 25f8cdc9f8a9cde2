use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::error::{ReportError, Result};
use crate::models::{ExtractedText, QaRecord, SummaryResult};

/// Per-session context handed to every assistant handler.
///
/// Starts empty and only changes when an extraction, summary or answer succeeds.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReportSession {
    pub extracted: Option<ExtractedText>,
    pub summary: Option<SummaryResult>,
    pub qa_history: Vec<QaRecord>,
}

impl ReportSession {
    pub fn new() -> Self {
        Self::default()
    }

    /// The text of the loaded report, or `NoReportLoaded`
    pub fn report(&self) -> Result<&ExtractedText> {
        self.extracted.as_ref().ok_or(ReportError::NoReportLoaded)
    }

    /// A new report replaces the previous one.
    /// The summary belonged to the old report and is dropped.
    pub fn record_extraction(&mut self, extracted: ExtractedText) {
        let same_document = self
            .extracted
            .as_ref()
            .is_some_and(|current| current.document_id == extracted.document_id);
        if !same_document {
            self.summary = None;
        }
        self.extracted = Some(extracted);
    }

    pub fn record_summary(&mut self, summary: SummaryResult) {
        self.summary = Some(summary);
    }

    pub fn record_answer(
        &mut self,
        question: impl Into<String>,
        answer: impl Into<String>,
    ) -> &QaRecord {
        self.qa_history.push(QaRecord {
            question: question.into(),
            answer: answer.into(),
            asked_at: Utc::now(),
        });
        &self.qa_history[self.qa_history.len() - 1]
    }

    pub fn clear(&mut self) {
        *self = Self::default();
    }

    pub fn has_report(&self) -> bool {
        self.extracted.is_some()
    }
}
