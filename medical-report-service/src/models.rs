use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::error::ReportError;
use crate::translate::OutputLanguage;

/// A file exactly as the user uploaded it
#[derive(Debug, Clone)]
pub struct UploadedDocument {
    pub filename: String,
    pub bytes: Vec<u8>,
}

impl UploadedDocument {
    pub fn new(filename: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            filename: filename.into(),
            bytes: bytes.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractedText {
    /// Content digest of the source upload
    pub document_id: String,
    pub filename: String,
    pub text: String,
    pub extracted_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Translation {
    pub language: OutputLanguage,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SummaryResult {
    pub document_id: String,
    pub summary: String,
    pub translation: Option<Translation>,
    pub created_at: DateTime<Utc>,
}

impl SummaryResult {
    /// The text a reader should see: the translation when one exists, else the summary
    pub fn display_text(&self) -> &str {
        self.translation
            .as_ref()
            .map(|t| t.text.as_str())
            .unwrap_or(&self.summary)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QaRecord {
    pub question: String,
    pub answer: String,
    pub asked_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LiteratureRecord {
    pub pmid: Option<String>,
    pub title: String,
    pub abstract_text: String,
    pub url: Option<String>,
}

/// Records from a literature search together with the failure, if any step failed.
/// A failure in a later step keeps whatever was recovered before it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SearchOutcome {
    pub records: Vec<LiteratureRecord>,
    pub error: Option<ReportError>,
}

impl SearchOutcome {
    pub fn failed(error: ReportError) -> Self {
        Self {
            records: Vec::new(),
            error: Some(error),
        }
    }
}

/// Result of a summarize action. A failed translation leaves `summary` intact.
#[derive(Debug, Clone, PartialEq)]
pub struct SummarizeOutcome {
    pub summary: SummaryResult,
    pub translation_error: Option<ReportError>,
}

// ---------------------------------------------------------------------------
// HTTP request / response bodies
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiErrorBody {
    pub error: String,
    pub message: String,
}

impl From<&ReportError> for ApiErrorBody {
    fn from(error: &ReportError) -> Self {
        Self {
            error: error.kind().to_string(),
            message: error.to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct UploadQuery {
    pub filename: String,
}

#[derive(Debug, Deserialize)]
pub struct SummarizeRequest {
    #[serde(default)]
    pub language: OutputLanguage,
}

#[derive(Debug, Deserialize)]
pub struct QuestionRequest {
    pub question: String,
}

fn default_max_results() -> usize {
    5
}

#[derive(Debug, Deserialize)]
pub struct LiteratureSearchRequest {
    pub topic: String,
    #[serde(default = "default_max_results")]
    pub max_results: usize,
}

#[derive(Debug, Deserialize)]
pub struct BatchIdsRequest {
    pub queries: Vec<String>,
    #[serde(default = "default_max_results")]
    pub max_results: usize,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CreateSessionResponse {
    pub session_id: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ExtractionResponse {
    pub session_id: String,
    pub filename: String,
    pub characters: usize,
    pub text: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SummaryResponse {
    pub session_id: String,
    pub language: OutputLanguage,
    pub summary: String,
    pub translated_summary: Option<String>,
    pub translation_error: Option<ApiErrorBody>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AnswerResponse {
    pub session_id: String,
    pub question: String,
    pub answer: String,
    pub history_len: usize,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SessionResponse {
    pub session_id: String,
    pub status_message: Option<String>,
    pub extracted: Option<ExtractedText>,
    pub summary: Option<SummaryResult>,
    pub qa_history: Vec<QaRecord>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct LiteratureSearchResponse {
    pub topic: String,
    pub count: usize,
    pub records: Vec<LiteratureRecord>,
    pub error: Option<ApiErrorBody>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct BatchIdsResponse {
    pub results: HashMap<String, Vec<String>>,
}
