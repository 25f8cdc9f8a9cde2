use thiserror::Error;

/// Failures surfaced by the report assistant. Every external call is converted into one of
/// these at its boundary so callers only ever see a typed value with a readable message.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReportError {
    #[error("unsupported file type '{0}'; upload a PDF, CSV, TXT or DATA file")]
    UnsupportedFileType(String),

    #[error("could not extract text: {0}")]
    DecodeFailure(String),

    #[error("generation failed: {0}")]
    GenerationFailed(String),

    #[error("translation failed: {0}")]
    TranslationFailed(String),

    #[error("literature search request failed: {0}")]
    SearchTransport(String),

    #[error("could not parse literature search response: {0}")]
    SearchParse(String),

    #[error("no report has been uploaded and extracted in this session")]
    NoReportLoaded,

    #[error("invalid input: {0}")]
    InvalidInput(String),
}

impl ReportError {
    /// Stable identifier for API clients
    pub fn kind(&self) -> &'static str {
        match self {
            ReportError::UnsupportedFileType(_) => "unsupported_file_type",
            ReportError::DecodeFailure(_) => "decode_failure",
            ReportError::GenerationFailed(_) => "generation_failed",
            ReportError::TranslationFailed(_) => "translation_failed",
            ReportError::SearchTransport(_) => "search_transport_failure",
            ReportError::SearchParse(_) => "search_parse_failure",
            ReportError::NoReportLoaded => "no_report_loaded",
            ReportError::InvalidInput(_) => "invalid_input",
        }
    }
}

pub type Result<T> = std::result::Result<T, ReportError>;
