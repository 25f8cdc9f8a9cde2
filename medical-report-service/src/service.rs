use axum::{
    Router,
    body::Bytes,
    extract::{
        DefaultBodyLimit, Path, Query, State,
        rejection::{JsonRejection, QueryRejection},
    },
    http::{StatusCode, header},
    response::{IntoResponse, Json},
    routing::{get, post},
};
use serde_json::{Value, json};
use session_flow::{FlowError, InMemorySessionStorage, Session, SessionStorage, TtlCache};
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{error, info, warn};

use crate::{
    config::Config,
    error::ReportError,
    literature::PubMedClient,
    llm::{LlmFacade, OpenRouterModel},
    models::{
        AnswerResponse, ApiErrorBody, BatchIdsRequest, BatchIdsResponse, CreateSessionResponse,
        ExtractionResponse, LiteratureSearchRequest, LiteratureSearchResponse, QuestionRequest,
        SessionResponse, SummarizeRequest, SummaryResponse, UploadQuery, UploadedDocument,
    },
    session::ReportSession,
    translate::GoogleTranslator,
    workflow::ReportAssistant,
};

type ApiError = (StatusCode, Json<ApiErrorBody>);
type ApiResult<T> = Result<Json<T>, ApiError>;

fn api_error(status: StatusCode, kind: &str, message: impl Into<String>) -> ApiError {
    (
        status,
        Json(ApiErrorBody {
            error: kind.to_string(),
            message: message.into(),
        }),
    )
}

fn report_error(e: ReportError) -> ApiError {
    let status = match e {
        ReportError::UnsupportedFileType(_)
        | ReportError::DecodeFailure(_)
        | ReportError::InvalidInput(_) => StatusCode::BAD_REQUEST,
        ReportError::NoReportLoaded => StatusCode::CONFLICT,
        ReportError::GenerationFailed(_)
        | ReportError::TranslationFailed(_)
        | ReportError::SearchTransport(_)
        | ReportError::SearchParse(_) => StatusCode::BAD_GATEWAY,
    };
    (status, Json(ApiErrorBody::from(&e)))
}

fn session_error(e: FlowError) -> ApiError {
    match e {
        FlowError::SessionNotFound(id) => api_error(
            StatusCode::NOT_FOUND,
            "session_not_found",
            format!("session {id} not found"),
        ),
        FlowError::Storage(message) => {
            error!("Session storage failure: {}", message);
            api_error(StatusCode::INTERNAL_SERVER_ERROR, "storage_failure", message)
        }
    }
}

fn json_body<T>(payload: Result<Json<T>, JsonRejection>) -> Result<T, ApiError> {
    payload
        .map(|Json(body)| body)
        .map_err(|rejection| report_error(ReportError::InvalidInput(rejection.body_text())))
}

fn query_params<T>(query: Result<Query<T>, QueryRejection>) -> Result<T, ApiError> {
    query
        .map(|Query(params)| params)
        .map_err(|rejection| report_error(ReportError::InvalidInput(rejection.body_text())))
}

#[derive(Clone)]
pub struct AppState {
    pub sessions: Arc<dyn SessionStorage<ReportSession>>,
    pub assistant: Arc<ReportAssistant>,
    pub max_upload_bytes: usize,
}

impl AppState {
    pub fn new(
        assistant: Arc<ReportAssistant>,
        sessions: Arc<dyn SessionStorage<ReportSession>>,
        max_upload_bytes: usize,
    ) -> Self {
        Self {
            sessions,
            assistant,
            max_upload_bytes,
        }
    }

    /// Construct every client up front from `config`
    pub fn from_config(config: &Config) -> anyhow::Result<Self> {
        let model = Arc::new(OpenRouterModel::new(
            &config.openrouter_api_key,
            config.llm_model.clone(),
        ));
        let translator = Arc::new(GoogleTranslator::new(
            config.translate_base_url.clone(),
            config.http_timeout,
        )?);
        let literature = PubMedClient::new(config.pubmed_settings())?;
        let extraction_cache = TtlCache::new(
            "extraction",
            config.extract_cache_ttl,
            config.extract_cache_max_entries,
        );

        let assistant = ReportAssistant::new(
            LlmFacade::new(model, config.llm_timeout),
            translator,
            literature,
            extraction_cache,
        );

        Ok(Self::new(
            Arc::new(assistant),
            Arc::new(InMemorySessionStorage::new()),
            config.max_upload_bytes,
        ))
    }
}

pub fn create_app(config: &Config) -> anyhow::Result<Router> {
    Ok(build_router(AppState::from_config(config)?))
}

pub fn build_router(app_state: AppState) -> Router {
    let max_upload_bytes = app_state.max_upload_bytes;

    Router::new()
        .route("/", get(root))
        .route("/health", get(health_check))
        .route("/sessions", post(create_session))
        .route(
            "/sessions/{session_id}",
            get(get_session).delete(delete_session),
        )
        .route("/sessions/{session_id}/documents", post(upload_document))
        .route("/sessions/{session_id}/summary", post(summarize))
        .route("/sessions/{session_id}/summary/download", get(download_summary))
        .route("/sessions/{session_id}/questions", post(ask_question))
        .route("/literature/search", post(search_literature))
        .route("/literature/ids", post(search_literature_ids))
        .route("/metrics/performance", get(performance_summary))
        .route("/cache/clear", post(clear_caches))
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(app_state)
}

async fn root() -> Json<Value> {
    Json(json!({
        "service": "Medical Report Assistant",
        "version": "0.1.0",
        "description": "Upload a medical report, get an AI summary in your language, \
                        ask questions about it and search PubMed",
        "endpoints": {
            "POST /sessions": "Start a new session",
            "GET /sessions/{session_id}": "Current report, summary and question history",
            "DELETE /sessions/{session_id}": "End the session and clear its state",
            "POST /sessions/{session_id}/documents?filename=<name>":
                "Upload a PDF, TXT, DATA or CSV report (raw body)",
            "POST /sessions/{session_id}/summary": "Summarize the report, optionally translated",
            "GET /sessions/{session_id}/summary/download": "Download the last summary as text",
            "POST /sessions/{session_id}/questions": "Ask a question about the report",
            "POST /literature/search": "Search PubMed for a topic",
            "POST /literature/ids": "Look up PubMed identifiers for several queries",
            "GET /metrics/performance": "Per-component timing summary",
            "POST /cache/clear": "Drop all cached results",
            "GET /health": "Health check"
        }
    }))
}

async fn health_check() -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339()
    }))
}

async fn load_session(
    state: &AppState,
    session_id: &str,
) -> Result<Session<ReportSession>, ApiError> {
    state.sessions.require(session_id).await.map_err(session_error)
}

async fn save_session(state: &AppState, session: Session<ReportSession>) -> Result<(), ApiError> {
    state.sessions.save(session).await.map_err(|e| {
        error!("Failed to save session: {}", e);
        session_error(e)
    })
}

async fn create_session(State(state): State<AppState>) -> ApiResult<CreateSessionResponse> {
    let session = Session::<ReportSession>::new();
    let session_id = session.id.clone();
    save_session(&state, session).await?;

    info!("Session {} created", session_id);
    Ok(Json(CreateSessionResponse { session_id }))
}

async fn get_session(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> ApiResult<SessionResponse> {
    let session = load_session(&state, &session_id).await?;

    Ok(Json(SessionResponse {
        session_id: session.id,
        status_message: session.status_message,
        extracted: session.state.extracted,
        summary: session.state.summary,
        qa_history: session.state.qa_history,
        created_at: session.created_at,
        updated_at: session.updated_at,
    }))
}

async fn delete_session(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> ApiResult<Value> {
    state
        .sessions
        .delete(&session_id)
        .await
        .map_err(session_error)?;

    info!("Session {} cleared", session_id);
    Ok(Json(json!({
        "session_id": session_id,
        "status": "cleared"
    })))
}

async fn upload_document(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    query: Result<Query<UploadQuery>, QueryRejection>,
    body: Bytes,
) -> ApiResult<ExtractionResponse> {
    let query = query_params(query)?;
    let mut session = load_session(&state, &session_id).await?;
    let document = UploadedDocument::new(query.filename, body.to_vec());

    let extracted = state
        .assistant
        .ingest(&mut session.state, document)
        .await
        .map_err(report_error)?;

    session.touch(Some(format!("Extracted text from {}", extracted.filename)));
    save_session(&state, session).await?;

    Ok(Json(ExtractionResponse {
        session_id,
        filename: extracted.filename,
        characters: extracted.text.chars().count(),
        text: extracted.text,
    }))
}

async fn summarize(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    payload: Result<Json<SummarizeRequest>, JsonRejection>,
) -> ApiResult<SummaryResponse> {
    let request = json_body(payload)?;
    let mut session = load_session(&state, &session_id).await?;

    let outcome = state
        .assistant
        .summarize(&mut session.state, request.language)
        .await
        .map_err(report_error)?;

    session.touch(Some(format!("Summary generated ({})", request.language)));
    save_session(&state, session).await?;

    Ok(Json(SummaryResponse {
        session_id,
        language: request.language,
        translated_summary: outcome.summary.translation.map(|t| t.text),
        summary: outcome.summary.summary,
        translation_error: outcome.translation_error.as_ref().map(ApiErrorBody::from),
    }))
}

async fn download_summary(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let session = load_session(&state, &session_id).await?;
    session.state.report().map_err(report_error)?;

    let Some(summary) = session.state.summary else {
        return Err(api_error(
            StatusCode::CONFLICT,
            "no_summary",
            "no summary has been generated for this report yet",
        ));
    };

    Ok((
        [
            (header::CONTENT_TYPE, "text/plain; charset=utf-8"),
            (
                header::CONTENT_DISPOSITION,
                "attachment; filename=\"summary.txt\"",
            ),
        ],
        summary.display_text().to_string(),
    ))
}

async fn ask_question(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    payload: Result<Json<QuestionRequest>, JsonRejection>,
) -> ApiResult<AnswerResponse> {
    let request = json_body(payload)?;
    let mut session = load_session(&state, &session_id).await?;

    let record = state
        .assistant
        .ask(&mut session.state, &request.question)
        .await
        .map_err(report_error)?;

    let history_len = session.state.qa_history.len();
    session.touch(Some(format!("Answered {} question(s)", history_len)));
    save_session(&state, session).await?;

    Ok(Json(AnswerResponse {
        session_id,
        question: record.question,
        answer: record.answer,
        history_len,
    }))
}

async fn search_literature(
    State(state): State<AppState>,
    payload: Result<Json<LiteratureSearchRequest>, JsonRejection>,
) -> ApiResult<LiteratureSearchResponse> {
    let request = json_body(payload)?;

    let outcome = state
        .assistant
        .search_literature(&request.topic, request.max_results)
        .await
        .map_err(report_error)?;

    if let Some(e) = &outcome.error {
        warn!("Literature search for '{}' reported: {}", request.topic, e);
    }

    Ok(Json(LiteratureSearchResponse {
        topic: request.topic.trim().to_string(),
        count: outcome.records.len(),
        records: outcome.records,
        error: outcome.error.as_ref().map(ApiErrorBody::from),
    }))
}

async fn search_literature_ids(
    State(state): State<AppState>,
    payload: Result<Json<BatchIdsRequest>, JsonRejection>,
) -> ApiResult<BatchIdsResponse> {
    let request = json_body(payload)?;

    let results = state
        .assistant
        .search_ids_batch(&request.queries, request.max_results)
        .await
        .map_err(report_error)?;

    Ok(Json(BatchIdsResponse { results }))
}

async fn performance_summary(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "components": state.assistant.monitor().summary(),
        "timestamp": chrono::Utc::now().to_rfc3339()
    }))
}

async fn clear_caches(State(state): State<AppState>) -> Json<Value> {
    state.assistant.clear_caches();
    Json(json!({ "status": "cleared" }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::tests::ScriptedModel;
    use crate::workflow::tests::{FakeTranslator, assistant_with};
    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;

    fn app(model: ScriptedModel) -> Router {
        let assistant = assistant_with(
            Arc::new(model),
            Arc::new(FakeTranslator::working()),
            "http://127.0.0.1:9",
        );
        build_router(AppState::new(
            Arc::new(assistant),
            Arc::new(InMemorySessionStorage::new()),
            1024 * 1024,
        ))
    }

    async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, serde_json::from_slice(&bytes).unwrap_or(Value::Null))
    }

    fn post_json(uri: &str, body: Value) -> Request<Body> {
        Request::post(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn new_session(app: &Router) -> String {
        let (status, body) = send(app, empty("POST", "/sessions")).await;
        assert_eq!(status, StatusCode::OK);
        body["session_id"].as_str().unwrap().to_string()
    }

    fn empty(method: &str, uri: &str) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .body(Body::empty())
            .unwrap()
    }

    async fn upload(
        app: &Router,
        session_id: &str,
        filename: &str,
        bytes: &'static [u8],
    ) -> (StatusCode, Value) {
        let request = Request::post(format!(
            "/sessions/{session_id}/documents?filename={filename}"
        ))
        .body(Body::from(bytes))
        .unwrap();
        send(app, request).await
    }

    #[tokio::test]
    async fn test_health_and_root() {
        let app = app(ScriptedModel::replying("unused"));
        let (status, body) = send(&app, Request::get("/health").body(Body::empty()).unwrap()).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "healthy");

        let (status, body) = send(&app, Request::get("/").body(Body::empty()).unwrap()).await;
        assert_eq!(status, StatusCode::OK);
        assert!(body["endpoints"].is_object());
    }

    #[tokio::test]
    async fn test_report_flow_over_http() {
        let app = app(ScriptedModel::replying("Patient shows mild hypertension."));
        let id = new_session(&app).await;

        let (status, body) =
            upload(&app, &id, "report.txt", b"Patient has mild hypertension.").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["text"], "Patient has mild hypertension.");

        let (status, body) = send(
            &app,
            post_json(&format!("/sessions/{id}/summary"), json!({"language": "English"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["summary"], "Patient shows mild hypertension.");
        assert!(body["translated_summary"].is_null());
        assert!(body["translation_error"].is_null());

        let response = app
            .clone()
            .oneshot(
                Request::get(format!("/sessions/{id}/summary/download"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(
            response.headers()[header::CONTENT_DISPOSITION]
                .to_str()
                .unwrap()
                .contains("summary.txt")
        );
        let text = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        assert_eq!(&text[..], b"Patient shows mild hypertension.");

        let (status, body) = send(
            &app,
            post_json(&format!("/sessions/{id}/questions"), json!({"question": "Is it severe?"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["history_len"], 1);

        let (status, body) = send(&app, empty("GET", &format!("/sessions/{id}"))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["qa_history"].as_array().unwrap().len(), 1);
        assert_eq!(body["extracted"]["filename"], "report.txt");

        let (status, _) = send(&app, empty("DELETE", &format!("/sessions/{id}"))).await;
        assert_eq!(status, StatusCode::OK);
        let (status, body) = send(&app, empty("GET", &format!("/sessions/{id}"))).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"], "session_not_found");
    }

    #[tokio::test]
    async fn test_translated_summary_is_returned_alongside_english() {
        let app = app(ScriptedModel::replying("Stable."));
        let id = new_session(&app).await;
        upload(&app, &id, "report.txt", b"BP 120/80.").await;

        let (status, body) = send(
            &app,
            post_json(&format!("/sessions/{id}/summary"), json!({"language": "Spanish"})),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["language"], "Spanish");
        assert_eq!(body["summary"], "Stable.");
        assert_eq!(body["translated_summary"], "[es] STABLE.");
    }

    #[tokio::test]
    async fn test_error_mapping() {
        let app = app(ScriptedModel::failing("upstream 503"));
        let id = new_session(&app).await;

        let (status, body) = upload(&app, &id, "scan.docx", b"PK\x03\x04").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "unsupported_file_type");

        let summary_uri = format!("/sessions/{id}/summary");
        let (status, body) = send(&app, post_json(&summary_uri, json!({}))).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["error"], "no_report_loaded");

        upload(&app, &id, "notes.data", b"Glucose 180 mg/dL").await;
        let (status, body) = send(
            &app,
            post_json(&format!("/sessions/{id}/summary"), json!({"language": "Klingon"})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "invalid_input");

        let (status, body) = send(&app, post_json(&summary_uri, json!({}))).await;
        assert_eq!(status, StatusCode::BAD_GATEWAY);
        assert_eq!(body["error"], "generation_failed");
        assert!(body["message"].as_str().unwrap().contains("upstream 503"));

        let (status, _) = send(
            &app,
            post_json("/sessions/missing/questions", json!({"question": "?"})),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_upload_without_filename_is_json_bad_request() {
        let app = app(ScriptedModel::replying("unused"));
        let id = new_session(&app).await;

        let (status, body) = send(
            &app,
            Request::post(format!("/sessions/{id}/documents"))
                .body(Body::from("Patient has mild hypertension."))
                .unwrap(),
        )
        .await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "invalid_input");
        assert!(body["message"].as_str().unwrap().contains("filename"));
    }

    #[tokio::test]
    async fn test_download_before_summary_conflicts() {
        let app = app(ScriptedModel::replying("unused"));
        let id = new_session(&app).await;
        upload(&app, &id, "labs.csv", b"test,value\nLDL,160\n").await;

        let (status, body) = send(
            &app,
            Request::get(format!("/sessions/{id}/summary/download"))
                .body(Body::empty())
                .unwrap(),
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["error"], "no_summary");
    }

    #[tokio::test]
    async fn test_literature_validation_and_metrics() {
        let app = app(ScriptedModel::replying("unused"));

        let (status, body) =
            send(&app, post_json("/literature/search", json!({"topic": " "}))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "invalid_input");

        let id = new_session(&app).await;
        upload(&app, &id, "report.txt", b"Patient has mild hypertension.").await;

        let (status, body) = send(&app, empty("GET", "/metrics/performance")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["components"]["text_extraction"]["total_calls"], 1);

        let (status, body) = send(&app, empty("POST", "/cache/clear")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "cleared");
    }
}
