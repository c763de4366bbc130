use std::path::Path as FsPath;

use axum::{
    body::Bytes,
    extract::{DefaultBodyLimit, Json, Path, State},
    http::{header, HeaderMap, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::{
    app_state::{AppState, Status},
    ingest::{self, UploadRejection},
    jobs::{Job, JobState},
    models::AnswerResult,
    samples::{self, SampleContract},
};

type ApiError = (StatusCode, Json<serde_json::Value>);

fn api_error(code: StatusCode, message: impl Into<String>) -> ApiError {
    (code, Json(json!({"error": message.into()})))
}

// --- Payloads y Respuestas de la API ---

#[derive(Deserialize)]
pub struct AskPayload {
    job_id: Uuid,
    question: String,
}

#[derive(Deserialize)]
pub struct SamplePayload {
    filename: String,
}

#[derive(Debug, Serialize)]
pub struct AnalyzeResponse {
    job_id: Uuid,
    status: JobState,
}

// --- Router ---

pub fn create_router(app_state: AppState) -> Router {
    // Un byte de margen para que el exceso lo detecte `validate_upload`.
    let body_limit = app_state.config.max_upload_bytes.saturating_add(1);

    Router::new()
        .route("/api/ping", get(ping_handler))
        .route("/api/analyze", post(analyze_handler))
        .route("/api/jobs/:id", get(job_handler))
        .route("/api/jobs/:id/pdf", get(job_pdf_handler))
        .route("/api/ask", post(ask_handler))
        .route("/api/samples", get(list_samples_handler))
        .route("/api/samples/analyze", post(analyze_sample_handler))
        .route("/api/status", get(status_handler))
        .route("/api/shutdown", post(shutdown_handler))
        .layer(DefaultBodyLimit::max(body_limit))
        .with_state(app_state)
}

// --- Handlers ---

#[axum::debug_handler]
async fn ping_handler() -> Json<serde_json::Value> {
    Json(json!({"status": "ok"}))
}

#[axum::debug_handler]
async fn analyze_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<(StatusCode, Json<AnalyzeResponse>), ApiError> {
    validate_pdf(&state, &body)?;

    let filename = headers
        .get("x-filename")
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .unwrap_or("upload.pdf")
        .to_string();

    enqueue(&state, filename, body.to_vec()).await
}

/// Mismas comprobaciones para subidas y contratos de ejemplo.
fn validate_pdf(state: &AppState, bytes: &[u8]) -> Result<(), ApiError> {
    ingest::validate_upload(bytes, state.config.max_upload_bytes).map_err(|rejection| {
        let code = match rejection {
            UploadRejection::Empty => StatusCode::UNPROCESSABLE_ENTITY,
            UploadRejection::TooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            UploadRejection::NotPdf => StatusCode::UNSUPPORTED_MEDIA_TYPE,
        };
        warn!("PDF rechazado: {:?}", rejection);
        api_error(code, rejection.to_string())
    })
}

async fn enqueue(
    state: &AppState,
    filename: String,
    bytes: Vec<u8>,
) -> Result<(StatusCode, Json<AnalyzeResponse>), ApiError> {
    info!("Encolando análisis de '{}' ({} bytes)", filename, bytes.len());
    match state.jobs.enqueue(filename, bytes).await {
        Ok(job_id) => Ok((
            StatusCode::ACCEPTED,
            Json(AnalyzeResponse {
                job_id,
                status: JobState::Queued,
            }),
        )),
        Err(e) => {
            error!("No se pudo encolar el análisis: {}", e);
            Err(api_error(StatusCode::SERVICE_UNAVAILABLE, e.to_string()))
        }
    }
}

#[axum::debug_handler]
async fn job_handler(
    State(state): State<AppState>,
    Path(job_id): Path<Uuid>,
) -> Result<Json<Job>, ApiError> {
    state
        .jobs
        .get(job_id)
        .await
        .map(Json)
        .ok_or_else(|| api_error(StatusCode::NOT_FOUND, "Job not found"))
}

#[axum::debug_handler]
async fn job_pdf_handler(
    State(state): State<AppState>,
    Path(job_id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let job = state
        .jobs
        .get(job_id)
        .await
        .ok_or_else(|| api_error(StatusCode::NOT_FOUND, "Job not found"))?;
    let pdf = job
        .highlighted_pdf
        .ok_or_else(|| api_error(StatusCode::NOT_FOUND, "No highlighted PDF for this job"))?;
    Ok(([(header::CONTENT_TYPE, "application/pdf")], Bytes::from(pdf.as_ref().clone())))
}

#[axum::debug_handler]
async fn ask_handler(
    State(state): State<AppState>,
    Json(payload): Json<AskPayload>,
) -> Result<Json<AnswerResult>, ApiError> {
    let question = payload.question.trim();
    if question.is_empty() {
        return Err(api_error(StatusCode::UNPROCESSABLE_ENTITY, "Question is empty"));
    }

    let job = state
        .jobs
        .get(payload.job_id)
        .await
        .ok_or_else(|| api_error(StatusCode::NOT_FOUND, "Job not found"))?;
    if job.state != JobState::Done {
        return Err(api_error(
            StatusCode::CONFLICT,
            format!("Job is not ready (state: {:?})", job.state),
        ));
    }

    match state
        .synthesizer
        .answer(question, &job.clauses, &job.document_text)
        .await
    {
        Ok(answer) => Ok(Json(answer)),
        Err(e) => {
            error!("Error al responder sobre el job {}: {:#}", job.id, e);
            Err(api_error(
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Error al procesar la pregunta: {}", e),
            ))
        }
    }
}

#[axum::debug_handler]
async fn list_samples_handler(State(state): State<AppState>) -> Json<Vec<SampleContract>> {
    Json(samples::list_samples(FsPath::new(&state.config.samples_dir)))
}

#[axum::debug_handler]
async fn analyze_sample_handler(
    State(state): State<AppState>,
    Json(payload): Json<SamplePayload>,
) -> Result<(StatusCode, Json<AnalyzeResponse>), ApiError> {
    let bytes = samples::read_sample(FsPath::new(&state.config.samples_dir), &payload.filename)
        .map_err(|e| api_error(StatusCode::NOT_FOUND, e.to_string()))?;
    validate_pdf(&state, &bytes)?;
    enqueue(&state, payload.filename, bytes).await
}

#[axum::debug_handler]
async fn status_handler(State(state): State<AppState>) -> Json<Status> {
    Json(state.status.lock().await.clone())
}

// --- Handler de Apagado ---

#[axum::debug_handler]
async fn shutdown_handler(State(state): State<AppState>) -> impl IntoResponse {
    info!("Petición de apagado recibida.");
    if let Some(sender) = state.shutdown_sender.lock().await.take() {
        let _ = sender.send(());
    }
    StatusCode::OK
}
