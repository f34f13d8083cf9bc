//! HTTP surface for the interview controller.

use axum::{
    body::Body,
    extract::{DefaultBodyLimit, Multipart, Path, State},
    http::{HeaderValue, Method, Request, StatusCode},
    middleware::Next,
    response::Response,
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::services::ServeDir;
use viva_core::{
    AnswerUpload, FinishOutcome, InterviewConfig, InterviewController, InterviewError, NextQuestion, Progress,
    SubmitOutcome, Transcript,
};

pub struct AppState {
    pub controller: InterviewController,
}

type ApiError = (StatusCode, String);

#[derive(Deserialize)]
struct StartRequest {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    email: String,
}

pub fn build_router(state: Arc<AppState>, cfg: &InterviewConfig) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/start_interview", post(start_interview))
        .route("/question/:candidate_id", get(next_question))
        .route("/submit_answer/:candidate_id/:question_index", post(submit_answer))
        .route("/finish_interview/:candidate_id", get(finish_interview))
        .route("/get_answers/:candidate_id", get(get_answers))
        .route("/status/:candidate_id", get(status))
        .nest_service("/static", ServeDir::new(&cfg.static_dir))
        .layer(DefaultBodyLimit::max(cfg.max_upload_bytes))
        .layer(cors_layer(&cfg.cors_origins))
        .layer(axum::middleware::from_fn(log_requests))
        .with_state(state)
}

async fn log_requests(request: Request<Body>, next: Next) -> Response {
    let method = request.method().clone();
    let path = request.uri().path().to_string();
    let started = std::time::Instant::now();
    let response = next.run(request).await;
    tracing::info!(
        %method,
        %path,
        status = response.status().as_u16(),
        elapsed_ms = started.elapsed().as_millis() as u64,
        "request"
    );
    response
}

/// Configured origins, or any origin when none are configured.
fn cors_layer(origins: &[String]) -> CorsLayer {
    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|o| match HeaderValue::from_str(o.trim()) {
            Ok(v) => Some(v),
            Err(_) => {
                tracing::warn!(origin = %o, "ignoring invalid CORS origin");
                None
            }
        })
        .collect();
    let layer = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(Any);
    if allowed.is_empty() {
        layer.allow_origin(Any)
    } else {
        layer.allow_origin(AllowOrigin::list(allowed))
    }
}

fn reject(err: InterviewError) -> ApiError {
    let status = match &err {
        InterviewError::NotFound(_) => StatusCode::NOT_FOUND,
        InterviewError::BadRequest(_) => StatusCode::BAD_REQUEST,
        InterviewError::QuestionIndexMismatch { .. } => StatusCode::CONFLICT,
        InterviewError::Transcoding(_) => StatusCode::UNPROCESSABLE_ENTITY,
        InterviewError::Synthesis(_) | InterviewError::Blob(_) => StatusCode::BAD_GATEWAY,
        InterviewError::Persistence(_) | InterviewError::Config(_) | InterviewError::Internal(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    };
    if status.is_server_error() {
        tracing::error!("{}", err);
    }
    (status, err.to_string())
}

async fn health() -> &'static str {
    "OK"
}

async fn start_interview(
    State(state): State<Arc<AppState>>,
    Json(body): Json<StartRequest>,
) -> Result<Json<Value>, ApiError> {
    let started = state
        .controller
        .start(&body.email, body.name.as_deref())
        .await
        .map_err(reject)?;
    let message = if started.resumed { "Interview resumed" } else { "Interview started" };
    Ok(Json(json!({
        "message": message,
        "candidate_id": started.candidate_id,
        "created": started.created,
        "next_question_url": started.next_question_url,
    })))
}

async fn next_question(
    State(state): State<Arc<AppState>>,
    Path(candidate_id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let next = state.controller.next_question(&candidate_id).await.map_err(reject)?;
    Ok(Json(match next {
        NextQuestion::Question {
            question_index,
            question,
            audio_url,
        } => json!({
            "done": false,
            "question_index": question_index,
            "question": question,
            "audio_url": audio_url,
        }),
        NextQuestion::Done => json!({ "done": true, "message": "Interview finished" }),
    }))
}

async fn submit_answer(
    State(state): State<Arc<AppState>>,
    Path((candidate_id, question_index)): Path<(String, String)>,
    mut multipart: Multipart,
) -> Result<Json<SubmitOutcome>, ApiError> {
    let question_index: usize = question_index
        .trim()
        .parse()
        .map_err(|_| (StatusCode::BAD_REQUEST, format!("Invalid question index {:?}", question_index)))?;

    let mut upload: Option<AnswerUpload> = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| (StatusCode::BAD_REQUEST, format!("Malformed upload: {}", e)))?
    {
        if field.name() != Some("file") {
            continue;
        }
        let filename = field.file_name().map(str::to_string);
        let content_type = field.content_type().map(str::to_string);
        let bytes = field
            .bytes()
            .await
            .map_err(|e| (StatusCode::BAD_REQUEST, format!("Malformed upload: {}", e)))?;
        upload = Some(AnswerUpload {
            bytes: bytes.to_vec(),
            filename,
            content_type,
        });
        break;
    }
    let upload = upload.ok_or_else(|| (StatusCode::BAD_REQUEST, "No file uploaded".to_string()))?;

    state
        .controller
        .submit_answer(&candidate_id, question_index, upload)
        .await
        .map(Json)
        .map_err(reject)
}

async fn finish_interview(
    State(state): State<Arc<AppState>>,
    Path(candidate_id): Path<String>,
) -> Result<Json<FinishOutcome>, ApiError> {
    state.controller.finish(&candidate_id).await.map(Json).map_err(reject)
}

async fn get_answers(
    State(state): State<Arc<AppState>>,
    Path(candidate_id): Path<String>,
) -> Result<Json<Transcript>, ApiError> {
    state.controller.transcript(&candidate_id).map(Json).map_err(reject)
}

async fn status(
    State(state): State<Arc<AppState>>,
    Path(candidate_id): Path<String>,
) -> Result<Json<Progress>, ApiError> {
    state.controller.progress(&candidate_id).map(Json).map_err(reject)
}
