use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::{Deserialize, Serialize};
use serde_json::json;
use shuttle_axum::axum::{
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use tower_http::cors::CorsLayer;

use crate::error::PipelineError;
use crate::pipeline::{GenerationPipeline, GenerationRecord, GenerationRequest, PipelineStatus};
use crate::schedule::{ScheduleController, ScheduleSpec};
use crate::speech::Voice;

#[derive(Clone)]
pub struct AppState {
    pipeline: Arc<GenerationPipeline>,
    scheduler: Arc<Mutex<ScheduleController>>,
}

impl AppState {
    /// Scheduler wired to the same pipeline as manual runs.
    pub fn new(pipeline: Arc<GenerationPipeline>) -> Self {
        let scheduler = ScheduleController::new(pipeline.clone());
        Self::with_scheduler(pipeline, scheduler)
    }

    pub fn with_scheduler(pipeline: Arc<GenerationPipeline>, scheduler: ScheduleController) -> Self {
        Self {
            pipeline,
            scheduler: Arc::new(Mutex::new(scheduler)),
        }
    }

    fn scheduler(&self) -> MutexGuard<'_, ScheduleController> {
        self.scheduler.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/voices", get(list_voices))
        .route("/generate", post(generate))
        .route("/status", get(status))
        .route("/last", get(last))
        .route("/audio/latest", get(latest_audio))
        .route(
            "/schedule",
            get(schedule_info).post(arm_schedule).delete(disarm_schedule),
        )
        .layer(CorsLayer::very_permissive())
        .with_state(state)
}

impl PipelineError {
    fn status_code(&self) -> StatusCode {
        match self {
            PipelineError::InvalidRequest(_) | PipelineError::ScheduleMisconfigured(_) => {
                StatusCode::BAD_REQUEST
            }
            PipelineError::GenerationInProgress => StatusCode::CONFLICT,
            PipelineError::ContentTooShort { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            PipelineError::SourceUnreachable { .. } | PipelineError::ProviderCallFailed { .. } => {
                StatusCode::BAD_GATEWAY
            }
            PipelineError::ProviderNotConfigured(_) => StatusCode::SERVICE_UNAVAILABLE,
            PipelineError::Delivery(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for PipelineError {
    fn into_response(self) -> Response {
        (self.status_code(), Json(json!({ "error": self.to_string() }))).into_response()
    }
}

fn default_duration() -> u32 {
    60
}

#[derive(Deserialize)]
struct GenerateReq {
    #[serde(default)]
    rss_url: Option<String>,
    #[serde(default)]
    news_url: Option<String>,
    voice_id: String,
    #[serde(default = "default_duration")]
    duration_secs: u32,
    #[serde(default)]
    save_to_local: bool,
}

async fn list_voices(State(state): State<AppState>) -> Result<Json<Vec<Voice>>, PipelineError> {
    Ok(Json(state.pipeline.voices().await?))
}

async fn generate(
    State(state): State<AppState>,
    Json(body): Json<GenerateReq>,
) -> Result<Json<GenerationRecord>, PipelineError> {
    let req = GenerationRequest::from_urls(
        body.rss_url.as_deref(),
        body.news_url.as_deref(),
        &body.voice_id,
        body.duration_secs,
        body.save_to_local,
    )?;
    Ok(Json(state.pipeline.run(req).await?))
}

async fn status(State(state): State<AppState>) -> Json<PipelineStatus> {
    let mut st = state.pipeline.status();
    st.next_slot = state.scheduler().next_slot().map(|d| d.to_string());
    Json(st)
}

async fn last(State(state): State<AppState>) -> Json<Option<GenerationRecord>> {
    Json(state.pipeline.last().await)
}

async fn latest_audio(State(state): State<AppState>) -> Response {
    match state.pipeline.last_audio().await {
        Some(audio) => (
            [(header::CONTENT_TYPE, "audio/mpeg")],
            audio.as_ref().clone(),
        )
            .into_response(),
        None => (
            StatusCode::NOT_FOUND,
            Json(json!({ "error": "no audio generated yet" })),
        )
            .into_response(),
    }
}

#[derive(Deserialize)]
struct ScheduleReq {
    hours: Vec<u8>,
    minute: u8,
    rss_url: String,
    voice_id: String,
    #[serde(default = "default_duration")]
    duration_secs: u32,
    #[serde(default)]
    save_to_local: bool,
}

#[derive(Serialize)]
struct ScheduleView {
    armed: bool,
    spec: Option<ScheduleSpec>,
    rss_url: Option<String>,
    next_slot: Option<String>,
}

fn schedule_view(ctl: &ScheduleController) -> ScheduleView {
    ScheduleView {
        armed: ctl.is_armed(),
        spec: ctl.spec().cloned(),
        rss_url: ctl.request().map(|r| r.target.url().to_string()),
        next_slot: ctl.next_slot().map(|d| d.to_string()),
    }
}

async fn schedule_info(State(state): State<AppState>) -> Json<ScheduleView> {
    Json(schedule_view(&state.scheduler()))
}

async fn arm_schedule(
    State(state): State<AppState>,
    Json(body): Json<ScheduleReq>,
) -> Result<Json<ScheduleView>, PipelineError> {
    let mut ctl = state.scheduler();
    // a rejected request must not leave the previous schedule running
    ctl.disarm();

    let spec = ScheduleSpec::new(body.hours, body.minute)?;
    if body.rss_url.trim().is_empty() {
        return Err(PipelineError::ScheduleMisconfigured(
            "scheduled runs need an RSS feed URL".into(),
        ));
    }
    let req = GenerationRequest::from_urls(
        Some(&body.rss_url),
        None,
        &body.voice_id,
        body.duration_secs,
        body.save_to_local,
    )?;
    ctl.arm(spec, req)?;
    Ok(Json(schedule_view(&ctl)))
}

async fn disarm_schedule(State(state): State<AppState>) -> Json<ScheduleView> {
    let mut ctl = state.scheduler();
    ctl.disarm();
    Json(schedule_view(&ctl))
}
