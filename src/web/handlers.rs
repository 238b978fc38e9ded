use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Json,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::error::{Result as WebResult, WebError};
use crate::acquisition::AcquisitionRequest;
use crate::content::QuestionOrigin;
use crate::scores::{DEFAULT_NAME, HighscoreEntry};
use crate::session::SessionView;
use crate::session::manager::FinishReply;
use crate::state::AppState;

const DEFAULT_SESSION_AMOUNT: u8 = 10;
const QUICK_START_TOPIC: &str = "javascript";
const QUICK_START_AMOUNT: u8 = 50;

#[derive(Deserialize, Debug, Default)]
pub struct StartSessionRequest {
    pub topic: Option<String>,
    pub difficulty: Option<String>,
    pub amount: Option<u8>,
}

#[derive(Serialize, Debug)]
pub struct StartSessionResponse {
    #[serde(flatten)]
    pub session: SessionView,
    /// Warning for the surface to toast when acquisition had to degrade.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notice: Option<String>,
}

async fn acquire_and_start(
    app_state: &AppState,
    request: AcquisitionRequest,
) -> WebResult<Json<StartSessionResponse>> {
    let report = app_state.acquisition.acquire(&request).await;

    let notice = if report.questions.is_empty() {
        Some("No questions available at all; the session has nothing to play.".to_string())
    } else if report.degraded {
        Some("No questions matched the requested filters; using the full local pool.".to_string())
    } else if report.origin == Some(QuestionOrigin::LocalPool) {
        Some("No questions returned from remote providers; starting with the local pool.".to_string())
    } else {
        None
    };

    let session = app_state
        .sessions
        .start_session(report.questions, report.origin, report.degraded)
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "Failed to start session");
            WebError::InternalServerError(e)
        })?;

    Ok(Json(StartSessionResponse { session, notice }))
}

pub async fn start_session_handler(
    State(app_state): State<AppState>,
    Json(payload): Json<StartSessionRequest>,
) -> WebResult<Json<StartSessionResponse>> {
    tracing::info!(
        request.topic = ?payload.topic,
        request.difficulty = ?payload.difficulty,
        request.amount = ?payload.amount,
        "HTTP: start session"
    );

    let request = AcquisitionRequest {
        amount: payload.amount.unwrap_or(DEFAULT_SESSION_AMOUNT),
        topic: payload.topic,
        difficulty: payload.difficulty,
        category: None,
    };
    acquire_and_start(&app_state, request).await
}

/// Quick-start: a large topic-biased pull from the primary provider using the
/// configured opaque category, falling through the usual chain.
pub async fn quick_start_handler(
    State(app_state): State<AppState>,
) -> WebResult<Json<StartSessionResponse>> {
    tracing::info!("HTTP: quick start");

    let request = AcquisitionRequest {
        amount: QUICK_START_AMOUNT,
        topic: Some(QUICK_START_TOPIC.to_string()),
        difficulty: None,
        category: app_state.settings.providers.quickstart_category.clone(),
    };
    acquire_and_start(&app_state, request).await
}

pub async fn get_session_handler(
    State(app_state): State<AppState>,
    Path(id): Path<Uuid>,
) -> WebResult<Json<SessionView>> {
    app_state
        .sessions
        .get(id)
        .await
        .map(Json)
        .ok_or(WebError::SessionNotFound(id))
}

#[derive(Deserialize, Debug)]
pub struct AnswerRequest {
    pub option: usize,
}

pub async fn answer_handler(
    State(app_state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<AnswerRequest>,
) -> WebResult<Json<SessionView>> {
    app_state
        .sessions
        .select(id, payload.option)
        .await
        .map(Json)
        .ok_or(WebError::SessionNotFound(id))
}

#[derive(Deserialize, Debug, Default)]
pub struct FinishRequest {
    pub name: Option<String>,
}

#[derive(Serialize, Debug)]
pub struct FinishResponse {
    pub entry: HighscoreEntry,
    pub highscores: Vec<HighscoreEntry>,
}

pub async fn finish_handler(
    State(app_state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<FinishRequest>,
) -> WebResult<Json<FinishResponse>> {
    let summary = match app_state.sessions.finish(id).await {
        FinishReply::NotFound => return Err(WebError::SessionNotFound(id)),
        FinishReply::NotFinished => {
            return Err(WebError::Conflict(
                "Session still has unanswered questions".to_string(),
            ));
        }
        FinishReply::Summary(summary) => summary,
    };

    // Name precedence: explicit in the request, then the remembered one,
    // then the anonymous default.
    let name = match payload.name.map(|n| n.trim().to_string()) {
        Some(name) if !name.is_empty() => name,
        _ => app_state
            .scores
            .last_name()
            .await
            .unwrap_or_else(|| DEFAULT_NAME.to_string()),
    };

    if let Err(e) = app_state.scores.remember_name(&name).await {
        tracing::warn!(error = %e, "Failed to remember player name");
    }

    let entry = HighscoreEntry {
        name,
        score: summary.score,
        total: summary.total,
        date: Utc::now(),
        topics: summary.topics,
    };

    let highscores = app_state.scores.record(entry.clone()).await.map_err(|e| {
        tracing::error!(error = %e, "Failed to persist highscore entry");
        WebError::InternalServerError(format!("Failed to persist highscore: {}", e))
    })?;

    Ok(Json(FinishResponse { entry, highscores }))
}

#[derive(Serialize, Debug)]
pub struct HighscoresResponse {
    pub entries: Vec<HighscoreEntry>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
}

pub async fn highscores_handler(
    State(app_state): State<AppState>,
) -> Json<HighscoresResponse> {
    Json(HighscoresResponse {
        entries: app_state.scores.list().await,
        last_name: app_state.scores.last_name().await,
    })
}

pub async fn refresh_pool_handler(
    State(app_state): State<AppState>,
) -> WebResult<StatusCode> {
    tracing::info!("HTTP: refresh local pool");
    app_state.pool.refresh().await.map_err(|e| {
        tracing::error!(error = %e, "Failed to refresh local pool");
        WebError::InternalServerError(format!("Failed to refresh pool: {}", e))
    })?;
    Ok(StatusCode::OK)
}
