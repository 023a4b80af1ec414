// src/handlers/quiz_attempt.rs

use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use uuid::Uuid;
use validator::Validate;

use crate::{
    error::AppError,
    models::quiz_attempt::{CacheProgressRequest, SaveAnswerRequest, StartAttemptRequest},
    services::QuizAttemptService,
    utils::jwt::Claims,
};

/// Starts a quiz attempt for the authenticated user.
///
/// Returns 201 Created with the attempt id and start time.
pub async fn start_attempt(
    State(service): State<QuizAttemptService>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<StartAttemptRequest>,
) -> Result<impl IntoResponse, AppError> {
    let user_id = claims.user_id()?;

    let started = service
        .start_attempt(user_id, req.quiz_id, &req.questions)
        .await?;

    Ok((StatusCode::CREATED, Json(started)))
}

/// Saves the selection for one question of an in-progress attempt.
pub async fn save_answer(
    State(service): State<QuizAttemptService>,
    Path(attempt_id): Path<Uuid>,
    Json(req): Json<SaveAnswerRequest>,
) -> Result<impl IntoResponse, AppError> {
    req.validate()?;

    service
        .save_answer(attempt_id, req.question_id, &req.selected_answers)
        .await?;

    Ok(Json(serde_json::json!({
        "message": "Answer saved"
    })))
}

/// Autosave checkpoint: replaces all cached answers and the remaining time.
pub async fn cache_progress(
    State(service): State<QuizAttemptService>,
    Path(attempt_id): Path<Uuid>,
    Json(req): Json<CacheProgressRequest>,
) -> Result<impl IntoResponse, AppError> {
    req.validate()?;

    service
        .cache_progress(attempt_id, &req.answers, req.time_left)
        .await?;

    Ok(StatusCode::NO_CONTENT)
}

/// Submits an attempt, scoring it and persisting the result.
pub async fn submit_attempt(
    State(service): State<QuizAttemptService>,
    Path(attempt_id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let result = service.submit_attempt(attempt_id).await?;
    Ok(Json(result))
}

/// Fetches an attempt: the live snapshot while in progress, the stored
/// result once submitted.
pub async fn get_result(
    State(service): State<QuizAttemptService>,
    Path(attempt_id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let result = service.get_result(attempt_id).await?;
    Ok(Json(result))
}
