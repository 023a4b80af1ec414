// src/handlers/quiz.rs

use axum::{
    Json,
    extract::{Path, State},
    response::IntoResponse,
};
use uuid::Uuid;

use crate::{error::AppError, services::QuizAttemptService};

/// Lists the submitted attempts of a quiz, most recent first.
/// Instructors and admins only.
pub async fn list_attempts(
    State(service): State<QuizAttemptService>,
    Path(quiz_id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let attempts = service.get_quiz_attempts_by_quiz_id(quiz_id).await?;
    Ok(Json(attempts))
}
