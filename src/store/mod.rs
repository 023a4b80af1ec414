// src/store/mod.rs

pub mod postgres;

use async_trait::async_trait;
use uuid::Uuid;

use crate::{
    error::AppError,
    models::{
        quiz::QuizDefinition,
        quiz_attempt::{QuizAttempt, QuizAttemptSummary, UserAnswer},
    },
};

pub use postgres::PgStore;

/// Durable storage used by the quiz attempt workflow.
#[async_trait]
pub trait QuizStore: Send + Sync {
    /// Loads a quiz with its questions and their candidate answers.
    async fn find_quiz(&self, quiz_id: Uuid) -> Result<Option<QuizDefinition>, AppError>;

    async fn find_attempt(&self, attempt_id: Uuid) -> Result<Option<QuizAttempt>, AppError>;

    async fn find_attempt_answers(&self, attempt_id: Uuid) -> Result<Vec<UserAnswer>, AppError>;

    /// Writes a submitted attempt and its answer rows.
    /// Fails with `Conflict` if the attempt was already recorded.
    async fn record_attempt(
        &self,
        attempt: &QuizAttempt,
        answers: &[UserAnswer],
    ) -> Result<(), AppError>;

    /// Persisted attempts of a quiz, most recently completed first.
    async fn list_attempts_by_quiz(
        &self,
        quiz_id: Uuid,
    ) -> Result<Vec<QuizAttemptSummary>, AppError>;
}

/// Receives the signal that a learner passed a quiz, so course progress
/// can be updated.
#[async_trait]
pub trait ProgressNotifier: Send + Sync {
    async fn notify_quiz_passed(&self, user_id: Uuid, quiz_id: Uuid) -> Result<(), AppError>;
}
