// src/store/postgres.rs

use std::collections::HashMap;

use async_trait::async_trait;
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

use super::{ProgressNotifier, QuizStore};
use crate::{
    error::AppError,
    models::{
        quiz::{QuestionType, QuizAnswer, QuizDefinition, QuizQuestion},
        quiz_attempt::{QuizAttempt, QuizAttemptSummary, UserAnswer},
    },
};

/// Helper struct for fetching the quiz header.
#[derive(FromRow)]
struct QuizRow {
    id: Uuid,
    title: String,
    passing_score: Option<i32>,
}

#[derive(FromRow)]
struct QuestionRow {
    id: Uuid,
    question_type: String,
}

#[derive(FromRow)]
struct AnswerRow {
    id: Uuid,
    question_id: Uuid,
    is_correct: bool,
}

/// PostgreSQL-backed store.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    // Postgres error code for unique violation is 23505
    err.as_database_error()
        .and_then(|db| db.code())
        .is_some_and(|code| code == "23505")
}

#[async_trait]
impl QuizStore for PgStore {
    async fn find_quiz(&self, quiz_id: Uuid) -> Result<Option<QuizDefinition>, AppError> {
        let quiz = sqlx::query_as::<_, QuizRow>(
            "SELECT id, title, passing_score FROM quizzes WHERE id = $1",
        )
        .bind(quiz_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            tracing::error!("Failed to fetch quiz {}: {:?}", quiz_id, e);
            AppError::from(e)
        })?;

        let Some(quiz) = quiz else {
            return Ok(None);
        };

        let question_rows = sqlx::query_as::<_, QuestionRow>(
            r#"
            SELECT id, question_type
            FROM questions
            WHERE quiz_id = $1
            ORDER BY position, id
            "#,
        )
        .bind(quiz_id)
        .fetch_all(&self.pool)
        .await?;

        let question_ids: Vec<Uuid> = question_rows.iter().map(|q| q.id).collect();

        let answer_rows = sqlx::query_as::<_, AnswerRow>(
            r#"
            SELECT id, question_id, is_correct
            FROM answers
            WHERE question_id = ANY($1)
            ORDER BY id
            "#,
        )
        .bind(&question_ids)
        .fetch_all(&self.pool)
        .await?;

        let mut answers_by_question: HashMap<Uuid, Vec<QuizAnswer>> = HashMap::new();
        for row in answer_rows {
            answers_by_question
                .entry(row.question_id)
                .or_default()
                .push(QuizAnswer {
                    id: row.id,
                    is_correct: row.is_correct,
                });
        }

        let mut questions = Vec::with_capacity(question_rows.len());
        for row in question_rows {
            let question_type = row
                .question_type
                .parse::<QuestionType>()
                .map_err(AppError::InternalServerError)?;
            questions.push(QuizQuestion {
                id: row.id,
                question_type,
                answers: answers_by_question.remove(&row.id).unwrap_or_default(),
            });
        }

        Ok(Some(QuizDefinition {
            id: quiz.id,
            title: quiz.title,
            passing_score: quiz.passing_score,
            questions,
        }))
    }

    async fn find_attempt(&self, attempt_id: Uuid) -> Result<Option<QuizAttempt>, AppError> {
        let attempt = sqlx::query_as::<_, QuizAttempt>(
            r#"
            SELECT id, user_id, quiz_id, score, is_passed, started_at, completed_at
            FROM quiz_attempts
            WHERE id = $1
            "#,
        )
        .bind(attempt_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(attempt)
    }

    async fn find_attempt_answers(&self, attempt_id: Uuid) -> Result<Vec<UserAnswer>, AppError> {
        let answers = sqlx::query_as::<_, UserAnswer>(
            r#"
            SELECT id, attempt_id, question_id, answer_id, is_correct
            FROM user_answers
            WHERE attempt_id = $1
            "#,
        )
        .bind(attempt_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(answers)
    }

    async fn record_attempt(
        &self,
        attempt: &QuizAttempt,
        answers: &[UserAnswer],
    ) -> Result<(), AppError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| AppError::InternalServerError(e.to_string()))?;

        sqlx::query(
            r#"
            INSERT INTO quiz_attempts (id, user_id, quiz_id, score, is_passed, started_at, completed_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(attempt.id)
        .bind(attempt.user_id)
        .bind(attempt.quiz_id)
        .bind(attempt.score)
        .bind(attempt.is_passed)
        .bind(attempt.started_at)
        .bind(attempt.completed_at)
        .execute(&mut *tx)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                AppError::Conflict("Quiz attempt has already been submitted".to_string())
            } else {
                tracing::error!("Failed to insert quiz attempt {}: {:?}", attempt.id, e);
                AppError::from(e)
            }
        })?;

        for answer in answers {
            sqlx::query(
                r#"
                INSERT INTO user_answers (id, attempt_id, question_id, answer_id, is_correct)
                VALUES ($1, $2, $3, $4, $5)
                "#,
            )
            .bind(answer.id)
            .bind(answer.attempt_id)
            .bind(answer.question_id)
            .bind(answer.answer_id)
            .bind(answer.is_correct)
            .execute(&mut *tx)
            .await
            .map_err(|e| {
                tracing::error!("Failed to insert answer for attempt {}: {:?}", attempt.id, e);
                AppError::from(e)
            })?;
        }

        tx.commit()
            .await
            .map_err(|e| AppError::InternalServerError(e.to_string()))?;

        Ok(())
    }

    async fn list_attempts_by_quiz(
        &self,
        quiz_id: Uuid,
    ) -> Result<Vec<QuizAttemptSummary>, AppError> {
        let attempts = sqlx::query_as::<_, QuizAttemptSummary>(
            r#"
            SELECT
                a.id,
                a.user_id,
                u.username,
                a.quiz_id,
                q.title as quiz_title,
                a.score,
                a.is_passed,
                a.started_at,
                a.completed_at
            FROM quiz_attempts a
            JOIN users u ON a.user_id = u.id
            JOIN quizzes q ON a.quiz_id = q.id
            WHERE a.quiz_id = $1
            ORDER BY a.completed_at DESC
            "#,
        )
        .bind(quiz_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            tracing::error!("Failed to list attempts for quiz {}: {:?}", quiz_id, e);
            AppError::from(e)
        })?;

        Ok(attempts)
    }
}

#[async_trait]
impl ProgressNotifier for PgStore {
    /// Marks every curriculum wrapping the quiz as completed for the user.
    async fn notify_quiz_passed(&self, user_id: Uuid, quiz_id: Uuid) -> Result<(), AppError> {
        let result = sqlx::query(
            r#"
            INSERT INTO curriculum_progress (user_id, curriculum_id, is_completed, completed_at)
            SELECT $1, c.id, TRUE, CURRENT_TIMESTAMP
            FROM curriculums c
            WHERE c.quiz_id = $2
            ON CONFLICT (user_id, curriculum_id) DO UPDATE SET
                is_completed = TRUE,
                completed_at = COALESCE(curriculum_progress.completed_at, EXCLUDED.completed_at)
            "#,
        )
        .bind(user_id)
        .bind(quiz_id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!(
                "No curriculum references quiz {}",
                quiz_id
            )));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    const SCHEMA: &str = include_str!("../../migrations/20250601000000_quiz_attempts.sql");

    fn table_body(name: &str) -> &'static str {
        let start = SCHEMA
            .find(&format!("CREATE TABLE IF NOT EXISTS {} (", name))
            .expect("table is created");
        let end = SCHEMA[start..].find(");").expect("table is closed");
        &SCHEMA[start..start + end]
    }

    #[test]
    fn test_answer_rows_do_not_reference_live_quiz_content() {
        let body = table_body("user_answers");
        assert!(body.contains("REFERENCES quiz_attempts(id)"));
        assert!(!body.contains("REFERENCES questions"));
        assert!(!body.contains("REFERENCES answers"));
    }
}
