// src/models/quiz_attempt.rs

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;
use validator::Validate;

use crate::{
    config::DEFAULT_PASSING_SCORE,
    models::quiz::{QuestionType, QuizDefinition},
};

/// Selected answer ids per question. A selection always holds at least one id.
pub type AnswerMap = HashMap<Uuid, Vec<Uuid>>;

/// Candidate answer captured at attempt start.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnswerSnapshot {
    pub answer_id: Uuid,
    pub is_correct: bool,
}

/// Quiz-level data copied into each question so scoring is self-contained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuizSettings {
    pub passing_score: i32,
}

/// A question frozen at attempt start. Later edits to the quiz do not touch it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuestionSnapshot {
    pub question_id: Uuid,
    pub question_type: QuestionType,
    pub answers: Vec<AnswerSnapshot>,
    pub quiz: QuizSettings,
}

impl QuestionSnapshot {
    pub fn has_answer(&self, answer_id: Uuid) -> bool {
        self.answers.iter().any(|a| a.answer_id == answer_id)
    }

    pub fn correct_answer_ids(&self) -> impl Iterator<Item = Uuid> + '_ {
        self.answers
            .iter()
            .filter(|a| a.is_correct)
            .map(|a| a.answer_id)
    }
}

/// In-progress attempt, stored in the cache under `quiz-attempt:<attempt_id>`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttemptSnapshot {
    pub attempt_id: Uuid,
    pub start_time: DateTime<Utc>,
    pub quiz_id: Uuid,
    pub user_id: Uuid,
    pub questions: Vec<QuestionSnapshot>,
    #[serde(default)]
    pub answers: AnswerMap,

    /// Seconds remaining, as last reported by the client or computed on read.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_left: Option<i64>,
}

impl AttemptSnapshot {
    pub fn capture(
        attempt_id: Uuid,
        user_id: Uuid,
        quiz: &QuizDefinition,
        start_time: DateTime<Utc>,
    ) -> Self {
        let settings = QuizSettings {
            passing_score: quiz.passing_score.unwrap_or(DEFAULT_PASSING_SCORE),
        };

        let questions = quiz
            .questions
            .iter()
            .map(|q| QuestionSnapshot {
                question_id: q.id,
                question_type: q.question_type,
                answers: q
                    .answers
                    .iter()
                    .map(|a| AnswerSnapshot {
                        answer_id: a.id,
                        is_correct: a.is_correct,
                    })
                    .collect(),
                quiz: settings,
            })
            .collect();

        Self {
            attempt_id,
            start_time,
            quiz_id: quiz.id,
            user_id,
            questions,
            answers: AnswerMap::new(),
            time_left: None,
        }
    }

    pub fn question(&self, question_id: Uuid) -> Option<&QuestionSnapshot> {
        self.questions.iter().find(|q| q.question_id == question_id)
    }

    pub fn passing_score(&self) -> i32 {
        self.questions
            .first()
            .map(|q| q.quiz.passing_score)
            .unwrap_or(DEFAULT_PASSING_SCORE)
    }
}

/// Represents the 'quiz_attempts' table. Written once, at submit.
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct QuizAttempt {
    /// Same id as the cached attempt it was submitted from.
    pub id: Uuid,
    pub user_id: Uuid,
    pub quiz_id: Uuid,
    pub score: i32,
    pub is_passed: bool,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
}

/// Represents the 'user_answers' table.
/// Holds only the first selected answer of a question.
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct UserAnswer {
    pub id: Uuid,
    pub attempt_id: Uuid,
    pub question_id: Uuid,
    pub answer_id: Uuid,
    pub is_correct: bool,
}

/// Persisted attempt joined with user and quiz metadata, for instructors.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct QuizAttemptSummary {
    pub id: Uuid,
    pub user_id: Uuid,
    pub username: String,
    pub quiz_id: Uuid,
    pub quiz_title: String,
    pub score: i32,
    pub is_passed: bool,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
}

/// DTO for starting an attempt.
/// `questions` is kept raw so a non-array payload is reported as a
/// validation error instead of a deserialization rejection.
#[derive(Debug, Deserialize)]
pub struct StartAttemptRequest {
    pub quiz_id: Uuid,
    #[serde(default)]
    pub questions: serde_json::Value,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct StartAttemptResponse {
    pub attempt_id: Uuid,
    pub start_time: DateTime<Utc>,
}

/// DTO for saving the selection of one question.
#[derive(Debug, Deserialize, Validate)]
pub struct SaveAnswerRequest {
    pub question_id: Uuid,
    #[validate(length(min = 1, message = "At least one answer must be selected."))]
    pub selected_answers: Vec<Uuid>,
}

/// DTO for the client autosave checkpoint.
#[derive(Debug, Deserialize, Validate)]
pub struct CacheProgressRequest {
    #[serde(default)]
    pub answers: AnswerMap,
    #[validate(range(min = 0, message = "time_left cannot be negative."))]
    pub time_left: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmitAttemptResponse {
    pub attempt_id: Uuid,
    pub score: i32,
    pub total_questions: usize,
    pub correct_answers: usize,
    pub is_passed: bool,
    /// Minutes between start and submit, rounded.
    pub time_spent: i64,
}

/// A persisted attempt with its answer rows.
#[derive(Debug, Clone, Serialize)]
pub struct SubmittedAttempt {
    #[serde(flatten)]
    pub attempt: QuizAttempt,
    pub answers: Vec<UserAnswer>,
}

/// What `get_result` hands back, tagged by `status`.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum AttemptResult {
    /// Not submitted yet; `time_left` is filled in.
    InProgress(AttemptSnapshot),
    /// Submitted; the stored result.
    Submitted(SubmittedAttempt),
    /// Submitted, but answered from the pre-submission cache entry
    /// (legacy result mode only).
    StaleSnapshot(AttemptSnapshot),
}
