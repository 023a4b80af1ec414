// src/services/quiz_attempt.rs

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;

use crate::{
    cache::{AttemptCache, Versioned},
    config::{ATTEMPT_CACHE_PREFIX, Config},
    error::AppError,
    models::quiz_attempt::{
        AnswerMap, AttemptResult, AttemptSnapshot, QuestionSnapshot, QuizAttempt,
        QuizAttemptSummary, StartAttemptResponse, SubmitAttemptResponse, SubmittedAttempt,
        UserAnswer,
    },
    services::scoring::calculate_score,
    store::{ProgressNotifier, QuizStore},
};

/// How many times a read-modify-write of a cached attempt is retried when
/// another writer changed the entry in between.
const MAX_WRITE_RETRIES: usize = 3;

pub fn cache_key(attempt_id: Uuid) -> String {
    format!("{}{}", ATTEMPT_CACHE_PREFIX, attempt_id)
}

/// Checks a selection for one question and returns it without duplicates.
pub fn validate_selection(
    question: &QuestionSnapshot,
    selected: &[Uuid],
) -> Result<Vec<Uuid>, AppError> {
    let mut seen = HashSet::new();
    let ids: Vec<Uuid> = selected.iter().copied().filter(|id| seen.insert(*id)).collect();

    if ids.is_empty() {
        return Err(AppError::BadRequest(
            "At least one answer must be selected".to_string(),
        ));
    }

    if ids.len() > 1 && question.question_type.rejects_multiple() {
        return Err(AppError::BadRequest(format!(
            "Question {} accepts a single answer",
            question.question_id
        )));
    }

    if let Some(unknown) = ids.iter().find(|id| !question.has_answer(**id)) {
        return Err(AppError::BadRequest(format!(
            "Answer {} does not belong to question {}",
            unknown, question.question_id
        )));
    }

    Ok(ids)
}

/// Orchestrates the lifecycle of a quiz attempt:
/// start, save answers, autosave, submit and result lookup.
///
/// In-progress attempts live only in the cache; an attempt reaches the store
/// when it is submitted.
#[derive(Clone)]
pub struct QuizAttemptService {
    cache: Arc<dyn AttemptCache>,
    store: Arc<dyn QuizStore>,
    progress: Arc<dyn ProgressNotifier>,
    time_limit: Duration,
    legacy_result_snapshot: bool,
}

impl QuizAttemptService {
    pub fn new(
        cache: Arc<dyn AttemptCache>,
        store: Arc<dyn QuizStore>,
        progress: Arc<dyn ProgressNotifier>,
        config: &Config,
    ) -> Self {
        Self {
            cache,
            store,
            progress,
            time_limit: Duration::seconds(config.attempt_time_limit_secs),
            legacy_result_snapshot: config.legacy_result_snapshot,
        }
    }

    /// Starts an attempt by caching a snapshot of the quiz's questions.
    ///
    /// `questions` is the client's view of the quiz and must be a JSON array;
    /// the snapshot itself is always taken from the store.
    pub async fn start_attempt(
        &self,
        user_id: Uuid,
        quiz_id: Uuid,
        questions: &serde_json::Value,
    ) -> Result<StartAttemptResponse, AppError> {
        if !questions.is_array() {
            return Err(AppError::BadRequest("questions must be an array".to_string()));
        }

        let quiz = self
            .store
            .find_quiz(quiz_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Quiz {} not found", quiz_id)))?;

        if quiz.questions.is_empty() {
            return Err(AppError::BadRequest(format!(
                "Quiz {} has no questions",
                quiz_id
            )));
        }

        let attempt_id = Uuid::new_v4();
        let start_time = Utc::now();
        let snapshot = AttemptSnapshot::capture(attempt_id, user_id, &quiz, start_time);

        self.cache
            .set(&cache_key(attempt_id), serde_json::to_string(&snapshot)?)
            .await?;

        tracing::info!(
            "User {} started attempt {} on quiz {} ({} questions)",
            user_id,
            attempt_id,
            quiz_id,
            snapshot.questions.len()
        );

        Ok(StartAttemptResponse {
            attempt_id,
            start_time,
        })
    }

    /// Records the selection for one question, replacing any earlier one.
    pub async fn save_answer(
        &self,
        attempt_id: Uuid,
        question_id: Uuid,
        selected_answers: &[Uuid],
    ) -> Result<(), AppError> {
        self.update(attempt_id, |attempt| {
            let question = attempt.question(question_id).ok_or_else(|| {
                AppError::NotFound(format!(
                    "Question {} is not part of attempt {}",
                    question_id, attempt_id
                ))
            })?;

            let ids = validate_selection(question, selected_answers)?;
            attempt.answers.insert(question_id, ids);
            Ok(())
        })
        .await?;

        tracing::debug!("Saved answer for question {} in attempt {}", question_id, attempt_id);
        Ok(())
    }

    /// Replaces the cached answers and remaining time wholesale.
    pub async fn cache_progress(
        &self,
        attempt_id: Uuid,
        answers: &AnswerMap,
        time_left: i64,
    ) -> Result<(), AppError> {
        if time_left < 0 {
            return Err(AppError::BadRequest("time_left cannot be negative".to_string()));
        }

        self.update(attempt_id, |attempt| {
            let mut checked = AnswerMap::new();
            for (question_id, selected) in answers {
                if selected.is_empty() {
                    continue;
                }
                let question = attempt.question(*question_id).ok_or_else(|| {
                    AppError::BadRequest(format!(
                        "Question {} is not part of attempt {}",
                        question_id, attempt_id
                    ))
                })?;
                checked.insert(*question_id, validate_selection(question, selected)?);
            }

            attempt.answers = checked;
            attempt.time_left = Some(time_left);
            Ok(())
        })
        .await?;

        tracing::debug!("Cached progress for attempt {} ({}s left)", attempt_id, time_left);
        Ok(())
    }

    /// Scores and persists the attempt, then clears it from the cache.
    pub async fn submit_attempt(&self, attempt_id: Uuid) -> Result<SubmitAttemptResponse, AppError> {
        let key = cache_key(attempt_id);
        let Versioned { value: attempt, .. } = self.load(attempt_id).await?;

        if attempt.questions.is_empty() {
            return Err(AppError::BadRequest(
                "Invalid or missing question data".to_string(),
            ));
        }

        let now = Utc::now();
        let elapsed = now - attempt.start_time;
        if elapsed > self.time_limit {
            tracing::warn!(
                "Rejected submit of attempt {}: {}s elapsed",
                attempt_id,
                elapsed.num_seconds()
            );
            return Err(AppError::TimeLimitExceeded(
                "Quiz time limit exceeded".to_string(),
            ));
        }

        let outcome = calculate_score(&attempt);
        let is_passed = outcome.score >= attempt.passing_score();

        let record = QuizAttempt {
            id: attempt.attempt_id,
            user_id: attempt.user_id,
            quiz_id: attempt.quiz_id,
            score: outcome.score,
            is_passed,
            started_at: attempt.start_time,
            completed_at: now,
        };

        let answers: Vec<UserAnswer> = attempt
            .answers
            .iter()
            .filter_map(|(question_id, selected)| {
                selected.first().map(|&answer_id| UserAnswer {
                    id: Uuid::new_v4(),
                    attempt_id: attempt.attempt_id,
                    question_id: *question_id,
                    answer_id,
                    is_correct: outcome.is_correct(question_id),
                })
            })
            .collect();

        self.store.record_attempt(&record, &answers).await?;

        // The attempt is committed; a leftover entry is cleared by get_result
        // or expires. Saves that raced this submit are dropped with it.
        if let Err(e) = self.cache.del(&key).await {
            tracing::warn!("Failed to clear cached attempt {} after submit: {}", attempt_id, e);
        }

        tracing::info!(
            "Attempt {} submitted: score {} ({}/{}), passed: {}",
            attempt_id,
            outcome.score,
            outcome.correct_answers,
            outcome.total_questions,
            is_passed
        );

        if is_passed {
            if let Err(e) = self
                .progress
                .notify_quiz_passed(attempt.user_id, attempt.quiz_id)
                .await
            {
                tracing::warn!(
                    "Failed to record quiz completion for user {} on quiz {}: {}",
                    attempt.user_id,
                    attempt.quiz_id,
                    e
                );
            }
        }

        Ok(SubmitAttemptResponse {
            attempt_id,
            score: outcome.score,
            total_questions: outcome.total_questions,
            correct_answers: outcome.correct_answers,
            is_passed,
            time_spent: (elapsed.num_seconds() as f64 / 60.0).round() as i64,
        })
    }

    /// Returns the live attempt while it is in progress, or its stored result
    /// once submitted.
    pub async fn get_result(&self, attempt_id: Uuid) -> Result<AttemptResult, AppError> {
        let key = cache_key(attempt_id);
        let cached = match self.cache.get(&key).await? {
            Some(entry) => Some(serde_json::from_str::<AttemptSnapshot>(&entry.value)?),
            None => None,
        };

        match cached {
            Some(mut snapshot) => match self.store.find_attempt(attempt_id).await? {
                None => {
                    snapshot.time_left = Some(self.time_left(&snapshot, Utc::now()));
                    Ok(AttemptResult::InProgress(snapshot))
                }
                Some(record) => {
                    // Submitted but still cached: drop the orphan.
                    self.cache.del(&key).await?;
                    if self.legacy_result_snapshot {
                        Ok(AttemptResult::StaleSnapshot(snapshot))
                    } else {
                        self.submitted(record).await
                    }
                }
            },
            None if self.legacy_result_snapshot => Err(not_found(attempt_id)),
            None => match self.store.find_attempt(attempt_id).await? {
                Some(record) => self.submitted(record).await,
                None => Err(not_found(attempt_id)),
            },
        }
    }

    /// Persisted attempts of a quiz, most recent first.
    pub async fn get_quiz_attempts_by_quiz_id(
        &self,
        quiz_id: Uuid,
    ) -> Result<Vec<QuizAttemptSummary>, AppError> {
        self.store.list_attempts_by_quiz(quiz_id).await
    }

    fn time_left(&self, attempt: &AttemptSnapshot, now: DateTime<Utc>) -> i64 {
        let remaining = self.time_limit - (now - attempt.start_time);
        remaining.num_seconds().max(0)
    }

    async fn submitted(&self, attempt: QuizAttempt) -> Result<AttemptResult, AppError> {
        let answers = self.store.find_attempt_answers(attempt.id).await?;
        Ok(AttemptResult::Submitted(SubmittedAttempt { attempt, answers }))
    }

    async fn load(&self, attempt_id: Uuid) -> Result<Versioned<AttemptSnapshot>, AppError> {
        let entry = self
            .cache
            .get(&cache_key(attempt_id))
            .await?
            .ok_or_else(|| not_found(attempt_id))?;

        Ok(Versioned {
            value: serde_json::from_str(&entry.value)?,
            version: entry.version,
        })
    }

    /// Read-modify-write of a cached attempt guarded by compare-and-swap.
    /// `apply` may run more than once and must leave the attempt untouched
    /// when it fails.
    async fn update<F>(&self, attempt_id: Uuid, mut apply: F) -> Result<AttemptSnapshot, AppError>
    where
        F: FnMut(&mut AttemptSnapshot) -> Result<(), AppError> + Send,
    {
        let key = cache_key(attempt_id);

        for _ in 0..MAX_WRITE_RETRIES {
            let Versioned { value: mut attempt, version } = self.load(attempt_id).await?;
            apply(&mut attempt)?;

            let encoded = serde_json::to_string(&attempt)?;
            if self.cache.compare_and_set(&key, version, encoded).await? {
                return Ok(attempt);
            }

            tracing::debug!("Concurrent write on attempt {}, retrying", attempt_id);
        }

        Err(AppError::Conflict(format!(
            "Attempt {} is being modified concurrently, please retry",
            attempt_id
        )))
    }
}

fn not_found(attempt_id: Uuid) -> AppError {
    AppError::NotFound(format!("Quiz attempt {} not found or expired", attempt_id))
}
