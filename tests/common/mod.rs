#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use mentora::{
    cache::{AttemptCache, MemoryCache},
    config::Config,
    error::AppError,
    models::{
        quiz::{QuestionType, QuizAnswer, QuizDefinition, QuizQuestion},
        quiz_attempt::{AttemptSnapshot, QuizAttempt, QuizAttemptSummary, UserAnswer},
    },
    routes,
    services::{QuizAttemptService, quiz_attempt::cache_key},
    state::AppState,
    store::{ProgressNotifier, QuizStore},
    utils::jwt::sign_jwt,
};
use uuid::Uuid;

pub const JWT_SECRET: &str = "test_secret_for_integration_tests";

/// In-memory stand-in for the Postgres store and progress tracker.
#[derive(Default)]
pub struct MemoryStore {
    quizzes: Mutex<HashMap<Uuid, QuizDefinition>>,
    attempts: Mutex<HashMap<Uuid, QuizAttempt>>,
    answers: Mutex<Vec<UserAnswer>>,
    usernames: Mutex<HashMap<Uuid, String>>,
    notified: Mutex<Vec<(Uuid, Uuid)>>,
    pub fail_progress: AtomicBool,
}

impl MemoryStore {
    pub fn put_quiz(&self, quiz: QuizDefinition) {
        self.quizzes.lock().unwrap().insert(quiz.id, quiz);
    }

    pub fn put_user(&self, id: Uuid, username: &str) {
        self.usernames.lock().unwrap().insert(id, username.to_string());
    }

    pub fn attempt_count(&self) -> usize {
        self.attempts.lock().unwrap().len()
    }

    pub fn stored_attempt(&self, id: Uuid) -> Option<QuizAttempt> {
        self.attempts.lock().unwrap().get(&id).cloned()
    }

    pub fn stored_answers(&self, attempt_id: Uuid) -> Vec<UserAnswer> {
        self.answers
            .lock()
            .unwrap()
            .iter()
            .filter(|a| a.attempt_id == attempt_id)
            .cloned()
            .collect()
    }

    pub fn notifications(&self) -> Vec<(Uuid, Uuid)> {
        self.notified.lock().unwrap().clone()
    }
}

#[async_trait]
impl QuizStore for MemoryStore {
    async fn find_quiz(&self, quiz_id: Uuid) -> Result<Option<QuizDefinition>, AppError> {
        Ok(self.quizzes.lock().unwrap().get(&quiz_id).cloned())
    }

    async fn find_attempt(&self, attempt_id: Uuid) -> Result<Option<QuizAttempt>, AppError> {
        Ok(self.stored_attempt(attempt_id))
    }

    async fn find_attempt_answers(&self, attempt_id: Uuid) -> Result<Vec<UserAnswer>, AppError> {
        Ok(self.stored_answers(attempt_id))
    }

    async fn record_attempt(
        &self,
        attempt: &QuizAttempt,
        answers: &[UserAnswer],
    ) -> Result<(), AppError> {
        let mut attempts = self.attempts.lock().unwrap();
        if attempts.contains_key(&attempt.id) {
            return Err(AppError::Conflict("Quiz attempt has already been submitted".to_string()));
        }
        attempts.insert(attempt.id, attempt.clone());
        self.answers.lock().unwrap().extend_from_slice(answers);
        Ok(())
    }

    async fn list_attempts_by_quiz(
        &self,
        quiz_id: Uuid,
    ) -> Result<Vec<QuizAttemptSummary>, AppError> {
        let quizzes = self.quizzes.lock().unwrap();
        let usernames = self.usernames.lock().unwrap();
        let mut rows: Vec<QuizAttemptSummary> = self
            .attempts
            .lock()
            .unwrap()
            .values()
            .filter(|a| a.quiz_id == quiz_id)
            .map(|a| QuizAttemptSummary {
                id: a.id,
                user_id: a.user_id,
                username: usernames.get(&a.user_id).cloned().unwrap_or_default(),
                quiz_id: a.quiz_id,
                quiz_title: quizzes.get(&a.quiz_id).map(|q| q.title.clone()).unwrap_or_default(),
                score: a.score,
                is_passed: a.is_passed,
                started_at: a.started_at,
                completed_at: a.completed_at,
            })
            .collect();
        rows.sort_by(|a, b| b.completed_at.cmp(&a.completed_at));
        Ok(rows)
    }
}

#[async_trait]
impl ProgressNotifier for MemoryStore {
    async fn notify_quiz_passed(&self, user_id: Uuid, quiz_id: Uuid) -> Result<(), AppError> {
        self.notified.lock().unwrap().push((user_id, quiz_id));
        if self.fail_progress.load(Ordering::SeqCst) {
            return Err(AppError::InternalServerError("progress service down".to_string()));
        }
        Ok(())
    }
}

pub fn test_config() -> Config {
    Config {
        database_url: "postgres://unused".to_string(),
        jwt_secret: JWT_SECRET.to_string(),
        rust_log: "error".to_string(),
        port: 0,
        attempt_time_limit_secs: 3600,
        attempt_cache_ttl_secs: 7200,
        legacy_result_snapshot: false,
    }
}

/// Service wired to in-memory collaborators, with handles kept for assertions.
pub struct TestApp {
    pub config: Config,
    pub cache: Arc<MemoryCache>,
    pub store: Arc<MemoryStore>,
    pub service: QuizAttemptService,
}

impl TestApp {
    pub fn new() -> Self {
        Self::with_config(test_config())
    }

    pub fn with_config(config: Config) -> Self {
        let cache = Arc::new(MemoryCache::new(Duration::from_secs(
            config.attempt_cache_ttl_secs,
        )));
        let store = Arc::new(MemoryStore::default());
        let service =
            QuizAttemptService::new(cache.clone(), store.clone(), store.clone(), &config);
        Self { config, cache, store, service }
    }

    pub async fn snapshot(&self, attempt_id: Uuid) -> Option<AttemptSnapshot> {
        self.cache
            .get(&cache_key(attempt_id))
            .await
            .unwrap()
            .map(|entry| serde_json::from_str(&entry.value).unwrap())
    }

    pub async fn put_snapshot(&self, snapshot: &AttemptSnapshot) {
        self.cache
            .set(&cache_key(snapshot.attempt_id), serde_json::to_string(snapshot).unwrap())
            .await
            .unwrap();
    }

    /// Moves the start of a cached attempt `minutes` into the past.
    pub async fn backdate(&self, attempt_id: Uuid, minutes: i64) {
        let mut snapshot = self.snapshot(attempt_id).await.expect("attempt is cached");
        snapshot.start_time = Utc::now() - chrono::Duration::minutes(minutes);
        self.put_snapshot(&snapshot).await;
    }

    /// Spawns the HTTP app on a random port and returns its base URL.
    pub async fn spawn(&self) -> String {
        let state = AppState {
            config: self.config.clone(),
            attempts: self.service.clone(),
        };
        let app = routes::create_router(state);

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind random port");
        let port = listener.local_addr().unwrap().port();

        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        format!("http://127.0.0.1:{}", port)
    }
}

pub fn bearer(user_id: Uuid, role: &str) -> String {
    let token = sign_jwt(user_id, role, JWT_SECRET, 600).unwrap();
    format!("Bearer {}", token)
}

fn question(kind: QuestionType, correct: &[bool]) -> QuizQuestion {
    QuizQuestion {
        id: Uuid::new_v4(),
        question_type: kind,
        answers: correct
            .iter()
            .map(|&is_correct| QuizAnswer { id: Uuid::new_v4(), is_correct })
            .collect(),
    }
}

/// Three options, the first one correct.
pub fn single_choice() -> QuizQuestion {
    question(QuestionType::SingleChoice, &[true, false, false])
}

/// Four options, the first two correct.
pub fn multiple_choice() -> QuizQuestion {
    question(QuestionType::MultipleChoice, &[true, true, false, false])
}

/// "True" (correct) then "False".
pub fn true_false() -> QuizQuestion {
    question(QuestionType::TrueFalse, &[true, false])
}

pub fn quiz(questions: Vec<QuizQuestion>, passing_score: Option<i32>) -> QuizDefinition {
    QuizDefinition {
        id: Uuid::new_v4(),
        title: "Rust Fundamentals".to_string(),
        passing_score,
        questions,
    }
}

pub fn correct_ids(question: &QuizQuestion) -> Vec<Uuid> {
    question.answers.iter().filter(|a| a.is_correct).map(|a| a.id).collect()
}

pub fn wrong_id(question: &QuizQuestion) -> Uuid {
    question
        .answers
        .iter()
        .find(|a| !a.is_correct)
        .map(|a| a.id)
        .expect("question has a wrong answer")
}
