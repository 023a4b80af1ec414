use crate::config::Config;
use crate::services::QuizAttemptService;
use axum::extract::FromRef;

#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub attempts: QuizAttemptService,
}

impl FromRef<AppState> for QuizAttemptService {
    fn from_ref(state: &AppState) -> Self {
        state.attempts.clone()
    }
}

impl FromRef<AppState> for Config {
    fn from_ref(state: &AppState) -> Self {
        state.config.clone()
    }
}
