// src/routes.rs

use axum::{
    Router,
    http::{HeaderValue, Method},
    middleware,
    routing::{get, post, put},
};
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::{
    handlers::{quiz, quiz_attempt},
    state::AppState,
    utils::jwt::{auth_middleware, instructor_middleware},
};

/// Assembles the main application router.
///
/// * Merges the attempt and quiz sub-routers.
/// * Applies global middleware (Trace, CORS).
/// * Injects global state (config and attempt service).
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin([
            HeaderValue::from_static("http://localhost:3000"),
            HeaderValue::from_static("http://127.0.0.1:3000"),
        ])
        .allow_methods([Method::GET, Method::POST, Method::PUT])
        .allow_headers([
            axum::http::header::AUTHORIZATION,
            axum::http::header::CONTENT_TYPE,
        ]);

    let auth = middleware::from_fn_with_state(state.config.clone(), auth_middleware);

    let attempt_routes = Router::new()
        .route("/", post(quiz_attempt::start_attempt))
        .route("/{attempt_id}", get(quiz_attempt::get_result))
        .route("/{attempt_id}/answers", post(quiz_attempt::save_answer))
        .route("/{attempt_id}/progress", put(quiz_attempt::cache_progress))
        .route("/{attempt_id}/submit", post(quiz_attempt::submit_attempt))
        .layer(auth.clone());

    let quiz_routes = Router::new()
        .route("/{quiz_id}/attempts", get(quiz::list_attempts))
        // Auth first, then the instructor check
        .layer(middleware::from_fn(instructor_middleware))
        .layer(auth);

    Router::new()
        .nest("/api/quiz-attempts", attempt_routes)
        .nest("/api/quizzes", quiz_routes)
        // Global Middleware (applied from outside in)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors),
        )
        .with_state(state)
}
