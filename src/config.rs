// src/config.rs

use std::env;
use std::str::FromStr;

use dotenvy::dotenv;

/// Passing score applied when a quiz does not define one.
pub const DEFAULT_PASSING_SCORE: i32 = 70;

/// Wall-clock limit for a single quiz attempt, in seconds.
pub const ATTEMPT_TIME_LIMIT_SECS: i64 = 60 * 60;

/// Default lifetime of a cached attempt snapshot, in seconds.
pub const ATTEMPT_CACHE_TTL_SECS: u64 = 2 * 60 * 60;

/// Prefix of every attempt key stored in the cache.
pub const ATTEMPT_CACHE_PREFIX: &str = "quiz-attempt:";

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub jwt_secret: String,
    pub rust_log: String,
    pub port: u16,
    pub attempt_time_limit_secs: i64,
    pub attempt_cache_ttl_secs: u64,
    /// Serve the cached pre-submission snapshot from `get_result` once an
    /// attempt has been persisted, instead of the stored result.
    pub legacy_result_snapshot: bool,
}

impl Config {
    pub fn from_env() -> Self {
        dotenv().ok();

        let database_url = env::var("DATABASE_URL")
            .expect("DATABASE_URL must be set");

        let jwt_secret = env::var("JWT_SECRET")
            .expect("JWT_SECRET must be set");

        let rust_log = env::var("RUST_LOG")
            .unwrap_or_else(|_| "info".to_string());

        Self {
            database_url,
            jwt_secret,
            rust_log,
            port: parse_var("PORT", 3000),
            attempt_time_limit_secs: parse_var("QUIZ_ATTEMPT_TIME_LIMIT", ATTEMPT_TIME_LIMIT_SECS),
            attempt_cache_ttl_secs: parse_var("QUIZ_ATTEMPT_CACHE_TTL", ATTEMPT_CACHE_TTL_SECS),
            legacy_result_snapshot: parse_var("LEGACY_RESULT_SNAPSHOT", false),
        }
    }
}

/// Reads an optional variable, falling back to `default` when it is unset
/// or does not parse.
fn parse_var<T: FromStr>(key: &str, default: T) -> T {
    match env::var(key) {
        Ok(raw) => parse_or(&raw, default, key),
        Err(_) => default,
    }
}

fn parse_or<T: FromStr>(raw: &str, default: T, key: &str) -> T {
    raw.trim().parse().unwrap_or_else(|_| {
        tracing::warn!("Ignoring invalid value {:?} for {}", raw, key);
        default
    })
}
