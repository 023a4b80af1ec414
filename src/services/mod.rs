// src/services/mod.rs

pub mod quiz_attempt;
pub mod scoring;

pub use quiz_attempt::QuizAttemptService;
