// src/models/quiz.rs

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// How a question is answered and scored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum QuestionType {
    SingleChoice,
    MultipleChoice,
    TrueFalse,
}

impl QuestionType {
    /// Whether a selection of more than one answer is rejected outright.
    /// True/false selections are accepted and scored wrong instead.
    pub fn rejects_multiple(self) -> bool {
        matches!(self, QuestionType::SingleChoice)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            QuestionType::SingleChoice => "SINGLE_CHOICE",
            QuestionType::MultipleChoice => "MULTIPLE_CHOICE",
            QuestionType::TrueFalse => "TRUE_FALSE",
        }
    }
}

impl fmt::Display for QuestionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for QuestionType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "SINGLE_CHOICE" => Ok(QuestionType::SingleChoice),
            "MULTIPLE_CHOICE" => Ok(QuestionType::MultipleChoice),
            "TRUE_FALSE" => Ok(QuestionType::TrueFalse),
            other => Err(format!("Unknown question type '{}'", other)),
        }
    }
}

/// A quiz as loaded from the store, with its questions and candidate answers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuizDefinition {
    pub id: Uuid,
    pub title: String,

    /// Minimum percentage to pass. `None` falls back to the default.
    pub passing_score: Option<i32>,

    pub questions: Vec<QuizQuestion>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuizQuestion {
    pub id: Uuid,
    pub question_type: QuestionType,
    pub answers: Vec<QuizAnswer>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuizAnswer {
    pub id: Uuid,
    pub is_correct: bool,
}
