// src/services/scoring.rs

use std::collections::HashSet;

use uuid::Uuid;

use crate::models::{
    quiz::QuestionType,
    quiz_attempt::{AttemptSnapshot, QuestionSnapshot},
};

/// Outcome of scoring a cached attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScoreOutcome {
    /// Percentage in `0..=100`.
    pub score: i32,
    pub correct_answers: usize,
    pub total_questions: usize,
    pub correct_questions: HashSet<Uuid>,
}

impl ScoreOutcome {
    pub fn is_correct(&self, question_id: &Uuid) -> bool {
        self.correct_questions.contains(question_id)
    }
}

/// Checks one selection against a question snapshot.
///
/// Single-answer questions need exactly one correct answer, selected alone.
/// Multiple-choice questions need the selected set to equal the correct set.
pub fn is_answer_correct(question: &QuestionSnapshot, selected: &[Uuid]) -> bool {
    if selected.is_empty() {
        return false;
    }

    match question.question_type {
        QuestionType::SingleChoice | QuestionType::TrueFalse => {
            let correct: Vec<Uuid> = question.correct_answer_ids().collect();
            correct.len() == 1 && selected.len() == 1 && selected[0] == correct[0]
        }
        QuestionType::MultipleChoice => {
            let correct: HashSet<Uuid> = question.correct_answer_ids().collect();
            let chosen: HashSet<Uuid> = selected.iter().copied().collect();
            correct == chosen
        }
    }
}

/// Scores an attempt from its snapshot alone. Unanswered questions count as
/// wrong. An attempt without questions scores 0.
pub fn calculate_score(attempt: &AttemptSnapshot) -> ScoreOutcome {
    let total_questions = attempt.questions.len();

    let correct_questions: HashSet<Uuid> = attempt
        .questions
        .iter()
        .filter(|q| {
            attempt
                .answers
                .get(&q.question_id)
                .is_some_and(|selected| is_answer_correct(q, selected))
        })
        .map(|q| q.question_id)
        .collect();

    let correct_answers = correct_questions.len();
    let score = percentage(correct_answers, total_questions);

    ScoreOutcome {
        score,
        correct_answers,
        total_questions,
        correct_questions,
    }
}

fn percentage(correct: usize, total: usize) -> i32 {
    if total == 0 {
        return 0;
    }
    ((correct as f64 / total as f64) * 100.0).round() as i32
}
