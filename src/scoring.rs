// src/scoring.rs

//! Deterministic scoring of a submitted answer vector.
//!
//! Everything here is total: degenerate questions (no option or several
//! options flagged correct) and out-of-range answers earn zero credit instead
//! of failing the submission.

use serde::{Deserialize, Serialize};

use crate::models::test::Question;

/// Answer index meaning "not answered" / "no correct option".
pub const UNANSWERED: i64 = -1;

/// Letter grade derived from the percentage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Grade {
    #[serde(rename = "A+")]
    APlus,
    A,
    B,
    C,
    D,
    F,
}

impl Grade {
    pub fn from_percentage(percentage: i64) -> Self {
        match percentage {
            p if p >= 90 => Grade::APlus,
            p if p >= 80 => Grade::A,
            p if p >= 70 => Grade::B,
            p if p >= 60 => Grade::C,
            p if p >= 50 => Grade::D,
            _ => Grade::F,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Grade::APlus => "A+",
            Grade::A => "A",
            Grade::B => "B",
            Grade::C => "C",
            Grade::D => "D",
            Grade::F => "F",
        }
    }
}

/// Outcome for a single question.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestionOutcome {
    pub question_index: usize,
    pub question: String,
    pub selected: i64,
    pub correct_option: i64,
    pub selected_text: Option<String>,
    pub correct_text: Option<String>,
    pub is_correct: bool,
    pub marks: i64,
    pub marks_obtained: i64,
}

/// Aggregate score for one submission.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoreSheet {
    pub outcomes: Vec<QuestionOutcome>,
    pub correct_count: usize,
    pub total_questions: usize,
    pub obtained_marks: i64,
    pub total_marks: i64,
    pub percentage: i64,
    pub grade: Grade,
}

/// Index of the unique correct option, or `UNANSWERED` when zero or
/// several options are flagged.
pub fn correct_option(question: &Question) -> i64 {
    let mut flagged = question
        .options
        .iter()
        .enumerate()
        .filter(|(_, o)| o.is_correct)
        .map(|(i, _)| i);

    match (flagged.next(), flagged.next()) {
        (Some(index), None) => index as i64,
        _ => UNANSWERED,
    }
}

/// Weight of a question; unset or non-positive weights count as 1.
pub fn question_marks(question: &Question) -> i64 {
    question.marks.filter(|m| *m > 0).unwrap_or(1)
}

/// `round(correct / max(1, total) * 100)`.
pub fn percentage(correct_count: usize, total_questions: usize) -> i64 {
    let denominator = total_questions.max(1) as f64;
    ((correct_count as f64 / denominator) * 100.0).round() as i64
}

fn option_text(question: &Question, index: i64) -> Option<String> {
    usize::try_from(index)
        .ok()
        .and_then(|i| question.options.get(i))
        .map(|o| o.text.clone())
}

/// Scores `answers` against `questions`.
///
/// Missing trailing answers count as unanswered; surplus answers are ignored.
pub fn score(questions: &[Question], answers: &[i64]) -> ScoreSheet {
    let outcomes: Vec<QuestionOutcome> = questions
        .iter()
        .enumerate()
        .map(|(index, question)| {
            let selected = answers.get(index).copied().unwrap_or(UNANSWERED);
            let correct = correct_option(question);
            let marks = question_marks(question);
            let is_correct = correct >= 0 && selected == correct;

            QuestionOutcome {
                question_index: index,
                question: question.text.clone(),
                selected,
                correct_option: correct,
                selected_text: option_text(question, selected),
                correct_text: option_text(question, correct),
                is_correct,
                marks,
                marks_obtained: if is_correct { marks } else { 0 },
            }
        })
        .collect();

    let correct_count = outcomes.iter().filter(|o| o.is_correct).count();
    let total_questions = questions.len();
    let percentage = percentage(correct_count, total_questions);

    ScoreSheet {
        correct_count,
        total_questions,
        obtained_marks: outcomes.iter().map(|o| o.marks_obtained).sum(),
        total_marks: outcomes.iter().map(|o| o.marks).sum(),
        percentage,
        grade: Grade::from_percentage(percentage),
        outcomes,
    }
}

/// One synthetic answer pattern run through [`score`].
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Simulation {
    pub scenario: &'static str,
    pub answers: Vec<i64>,
    pub correct_count: usize,
    pub total_questions: usize,
    pub percentage: i64,
}

/// Per-question structure check used by the authoring diagnostics.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestionCheck {
    pub index: usize,
    pub option_count: usize,
    pub correct_option: i64,
    pub has_correct_answer: bool,
}

/// Scores the all-correct and all-wrong answer patterns for a test.
///
/// An all-correct run below 100% means some questions are unscorable.
pub fn simulate(questions: &[Question]) -> Vec<Simulation> {
    let all_correct: Vec<i64> = questions.iter().map(correct_option).collect();
    let all_wrong: Vec<i64> = all_correct
        .iter()
        .map(|&c| if c == 0 { 1 } else { 0 })
        .collect();

    [("all_correct", all_correct), ("all_wrong", all_wrong)]
        .into_iter()
        .map(|(scenario, answers)| {
            let sheet = score(questions, &answers);
            Simulation {
                scenario,
                answers,
                correct_count: sheet.correct_count,
                total_questions: sheet.total_questions,
                percentage: sheet.percentage,
            }
        })
        .collect()
}

pub fn check_structure(questions: &[Question]) -> Vec<QuestionCheck> {
    questions
        .iter()
        .enumerate()
        .map(|(index, q)| {
            let correct = correct_option(q);
            QuestionCheck {
                index,
                option_count: q.options.len(),
                correct_option: correct,
                has_correct_answer: correct >= 0,
            }
        })
        .collect()
}
