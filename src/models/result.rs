// src/models/result.rs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, types::Json};
use uuid::Uuid;
use validator::Validate;

use crate::{error::AppError, monitor::Violation, scoring::QuestionOutcome};

/// Why a session was finalized.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubmissionReason {
    Manual,
    TimeExpired,
    SecurityViolations,
}

impl SubmissionReason {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Manual => "manual",
            Self::TimeExpired => "time_expired",
            Self::SecurityViolations => "security_violations",
        }
    }

    /// Anything but a manual submit was triggered by the monitor itself.
    pub fn is_automatic(self) -> bool {
        !matches!(self, Self::Manual)
    }
}

/// How the respondent reached the test.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccessMode {
    /// Authenticated respondent; receives the full score breakdown.
    Direct,
    /// Anonymous respondent via share link; receives an acknowledgment only.
    Link,
}

impl AccessMode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Direct => "direct",
            Self::Link => "link",
        }
    }
}

/// The single payload a finalized session hands to the scoring boundary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct FinalizationPayload {
    /// Generated once at finalization; repeated deliveries reuse it.
    pub submission_id: Uuid,
    pub test_id: i64,
    #[validate(length(min = 1, max = 100))]
    pub user_name: String,
    #[validate(email)]
    pub user_email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[validate(length(max = 50))]
    pub roll_number: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[validate(length(max = 30))]
    pub phone: Option<String>,
    #[validate(length(max = 500))]
    pub answers: Vec<i64>,
    #[validate(range(min = 0))]
    pub time_taken_seconds: i64,
    #[validate(length(max = 1000))]
    pub violations: Vec<Violation>,
    pub total_violations: u32,
    pub tab_switches: u32,
    pub auto_submitted: bool,
    pub exam_locked: bool,
    pub submission_reason: SubmissionReason,
}

/// Score summary returned to authenticated respondents.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoreSummary {
    pub correct_count: i64,
    pub total_questions: i64,
    pub obtained_marks: i64,
    pub total_marks: i64,
    pub percentage: i64,
    pub grade: String,
    #[serde(default)]
    pub outcomes: Vec<QuestionOutcome>,
}

/// Response to a finalization call.
///
/// `score` is omitted for link-based submissions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmissionResponse {
    pub result_id: i64,
    pub submission_id: Uuid,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<ScoreSummary>,
}

/// Represents the 'results' table in the database.
/// Rows are written once and never updated.
#[derive(Debug, Clone, FromRow, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExamResult {
    pub id: i64,
    pub submission_id: String,
    pub test_id: i64,
    pub user_id: Option<i64>,
    pub respondent_name: String,
    pub respondent_email: String,
    pub roll_number: Option<String>,
    pub phone: Option<String>,
    pub answers: Json<Vec<i64>>,
    pub outcomes: Json<Vec<QuestionOutcome>>,
    pub correct_count: i64,
    pub total_questions: i64,
    pub obtained_marks: i64,
    pub total_marks: i64,
    pub percentage: i64,
    pub grade: String,
    pub time_taken_seconds: i64,
    pub violations: Json<Vec<Violation>>,
    pub total_violations: i64,
    pub tab_switches: i64,
    pub auto_submitted: bool,
    pub exam_locked: bool,
    pub submission_reason: String,
    pub access_mode: String,
    pub submitted_at: DateTime<Utc>,
}

impl ExamResult {
    pub fn submission_uuid(&self) -> Result<Uuid, AppError> {
        Uuid::parse_str(&self.submission_id)
            .map_err(|e| AppError::InternalServerError(format!("corrupt submission id: {}", e)))
    }

    pub fn score_summary(&self) -> ScoreSummary {
        ScoreSummary {
            correct_count: self.correct_count,
            total_questions: self.total_questions,
            obtained_marks: self.obtained_marks,
            total_marks: self.total_marks,
            percentage: self.percentage,
            grade: self.grade.clone(),
            outcomes: self.outcomes.0.clone(),
        }
    }
}

/// Compact row for listing a test's results.
#[derive(Debug, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct ResultListEntry {
    pub id: i64,
    pub respondent_name: String,
    pub respondent_email: String,
    pub roll_number: Option<String>,
    pub percentage: i64,
    pub grade: String,
    pub total_violations: i64,
    pub submission_reason: String,
    pub access_mode: String,
    pub submitted_at: DateTime<Utc>,
}
