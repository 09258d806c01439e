// src/models/test.rs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{prelude::FromRow, types::Json};
use url::Url;
use validator::Validate;

use crate::config::{MAX_SHARE_LINK_HOURS, MAX_TEST_DURATION_MINUTES};

/// One answer choice of a question.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnswerOption {
    pub text: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,

    /// Whether this option is a correct answer. Never sent to respondents.
    #[serde(default)]
    pub is_correct: bool,
}

/// A multiple-choice question as stored in the `tests.questions` JSON column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Question {
    pub text: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,

    #[serde(default)]
    pub options: Vec<AnswerOption>,

    /// Weight of the question. Treated as 1 when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub marks: Option<i64>,
}

/// Per-test proctoring settings.
///
/// Absent thresholds fall back to the monitor defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ProctoringConfig {
    pub camera_required: bool,
    pub fullscreen_required: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tab_switch_limit: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_violations: Option<u32>,
    pub prevent_copy: bool,
}

impl Default for ProctoringConfig {
    fn default() -> Self {
        Self {
            camera_required: true,
            fullscreen_required: true,
            tab_switch_limit: None,
            max_violations: None,
            prevent_copy: true,
        }
    }
}

/// Represents the 'tests' table in the database.
#[derive(Debug, Clone, FromRow, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Test {
    pub id: i64,
    pub title: String,
    pub description: String,

    /// Time budget in minutes. Zero means untimed.
    pub duration_minutes: i64,

    pub questions: Json<Vec<Question>>,
    pub proctoring: Json<ProctoringConfig>,

    #[serde(skip)]
    pub share_token: Option<String>,
    pub share_expires_at: Option<DateTime<Utc>>,

    pub created_by: Option<i64>,
    pub created_at: DateTime<Utc>,
}

impl Test {
    /// True when a share link exists and its expiry (if any) lies in the past.
    pub fn share_expired(&self, now: DateTime<Utc>) -> bool {
        matches!(self.share_expires_at, Some(expiry) if expiry <= now)
    }

    /// Respondent-facing view with correctness flags removed.
    pub fn to_public(&self) -> PublicTest {
        PublicTest {
            id: self.id,
            title: self.title.clone(),
            description: self.description.clone(),
            duration: self.duration_minutes,
            total_marks: self
                .questions
                .iter()
                .map(|q| q.marks.filter(|m| *m > 0).unwrap_or(1))
                .sum(),
            questions: self
                .questions
                .iter()
                .enumerate()
                .map(|(index, q)| PublicQuestion {
                    index,
                    text: q.text.clone(),
                    image: q.image.clone(),
                    options: q
                        .options
                        .iter()
                        .map(|o| PublicOption {
                            text: o.text.clone(),
                            image: o.image.clone(),
                        })
                        .collect(),
                    marks: q.marks.filter(|m| *m > 0).unwrap_or(1),
                })
                .collect(),
            proctoring_config: self.proctoring.0.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PublicOption {
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PublicQuestion {
    pub index: usize,
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    pub options: Vec<PublicOption>,
    pub marks: i64,
}

/// DTO for a respondent taking a test (excludes correctness flags).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicTest {
    pub id: i64,
    pub title: String,
    pub description: String,
    /// Minutes; zero disables the countdown.
    pub duration: i64,
    pub total_marks: i64,
    pub questions: Vec<PublicQuestion>,
    #[serde(default)]
    pub proctoring_config: ProctoringConfig,
}

/// DTO for creating a test.
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateTestRequest {
    #[validate(length(min = 1, max = 200))]
    pub title: String,
    #[serde(default)]
    #[validate(length(max = 1000))]
    pub description: String,
    #[validate(range(min = 0, max = MAX_TEST_DURATION_MINUTES))]
    pub duration: i64,
    #[validate(custom(function = validate_questions))]
    pub questions: Vec<Question>,
    #[serde(default)]
    #[validate(custom(function = validate_proctoring))]
    pub proctoring_config: ProctoringConfig,
}

/// DTO for issuing a share link.
#[derive(Debug, Default, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ShareLinkRequest {
    #[validate(range(min = 1, max = MAX_SHARE_LINK_HOURS))]
    pub expires_in_hours: Option<i64>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ShareLinkResponse {
    pub test_id: i64,
    pub share_token: String,
    pub expires_at: Option<DateTime<Utc>>,
}

fn validate_image(image: &Option<String>) -> Result<(), validator::ValidationError> {
    if let Some(url) = image {
        if url.len() > 500 {
            return Err(validator::ValidationError::new("image_url_too_long"));
        }
        if Url::parse(url).is_err() {
            return Err(validator::ValidationError::new("invalid_image_url"));
        }
    }
    Ok(())
}

/// Every question needs text, 2..=10 options and at least one correct option.
fn validate_questions(questions: &[Question]) -> Result<(), validator::ValidationError> {
    if questions.is_empty() {
        return Err(validator::ValidationError::new("questions_cannot_be_empty"));
    }
    if questions.len() > 500 {
        return Err(validator::ValidationError::new("too_many_questions"));
    }
    for q in questions {
        if q.text.trim().is_empty() || q.text.len() > 2000 {
            return Err(validator::ValidationError::new("invalid_question_text"));
        }
        validate_image(&q.image)?;
        if q.options.len() < 2 || q.options.len() > 10 {
            return Err(validator::ValidationError::new("invalid_option_count"));
        }
        for opt in &q.options {
            if opt.text.len() > 500 {
                return Err(validator::ValidationError::new("option_too_long"));
            }
            validate_image(&opt.image)?;
        }
        if !q.options.iter().any(|o| o.is_correct) {
            return Err(validator::ValidationError::new("missing_correct_option"));
        }
        if matches!(q.marks, Some(m) if m < 1) {
            return Err(validator::ValidationError::new("marks_must_be_positive"));
        }
    }
    Ok(())
}

fn validate_proctoring(config: &ProctoringConfig) -> Result<(), validator::ValidationError> {
    if matches!(config.tab_switch_limit, Some(0)) || matches!(config.max_violations, Some(0)) {
        return Err(validator::ValidationError::new("thresholds_must_be_positive"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn question(correct: &[bool]) -> Question {
        Question {
            text: "Pick one".to_string(),
            image: None,
            options: correct
                .iter()
                .enumerate()
                .map(|(i, c)| AnswerOption {
                    text: format!("Option {}", i),
                    image: None,
                    is_correct: *c,
                })
                .collect(),
            marks: None,
        }
    }

    #[test]
    fn test_validate_questions_requires_correct_option() {
        assert!(validate_questions(&[question(&[true, false])]).is_ok());
        assert!(validate_questions(&[question(&[false, false])]).is_err());
        assert!(validate_questions(&[]).is_err());
    }

    #[test]
    fn test_validate_questions_rejects_bad_image() {
        let mut q = question(&[true, false]);
        q.image = Some("not a url".to_string());
        assert!(validate_questions(&[q]).is_err());
    }

    #[test]
    fn test_proctoring_defaults_when_fields_missing() {
        let cfg: ProctoringConfig = serde_json::from_str(r#"{"tabSwitchLimit": 4}"#).unwrap();
        assert!(cfg.camera_required);
        assert!(cfg.prevent_copy);
        assert_eq!(cfg.tab_switch_limit, Some(4));
        assert_eq!(cfg.max_violations, None);
    }

    #[test]
    fn test_public_view_hides_correct_flags() {
        let test = Test {
            id: 7,
            title: "T".to_string(),
            description: String::new(),
            duration_minutes: 10,
            questions: Json(vec![question(&[false, true])]),
            proctoring: Json(ProctoringConfig::default()),
            share_token: None,
            share_expires_at: None,
            created_by: None,
            created_at: Utc::now(),
        };

        let public = test.to_public();
        let body = serde_json::to_value(&public).unwrap();
        assert!(!body.to_string().contains("isCorrect"));
        assert_eq!(public.total_marks, 1);
        assert_eq!(public.questions[0].options.len(), 2);
    }

    #[test]
    fn test_share_expired() {
        let now = Utc::now();
        let mut test = Test {
            id: 1,
            title: "T".to_string(),
            description: String::new(),
            duration_minutes: 0,
            questions: Json(vec![]),
            proctoring: Json(ProctoringConfig::default()),
            share_token: Some("abc".to_string()),
            share_expires_at: None,
            created_by: None,
            created_at: now,
        };
        assert!(!test.share_expired(now));
        test.share_expires_at = Some(now - chrono::Duration::hours(1));
        assert!(test.share_expired(now));
    }
}
