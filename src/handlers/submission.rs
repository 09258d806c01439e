// src/handlers/submission.rs

use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use chrono::Utc;
use sqlx::{SqlitePool, types::Json as SqlJson};
use validator::Validate;

use crate::{
    error::AppError,
    handlers::exam::{find_issued_link_test, find_test},
    models::{
        result::{AccessMode, ExamResult, FinalizationPayload, SubmissionResponse},
        test::Test,
    },
    scoring,
    utils::jwt::Claims,
};

pub(crate) const RESULT_COLUMNS: &str = "id, submission_id, test_id, user_id, respondent_name, \
     respondent_email, roll_number, phone, answers, outcomes, correct_count, total_questions, \
     obtained_marks, total_marks, percentage, grade, time_taken_seconds, violations, \
     total_violations, tab_switches, auto_submitted, exam_locked, submission_reason, \
     access_mode, submitted_at";

async fn find_by_submission_id(
    pool: &SqlitePool,
    submission_id: &str,
) -> Result<Option<ExamResult>, sqlx::Error> {
    sqlx::query_as::<_, ExamResult>(&format!(
        "SELECT {} FROM results WHERE submission_id = ?",
        RESULT_COLUMNS
    ))
    .bind(submission_id)
    .fetch_optional(pool)
    .await
}

/// Scores and stores one finalization payload.
///
/// Replays of a known `submission_id` return the stored row untouched; the
/// flag is `true` only when this call inserted the row.
async fn record_submission(
    pool: &SqlitePool,
    test: &Test,
    payload: FinalizationPayload,
    user_id: Option<i64>,
    mode: AccessMode,
) -> Result<(ExamResult, bool), AppError> {
    payload.validate()?;
    if payload.test_id != test.id {
        return Err(AppError::BadRequest(format!(
            "Payload is for test {}, not test {}",
            payload.test_id, test.id
        )));
    }

    let submission_id = payload.submission_id.to_string();
    if let Some(existing) = find_by_submission_id(pool, &submission_id).await? {
        if existing.test_id != test.id {
            return Err(AppError::Conflict(
                "Submission id already used for another test".to_string(),
            ));
        }
        tracing::info!(submission_id = %submission_id, "replayed submission");
        return Ok((existing, false));
    }

    let sheet = scoring::score(&test.questions, &payload.answers);

    let inserted = sqlx::query(
        r#"
        INSERT INTO results (
            submission_id, test_id, user_id, respondent_name, respondent_email, roll_number,
            phone, answers, outcomes, correct_count, total_questions, obtained_marks,
            total_marks, percentage, grade, time_taken_seconds, violations, total_violations,
            tab_switches, auto_submitted, exam_locked, submission_reason, access_mode,
            submitted_at
        )
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT(submission_id) DO NOTHING
        "#,
    )
    .bind(&submission_id)
    .bind(test.id)
    .bind(user_id)
    .bind(&payload.user_name)
    .bind(&payload.user_email)
    .bind(&payload.roll_number)
    .bind(&payload.phone)
    .bind(SqlJson(&payload.answers))
    .bind(SqlJson(&sheet.outcomes))
    .bind(sheet.correct_count as i64)
    .bind(sheet.total_questions as i64)
    .bind(sheet.obtained_marks)
    .bind(sheet.total_marks)
    .bind(sheet.percentage)
    .bind(sheet.grade.as_str())
    .bind(payload.time_taken_seconds)
    .bind(SqlJson(&payload.violations))
    .bind(payload.violations.len() as i64)
    .bind(i64::from(payload.tab_switches))
    .bind(payload.auto_submitted)
    .bind(payload.exam_locked)
    .bind(payload.submission_reason.as_str())
    .bind(mode.as_str())
    .bind(Utc::now())
    .execute(pool)
    .await
    .map_err(|e| {
        tracing::error!("Failed to store result: {:?}", e);
        AppError::from(e)
    })?
    .rows_affected()
        == 1;

    // A concurrent replay may have won the insert; either way the row exists now.
    let stored = find_by_submission_id(pool, &submission_id)
        .await?
        .ok_or_else(|| AppError::InternalServerError("Stored result vanished".to_string()))?;

    if inserted {
        tracing::info!(
            result_id = stored.id,
            test_id = test.id,
            mode = mode.as_str(),
            reason = payload.submission_reason.as_str(),
            percentage = stored.percentage,
            violations = stored.total_violations,
            "stored result"
        );
    }
    Ok((stored, inserted))
}

fn status_for(created: bool) -> StatusCode {
    if created {
        StatusCode::CREATED
    } else {
        StatusCode::OK
    }
}

/// Finalization from an authenticated respondent. Responds with the full
/// score breakdown.
pub async fn submit_direct(
    State(pool): State<SqlitePool>,
    Extension(claims): Extension<Claims>,
    Path(test_id): Path<i64>,
    Json(payload): Json<FinalizationPayload>,
) -> Result<impl IntoResponse, AppError> {
    let user_id = claims.user_id()?;
    let test = find_test(&pool, test_id).await?;

    let (result, created) =
        record_submission(&pool, &test, payload, Some(user_id), AccessMode::Direct).await?;

    Ok((
        status_for(created),
        Json(SubmissionResponse {
            result_id: result.id,
            submission_id: result.submission_uuid()?,
            message: "Test submitted successfully".to_string(),
            score: Some(result.score_summary()),
        }),
    ))
}

/// Finalization through a share link. Responds with an acknowledgment only.
///
/// Accepted for expired or superseded tokens too, so a session that started
/// on a valid link is never turned away at the end.
pub async fn submit_shared(
    State(pool): State<SqlitePool>,
    Path(token): Path<String>,
    Json(payload): Json<FinalizationPayload>,
) -> Result<impl IntoResponse, AppError> {
    let test = find_issued_link_test(&pool, &token).await?;

    let (result, created) =
        record_submission(&pool, &test, payload, None, AccessMode::Link).await?;

    Ok((
        status_for(created),
        Json(SubmissionResponse {
            result_id: result.id,
            submission_id: result.submission_uuid()?,
            message: "Your responses have been recorded".to_string(),
            score: None,
        }),
    ))
}
