// src/handlers/admin.rs

use axum::{
    Json,
    extract::{Extension, Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use chrono::{TimeDelta, Utc};
use serde_json::json;
use sqlx::{SqlitePool, types::Json as SqlJson};
use uuid::Uuid;
use validator::Validate;

use crate::{
    error::AppError,
    handlers::{exam::find_test, submission::RESULT_COLUMNS},
    models::{
        result::{ExamResult, ResultListEntry},
        test::{CreateTestRequest, ShareLinkRequest, ShareLinkResponse},
    },
    scoring,
    utils::{
        jwt::Claims,
        sanitize::{clean_html, sanitize_question},
    },
};

/// Creates a test. Question and option text is sanitized before storage.
/// Admin only.
pub async fn create_test(
    State(pool): State<SqlitePool>,
    Extension(claims): Extension<Claims>,
    Json(mut payload): Json<CreateTestRequest>,
) -> Result<impl IntoResponse, AppError> {
    payload.validate()?;
    let author = claims.user_id()?;

    payload.questions.iter_mut().for_each(sanitize_question);
    let title = clean_html(&payload.title);
    let description = clean_html(&payload.description);

    let id: i64 = sqlx::query_scalar(
        r#"
        INSERT INTO tests (title, description, duration_minutes, questions, proctoring, created_by, created_at)
        VALUES (?, ?, ?, ?, ?, ?, ?)
        RETURNING id
        "#,
    )
    .bind(&title)
    .bind(&description)
    .bind(payload.duration)
    .bind(SqlJson(&payload.questions))
    .bind(SqlJson(&payload.proctoring_config))
    .bind(author)
    .bind(Utc::now())
    .fetch_one(&pool)
    .await
    .map_err(|e| {
        tracing::error!("Failed to create test: {:?}", e);
        AppError::from(e)
    })?;

    tracing::info!(test_id = id, questions = payload.questions.len(), "created test");
    let test = find_test(&pool, id).await?;
    Ok((StatusCode::CREATED, Json(test)))
}

/// Issues a fresh share token. New sessions can only start on the latest one.
/// Admin only.
pub async fn issue_share_link(
    State(pool): State<SqlitePool>,
    Path(id): Path<i64>,
    Json(payload): Json<ShareLinkRequest>,
) -> Result<impl IntoResponse, AppError> {
    payload.validate()?;

    let token = Uuid::new_v4().simple().to_string();
    let expires_at = payload
        .expires_in_hours
        .map(|hours| Utc::now() + TimeDelta::hours(hours));

    let mut tx = pool.begin().await?;

    let updated = sqlx::query("UPDATE tests SET share_token = ?, share_expires_at = ? WHERE id = ?")
        .bind(&token)
        .bind(expires_at)
        .bind(id)
        .execute(&mut *tx)
        .await
        .map_err(|e| {
            tracing::error!("Failed to issue share link: {:?}", e);
            AppError::from(e)
        })?
        .rows_affected();

    if updated == 0 {
        return Err(AppError::NotFound(format!("Test {} not found", id)));
    }

    // Superseded tokens stay on record so in-flight sessions can still submit.
    sqlx::query("INSERT INTO share_links (token, test_id, expires_at, issued_at) VALUES (?, ?, ?, ?)")
        .bind(&token)
        .bind(id)
        .bind(expires_at)
        .bind(Utc::now())
        .execute(&mut *tx)
        .await
        .map_err(|e| {
            tracing::error!("Failed to record share link: {:?}", e);
            AppError::from(e)
        })?;

    tx.commit().await?;
    tracing::info!(test_id = id, expires_at = ?expires_at, "issued share link");

    Ok((
        StatusCode::CREATED,
        Json(ShareLinkResponse {
            test_id: id,
            share_token: token,
            expires_at,
        }),
    ))
}

/// Lists a test's results, newest first.
/// Admin only.
pub async fn list_test_results(
    State(pool): State<SqlitePool>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    find_test(&pool, id).await?;

    let results = sqlx::query_as::<_, ResultListEntry>(
        r#"
        SELECT id, respondent_name, respondent_email, roll_number, percentage, grade,
               total_violations, submission_reason, access_mode, submitted_at
        FROM results
        WHERE test_id = ?
        ORDER BY submitted_at DESC, id DESC
        "#,
    )
    .bind(id)
    .fetch_all(&pool)
    .await
    .map_err(|e| {
        tracing::error!("Failed to list results: {:?}", e);
        AppError::from(e)
    })?;

    Ok(Json(results))
}

/// One stored result with its violation log and per-question outcomes.
/// Admin only.
pub async fn get_result(
    State(pool): State<SqlitePool>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let result = sqlx::query_as::<_, ExamResult>(&format!(
        "SELECT {} FROM results WHERE id = ?",
        RESULT_COLUMNS
    ))
    .bind(id)
    .fetch_optional(&pool)
    .await
    .map_err(|e| {
        tracing::error!("Failed to fetch result {}: {:?}", id, e);
        AppError::from(e)
    })?
    .ok_or_else(|| AppError::NotFound(format!("Result {} not found", id)))?;

    Ok(Json(result))
}

/// Runs the all-correct and all-wrong answer patterns through the scorer.
/// An all-correct run under 100% points at unscorable questions.
/// Admin only.
pub async fn score_check(
    State(pool): State<SqlitePool>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let test = find_test(&pool, id).await?;
    let checks = scoring::check_structure(&test.questions);
    let unscorable = checks.iter().filter(|c| !c.has_correct_answer).count();

    Ok(Json(json!({
        "testId": test.id,
        "totalQuestions": checks.len(),
        "unscorableQuestions": unscorable,
        "questions": checks,
        "simulations": scoring::simulate(&test.questions),
    })))
}
