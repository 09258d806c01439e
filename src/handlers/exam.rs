// src/handlers/exam.rs

use std::sync::LazyLock;

use axum::{
    Json,
    extract::{Path, State},
    response::IntoResponse,
};
use chrono::Utc;
use regex::Regex;
use sqlx::SqlitePool;

use crate::{error::AppError, models::test::Test};

/// Share tokens are opaque, URL-safe and of bounded length.
static SHARE_TOKEN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9_-]{16,64}$").expect("share token pattern is valid"));

const TEST_COLUMNS: &str = "id, title, description, duration_minutes, questions, proctoring, \
     share_token, share_expires_at, created_by, created_at";

pub(crate) async fn find_test(pool: &SqlitePool, id: i64) -> Result<Test, AppError> {
    sqlx::query_as::<_, Test>(&format!("SELECT {} FROM tests WHERE id = ?", TEST_COLUMNS))
        .bind(id)
        .fetch_optional(pool)
        .await
        .map_err(|e| {
            tracing::error!("Failed to fetch test {}: {:?}", id, e);
            AppError::from(e)
        })?
        .ok_or_else(|| AppError::NotFound(format!("Test {} not found", id)))
}

/// Resolves the current share token for starting a session. Unknown tokens
/// are 404, expired ones 410.
pub(crate) async fn find_shared_test(pool: &SqlitePool, token: &str) -> Result<Test, AppError> {
    if !SHARE_TOKEN.is_match(token) {
        return Err(share_not_found());
    }

    let test = sqlx::query_as::<_, Test>(&format!(
        "SELECT {} FROM tests WHERE share_token = ?",
        TEST_COLUMNS
    ))
    .bind(token)
    .fetch_optional(pool)
    .await
    .map_err(|e| {
        tracing::error!("Failed to resolve share link: {:?}", e);
        AppError::from(e)
    })?
    .ok_or_else(share_not_found)?;

    if test.share_expired(Utc::now()) {
        return Err(AppError::Gone("This share link has expired".to_string()));
    }
    Ok(test)
}

/// Resolves any token ever issued for a test, for submitting.
///
/// Expiry and reissue only stop new sessions; a session started on a valid
/// link must still be able to deliver its result.
pub(crate) async fn find_issued_link_test(
    pool: &SqlitePool,
    token: &str,
) -> Result<Test, AppError> {
    if !SHARE_TOKEN.is_match(token) {
        return Err(share_not_found());
    }

    sqlx::query_as::<_, Test>(&format!(
        "SELECT {} FROM tests WHERE id = (SELECT test_id FROM share_links WHERE token = ?)",
        TEST_COLUMNS
    ))
    .bind(token)
    .fetch_optional(pool)
    .await
    .map_err(|e| {
        tracing::error!("Failed to resolve share link for submission: {:?}", e);
        AppError::from(e)
    })?
    .ok_or_else(share_not_found)
}

fn share_not_found() -> AppError {
    AppError::NotFound("Share link not found".to_string())
}

/// Test definition for an authenticated respondent, without answer keys.
pub async fn get_test(
    State(pool): State<SqlitePool>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let test = find_test(&pool, id).await?;
    Ok(Json(test.to_public()))
}

/// Test definition behind a share link, without answer keys.
pub async fn get_shared_test(
    State(pool): State<SqlitePool>,
    Path(token): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let test = find_shared_test(&pool, &token).await?;
    Ok(Json(test.to_public()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_share_token_shape() {
        assert!(SHARE_TOKEN.is_match("3f2a9c4e8b1d4e6fa0b2c4d6e8f01234"));
        assert!(!SHARE_TOKEN.is_match("short"));
        assert!(!SHARE_TOKEN.is_match("../../etc/passwd/aaaaaaaaaaaaaa"));
    }
}
