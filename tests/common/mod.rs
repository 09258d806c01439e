// tests/common/mod.rs

#![allow(dead_code)]

use std::str::FromStr;

use exam_portal::{config::Config, db, routes, state::AppState};
use serde_json::{Value, json};
use sqlx::{
    SqlitePool,
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
};

pub const ADMIN_USERNAME: &str = "admin";
pub const ADMIN_PASSWORD: &str = "admin-password";

pub struct TestApp {
    pub address: String,
    pub pool: SqlitePool,
    pub client: reqwest::Client,
}

/// Spawns the app on a random port, backed by a fresh in-memory database.
pub async fn spawn_app() -> TestApp {
    // One connection that never gets recycled, so the in-memory DB lives as
    // long as the pool.
    let options = SqliteConnectOptions::from_str("sqlite::memory:").expect("valid sqlite url");
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect_with(options)
        .await
        .expect("Failed to open in-memory database");

    db::migrate(&pool).await.expect("Failed to migrate database");

    let config = Config {
        database_url: "sqlite::memory:".to_string(),
        jwt_secret: "test_secret_for_integration_tests".to_string(),
        jwt_expiration: 600,
        rust_log: "error".to_string(),
        bind_addr: "127.0.0.1:0".to_string(),
        allowed_origins: vec!["http://localhost:3000".to_string()],
        admin_username: Some(ADMIN_USERNAME.to_string()),
        admin_password: Some(ADMIN_PASSWORD.to_string()),
    };
    db::seed_admin_user(&pool, &config)
        .await
        .expect("Failed to seed admin");

    let app = routes::create_router(AppState::new(pool.clone(), config));

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind random port");
    let port = listener.local_addr().unwrap().port();

    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    TestApp {
        address: format!("http://127.0.0.1:{}", port),
        pool,
        client: reqwest::Client::new(),
    }
}

impl TestApp {
    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.address, path)
    }

    pub async fn login(&self, username: &str, password: &str) -> String {
        let body: Value = self
            .client
            .post(self.url("/api/auth/login"))
            .json(&json!({ "username": username, "password": password }))
            .send()
            .await
            .expect("Login failed")
            .json()
            .await
            .expect("Failed to parse login json");
        body["token"].as_str().expect("Token not found").to_string()
    }

    pub async fn admin_token(&self) -> String {
        self.login(ADMIN_USERNAME, ADMIN_PASSWORD).await
    }

    /// Registers a fresh respondent and returns their token.
    pub async fn respondent_token(&self) -> String {
        let username = format!("u_{}", &uuid::Uuid::new_v4().simple().to_string()[..8]);
        let response = self
            .client
            .post(self.url("/api/auth/register"))
            .json(&json!({ "username": username, "password": "password123" }))
            .send()
            .await
            .expect("Register failed");
        assert_eq!(response.status().as_u16(), 201);
        self.login(&username, "password123").await
    }

    pub async fn create_test(&self, admin_token: &str, body: &Value) -> i64 {
        let response = self
            .client
            .post(self.url("/api/admin/tests"))
            .bearer_auth(admin_token)
            .json(body)
            .send()
            .await
            .expect("Create test failed");
        assert_eq!(response.status().as_u16(), 201);
        let created: Value = response.json().await.unwrap();
        created["id"].as_i64().expect("test id")
    }

    pub async fn share_link(&self, admin_token: &str, test_id: i64) -> String {
        let response = self
            .client
            .post(self.url(&format!("/api/admin/tests/{}/share", test_id)))
            .bearer_auth(admin_token)
            .json(&json!({}))
            .send()
            .await
            .expect("Share link failed");
        assert_eq!(response.status().as_u16(), 201);
        let body: Value = response.json().await.unwrap();
        body["shareToken"].as_str().expect("share token").to_string()
    }

    pub async fn result_count(&self) -> i64 {
        sqlx::query_scalar("SELECT COUNT(*) FROM results")
            .fetch_one(&self.pool)
            .await
            .unwrap()
    }
}

fn options(texts: &[&str], correct: &[usize]) -> Value {
    Value::Array(
        texts
            .iter()
            .enumerate()
            .map(|(i, t)| json!({ "text": t, "isCorrect": correct.contains(&i) }))
            .collect(),
    )
}

/// Two questions; correct answers are option 1 and option 2.
pub fn sample_test() -> Value {
    json!({
        "title": "Integrity check",
        "description": "Two quick questions",
        "duration": 1,
        "questions": [
            { "text": "2 + 2 = ?", "options": options(&["3", "4", "5", "22"], &[1]) },
            { "text": "Capital of France?", "options": options(&["Rome", "Berlin", "Paris", "Madrid"], &[2]) }
        ],
        "proctoringConfig": { "cameraRequired": false, "fullscreenRequired": true }
    })
}

/// The second question has two options flagged correct and cannot be scored.
pub fn ambiguous_test() -> Value {
    json!({
        "title": "Ambiguous",
        "duration": 0,
        "questions": [
            { "text": "Pick the vowel", "options": options(&["a", "b"], &[0]) },
            { "text": "Pick any", "options": options(&["x", "y"], &[0, 1]) }
        ]
    })
}

pub fn payload(test_id: i64, answers: &[i64], reason: &str) -> Value {
    json!({
        "submissionId": uuid::Uuid::new_v4(),
        "testId": test_id,
        "userName": "Ada Lovelace",
        "userEmail": "ada@example.com",
        "rollNumber": "R-17",
        "answers": answers,
        "timeTakenSeconds": 42,
        "violations": [{
            "type": "tab_switch",
            "description": "Switched to another tab or minimized the window",
            "timestamp": "2025-01-01T10:00:00Z",
            "questionIndex": 1
        }],
        "totalViolations": 1,
        "tabSwitches": 1,
        "autoSubmitted": reason != "manual",
        "examLocked": false,
        "submissionReason": reason
    })
}
