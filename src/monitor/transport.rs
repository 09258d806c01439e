// src/monitor/transport.rs

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;

use super::{FinalizeError, ScoringBoundary};
use crate::models::result::{FinalizationPayload, SubmissionResponse};

#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: String,
}

/// Delivers finalized sessions to the portal's HTTP API.
#[derive(Debug, Clone)]
pub struct HttpScoringBoundary {
    client: Client,
    endpoint: String,
    token: Option<String>,
}

impl HttpScoringBoundary {
    /// Authenticated respondent submitting `POST /api/tests/{id}/submit`.
    pub fn direct(base_url: &str, test_id: i64, token: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            endpoint: format!("{}/api/tests/{}/submit", base_url.trim_end_matches('/'), test_id),
            token: Some(token.into()),
        }
    }

    /// Anonymous respondent submitting through a share link.
    pub fn shared(base_url: &str, share_token: &str) -> Self {
        Self {
            client: Client::new(),
            endpoint: format!(
                "{}/api/share/{}/submit",
                base_url.trim_end_matches('/'),
                share_token
            ),
            token: None,
        }
    }

    pub fn with_client(mut self, client: Client) -> Self {
        self.client = client;
        self
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl ScoringBoundary for HttpScoringBoundary {
    async fn submit(
        &self,
        payload: &FinalizationPayload,
    ) -> Result<SubmissionResponse, FinalizeError> {
        let mut request = self.client.post(&self.endpoint).json(payload);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        let response = request
            .send()
            .await
            .map_err(|e| FinalizeError::Transport(e.to_string()))?;
        let status = response.status();

        if status.is_success() {
            return response
                .json::<SubmissionResponse>()
                .await
                .map_err(|e| FinalizeError::Transport(format!("unreadable response: {}", e)));
        }

        let message = match response.json::<ErrorBody>().await {
            Ok(body) => body.error,
            Err(_) => status
                .canonical_reason()
                .unwrap_or("unknown error")
                .to_string(),
        };

        if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
            return Err(FinalizeError::Transport(format!("{}: {}", status, message)));
        }
        Err(FinalizeError::Rejected {
            status: status.as_u16(),
            message,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoints() {
        let direct = HttpScoringBoundary::direct("http://localhost:3000/", 7, "jwt");
        assert_eq!(direct.endpoint(), "http://localhost:3000/api/tests/7/submit");

        let shared = HttpScoringBoundary::shared("http://localhost:3000", "abc123");
        assert_eq!(shared.endpoint(), "http://localhost:3000/api/share/abc123/submit");
        assert!(shared.token.is_none());
    }
}
