// src/monitor/finalizer.rs

use std::fmt;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::{Violation, session::Respondent};
use crate::models::result::{FinalizationPayload, SubmissionReason, SubmissionResponse};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FinalizeError {
    /// Delivery requested before the session was finalized.
    NotFinalized,
    /// The scoring boundary could not be reached; retry with the same snapshot.
    Transport(String),
    /// The scoring boundary refused the payload.
    Rejected { status: u16, message: String },
}

impl FinalizeError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, FinalizeError::Transport(_))
    }
}

impl fmt::Display for FinalizeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FinalizeError::NotFinalized => write!(f, "session has not been finalized"),
            FinalizeError::Transport(msg) => write!(f, "submission failed, please retry: {}", msg),
            FinalizeError::Rejected { status, message } => {
                write!(f, "submission rejected ({}): {}", status, message)
            }
        }
    }
}

impl std::error::Error for FinalizeError {}

/// Where finalized sessions are sent for scoring.
#[async_trait]
pub trait ScoringBoundary: Send + Sync {
    async fn submit(&self, payload: &FinalizationPayload) -> Result<SubmissionResponse, FinalizeError>;
}

/// Everything the finalizer snapshots from the live session.
pub struct SealInput<'a> {
    pub test_id: i64,
    pub respondent: &'a Respondent,
    pub answers: &'a [i64],
    pub violations: &'a [Violation],
    pub tab_switches: u32,
    pub exam_locked: bool,
    pub started_at: DateTime<Utc>,
    pub now: DateTime<Utc>,
    pub reason: SubmissionReason,
}

/// Exactly-once finalization guard plus delivery state.
#[derive(Debug, Default)]
pub struct Finalizer {
    payload: Option<FinalizationPayload>,
    receipt: Option<SubmissionResponse>,
    attempts: u32,
}

impl Finalizer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_finalized(&self) -> bool {
        self.payload.is_some()
    }

    pub fn payload(&self) -> Option<&FinalizationPayload> {
        self.payload.as_ref()
    }

    pub fn receipt(&self) -> Option<&SubmissionResponse> {
        self.receipt.as_ref()
    }

    /// Number of delivery attempts made so far.
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Builds the payload on the first call. Later calls change nothing and
    /// return `None`.
    pub fn seal(&mut self, input: SealInput<'_>) -> Option<&FinalizationPayload> {
        if let Some(existing) = &self.payload {
            tracing::debug!(
                ignored = input.reason.as_str(),
                sealed = existing.submission_reason.as_str(),
                "finalization already sealed"
            );
            return None;
        }

        let payload = FinalizationPayload {
            submission_id: Uuid::new_v4(),
            test_id: input.test_id,
            user_name: input.respondent.name.clone(),
            user_email: input.respondent.email.clone(),
            roll_number: input.respondent.roll_number.clone(),
            phone: input.respondent.phone.clone(),
            answers: input.answers.to_vec(),
            time_taken_seconds: (input.now - input.started_at).num_seconds().max(0),
            violations: input.violations.to_vec(),
            total_violations: input.violations.len() as u32,
            tab_switches: input.tab_switches,
            auto_submitted: input.reason.is_automatic(),
            exam_locked: input.exam_locked,
            submission_reason: input.reason,
        };

        tracing::info!(
            test_id = payload.test_id,
            submission_id = %payload.submission_id,
            reason = payload.submission_reason.as_str(),
            violations = payload.total_violations,
            "session finalized"
        );

        self.payload = Some(payload);
        self.payload.as_ref()
    }

    /// Hands the sealed payload to `boundary`.
    ///
    /// After a success the receipt is cached and returned without calling the
    /// boundary again. After a failure the same snapshot is resent.
    pub async fn deliver(
        &mut self,
        boundary: &dyn ScoringBoundary,
    ) -> Result<SubmissionResponse, FinalizeError> {
        if let Some(receipt) = &self.receipt {
            return Ok(receipt.clone());
        }
        let payload = self.payload.as_ref().ok_or(FinalizeError::NotFinalized)?;

        self.attempts += 1;
        match boundary.submit(payload).await {
            Ok(receipt) => {
                tracing::info!(
                    submission_id = %payload.submission_id,
                    result_id = receipt.result_id,
                    attempts = self.attempts,
                    "submission delivered"
                );
                self.receipt = Some(receipt.clone());
                Ok(receipt)
            }
            Err(e) => {
                tracing::warn!(
                    submission_id = %payload.submission_id,
                    attempt = self.attempts,
                    "submission delivery failed: {}",
                    e
                );
                Err(e)
            }
        }
    }
}
