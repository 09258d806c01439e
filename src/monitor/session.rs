// src/monitor/session.rs

use std::{fmt, sync::Arc};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{
    CameraLease, CapabilityError, CapabilityGate, Clock, DeviceCapabilities, EscalationController,
    EscalationState, FinalizeError, Finalizer, MonitorConfig, RawSignal, ScoringBoundary,
    SessionTimer, Violation, ViolationClassifier, Warning, escalation::LockOrder,
    finalizer::SealInput, timer::TimerTick,
};
use crate::{
    models::{
        result::{FinalizationPayload, SubmissionReason, SubmissionResponse},
        test::PublicTest,
    },
    scoring::UNANSWERED,
};

/// Who is taking the test.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Respondent {
    pub name: String,
    pub email: String,
    pub roll_number: Option<String>,
    pub phone: Option<String>,
}

impl Respondent {
    pub fn new(name: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            email: email.into(),
            roll_number: None,
            phone: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionPhase {
    /// Waiting for the capability gate.
    Pending,
    /// Monitoring armed, answers editable (unless locked).
    Active,
    /// Payload sealed; the session is immutable.
    Finalized,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    AlreadyStarted,
    Capability(CapabilityError),
    NotActive,
    Locked,
    QuestionOutOfRange { index: usize, len: usize },
    OptionOutOfRange { question: usize, option: usize, len: usize },
}

impl fmt::Display for SessionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionError::AlreadyStarted => write!(f, "session already started"),
            SessionError::Capability(e) => write!(f, "{}", e),
            SessionError::NotActive => write!(f, "session is not active"),
            SessionError::Locked => write!(f, "exam is locked"),
            SessionError::QuestionOutOfRange { index, len } => {
                write!(f, "question {} out of range ({} questions)", index, len)
            }
            SessionError::OptionOutOfRange {
                question,
                option,
                len,
            } => write!(
                f,
                "option {} out of range for question {} ({} options)",
                option, question, len
            ),
        }
    }
}

impl std::error::Error for SessionError {}

impl From<CapabilityError> for SessionError {
    fn from(err: CapabilityError) -> Self {
        SessionError::Capability(err)
    }
}

/// What a tick changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TickOutcome {
    /// Seconds left, when the countdown is running.
    pub remaining: Option<u64>,
    /// Set when this tick finalized the session.
    pub finalized: Option<SubmissionReason>,
}

/// One respondent taking one test.
///
/// Drives the classifier, escalation controller, timer and finalizer from
/// explicit calls; holds the camera lease for its lifetime.
pub struct ExamSession {
    test_id: i64,
    respondent: Respondent,
    option_counts: Vec<usize>,
    config: MonitorConfig,
    clock: Arc<dyn Clock>,
    phase: SessionPhase,
    started_at: Option<DateTime<Utc>>,
    answers: Vec<i64>,
    current_question: usize,
    violations: Vec<Violation>,
    classifier: ViolationClassifier,
    escalation: EscalationController,
    timer: SessionTimer,
    finalizer: Finalizer,
    camera: Option<CameraLease>,
    fullscreen: bool,
}

impl fmt::Debug for ExamSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExamSession")
            .field("test_id", &self.test_id)
            .field("phase", &self.phase)
            .field("violations", &self.violations.len())
            .field("locked", &self.escalation.is_locked())
            .finish()
    }
}

impl ExamSession {
    /// Session with thresholds taken from the test's proctoring config.
    pub fn new(test: &PublicTest, respondent: Respondent, clock: Arc<dyn Clock>) -> Self {
        let config = MonitorConfig::from_proctoring(&test.proctoring_config);
        Self::with_config(test, respondent, config, clock)
    }

    pub fn with_config(
        test: &PublicTest,
        respondent: Respondent,
        config: MonitorConfig,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            test_id: test.id,
            respondent,
            option_counts: test.questions.iter().map(|q| q.options.len()).collect(),
            classifier: ViolationClassifier::new(config.debounce_ms, config.prevent_copy),
            escalation: EscalationController::new(&config),
            timer: SessionTimer::from_minutes(test.duration),
            answers: vec![UNANSWERED; test.questions.len()],
            config,
            clock,
            phase: SessionPhase::Pending,
            started_at: None,
            current_question: 0,
            violations: Vec::new(),
            finalizer: Finalizer::new(),
            camera: None,
            fullscreen: false,
        }
    }

    /// Runs the capability gate, then arms the timer and classifier.
    ///
    /// A camera failure leaves the session `Pending`, so `start` may be retried.
    pub async fn start(&mut self, devices: &dyn DeviceCapabilities) -> Result<(), SessionError> {
        if self.phase != SessionPhase::Pending {
            return Err(SessionError::AlreadyStarted);
        }

        let gate = CapabilityGate {
            camera_required: self.config.camera_required,
            fullscreen_required: self.config.fullscreen_required,
        };
        let grant = gate.open(devices).await?;

        self.camera = grant.camera;
        self.fullscreen = grant.fullscreen;
        self.started_at = Some(self.clock.now());
        self.timer.start();
        self.classifier.arm();
        self.phase = SessionPhase::Active;

        tracing::info!(
            test_id = self.test_id,
            respondent = %self.respondent.email,
            timed = self.timer.is_enabled(),
            fullscreen = self.fullscreen,
            "exam session started"
        );
        Ok(())
    }

    pub fn test_id(&self) -> i64 {
        self.test_id
    }

    pub fn respondent(&self) -> &Respondent {
        &self.respondent
    }

    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    pub fn config(&self) -> &MonitorConfig {
        &self.config
    }

    pub fn answers(&self) -> &[i64] {
        &self.answers
    }

    pub fn violations(&self) -> &[Violation] {
        &self.violations
    }

    pub fn current_question(&self) -> usize {
        self.current_question
    }

    pub fn remaining_seconds(&self) -> Option<u64> {
        self.timer.is_enabled().then(|| self.timer.remaining())
    }

    pub fn is_locked(&self) -> bool {
        self.escalation.is_locked()
    }

    pub fn lock_order(&self) -> Option<LockOrder> {
        self.escalation.lock_order()
    }

    pub fn holds_camera(&self) -> bool {
        self.camera.as_ref().is_some_and(|c| !c.is_released())
    }

    pub fn in_fullscreen(&self) -> bool {
        self.fullscreen
    }

    pub fn escalation_state(&self) -> EscalationState {
        self.escalation
            .state(self.classifier.active_kind(self.clock.now()))
    }

    pub fn payload(&self) -> Option<&FinalizationPayload> {
        self.finalizer.payload()
    }

    pub fn receipt(&self) -> Option<&SubmissionResponse> {
        self.finalizer.receipt()
    }

    fn ensure_editable(&self) -> Result<(), SessionError> {
        match self.phase {
            SessionPhase::Active if self.escalation.is_locked() => Err(SessionError::Locked),
            SessionPhase::Active => Ok(()),
            _ => Err(SessionError::NotActive),
        }
    }

    fn check_question(&self, index: usize) -> Result<(), SessionError> {
        if index >= self.option_counts.len() {
            return Err(SessionError::QuestionOutOfRange {
                index,
                len: self.option_counts.len(),
            });
        }
        Ok(())
    }

    pub fn select_answer(&mut self, question: usize, option: usize) -> Result<(), SessionError> {
        self.ensure_editable()?;
        self.check_question(question)?;
        let len = self.option_counts[question];
        if option >= len {
            return Err(SessionError::OptionOutOfRange {
                question,
                option,
                len,
            });
        }
        self.answers[question] = option as i64;
        Ok(())
    }

    pub fn clear_answer(&mut self, question: usize) -> Result<(), SessionError> {
        self.ensure_editable()?;
        self.check_question(question)?;
        self.answers[question] = UNANSWERED;
        Ok(())
    }

    /// Moves the respondent to another question. Violations record this index.
    pub fn go_to(&mut self, question: usize) -> Result<(), SessionError> {
        self.ensure_editable()?;
        self.check_question(question)?;
        self.current_question = question;
        Ok(())
    }

    pub fn answered_count(&self) -> usize {
        self.answers.iter().filter(|a| **a >= 0).count()
    }

    /// Feeds one raw environment signal through classification and escalation.
    ///
    /// Returns the warning to surface, if any.
    pub fn observe(&mut self, signal: &RawSignal) -> Option<Warning> {
        if self.phase != SessionPhase::Active {
            return None;
        }
        let now = self.clock.now();
        let classified = self.classifier.admit(signal, now)?;

        self.violations.push(Violation {
            kind: classified.kind,
            description: classified.description,
            timestamp: now,
            question_index: self.current_question,
        });
        self.escalation.record(classified.kind, now)
    }

    /// Advances the countdown by one second and fires any due trigger.
    ///
    /// Time expiry wins over a pending lock grace period.
    pub fn tick(&mut self) -> TickOutcome {
        if self.phase != SessionPhase::Active {
            return TickOutcome {
                remaining: None,
                finalized: None,
            };
        }

        // A lock whose grace already ran out predates this tick's expiry.
        if let Some(reason) = self.enforce_lock() {
            return TickOutcome {
                remaining: None,
                finalized: Some(reason),
            };
        }

        let remaining = match self.timer.tick() {
            TimerTick::Expired => {
                let sealed = self.finalize(SubmissionReason::TimeExpired);
                return TickOutcome {
                    remaining: Some(0),
                    finalized: sealed.then_some(SubmissionReason::TimeExpired),
                };
            }
            TimerTick::Running { remaining } => Some(remaining),
            TimerTick::Idle => None,
        };

        TickOutcome {
            remaining,
            finalized: None,
        }
    }

    /// Time left before a pending lock submits the session.
    pub fn grace_remaining(&self) -> Option<std::time::Duration> {
        if self.phase != SessionPhase::Active {
            return None;
        }
        self.escalation
            .lock_order()
            .map(|order| (order.submit_at - self.clock.now()).to_std().unwrap_or_default())
    }

    /// Seals the session once the lock's grace period has run out.
    pub fn enforce_lock(&mut self) -> Option<SubmissionReason> {
        if !self.escalation.submission_due(self.clock.now()) {
            return None;
        }
        self.finalize(SubmissionReason::SecurityViolations)
            .then_some(SubmissionReason::SecurityViolations)
    }

    /// Manual submit. Returns the payload only if this call sealed it.
    pub fn submit(&mut self) -> Option<&FinalizationPayload> {
        if self.finalize(SubmissionReason::Manual) {
            self.finalizer.payload()
        } else {
            None
        }
    }

    /// The one path that ends a session. First caller wins.
    fn finalize(&mut self, reason: SubmissionReason) -> bool {
        if self.phase != SessionPhase::Active || self.finalizer.is_finalized() {
            return false;
        }
        let now = self.clock.now();

        self.timer.stop();
        self.classifier.disarm();
        if let Some(camera) = self.camera.as_mut() {
            camera.release();
        }

        let sealed = self
            .finalizer
            .seal(SealInput {
                test_id: self.test_id,
                respondent: &self.respondent,
                answers: &self.answers,
                violations: &self.violations,
                tab_switches: self.escalation.tab_switch_count(),
                exam_locked: self.escalation.is_locked(),
                started_at: self.started_at.unwrap_or(now),
                now,
                reason,
            })
            .is_some();
        self.phase = SessionPhase::Finalized;
        sealed
    }

    /// Sends the sealed payload; on failure the same snapshot can be resent.
    pub async fn deliver(
        &mut self,
        boundary: &dyn ScoringBoundary,
    ) -> Result<SubmissionResponse, FinalizeError> {
        self.finalizer.deliver(boundary).await
    }
}
