// src/monitor/driver.rs

use std::{sync::Arc, time::Duration};

use tokio::{
    sync::{mpsc, oneshot},
    time::{Instant, interval_at},
};

use super::{
    ExamSession, FinalizeError, RawSignal, ScoringBoundary, SessionPhase, Warning,
    escalation::LockOrder,
};
use crate::models::result::{SubmissionReason, SubmissionResponse};

const SIGNAL_BUFFER: usize = 64;
const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(2);
const DEFAULT_MAX_ATTEMPTS: u32 = 5;

/// Events surfaced to whoever renders the session.
#[derive(Debug, Clone, PartialEq)]
pub enum Notice {
    Tick { remaining: u64 },
    Warning(Warning),
    Locked(LockOrder),
    Finalized(SubmissionReason),
    DeliveryFailed { attempt: u32, message: String },
    Delivered(SubmissionResponse),
}

/// Input side of a running driver.
#[derive(Debug)]
pub struct DriverHandle {
    signals: mpsc::Sender<RawSignal>,
    submit: Option<oneshot::Sender<()>>,
}

impl DriverHandle {
    /// Returns `false` once the driver has stopped listening.
    pub async fn signal(&self, signal: RawSignal) -> bool {
        self.signals.send(signal).await.is_ok()
    }

    /// Requests a manual submit. Only the first request counts.
    pub fn submit(&mut self) -> bool {
        self.submit.take().is_some_and(|tx| tx.send(()).is_ok())
    }
}

/// How a driven session ended.
#[derive(Debug)]
pub struct DriverExit {
    pub session: ExamSession,
    pub delivery: Result<SubmissionResponse, FinalizeError>,
}

/// Runs an active [`ExamSession`] against real time.
///
/// Multiplexes the one-second countdown, incoming signals and a manual
/// submit request on one task, then delivers the sealed payload with retries.
pub struct SessionDriver {
    session: ExamSession,
    boundary: Arc<dyn ScoringBoundary>,
    signals: mpsc::Receiver<RawSignal>,
    submit: oneshot::Receiver<()>,
    notices: mpsc::UnboundedSender<Notice>,
    retry_delay: Duration,
    max_attempts: u32,
}

impl SessionDriver {
    pub fn new(
        session: ExamSession,
        boundary: Arc<dyn ScoringBoundary>,
    ) -> (Self, DriverHandle, mpsc::UnboundedReceiver<Notice>) {
        let (signal_tx, signal_rx) = mpsc::channel(SIGNAL_BUFFER);
        let (submit_tx, submit_rx) = oneshot::channel();
        let (notice_tx, notice_rx) = mpsc::unbounded_channel();

        let driver = Self {
            session,
            boundary,
            signals: signal_rx,
            submit: submit_rx,
            notices: notice_tx,
            retry_delay: DEFAULT_RETRY_DELAY,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        };
        let handle = DriverHandle {
            signals: signal_tx,
            submit: Some(submit_tx),
        };
        (driver, handle, notice_rx)
    }

    pub fn retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    pub fn max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts.max(1);
        self
    }

    fn notify(&self, notice: Notice) {
        // The receiver going away only means nobody is watching.
        let _ = self.notices.send(notice);
    }

    pub async fn run(mut self) -> DriverExit {
        if self.session.phase() == SessionPhase::Pending {
            return DriverExit {
                session: self.session,
                delivery: Err(FinalizeError::NotFinalized),
            };
        }

        self.monitor().await;
        let delivery = self.deliver().await;
        DriverExit {
            session: self.session,
            delivery,
        }
    }

    async fn monitor(&mut self) {
        let period = Duration::from_secs(1);
        let mut ticker = interval_at(Instant::now() + period, period);
        let mut submit_open = true;
        let mut signals_open = true;
        let mut lock_reported = false;

        while self.session.phase() == SessionPhase::Active {
            let grace = self.session.grace_remaining();
            if !signals_open
                && !submit_open
                && grace.is_none()
                && self.session.remaining_seconds().is_none()
            {
                tracing::warn!(
                    test_id = self.session.test_id(),
                    "driver handle dropped on an untimed session; nothing left to finalize it"
                );
                return;
            }

            tokio::select! {
                _ = ticker.tick() => {
                    let outcome = self.session.tick();
                    if let Some(remaining) = outcome.remaining {
                        self.notify(Notice::Tick { remaining });
                    }
                    if let Some(reason) = outcome.finalized {
                        self.notify(Notice::Finalized(reason));
                    }
                }
                signal = self.signals.recv(), if signals_open => {
                    let Some(signal) = signal else {
                        signals_open = false;
                        continue;
                    };
                    if let Some(warning) = self.session.observe(&signal) {
                        self.notify(Notice::Warning(warning));
                    }
                    if !lock_reported {
                        if let Some(order) = self.session.lock_order() {
                            lock_reported = true;
                            self.notify(Notice::Locked(order));
                        }
                    }
                }
                _ = tokio::time::sleep(grace.unwrap_or_default()), if grace.is_some() => {
                    if let Some(reason) = self.session.enforce_lock() {
                        self.notify(Notice::Finalized(reason));
                    }
                }
                requested = &mut self.submit, if submit_open => {
                    submit_open = false;
                    if requested.is_ok() && self.session.submit().is_some() {
                        self.notify(Notice::Finalized(SubmissionReason::Manual));
                    }
                }
            }
        }
    }

    async fn deliver(&mut self) -> Result<SubmissionResponse, FinalizeError> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.session.deliver(self.boundary.as_ref()).await {
                Ok(receipt) => {
                    self.notify(Notice::Delivered(receipt.clone()));
                    return Ok(receipt);
                }
                Err(e) => {
                    self.notify(Notice::DeliveryFailed {
                        attempt,
                        message: e.to_string(),
                    });
                    if !e.is_retryable() || attempt >= self.max_attempts {
                        tracing::error!(attempt, "giving up on submission delivery: {}", e);
                        return Err(e);
                    }
                    tokio::time::sleep(self.retry_delay).await;
                }
            }
        }
    }
}
