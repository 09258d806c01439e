// src/monitor/escalation.rs

use chrono::{DateTime, TimeDelta, Utc};
use serde::Serialize;

use super::{MonitorConfig, ViolationKind};

/// Escalation levels. Only ever move forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EscalationLevel {
    Clean,
    Warned,
    Locked,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WarningSeverity {
    /// Ordinary violation notice, rate-limited.
    Notice,
    /// One more tab switch will submit the exam.
    Critical,
    /// The exam is locked and about to be submitted.
    Final,
}

/// Transient message shown to the respondent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Warning {
    pub severity: WarningSeverity,
    pub kind: ViolationKind,
    pub message: String,
    pub count: u32,
    pub limit: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LockReason {
    ViolationLimit,
    TabSwitchLimit,
}

/// Pending automatic submission scheduled by a lock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LockOrder {
    pub reason: LockReason,
    pub locked_at: DateTime<Utc>,
    pub submit_at: DateTime<Utc>,
}

/// Snapshot of the escalation tallies.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EscalationState {
    pub level: EscalationLevel,
    pub total_count: u32,
    pub tab_switch_count: u32,
    pub last_violation_at: Option<DateTime<Utc>>,
    pub active_debounce_kind: Option<ViolationKind>,
    pub locked: bool,
}

/// Tallies violations and decides when the violation budget is spent.
#[derive(Debug, Clone)]
pub struct EscalationController {
    max_violations: u32,
    tab_switch_limit: u32,
    warning_spacing_ms: i64,
    grace_ms: i64,
    level: EscalationLevel,
    total_count: u32,
    tab_switch_count: u32,
    last_violation_at: Option<DateTime<Utc>>,
    last_warning_at: Option<DateTime<Utc>>,
    lock: Option<LockOrder>,
}

impl EscalationController {
    pub fn new(config: &MonitorConfig) -> Self {
        Self {
            max_violations: config.max_violations.max(1),
            tab_switch_limit: config.tab_switch_limit.max(1),
            warning_spacing_ms: config.warning_spacing_ms.max(0),
            grace_ms: config.grace_ms.max(0),
            level: EscalationLevel::Clean,
            total_count: 0,
            tab_switch_count: 0,
            last_violation_at: None,
            last_warning_at: None,
            lock: None,
        }
    }

    pub fn level(&self) -> EscalationLevel {
        self.level
    }

    pub fn is_locked(&self) -> bool {
        self.level == EscalationLevel::Locked
    }

    pub fn total_count(&self) -> u32 {
        self.total_count
    }

    pub fn tab_switch_count(&self) -> u32 {
        self.tab_switch_count
    }

    pub fn lock_order(&self) -> Option<LockOrder> {
        self.lock
    }

    /// Whether the grace period after a lock has run out.
    pub fn submission_due(&self, now: DateTime<Utc>) -> bool {
        self.lock.is_some_and(|order| now >= order.submit_at)
    }

    pub fn state(&self, active_debounce_kind: Option<ViolationKind>) -> EscalationState {
        EscalationState {
            level: self.level,
            total_count: self.total_count,
            tab_switch_count: self.tab_switch_count,
            last_violation_at: self.last_violation_at,
            active_debounce_kind,
            locked: self.is_locked(),
        }
    }

    /// Counts one recorded violation and returns the warning to surface, if any.
    pub fn record(&mut self, kind: ViolationKind, now: DateTime<Utc>) -> Option<Warning> {
        self.total_count += 1;
        if kind == ViolationKind::TabSwitch {
            self.tab_switch_count += 1;
        }
        self.last_violation_at = Some(now);

        // Locked is terminal: keep counting, say nothing new.
        if self.is_locked() {
            return None;
        }

        let reason = if self.tab_switch_count >= self.tab_switch_limit {
            Some(LockReason::TabSwitchLimit)
        } else if self.total_count >= self.max_violations {
            Some(LockReason::ViolationLimit)
        } else {
            None
        };

        if let Some(reason) = reason {
            return Some(self.lock(kind, reason, now));
        }

        self.level = EscalationLevel::Warned;

        if kind == ViolationKind::TabSwitch && self.tab_switch_limit - self.tab_switch_count == 1 {
            self.last_warning_at = Some(now);
            return Some(Warning {
                severity: WarningSeverity::Critical,
                kind,
                message: "Tab switching detected! One more tab switch will submit your exam immediately.".to_string(),
                count: self.tab_switch_count,
                limit: self.tab_switch_limit,
            });
        }

        let spaced = self
            .last_warning_at
            .is_none_or(|last| (now - last).num_milliseconds() >= self.warning_spacing_ms);
        if !spaced {
            tracing::debug!(kind = kind.as_str(), "warning suppressed by rate limit");
            return None;
        }

        self.last_warning_at = Some(now);
        Some(Warning {
            severity: WarningSeverity::Notice,
            kind,
            message: format!(
                "Security violation detected: {}. Violation {} of {}.",
                kind.label(),
                self.total_count,
                self.max_violations
            ),
            count: self.total_count,
            limit: self.max_violations,
        })
    }

    fn lock(&mut self, kind: ViolationKind, reason: LockReason, now: DateTime<Utc>) -> Warning {
        let order = LockOrder {
            reason,
            locked_at: now,
            submit_at: now + TimeDelta::milliseconds(self.grace_ms),
        };
        self.level = EscalationLevel::Locked;
        self.lock = Some(order);
        self.last_warning_at = Some(now);

        tracing::info!(
            reason = ?reason,
            total = self.total_count,
            tab_switches = self.tab_switch_count,
            "exam locked, submitting after grace period"
        );

        let (count, limit) = match reason {
            LockReason::TabSwitchLimit => (self.tab_switch_count, self.tab_switch_limit),
            LockReason::ViolationLimit => (self.total_count, self.max_violations),
        };
        Warning {
            severity: WarningSeverity::Final,
            kind,
            message: format!(
                "Maximum violations reached ({} of {}). Your exam is locked and is being submitted now.",
                count, limit
            ),
            count,
            limit,
        }
    }
}
