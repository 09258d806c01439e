// src/monitor/mod.rs

//! Exam integrity monitor.
//!
//! Runs on the respondent's side while a timed test is open. Raw environment
//! signals are classified and debounced into [`Violation`]s, tallied by the
//! escalation controller, and raced against the countdown timer. Whichever
//! trigger fires first (manual submit, time expiry, escalation lock) seals
//! exactly one [`FinalizationPayload`](crate::models::result::FinalizationPayload).
//!
//! Time and device access are injected (see [`clock::Clock`] and
//! [`capability::DeviceCapabilities`]) so the whole pipeline runs
//! deterministically in tests.

pub mod capability;
pub mod classifier;
pub mod clock;
pub mod driver;
pub mod escalation;
pub mod finalizer;
pub mod session;
pub mod timer;
pub mod transport;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::test::ProctoringConfig;

pub use capability::{CameraLease, CapabilityError, CapabilityGate, DeviceCapabilities};
pub use classifier::{RawSignal, ViolationClassifier};
pub use driver::{DriverExit, DriverHandle, Notice, SessionDriver};
pub use clock::{Clock, ManualClock, SystemClock, TokioClock};
pub use escalation::{EscalationController, EscalationLevel, EscalationState, Warning};
pub use finalizer::{FinalizeError, Finalizer, ScoringBoundary};
pub use session::{ExamSession, Respondent, SessionError, SessionPhase};
pub use timer::SessionTimer;
pub use transport::HttpScoringBoundary;

/// Closed set of violation kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ViolationKind {
    TabSwitch,
    FullscreenExit,
    WindowBlur,
    WindowExit,
    PageExit,
    ShortcutAttempt,
    CopyAttempt,
    RightClick,
}

impl ViolationKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::TabSwitch => "tab_switch",
            Self::FullscreenExit => "fullscreen_exit",
            Self::WindowBlur => "window_blur",
            Self::WindowExit => "window_exit",
            Self::PageExit => "page_exit",
            Self::ShortcutAttempt => "shortcut_attempt",
            Self::CopyAttempt => "copy_attempt",
            Self::RightClick => "right_click",
        }
    }

    /// Short human label used in warnings.
    pub fn label(self) -> &'static str {
        match self {
            Self::TabSwitch => "switching tabs",
            Self::FullscreenExit => "leaving fullscreen",
            Self::WindowBlur => "leaving the exam window",
            Self::WindowExit => "moving the cursor out of the exam window",
            Self::PageExit => "trying to leave the page",
            Self::ShortcutAttempt => "using a blocked keyboard shortcut",
            Self::CopyAttempt => "copying or pasting",
            Self::RightClick => "right-clicking",
        }
    }

    /// Whether two kinds may stem from one physical action.
    ///
    /// A tab switch also blurs the window, so those two debounce each other.
    pub fn is_related(self, other: ViolationKind) -> bool {
        self == other
            || matches!(
                (self, other),
                (Self::TabSwitch, Self::WindowBlur) | (Self::WindowBlur, Self::TabSwitch)
            )
    }
}

/// A recorded violation. Append-only within a session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Violation {
    #[serde(rename = "type")]
    pub kind: ViolationKind,
    pub description: String,
    pub timestamp: DateTime<Utc>,
    pub question_index: usize,
}

pub const DEFAULT_DEBOUNCE_MS: i64 = 2_000;
pub const DEFAULT_WARNING_SPACING_MS: i64 = 2_000;
pub const DEFAULT_GRACE_MS: i64 = 3_000;
pub const DEFAULT_MAX_VIOLATIONS: u32 = 3;
pub const DEFAULT_TAB_SWITCH_LIMIT: u32 = 2;

/// Tunables for one monitored session.
#[derive(Debug, Clone, PartialEq)]
pub struct MonitorConfig {
    /// Window in which related signals collapse into one violation.
    pub debounce_ms: i64,
    /// Minimum spacing between ordinary warnings.
    pub warning_spacing_ms: i64,
    /// Delay between lock and automatic submission.
    pub grace_ms: i64,
    pub max_violations: u32,
    pub tab_switch_limit: u32,
    pub prevent_copy: bool,
    pub camera_required: bool,
    pub fullscreen_required: bool,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            debounce_ms: DEFAULT_DEBOUNCE_MS,
            warning_spacing_ms: DEFAULT_WARNING_SPACING_MS,
            grace_ms: DEFAULT_GRACE_MS,
            max_violations: DEFAULT_MAX_VIOLATIONS,
            tab_switch_limit: DEFAULT_TAB_SWITCH_LIMIT,
            prevent_copy: true,
            camera_required: true,
            fullscreen_required: true,
        }
    }
}

impl MonitorConfig {
    /// Thresholds from the test definition win; the rest keep defaults.
    pub fn from_proctoring(proctoring: &ProctoringConfig) -> Self {
        let defaults = Self::default();
        Self {
            max_violations: proctoring
                .max_violations
                .filter(|v| *v > 0)
                .unwrap_or(defaults.max_violations),
            tab_switch_limit: proctoring
                .tab_switch_limit
                .filter(|v| *v > 0)
                .unwrap_or(defaults.tab_switch_limit),
            prevent_copy: proctoring.prevent_copy,
            camera_required: proctoring.camera_required,
            fullscreen_required: proctoring.fullscreen_required,
            ..defaults
        }
    }
}
