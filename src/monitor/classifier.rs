// src/monitor/classifier.rs

use std::sync::LazyLock;

use chrono::{DateTime, Utc};
use regex::Regex;

use super::ViolationKind;

/// `Ctrl+Shift+I`, `Meta+Tab`, `F12`, ...
static KEY_COMBO: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?i)((?:ctrl|control|alt|option|shift|meta|cmd|command)\+)*([a-z0-9]+)$")
        .expect("key combo pattern is valid")
});

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClipboardAction {
    Copy,
    Cut,
    Paste,
}

/// A parsed keyboard chord.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct KeyCombo {
    pub ctrl: bool,
    pub alt: bool,
    pub shift: bool,
    pub meta: bool,
    /// Upper-cased key name, e.g. `C`, `TAB`, `F12`.
    pub key: String,
}

impl KeyCombo {
    pub fn parse(raw: &str) -> Option<Self> {
        let raw = raw.trim();
        if !KEY_COMBO.is_match(raw) {
            return None;
        }

        let mut combo = KeyCombo::default();
        let mut parts: Vec<&str> = raw.split('+').collect();
        combo.key = parts.pop()?.to_ascii_uppercase();
        for modifier in parts {
            match modifier.to_ascii_lowercase().as_str() {
                "ctrl" | "control" => combo.ctrl = true,
                "alt" | "option" => combo.alt = true,
                "shift" => combo.shift = true,
                _ => combo.meta = true,
            }
        }
        Some(combo)
    }

    /// Violation kind for a forbidden chord, `None` for harmless keys.
    pub fn forbidden_kind(&self) -> Option<ViolationKind> {
        let command = self.ctrl || self.meta;
        let key = self.key.as_str();

        if command && !self.shift && matches!(key, "C" | "X" | "V") {
            return Some(ViolationKind::CopyAttempt);
        }

        let blocked = match key {
            "F12" | "PRINTSCREEN" => true,
            "TAB" => self.alt || self.meta,
            "I" | "J" | "C" => command && self.shift,
            "U" | "T" | "W" | "N" | "R" | "P" | "S" => command,
            _ => false,
        };
        blocked.then_some(ViolationKind::ShortcutAttempt)
    }
}

/// Raw environment events, before classification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RawSignal {
    VisibilityChange { hidden: bool },
    WindowBlur,
    WindowFocus,
    FullscreenChange { active: bool },
    KeyDown(KeyCombo),
    ContextMenu,
    BeforeUnload,
    MouseLeave,
    Clipboard(ClipboardAction),
}

impl RawSignal {
    /// Parses a DOM-style event name plus optional detail.
    ///
    /// Unknown names and malformed details yield `None`.
    pub fn from_event(name: &str, detail: Option<&str>) -> Option<Self> {
        let detail = detail.map(str::trim).unwrap_or_default();
        let signal = match name.trim().to_ascii_lowercase().as_str() {
            "visibilitychange" => match detail {
                "hidden" => RawSignal::VisibilityChange { hidden: true },
                "visible" => RawSignal::VisibilityChange { hidden: false },
                _ => return None,
            },
            "blur" => RawSignal::WindowBlur,
            "focus" => RawSignal::WindowFocus,
            "fullscreenchange" => match detail {
                "enter" | "active" => RawSignal::FullscreenChange { active: true },
                "exit" | "inactive" => RawSignal::FullscreenChange { active: false },
                _ => return None,
            },
            "keydown" => RawSignal::KeyDown(KeyCombo::parse(detail)?),
            "contextmenu" => RawSignal::ContextMenu,
            "beforeunload" => RawSignal::BeforeUnload,
            "mouseleave" => RawSignal::MouseLeave,
            "copy" => RawSignal::Clipboard(ClipboardAction::Copy),
            "cut" => RawSignal::Clipboard(ClipboardAction::Cut),
            "paste" => RawSignal::Clipboard(ClipboardAction::Paste),
            _ => return None,
        };
        Some(signal)
    }
}

/// A signal that maps to a violation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classification {
    pub kind: ViolationKind,
    pub description: String,
}

/// Maps a raw signal to a violation kind, ignoring debounce.
pub fn classify(signal: &RawSignal, prevent_copy: bool) -> Option<Classification> {
    let (kind, description) = match signal {
        RawSignal::VisibilityChange { hidden: true } => (
            ViolationKind::TabSwitch,
            "Switched to another tab or minimized the window".to_string(),
        ),
        RawSignal::WindowBlur => (
            ViolationKind::WindowBlur,
            "Exam window lost focus".to_string(),
        ),
        RawSignal::FullscreenChange { active: false } => (
            ViolationKind::FullscreenExit,
            "Exited fullscreen mode".to_string(),
        ),
        RawSignal::KeyDown(combo) => {
            let kind = combo.forbidden_kind()?;
            if kind == ViolationKind::CopyAttempt && !prevent_copy {
                return None;
            }
            (kind, format!("Pressed blocked key combination {}", describe(combo)))
        }
        RawSignal::ContextMenu => (
            ViolationKind::RightClick,
            "Opened the context menu".to_string(),
        ),
        RawSignal::BeforeUnload => (
            ViolationKind::PageExit,
            "Attempted to leave or reload the page".to_string(),
        ),
        RawSignal::MouseLeave => (
            ViolationKind::WindowExit,
            "Cursor left the exam window".to_string(),
        ),
        RawSignal::Clipboard(action) if prevent_copy => (
            ViolationKind::CopyAttempt,
            match action {
                ClipboardAction::Copy => "Attempted to copy content",
                ClipboardAction::Cut => "Attempted to cut content",
                ClipboardAction::Paste => "Attempted to paste content",
            }
            .to_string(),
        ),
        _ => return None,
    };
    Some(Classification { kind, description })
}

fn describe(combo: &KeyCombo) -> String {
    let mut parts = Vec::new();
    if combo.ctrl {
        parts.push("Ctrl");
    }
    if combo.meta {
        parts.push("Meta");
    }
    if combo.alt {
        parts.push("Alt");
    }
    if combo.shift {
        parts.push("Shift");
    }
    parts.push(&combo.key);
    parts.join("+")
}

/// Turns raw signals into at most one violation per debounce window.
#[derive(Debug, Clone)]
pub struct ViolationClassifier {
    debounce_ms: i64,
    prevent_copy: bool,
    armed: bool,
    last_recorded_at: Option<DateTime<Utc>>,
    active_kind: Option<ViolationKind>,
}

impl ViolationClassifier {
    pub fn new(debounce_ms: i64, prevent_copy: bool) -> Self {
        Self {
            debounce_ms: debounce_ms.max(0),
            prevent_copy,
            armed: false,
            last_recorded_at: None,
            active_kind: None,
        }
    }

    /// Starts accepting signals.
    pub fn arm(&mut self) {
        self.armed = true;
    }

    /// Stops accepting signals. Used at finalization.
    pub fn disarm(&mut self) {
        self.armed = false;
        self.active_kind = None;
    }

    /// Kind currently suppressing related signals, if its window is still open.
    pub fn active_kind(&self, now: DateTime<Utc>) -> Option<ViolationKind> {
        self.active_kind.filter(|_| self.within_window(now))
    }

    fn within_window(&self, now: DateTime<Utc>) -> bool {
        self.last_recorded_at
            .is_some_and(|last| (now - last).num_milliseconds() < self.debounce_ms)
    }

    /// Classifies `signal` and applies the debounce rule.
    ///
    /// Returns the classification when a new violation must be recorded.
    pub fn admit(&mut self, signal: &RawSignal, now: DateTime<Utc>) -> Option<Classification> {
        if !self.armed {
            return None;
        }
        let classification = classify(signal, self.prevent_copy)?;

        if !self.within_window(now) {
            self.active_kind = None;
        }

        if let Some(active) = self.active_kind {
            if classification.kind.is_related(active) {
                tracing::debug!(
                    kind = classification.kind.as_str(),
                    active = active.as_str(),
                    "debounced violation signal"
                );
                return None;
            }
        }

        self.last_recorded_at = Some(now);
        self.active_kind = Some(classification.kind);
        Some(classification)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeDelta;

    fn armed() -> ViolationClassifier {
        let mut c = ViolationClassifier::new(2_000, true);
        c.arm();
        c
    }

    fn hidden() -> RawSignal {
        RawSignal::VisibilityChange { hidden: true }
    }

    #[test]
    fn test_parse_event_names() {
        assert_eq!(
            RawSignal::from_event("visibilitychange", Some("hidden")),
            Some(hidden())
        );
        assert_eq!(RawSignal::from_event("blur", None), Some(RawSignal::WindowBlur));
        assert_eq!(RawSignal::from_event("visibilitychange", Some("sideways")), None);
        assert_eq!(RawSignal::from_event("devicemotion", None), None);
        assert_eq!(RawSignal::from_event("keydown", Some("Ctrl+")), None);
    }

    #[test]
    fn test_key_combos() {
        let kind = |raw: &str| KeyCombo::parse(raw).and_then(|c| c.forbidden_kind());

        assert_eq!(kind("Ctrl+C"), Some(ViolationKind::CopyAttempt));
        assert_eq!(kind("cmd+v"), Some(ViolationKind::CopyAttempt));
        assert_eq!(kind("Ctrl+Shift+I"), Some(ViolationKind::ShortcutAttempt));
        assert_eq!(kind("Ctrl+Shift+C"), Some(ViolationKind::ShortcutAttempt));
        assert_eq!(kind("F12"), Some(ViolationKind::ShortcutAttempt));
        assert_eq!(kind("Alt+Tab"), Some(ViolationKind::ShortcutAttempt));
        assert_eq!(kind("Tab"), None);
        assert_eq!(kind("A"), None);
        assert_eq!(kind("Shift+A"), None);
    }

    #[test]
    fn test_harmless_signals_are_dropped() {
        let mut c = armed();
        let now = Utc::now();
        assert!(c.admit(&RawSignal::WindowFocus, now).is_none());
        assert!(c.admit(&RawSignal::VisibilityChange { hidden: false }, now).is_none());
        assert!(c.admit(&RawSignal::FullscreenChange { active: true }, now).is_none());
        assert!(c.active_kind(now).is_none());
    }

    #[test]
    fn test_unarmed_classifier_drops_everything() {
        let mut c = ViolationClassifier::new(2_000, true);
        assert!(c.admit(&hidden(), Utc::now()).is_none());

        c.arm();
        c.disarm();
        assert!(c.admit(&hidden(), Utc::now()).is_none());
    }

    #[test]
    fn test_tab_switch_and_blur_collapse() {
        let mut c = armed();
        let t0 = Utc::now();

        let first = c.admit(&hidden(), t0).unwrap();
        assert_eq!(first.kind, ViolationKind::TabSwitch);
        assert!(c.admit(&RawSignal::WindowBlur, t0 + TimeDelta::milliseconds(50)).is_none());
        assert!(c.admit(&hidden(), t0 + TimeDelta::milliseconds(1_999)).is_none());
    }

    #[test]
    fn test_blur_first_then_tab_switch_collapse() {
        let mut c = armed();
        let t0 = Utc::now();

        assert!(c.admit(&RawSignal::WindowBlur, t0).is_some());
        assert!(c.admit(&hidden(), t0 + TimeDelta::milliseconds(10)).is_none());
    }

    #[test]
    fn test_unrelated_kind_inside_window_is_recorded() {
        let mut c = armed();
        let t0 = Utc::now();

        assert!(c.admit(&hidden(), t0).is_some());
        let next = c.admit(&RawSignal::ContextMenu, t0 + TimeDelta::milliseconds(100));
        assert_eq!(next.unwrap().kind, ViolationKind::RightClick);
        // right-click is now the active kind, so a blur is no longer related
        assert!(c.admit(&RawSignal::WindowBlur, t0 + TimeDelta::milliseconds(200)).is_some());
    }

    #[test]
    fn test_window_expiry_clears_active_kind() {
        let mut c = armed();
        let t0 = Utc::now();

        assert!(c.admit(&hidden(), t0).is_some());
        assert_eq!(c.active_kind(t0), Some(ViolationKind::TabSwitch));
        assert_eq!(c.active_kind(t0 + TimeDelta::milliseconds(2_000)), None);
        assert!(c.admit(&hidden(), t0 + TimeDelta::milliseconds(2_000)).is_some());
    }

    #[test]
    fn test_copy_allowed_when_not_prevented() {
        let mut c = ViolationClassifier::new(2_000, false);
        c.arm();
        let now = Utc::now();

        assert!(c.admit(&RawSignal::Clipboard(ClipboardAction::Copy), now).is_none());
        let ctrl_c = RawSignal::KeyDown(KeyCombo::parse("Ctrl+C").unwrap());
        assert!(c.admit(&ctrl_c, now).is_none());
        let f12 = RawSignal::KeyDown(KeyCombo::parse("F12").unwrap());
        assert!(c.admit(&f12, now).is_some());
    }

    #[test]
    fn test_recorded_never_exceeds_raw_signals() {
        let mut c = armed();
        let t0 = Utc::now();
        let signals = [
            (0, hidden()),
            (20, RawSignal::WindowBlur),
            (900, RawSignal::WindowBlur),
            (2_500, RawSignal::ContextMenu),
            (2_600, RawSignal::ContextMenu),
            (5_000, RawSignal::BeforeUnload),
            (5_100, RawSignal::MouseLeave),
        ];

        let recorded = signals
            .iter()
            .filter(|(ms, s)| c.admit(s, t0 + TimeDelta::milliseconds(*ms)).is_some())
            .count();

        assert!(recorded < signals.len());
        assert_eq!(recorded, 4);
    }
}
