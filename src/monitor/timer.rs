// src/monitor/timer.rs

/// Result of one timer tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerTick {
    /// Untimed test, or the timer is not running.
    Idle,
    Running { remaining: u64 },
    /// Reached zero on this tick. Reported exactly once.
    Expired,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TimerState {
    Armed,
    Running,
    Stopped,
}

/// One-second countdown from the test's duration.
///
/// It cannot be paused; it runs until zero or until stopped by finalization.
#[derive(Debug, Clone)]
pub struct SessionTimer {
    total_seconds: u64,
    remaining: u64,
    state: TimerState,
}

impl SessionTimer {
    /// `duration_minutes <= 0` disables the timer.
    pub fn from_minutes(duration_minutes: i64) -> Self {
        let total_seconds = u64::try_from(duration_minutes)
            .unwrap_or(0)
            .saturating_mul(60);
        Self {
            total_seconds,
            remaining: total_seconds,
            state: TimerState::Armed,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.total_seconds > 0
    }

    pub fn is_running(&self) -> bool {
        self.state == TimerState::Running
    }

    pub fn remaining(&self) -> u64 {
        self.remaining
    }

    pub fn start(&mut self) {
        if self.state == TimerState::Armed && self.is_enabled() {
            self.state = TimerState::Running;
        }
    }

    pub fn stop(&mut self) {
        self.state = TimerState::Stopped;
    }

    pub fn tick(&mut self) -> TimerTick {
        if self.state != TimerState::Running {
            return TimerTick::Idle;
        }
        self.remaining = self.remaining.saturating_sub(1);
        if self.remaining == 0 {
            self.state = TimerState::Stopped;
            return TimerTick::Expired;
        }
        TimerTick::Running {
            remaining: self.remaining,
        }
    }
}
