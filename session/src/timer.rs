//! The timer bank: every delay in a round runs through here.
//!
//! Only one timer is ever active. Each phase of a round replaces the previous
//! phase's timer, so there is nothing left ticking once a phase ends and nothing
//! to clean up beyond `cancel_all`.

use std::time::{Duration, Instant};

use rpsense_logging::Log;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TimerKind {
    /// Seconds before capture starts.
    Countdown,

    /// Frame cadence inside the capture window.
    Capture,

    /// How long a submission may stay unanswered.
    VerdictDeadline,

    /// Seconds before the next round starts on its own.
    InterRound,
}

/// One expiry of the active timer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TimerFire {
    pub kind: TimerKind,

    /// 1-based tick number.
    pub tick: u32,

    /// Ticks left after this one. Zero means the timer is done.
    pub remaining: u32,
}

#[derive(Debug)]
struct ActiveTimer {
    kind: TimerKind,
    period: Duration,
    ticks: u32,
    fired: u32,
    next_at: Instant,
}

#[derive(Debug, Default)]
pub struct TimerBank {
    active: Option<ActiveTimer>,
}

impl TimerBank {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts a timer that fires `ticks` times, `period` apart, beginning one period
    /// after `now`. Whatever was active before is cancelled.
    pub fn start(&mut self, kind: TimerKind, period: Duration, ticks: u32, now: Instant) {
        if let Some(previous) = self.active.take() {
            tracing::trace!(target: Log::Session, previous = ?previous.kind, ?kind, "Replacing active timer");
        }

        if ticks == 0 {
            return;
        }

        self.active = Some(ActiveTimer {
            kind,
            period,
            ticks,
            fired: 0,
            next_at: now + period,
        });
    }

    /// Cancels the active timer if it is of `kind`. Returns whether anything was cancelled.
    pub fn cancel(&mut self, kind: TimerKind) -> bool {
        if self.active() == Some(kind) {
            self.active = None;
            return true;
        }

        false
    }

    pub fn cancel_all(&mut self) {
        self.active = None;
    }

    pub fn active(&self) -> Option<TimerKind> {
        self.active.as_ref().map(|timer| timer.kind)
    }

    /// When the active timer fires next, if any.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.active.as_ref().map(|timer| timer.next_at)
    }

    /// Returns the next due expiry, if any. Call repeatedly until `None` to catch up
    /// after a late wakeup.
    pub fn poll(&mut self, now: Instant) -> Option<TimerFire> {
        let timer = self.active.as_mut()?;

        if now < timer.next_at {
            return None;
        }

        timer.fired += 1;

        let fire = TimerFire {
            kind: timer.kind,
            tick: timer.fired,
            remaining: timer.ticks - timer.fired,
        };

        if fire.remaining == 0 {
            self.active = None;
        } else {
            timer.next_at += timer.period;
        }

        Some(fire)
    }
}
