//! External-API quota tracking.
//!
//! The Odds API enforces a monthly request quota. The tracker answers
//! "may I make N more calls now?" and records confirmed usage. It holds
//! no lock itself; the scan orchestrator owns it behind a `Mutex` so
//! that concurrent fetch tasks cannot interleave check and record.
//!
//! Local counting can drift from the provider's books, so when a
//! response carries `x-requests-remaining` / `x-requests-used` headers
//! the tracker reconciles against those authoritative figures.

use chrono::{DateTime, Duration, Utc};
use thiserror::Error;
use tracing::{debug, info};

#[derive(Debug, Error, PartialEq)]
#[error("API quota exhausted, window resets in {retry_in}")]
pub struct QuotaExceeded {
    /// Time until the current window rolls over.
    pub retry_in: Duration,
}

/// Authoritative usage figures reported by the data source in response
/// metadata.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReportedUsage {
    pub remaining: u32,
    pub used: u32,
}

/// One quota window: calls used against a limit since `window_start`.
#[derive(Debug, Clone)]
pub struct QuotaWindow {
    pub window_start: DateTime<Utc>,
    pub calls_used: u32,
    pub calls_limit: u32,
}

/// Tracks the remaining call budget for the current window.
pub struct QuotaTracker {
    window: QuotaWindow,
    window_duration: Duration,
}

impl QuotaTracker {
    pub fn new(calls_limit: u32, window_duration: Duration) -> Self {
        Self {
            window: QuotaWindow {
                window_start: Utc::now(),
                calls_used: 0,
                calls_limit,
            },
            window_duration,
        }
    }

    /// May `n` more calls be made now? Returns the budget that would
    /// remain after them, or `QuotaExceeded` with the time to the next
    /// reset. Does not consume budget — call `record` once the calls
    /// actually happened.
    pub fn check(&mut self, n: u32) -> Result<u32, QuotaExceeded> {
        self.check_at(n, Utc::now())
    }

    /// Record `n` confirmed external calls. Must be called exactly once
    /// per successful call batch, never speculatively.
    pub fn record(&mut self, n: u32) {
        self.window.calls_used = self.window.calls_used.saturating_add(n);
        debug!(
            used = self.window.calls_used,
            limit = self.window.calls_limit,
            "Quota usage recorded"
        );
    }

    /// Reconcile local counting against figures the provider reported.
    /// Only ever tightens the budget — a header claiming more room than
    /// we think we have is ignored.
    pub fn reconcile(&mut self, reported: ReportedUsage) {
        let local_remaining = self.remaining();
        if reported.remaining < local_remaining {
            info!(
                local = local_remaining,
                reported = reported.remaining,
                "Reconciling quota against provider figures"
            );
            self.window.calls_used = self.window.calls_limit.saturating_sub(reported.remaining);
        }
    }

    pub fn remaining(&self) -> u32 {
        self.window.calls_limit.saturating_sub(self.window.calls_used)
    }

    pub fn window(&self) -> &QuotaWindow {
        &self.window
    }

    fn check_at(&mut self, n: u32, now: DateTime<Utc>) -> Result<u32, QuotaExceeded> {
        // One window per period: roll over when the period has elapsed.
        if now >= self.window.window_start + self.window_duration {
            debug!("Quota window expired, resetting");
            self.window.window_start = now;
            self.window.calls_used = 0;
        }

        let wanted = self.window.calls_used.saturating_add(n);
        if wanted <= self.window.calls_limit {
            Ok(self.window.calls_limit - wanted)
        } else {
            Err(QuotaExceeded {
                retry_in: self.window.window_start + self.window_duration - now,
            })
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
