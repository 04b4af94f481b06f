use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Mutable scheduling state for one source, owned by the scheduler.
///
/// In-memory only: rebuilt at startup, so a restart re-runs every
/// enabled source once immediately. The sink upsert makes that
/// harmless.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunState {
    pub last_run_at: Option<DateTime<Utc>>,
    pub consecutive_errors: u32,
    pub in_cooldown_until: Option<DateTime<Utc>>,
}

impl RunState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether a source with this state should run now.
    ///
    /// Due means: never run, or `interval` has elapsed since the last
    /// run, and any cooldown window has passed.
    pub fn is_due(&self, interval: Duration, now: DateTime<Utc>) -> bool {
        if let Some(until) = self.in_cooldown_until {
            if now < until {
                return false;
            }
        }
        match self.last_run_at {
            None => true,
            Some(last) => now - last >= chrono::Duration::seconds(interval.as_secs() as i64),
        }
    }

    /// Record a run where at least one query succeeded.
    pub fn record_success(&mut self, now: DateTime<Utc>) {
        self.last_run_at = Some(now);
        self.consecutive_errors = 0;
        self.in_cooldown_until = None;
    }

    /// Record a run where every query failed. Returns true if this
    /// failure pushed the source into cooldown.
    pub fn record_failure(
        &mut self,
        now: DateTime<Utc>,
        max_consecutive: u32,
        cooldown: Duration,
    ) -> bool {
        self.last_run_at = Some(now);
        self.consecutive_errors += 1;
        if self.consecutive_errors >= max_consecutive {
            self.in_cooldown_until =
                Some(now + chrono::Duration::seconds(cooldown.as_secs() as i64));
            true
        } else {
            false
        }
    }
}

/// Read-only snapshot of one source's scheduling state, exposed by
/// `Scheduler::status()` for operators.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceStatus {
    pub id: String,
    pub display_name: String,
    pub enabled: bool,
    pub interval_secs: u64,
    pub last_run_at: Option<DateTime<Utc>>,
    pub consecutive_errors: u32,
    pub in_cooldown_until: Option<DateTime<Utc>>,
}
