use crate::engine::CheckOutcome;

use chrono::{DateTime, Local};
use std::time::Duration;
use tokio::time::Instant;

// =============================================================================
// Schedule State
// =============================================================================

#[derive(Debug)]
pub struct ScheduleState {
    pub next_due: Instant,
    next_due_wall: DateTime<Local>,
    pub checks_run: u64,
    pub updates_applied: u64,
    pub consecutive_failures: u32,
}

impl Default for ScheduleState {
    fn default() -> Self {
        Self::new()
    }
}

impl ScheduleState {
    pub fn new() -> Self {
        Self {
            next_due: Instant::now(),
            next_due_wall: Local::now(),
            checks_run: 0,
            updates_applied: 0,
            consecutive_failures: 0,
        }
    }

    /// Schedule the next check one `interval` from now.
    pub fn schedule_next(&mut self, interval: Duration) {
        self.next_due = Instant::now() + interval;
        let now = Local::now();
        self.next_due_wall = chrono::Duration::from_std(interval)
            .ok()
            .and_then(|delta| now.checked_add_signed(delta))
            .unwrap_or(now);
    }

    pub fn next_due_display(&self) -> String {
        self.next_due_wall.format("%Y-%m-%d %H:%M:%S").to_string()
    }

    pub fn record(&mut self, outcome: &CheckOutcome) {
        self.checks_run += 1;

        if matches!(outcome, CheckOutcome::UpdateApplied) {
            self.updates_applied += 1;
        }

        if outcome.is_failure() {
            self.consecutive_failures += 1;
        } else {
            self.consecutive_failures = 0;
        }
    }
}
