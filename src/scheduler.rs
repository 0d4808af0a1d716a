use crate::engine::UpdateEngine;
use crate::error::ConfigError;
use crate::state::ScheduleState;

use std::time::Duration;
use tokio::time::sleep_until;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

// =============================================================================
// Check Scheduler
// =============================================================================

pub const MIN_INTERVAL_MINUTES: u32 = 5;

pub fn validate_interval(minutes: u32) -> Result<Duration, ConfigError> {
    if minutes < MIN_INTERVAL_MINUTES {
        return Err(ConfigError::IntervalTooSmall {
            minutes,
            min: MIN_INTERVAL_MINUTES,
        });
    }
    Ok(Duration::from_secs(u64::from(minutes) * 60))
}

/// Runs one check at startup, then one per interval, until `shutdown` fires.
/// A check is never interrupted; shutdown is only observed between checks.
pub struct Scheduler {
    engine: UpdateEngine,
    interval: Duration,
    state: ScheduleState,
}

impl Scheduler {
    pub fn new(engine: UpdateEngine, interval_minutes: u32) -> Result<Self, ConfigError> {
        let interval = validate_interval(interval_minutes)?;
        Ok(Self {
            engine,
            interval,
            state: ScheduleState::new(),
        })
    }

    async fn run_check(&mut self, force_update: bool) {
        let outcome = self.engine.check(force_update).await;
        self.state.record(&outcome);

        if outcome.is_failure() {
            error!("Update check finished: {}", outcome);
        } else {
            info!("Update check finished: {}", outcome);
        }

        if self.state.consecutive_failures > 1 {
            warn!(
                "{} consecutive update checks have failed",
                self.state.consecutive_failures
            );
        }
    }

    pub async fn run(&mut self, force_update: bool, shutdown: CancellationToken) {
        info!(
            "Running initial update check (force update: {})",
            force_update
        );
        self.run_check(force_update).await;

        loop {
            self.state.schedule_next(self.interval);
            info!(
                "Next update check will be at {}",
                self.state.next_due_display()
            );

            tokio::select! {
                biased;
                () = shutdown.cancelled() => break,
                () = sleep_until(self.state.next_due) => {}
            }

            self.run_check(false).await;
        }

        info!(
            "Stopped after {} checks ({} updates applied)",
            self.state.checks_run, self.state.updates_applied
        );
    }
}
