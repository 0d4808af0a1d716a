use crate::error::{CheckFailure, VersionFormatError};
use crate::runtime::{ContainerRuntime, RestartOutcome, restart_container};
use crate::source::{VersionSource, fetch_with_retry};
use crate::version::{VersionToken, compare, normalize};

use std::cmp::Ordering;
use std::fmt;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

// =============================================================================
// Update Decision
// =============================================================================

#[derive(Debug)]
pub enum CheckOutcome {
    UpToDate,
    UpdateApplied,
    UpdateFailed(RestartOutcome),
    CheckFailed(CheckFailure),
}

impl CheckOutcome {
    pub fn is_failure(&self) -> bool {
        matches!(self, Self::UpdateFailed(_) | Self::CheckFailed(_))
    }
}

impl fmt::Display for CheckOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UpToDate => write!(f, "up to date"),
            Self::UpdateApplied => write!(f, "update applied"),
            Self::UpdateFailed(reason) => write!(f, "update failed ({reason})"),
            Self::CheckFailed(reason) => write!(f, "check failed ({reason})"),
        }
    }
}

/// Fetches both versions, decides, and restarts the container when needed.
/// Holds no state between checks.
pub struct UpdateEngine {
    latest: Box<dyn VersionSource>,
    current: Box<dyn VersionSource>,
    runtime: Box<dyn ContainerRuntime>,
    container_name: String,
    retry_delay: Duration,
    shutdown: CancellationToken,
}

impl UpdateEngine {
    pub fn new(
        latest: Box<dyn VersionSource>,
        current: Box<dyn VersionSource>,
        runtime: Box<dyn ContainerRuntime>,
        container_name: impl Into<String>,
        retry_delay: Duration,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            latest,
            current,
            runtime,
            container_name: container_name.into(),
            retry_delay,
            shutdown,
        }
    }

    async fn fetch_version(&self, source: &dyn VersionSource) -> Result<VersionToken, CheckFailure> {
        let raw = fetch_with_retry(source, self.retry_delay, &self.shutdown)
            .await
            .map_err(|e| {
                error!("Failed to get {} Plex version: {}", source.name(), e);
                CheckFailure::Source {
                    provider: source.name(),
                    source: e,
                }
            })?;

        normalize(&raw).map_err(|e: VersionFormatError| {
            error!("Invalid {} version string: {:?}", source.name(), e.raw);
            CheckFailure::from(e)
        })
    }

    pub async fn check(&self, force_update: bool) -> CheckOutcome {
        let (latest, current) = tokio::join!(
            self.fetch_version(self.latest.as_ref()),
            self.fetch_version(self.current.as_ref()),
        );

        let (latest, current) = match (latest, current) {
            (Ok(latest), Ok(current)) => (latest, current),
            (Err(e), _) | (_, Err(e)) => {
                error!("Failed to compare Plex versions");
                return CheckOutcome::CheckFailed(e);
            }
        };

        info!("Latest Version: {}", latest);
        info!("Current Version: {}", current);

        if !force_update && compare(&latest, &current) != Ordering::Greater {
            info!("Plex is up to date.");
            return CheckOutcome::UpToDate;
        }

        if force_update {
            info!("Update forced. Restarting Plex container...");
        } else {
            info!("Update available. Restarting Plex container...");
        }

        match restart_container(self.runtime.as_ref(), &self.container_name).await {
            RestartOutcome::Restarted => CheckOutcome::UpdateApplied,
            failed => CheckOutcome::UpdateFailed(failed),
        }
    }
}
