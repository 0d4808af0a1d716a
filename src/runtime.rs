use anyhow::{Context, Result};
use async_trait::async_trait;
use std::fmt;
use std::process::Output;
use std::sync::Arc;
use tokio::process::Command;
use tracing::{debug, error, info};

// =============================================================================
// Container Runtime Interface
// =============================================================================

/// A container resolved by name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerHandle {
    pub id: String,
    pub name: String,
}

#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    /// Confirm the runtime is reachable, returning its server version.
    async fn ping(&self) -> Result<String>;

    /// Look a container up by name. `Ok(None)` means it does not exist.
    async fn find(&self, name: &str) -> Result<Option<ContainerHandle>>;

    async fn restart(&self, container: &ContainerHandle) -> Result<()>;
}

#[async_trait]
impl<T: ContainerRuntime + ?Sized> ContainerRuntime for Arc<T> {
    async fn ping(&self) -> Result<String> {
        (**self).ping().await
    }

    async fn find(&self, name: &str) -> Result<Option<ContainerHandle>> {
        (**self).find(name).await
    }

    async fn restart(&self, container: &ContainerHandle) -> Result<()> {
        (**self).restart(container).await
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RestartOutcome {
    Restarted,
    NotFound,
    RuntimeError(String),
}

impl fmt::Display for RestartOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Restarted => write!(f, "restarted"),
            Self::NotFound => write!(f, "container not found"),
            Self::RuntimeError(detail) => write!(f, "runtime error: {detail}"),
        }
    }
}

/// Restart the named container. Never retried here; the next scheduled
/// check is the retry.
pub async fn restart_container(runtime: &dyn ContainerRuntime, name: &str) -> RestartOutcome {
    let container = match runtime.find(name).await {
        Ok(Some(container)) => container,
        Ok(None) => {
            error!(
                "Plex container not found, please check the container name: {}",
                name
            );
            return RestartOutcome::NotFound;
        }
        Err(e) => {
            error!("Failed to look up container {}: {:#}", name, e);
            return RestartOutcome::RuntimeError(format!("{e:#}"));
        }
    };

    match runtime.restart(&container).await {
        Ok(()) => {
            info!("Plex container {} restarted", container.name);
            RestartOutcome::Restarted
        }
        Err(e) => {
            error!("Failed to restart Plex container {}: {:#}", container.name, e);
            RestartOutcome::RuntimeError(format!("{e:#}"))
        }
    }
}

/// Drives the `docker`/`podman` command line.
pub struct CliRuntime {
    binary: String,
}

impl CliRuntime {
    pub fn new(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    async fn run(&self, args: &[&str]) -> Result<Output> {
        debug!("Running {} {}", self.binary, args.join(" "));

        Command::new(&self.binary)
            .args(args)
            .output()
            .await
            .with_context(|| format!("Failed to execute '{} {}'", self.binary, args[0]))
    }
}

fn is_not_found(stderr: &str) -> bool {
    let stderr = stderr.to_lowercase();
    stderr.contains("no such container") || stderr.contains("no such object")
}

#[async_trait]
impl ContainerRuntime for CliRuntime {
    async fn ping(&self) -> Result<String> {
        let output = self
            .run(&["version", "--format", "{{.Server.Version}}"])
            .await?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(anyhow::anyhow!(
                "{} version failed: {}",
                self.binary,
                stderr.trim()
            ));
        }

        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }

    async fn find(&self, name: &str) -> Result<Option<ContainerHandle>> {
        let output = self
            .run(&["inspect", "--type", "container", "--format", "{{.Id}}", name])
            .await?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            if is_not_found(&stderr) {
                return Ok(None);
            }
            return Err(anyhow::anyhow!(
                "{} inspect failed: {}",
                self.binary,
                stderr.trim()
            ));
        }

        let stdout =
            String::from_utf8(output.stdout).context("Invalid UTF-8 in inspect output")?;
        let id = stdout.trim();
        if id.is_empty() {
            return Ok(None);
        }

        Ok(Some(ContainerHandle {
            id: id.to_string(),
            name: name.to_string(),
        }))
    }

    async fn restart(&self, container: &ContainerHandle) -> Result<()> {
        let output = self.run(&["restart", &container.id]).await?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(anyhow::anyhow!(
                "{} restart failed: {}",
                self.binary,
                stderr.trim()
            ));
        }

        Ok(())
    }
}


#[cfg(test)]
mod tests {
    use super::testing::FakeRuntime;
    use super::*;

    #[test]
    fn test_not_found_detection() {
        assert!(is_not_found("Error: No such container: plex"));
        assert!(is_not_found("Error response from daemon: No such object: plex"));
        assert!(is_not_found("Error: no such container plex"));
        assert!(!is_not_found("permission denied while trying to connect"));
    }

    #[tokio::test]
    async fn test_restart_existing_container() {
        let runtime = FakeRuntime::with_container("plex");
        let outcome = restart_container(&runtime, "plex").await;

        assert_eq!(outcome, RestartOutcome::Restarted);
        assert_eq!(*runtime.restarts.lock().unwrap(), vec!["plex".to_string()]);
    }

    #[tokio::test]
    async fn test_restart_missing_container() {
        let runtime = FakeRuntime::with_container("plex");
        let outcome = restart_container(&runtime, "plexx").await;

        assert_eq!(outcome, RestartOutcome::NotFound);
        assert_eq!(runtime.restart_count(), 0);
    }

    #[tokio::test]
    async fn test_restart_runtime_failure() {
        let runtime = FakeRuntime::failing("plex", "daemon unavailable");
        let outcome = restart_container(&runtime, "plex").await;

        assert_eq!(
            outcome,
            RestartOutcome::RuntimeError("daemon unavailable".to_string())
        );
    }

    #[tokio::test]
    async fn test_cli_runtime_missing_binary_is_runtime_error() {
        let runtime = CliRuntime::new("definitely-not-a-container-runtime");

        assert!(runtime.ping().await.is_err());
        let outcome = restart_container(&runtime, "plex").await;
        assert!(matches!(outcome, RestartOutcome::RuntimeError(_)));
    }
}
