use crate::error::ConfigError;
use crate::scheduler::validate_interval;

use clap::Parser;
use clap::builder::BoolishValueParser;
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

// =============================================================================
// Configuration and CLI
// =============================================================================

#[derive(Parser, Debug, Default)]
#[command(name = "plex-updater")]
#[command(about = "Restarts a Plex Media Server container when a newer release is published")]
pub struct Args {
    /// Optional TOML file; flags and environment variables take precedence
    #[arg(short, long, env = "PLEX_UPDATER_CONFIG")]
    pub config: Option<PathBuf>,

    /// Also write daily rotated log files to this directory
    #[arg(short, long, env = "LOG_DIR")]
    pub log_dir: Option<PathBuf>,

    #[arg(short = 'v', long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// Release channel to track (public, beta)
    #[arg(long, env = "PLEX_BRANCH")]
    pub branch: Option<String>,

    #[arg(long, env = "PLEX_TOKEN", hide_env_values = true)]
    pub token: Option<String>,

    #[arg(long, env = "PLEX_PROTOCOL")]
    pub protocol: Option<String>,

    #[arg(long = "ip", env = "PLEX_IP")]
    pub host: Option<String>,

    #[arg(long, env = "PLEX_PORT")]
    pub port: Option<u16>,

    #[arg(long, env = "PLEX_CONTAINER_NAME")]
    pub container_name: Option<String>,

    /// Restart on the first check even when already up to date
    #[arg(long, env = "FORCE_UPDATE", value_parser = BoolishValueParser::new())]
    pub force_update: Option<bool>,

    /// Minutes between checks (minimum 5)
    #[arg(long, env = "INTERVAL")]
    pub interval: Option<u32>,

    #[arg(long, env = "PLEX_CATALOG_URL")]
    pub catalog_url: Option<String>,

    #[arg(long, env = "PLEX_PLATFORM")]
    pub platform: Option<String>,

    #[arg(long, env = "PLEX_OS")]
    pub os: Option<String>,

    /// Container runtime CLI used for restarts (docker or podman)
    #[arg(long, env = "CONTAINER_RUNTIME")]
    pub runtime: Option<String>,

    /// HTTP request timeout in seconds
    #[arg(long, env = "HTTP_TIMEOUT")]
    pub http_timeout: Option<u64>,

    /// Seconds to wait before retrying an unreachable endpoint
    #[arg(long, env = "RETRY_DELAY")]
    pub retry_delay: Option<u64>,
}

/// Settings read from the optional TOML file. Every key is optional.
#[derive(Debug, Deserialize, Default)]
pub struct FileConfig {
    pub branch: Option<String>,
    pub token: Option<String>,
    pub protocol: Option<String>,
    pub host: Option<String>,
    pub port: Option<u16>,
    pub container_name: Option<String>,
    pub force_update: Option<bool>,
    pub interval: Option<u32>,
    pub catalog_url: Option<String>,
    pub platform: Option<String>,
    pub os: Option<String>,
    pub runtime: Option<String>,
    pub http_timeout: Option<u64>,
    pub retry_delay: Option<u64>,
}

impl FileConfig {
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;

        toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }
}

/// Resolved settings, fixed for the lifetime of the process.
#[derive(Clone)]
pub struct Config {
    pub branch: String,
    pub token: String,
    pub protocol: String,
    pub host: String,
    pub port: u16,
    pub container_name: String,
    pub force_update: bool,
    pub interval_minutes: u32,
    pub catalog_url: String,
    pub platform: String,
    pub os: String,
    pub runtime: String,
    pub http_timeout: Duration,
    pub retry_delay: Duration,
}

impl Config {
    pub fn load(args: &Args) -> Result<Self, ConfigError> {
        let file = match &args.config {
            Some(path) => FileConfig::from_file(path)?,
            None => FileConfig::default(),
        };
        Self::resolve(args, file)
    }

    pub fn resolve(args: &Args, file: FileConfig) -> Result<Self, ConfigError> {
        fn pick<T: Clone>(flag: &Option<T>, file: Option<T>, default: T) -> T {
            flag.clone().or(file).unwrap_or(default)
        }

        let token = args
            .token
            .clone()
            .or(file.token)
            .filter(|t| !t.trim().is_empty())
            .ok_or(ConfigError::MissingCredential)?;

        let protocol = pick(&args.protocol, file.protocol, "http".to_string()).to_lowercase();
        if protocol != "http" && protocol != "https" {
            return Err(ConfigError::InvalidProtocol(protocol));
        }

        let interval_minutes = pick(&args.interval, file.interval, 360);
        validate_interval(interval_minutes)?;

        let http_timeout = pick(&args.http_timeout, file.http_timeout, 30);
        if http_timeout == 0 {
            return Err(ConfigError::InvalidDuration("HTTP_TIMEOUT"));
        }
        let retry_delay = pick(&args.retry_delay, file.retry_delay, 5);
        if retry_delay == 0 {
            return Err(ConfigError::InvalidDuration("RETRY_DELAY"));
        }

        Ok(Self {
            branch: pick(&args.branch, file.branch, "public".to_string()),
            token,
            protocol,
            host: pick(&args.host, file.host, "127.0.0.1".to_string()),
            port: pick(&args.port, file.port, 32400),
            container_name: pick(&args.container_name, file.container_name, "plex".to_string()),
            force_update: pick(&args.force_update, file.force_update, false),
            interval_minutes,
            catalog_url: pick(&args.catalog_url, file.catalog_url, "https://plex.tv".to_string()),
            platform: pick(&args.platform, file.platform, "computer".to_string()),
            os: pick(&args.os, file.os, "Linux".to_string()),
            runtime: pick(&args.runtime, file.runtime, "docker".to_string()),
            http_timeout: Duration::from_secs(http_timeout),
            retry_delay: Duration::from_secs(retry_delay),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn args_with_token() -> Args {
        Args {
            token: Some("secret".to_string()),
            log_level: "info".to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_defaults() {
        let config = Config::resolve(&args_with_token(), FileConfig::default()).unwrap();

        assert_eq!(config.branch, "public");
        assert_eq!(config.protocol, "http");
        assert_eq!(config.host, "127.0.0.1");
        assert_eq!(config.port, 32400);
        assert_eq!(config.container_name, "plex");
        assert!(!config.force_update);
        assert_eq!(config.interval_minutes, 360);
        assert_eq!(config.catalog_url, "https://plex.tv");
        assert_eq!(config.platform, "computer");
        assert_eq!(config.os, "Linux");
        assert_eq!(config.runtime, "docker");
        assert_eq!(config.http_timeout, Duration::from_secs(30));
        assert_eq!(config.retry_delay, Duration::from_secs(5));
    }

    #[test]
    fn test_missing_token() {
        let args = Args::default();
        assert!(matches!(
            Config::resolve(&args, FileConfig::default()),
            Err(ConfigError::MissingCredential)
        ));

        let blank = Args {
            token: Some("  ".to_string()),
            ..Default::default()
        };
        assert!(matches!(
            Config::resolve(&blank, FileConfig::default()),
            Err(ConfigError::MissingCredential)
        ));
    }

    #[test]
    fn test_interval_minimum() {
        let args = Args {
            interval: Some(4),
            ..args_with_token()
        };
        assert!(matches!(
            Config::resolve(&args, FileConfig::default()),
            Err(ConfigError::IntervalTooSmall { minutes: 4, .. })
        ));

        let args = Args {
            interval: Some(5),
            ..args_with_token()
        };
        assert_eq!(
            Config::resolve(&args, FileConfig::default())
                .unwrap()
                .interval_minutes,
            5
        );
    }

    #[test]
    fn test_invalid_protocol_and_durations() {
        let args = Args {
            protocol: Some("ftp".to_string()),
            ..args_with_token()
        };
        assert!(matches!(
            Config::resolve(&args, FileConfig::default()),
            Err(ConfigError::InvalidProtocol(_))
        ));

        let args = Args {
            retry_delay: Some(0),
            ..args_with_token()
        };
        assert!(matches!(
            Config::resolve(&args, FileConfig::default()),
            Err(ConfigError::InvalidDuration("RETRY_DELAY"))
        ));
    }

    #[test]
    fn test_flags_override_file() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
token = "from-file"
container_name = "plexms"
interval = 60
force_update = true
os = "Windows"
"#
        )
        .unwrap();

        let args = Args {
            config: Some(file.path().to_path_buf()),
            interval: Some(120),
            ..Default::default()
        };
        let config = Config::load(&args).unwrap();

        assert_eq!(config.token, "from-file");
        assert_eq!(config.container_name, "plexms");
        assert_eq!(config.interval_minutes, 120);
        assert!(config.force_update);
        assert_eq!(config.os, "Windows");
        assert_eq!(config.port, 32400);
    }

    #[test]
    fn test_bad_config_file() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "interval = \"often\"").unwrap();

        let args = Args {
            config: Some(file.path().to_path_buf()),
            ..args_with_token()
        };
        assert!(matches!(
            Config::load(&args),
            Err(ConfigError::Parse { .. })
        ));

        let args = Args {
            config: Some(PathBuf::from("/nonexistent/plex-updater.toml")),
            ..args_with_token()
        };
        assert!(matches!(Config::load(&args), Err(ConfigError::Read { .. })));
    }

    #[test]
    fn test_cli_parsing() {
        let args = Args::try_parse_from([
            "plex-updater",
            "--token",
            "abc",
            "--force-update",
            "True",
            "--interval",
            "15",
            "--ip",
            "10.0.0.5",
        ])
        .unwrap();

        assert_eq!(args.force_update, Some(true));
        assert_eq!(args.interval, Some(15));
        assert_eq!(args.host.as_deref(), Some("10.0.0.5"));
    }
}
