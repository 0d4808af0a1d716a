use std::path::PathBuf;
use thiserror::Error;

// =============================================================================
// Error Types
// =============================================================================

/// Failure to obtain a raw version string from a provider.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("network error: {0}")]
    Network(String),

    #[error("request timed out: {0}")]
    Timeout(String),

    #[error("request rejected (HTTP {status}), check the access token")]
    AuthRejected { status: u16 },

    #[error("malformed response: {0}")]
    MalformedResponse(String),

    #[error("shutdown requested while waiting to retry")]
    Cancelled,
}

impl SourceError {
    /// Transport-level failures are retried; everything else surfaces immediately.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Network(_) | Self::Timeout(_))
    }

    pub fn from_status(status: reqwest::StatusCode) -> Self {
        match status.as_u16() {
            401 | 403 => Self::AuthRejected {
                status: status.as_u16(),
            },
            code if status.is_server_error() => Self::Network(format!("server returned HTTP {code}")),
            code => Self::MalformedResponse(format!("unexpected HTTP {code}")),
        }
    }
}

impl From<reqwest::Error> for SourceError {
    fn from(e: reqwest::Error) -> Self {
        // The request URL carries the access token in its query string.
        let e = e.without_url();
        if e.is_timeout() {
            Self::Timeout(e.to_string())
        } else if e.is_decode() {
            Self::MalformedResponse(e.to_string())
        } else if let Some(status) = e.status() {
            Self::from_status(status)
        } else {
            Self::Network(e.to_string())
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("invalid version string: {raw:?}")]
pub struct VersionFormatError {
    pub raw: String,
}

/// Why a single update check could not reach a decision.
#[derive(Debug, Error)]
pub enum CheckFailure {
    #[error("failed to get {provider} version: {source}")]
    Source {
        provider: &'static str,
        #[source]
        source: SourceError,
    },

    #[error(transparent)]
    InvalidVersion(#[from] VersionFormatError),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("PLEX_TOKEN is not set")]
    MissingCredential,

    #[error(
        "interval must be at least {min} minutes (got {minutes}), recommended is 360 minutes (6 hours)"
    )]
    IntervalTooSmall { minutes: u32, min: u32 },

    #[error("unsupported protocol {0:?}, expected http or https")]
    InvalidProtocol(String),

    #[error("{0} must be greater than zero")]
    InvalidDuration(&'static str),

    #[error("failed to read config file {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}
