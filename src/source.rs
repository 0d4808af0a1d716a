use crate::error::SourceError;

use anyhow::Context;
use async_trait::async_trait;
use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

// =============================================================================
// Version Sources
// =============================================================================

const USER_AGENT: &str = concat!("plex-updater/", env!("CARGO_PKG_VERSION"));

/// Something that can report a raw Plex version string.
#[async_trait]
pub trait VersionSource: Send + Sync {
    /// Provider name used in log lines.
    fn name(&self) -> &'static str;

    async fn fetch(&self) -> Result<String, SourceError>;
}

#[async_trait]
impl<T: VersionSource + ?Sized> VersionSource for Arc<T> {
    fn name(&self) -> &'static str {
        (**self).name()
    }

    async fn fetch(&self) -> Result<String, SourceError> {
        (**self).fetch().await
    }
}

pub fn build_http_client(timeout: Duration) -> anyhow::Result<reqwest::Client> {
    reqwest::Client::builder()
        .user_agent(USER_AGENT)
        .timeout(timeout)
        .connect_timeout(timeout)
        .build()
        .context("Failed to build HTTP client")
}

/// Latest published release from the plex.tv downloads catalog.
pub struct CatalogSource {
    client: reqwest::Client,
    base_url: String,
    channel: String,
    token: String,
    platform: String,
    os: String,
}

impl CatalogSource {
    pub fn new(
        client: reqwest::Client,
        base_url: &str,
        channel: &str,
        token: &str,
        platform: &str,
        os: &str,
    ) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            channel: channel.to_string(),
            token: token.to_string(),
            platform: platform.to_string(),
            os: os.to_string(),
        }
    }

    fn extract_version(&self, body: &Value) -> Result<String, SourceError> {
        body.get(&self.platform)
            .and_then(|p| p.get(&self.os))
            .and_then(|o| o.get("version"))
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| {
                SourceError::MalformedResponse(format!(
                    "catalog has no {}.{}.version field",
                    self.platform, self.os
                ))
            })
    }
}

#[async_trait]
impl VersionSource for CatalogSource {
    fn name(&self) -> &'static str {
        "latest"
    }

    async fn fetch(&self) -> Result<String, SourceError> {
        let url = format!("{}/api/downloads/5.json", self.base_url);
        debug!("Querying release catalog (channel: {})", self.channel);

        let response = self
            .client
            .get(&url)
            .query(&[
                ("channel", self.channel.as_str()),
                ("X-Plex-Token", self.token.as_str()),
            ])
            .header(reqwest::header::ACCEPT, "application/json")
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(SourceError::from_status(status));
        }

        let body: Value = response.json().await?;
        self.extract_version(&body)
    }
}

/// Version reported by the running Plex server's root endpoint.
pub struct InstanceSource {
    client: reqwest::Client,
    url: String,
    token: String,
}

impl InstanceSource {
    pub fn new(client: reqwest::Client, protocol: &str, host: &str, port: u16, token: &str) -> Self {
        Self {
            client,
            url: format!("{protocol}://{host}:{port}/"),
            token: token.to_string(),
        }
    }
}

#[async_trait]
impl VersionSource for InstanceSource {
    fn name(&self) -> &'static str {
        "current"
    }

    async fn fetch(&self) -> Result<String, SourceError> {
        debug!("Querying Plex server at {}", self.url);

        let response = self
            .client
            .get(&self.url)
            .query(&[("X-Plex-Token", self.token.as_str())])
            .header(reqwest::header::ACCEPT, "application/xml")
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(SourceError::from_status(status));
        }

        let body = response.text().await?;
        root_version_attribute(&body)
    }
}

fn version_attribute(root: &BytesStart<'_>) -> Result<String, SourceError> {
    let attr = root
        .try_get_attribute("version")
        .map_err(|e| SourceError::MalformedResponse(format!("bad attribute: {e}")))?
        .ok_or_else(|| {
            SourceError::MalformedResponse("root element has no version attribute".to_string())
        })?;
    let value = attr
        .unescape_value()
        .map_err(|e| SourceError::MalformedResponse(format!("bad attribute: {e}")))?;
    Ok(value.into_owned())
}

/// Read the `version` attribute of the document's root element. The whole
/// document must parse, with exactly one root element that is closed.
fn root_version_attribute(xml: &str) -> Result<String, SourceError> {
    let mut reader = Reader::from_str(xml);
    let mut version: Option<String> = None;
    let mut depth: usize = 0;

    loop {
        let event = reader.read_event().map_err(|e| {
            SourceError::MalformedResponse(format!(
                "XML parse error at byte {}: {e}",
                reader.buffer_position()
            ))
        })?;

        match &event {
            Event::Start(element) | Event::Empty(element) if depth == 0 => {
                if version.is_some() {
                    return Err(SourceError::MalformedResponse(
                        "response has more than one root element".to_string(),
                    ));
                }
                version = Some(version_attribute(element)?);
                if matches!(event, Event::Start(_)) {
                    depth += 1;
                }
            }
            Event::Start(_) => depth += 1,
            Event::End(_) => depth = depth.saturating_sub(1),
            Event::Eof => break,
            _ => {}
        }
    }

    if depth > 0 {
        return Err(SourceError::MalformedResponse(
            "response ends inside an unclosed element".to_string(),
        ));
    }

    version.ok_or_else(|| {
        SourceError::MalformedResponse("response contains no XML element".to_string())
    })
}

/// Fetch from `source`, retrying transport failures after `delay` until it
/// answers or `shutdown` is cancelled. Auth and payload errors are returned
/// on the first occurrence.
pub async fn fetch_with_retry(
    source: &dyn VersionSource,
    delay: Duration,
    shutdown: &CancellationToken,
) -> Result<String, SourceError> {
    let mut attempt: u32 = 1;

    loop {
        match source.fetch().await {
            Ok(raw) => return Ok(raw),
            Err(e) if e.is_transient() => {
                warn!(
                    "Failed to get {} version (attempt {}): {}, retrying in {}s",
                    source.name(),
                    attempt,
                    e,
                    delay.as_secs()
                );
            }
            Err(e) => return Err(e),
        }

        tokio::select! {
            biased;
            () = shutdown.cancelled() => return Err(SourceError::Cancelled),
            () = sleep(delay) => {}
        }
        attempt = attempt.saturating_add(1);
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Replays scripted responses; repeats the last one once the script runs out.
    pub struct ScriptedSource {
        name: &'static str,
        script: Mutex<VecDeque<Result<String, SourceError>>>,
        last: Mutex<Option<String>>,
        calls: AtomicUsize,
    }

    impl ScriptedSource {
        pub fn new(name: &'static str, script: Vec<Result<String, SourceError>>) -> Self {
            Self {
                name,
                script: Mutex::new(script.into()),
                last: Mutex::new(None),
                calls: AtomicUsize::new(0),
            }
        }

        pub fn fixed(name: &'static str, version: &str) -> Self {
            Self::new(name, vec![Ok(version.to_string())])
        }

        pub fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl VersionSource for ScriptedSource {
        fn name(&self) -> &'static str {
            self.name
        }

        async fn fetch(&self) -> Result<String, SourceError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let next = self.script.lock().unwrap().pop_front();
            match next {
                Some(Ok(v)) => {
                    *self.last.lock().unwrap() = Some(v.clone());
                    Ok(v)
                }
                Some(Err(e)) => Err(e),
                None => self
                    .last
                    .lock()
                    .unwrap()
                    .clone()
                    .ok_or_else(|| SourceError::MalformedResponse("script exhausted".to_string())),
            }
        }
    }
}
