// src/ingest/proxy.rs
//! Sequential fetch through CORS-bypass relays. Each relay either yields a usable
//! body or is skipped; only exhausting the whole list is reported to the caller.

use metrics::counter;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::ingest::transport::HttpTransport;
use crate::ingest::types::ExtractError;

pub const DEFAULT_ATTEMPT_TIMEOUT: Duration = Duration::from_secs(8);

/// How a relay hands back the upstream body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseShape {
    /// Upstream body returned as-is.
    #[default]
    Raw,
    /// `{"contents": "<upstream body>"}`
    JsonEnvelope,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProxyEndpoint {
    /// The url-encoded target is appended to this prefix.
    pub prefix: String,
    #[serde(default)]
    pub shape: ResponseShape,
}

impl ProxyEndpoint {
    pub fn raw(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            shape: ResponseShape::Raw,
        }
    }

    pub fn json_envelope(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            shape: ResponseShape::JsonEnvelope,
        }
    }

    pub fn request_url(&self, target: &str) -> String {
        let encoded: String = url::form_urlencoded::byte_serialize(target.as_bytes()).collect();
        format!("{}{}", self.prefix, encoded)
    }
}

pub fn default_feed_proxies() -> Vec<ProxyEndpoint> {
    vec![
        ProxyEndpoint::raw("https://api.allorigins.win/raw?url="),
        ProxyEndpoint::raw("https://cors-anywhere.herokuapp.com/"),
        ProxyEndpoint::raw("https://api.codetabs.com/v1/proxy?quest="),
    ]
}

/// Ordered by observed reliability for article pages.
pub fn default_page_proxies() -> Vec<ProxyEndpoint> {
    vec![
        ProxyEndpoint::raw("https://api.codetabs.com/v1/proxy?quest="),
        ProxyEndpoint::json_envelope("https://api.allorigins.win/get?url="),
        ProxyEndpoint::raw("https://cors-anywhere.herokuapp.com/"),
    ]
}

#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    /// Deliberately carries no per-proxy detail; see `ProxyFetcher::last_attempts`.
    #[error("all {attempts} proxies exhausted for {url}")]
    AllProxiesExhausted { url: String, attempts: usize },
}

/// Reason a single relay attempt was skipped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttemptFailure {
    Timeout,
    Transport(String),
    Status(u16),
    Envelope(String),
    Rejected(ExtractError),
}

impl AttemptFailure {
    /// Low-cardinality label for metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            AttemptFailure::Timeout => "timeout",
            AttemptFailure::Transport(_) => "transport",
            AttemptFailure::Status(_) => "status",
            AttemptFailure::Envelope(_) => "envelope",
            AttemptFailure::Rejected(_) => "rejected",
        }
    }
}

impl fmt::Display for AttemptFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttemptFailure::Timeout => write!(f, "timed out"),
            AttemptFailure::Transport(e) => write!(f, "transport error: {e}"),
            AttemptFailure::Status(s) => write!(f, "HTTP {s}"),
            AttemptFailure::Envelope(e) => write!(f, "bad JSON envelope: {e}"),
            AttemptFailure::Rejected(e) => write!(f, "unusable body: {e}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttemptRecord {
    pub proxy: String,
    pub failure: AttemptFailure,
}

#[derive(Deserialize)]
struct Envelope {
    contents: Option<String>,
}

pub struct ProxyFetcher {
    transport: Arc<dyn HttpTransport>,
    proxies: Vec<ProxyEndpoint>,
    attempt_timeout: Duration,
    // Failure log of the most recent fetch, for diagnostics only.
    attempts: Mutex<Vec<AttemptRecord>>,
}

impl ProxyFetcher {
    pub fn new(transport: Arc<dyn HttpTransport>, proxies: Vec<ProxyEndpoint>) -> Self {
        Self {
            transport,
            proxies,
            attempt_timeout: DEFAULT_ATTEMPT_TIMEOUT,
            attempts: Mutex::new(Vec::new()),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.attempt_timeout = timeout;
        self
    }

    pub fn proxies(&self) -> &[ProxyEndpoint] {
        &self.proxies
    }

    /// Raw upstream body from the first relay that answers successfully.
    pub async fn fetch(&self, target: &str) -> Result<String, FetchError> {
        self.fetch_with(target, |body| Ok(body.to_string())).await
    }

    /// Like `fetch`, but `accept` runs on each body; a rejected body counts as a
    /// failed attempt and the next relay is tried.
    pub async fn fetch_with<T, F>(&self, target: &str, accept: F) -> Result<T, FetchError>
    where
        F: Fn(&str) -> Result<T, ExtractError>,
    {
        let mut failures = Vec::new();

        for (i, proxy) in self.proxies.iter().enumerate() {
            counter!("proxy_attempts_total").increment(1);
            tracing::debug!(
                target: "ingest",
                attempt = i + 1,
                of = self.proxies.len(),
                proxy = %proxy.prefix,
                "trying proxy"
            );

            match self.attempt(proxy, target, &accept).await {
                Ok(v) => {
                    self.record(failures);
                    return Ok(v);
                }
                Err(failure) => {
                    tracing::warn!(
                        target: "ingest",
                        attempt = i + 1,
                        proxy = %proxy.prefix,
                        reason = %failure,
                        "proxy attempt failed"
                    );
                    counter!("proxy_failures_total", "reason" => failure.kind()).increment(1);
                    failures.push(AttemptRecord {
                        proxy: proxy.prefix.clone(),
                        failure,
                    });
                }
            }
        }

        let attempts = failures.len();
        self.record(failures);
        Err(FetchError::AllProxiesExhausted {
            url: target.to_string(),
            attempts,
        })
    }

    async fn attempt<T, F>(
        &self,
        proxy: &ProxyEndpoint,
        target: &str,
        accept: &F,
    ) -> Result<T, AttemptFailure>
    where
        F: Fn(&str) -> Result<T, ExtractError>,
    {
        let url = proxy.request_url(target);
        let reply = tokio::time::timeout(self.attempt_timeout, self.transport.get(&url))
            .await
            .map_err(|_| AttemptFailure::Timeout)?
            .map_err(|e| AttemptFailure::Transport(e.0))?;

        if !reply.is_success() {
            return Err(AttemptFailure::Status(reply.status));
        }

        let body = match proxy.shape {
            ResponseShape::Raw => reply.body,
            ResponseShape::JsonEnvelope => {
                let env: Envelope = serde_json::from_str(&reply.body)
                    .map_err(|e| AttemptFailure::Envelope(e.to_string()))?;
                env.contents
                    .ok_or_else(|| AttemptFailure::Envelope("missing `contents`".into()))?
            }
        };

        accept(&body).map_err(AttemptFailure::Rejected)
    }

    fn record(&self, failures: Vec<AttemptRecord>) {
        if let Ok(mut g) = self.attempts.lock() {
            *g = failures;
        }
    }

    /// Failed attempts of the most recent fetch (empty after a first-try success).
    pub fn last_attempts(&self) -> Vec<AttemptRecord> {
        self.attempts.lock().map(|g| g.clone()).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_url_encodes_target() {
        let p = ProxyEndpoint::raw("https://relay.test/raw?url=");
        assert_eq!(
            p.request_url("https://news.test/feed?a=1&b=2"),
            "https://relay.test/raw?url=https%3A%2F%2Fnews.test%2Ffeed%3Fa%3D1%26b%3D2"
        );
    }

    #[test]
    fn default_lists_match_known_relays() {
        let feed = default_feed_proxies();
        assert_eq!(feed.len(), 3);
        assert!(feed.iter().all(|p| p.shape == ResponseShape::Raw));

        let page = default_page_proxies();
        assert_eq!(page.len(), 3);
        assert_eq!(page[1].shape, ResponseShape::JsonEnvelope);
    }

    #[test]
    fn shape_defaults_to_raw_when_deserializing() {
        let p: ProxyEndpoint = serde_json::from_str(r#"{"prefix":"https://r.test/"}"#).unwrap();
        assert_eq!(p.shape, ResponseShape::Raw);
    }
}
