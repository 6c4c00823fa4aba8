use bytes::Bytes;
use reqwest::{Client, StatusCode};
use thiserror::Error;
use tracing::{info, warn};
use url::Url;

use crate::utils::pdf::is_pdf;

#[derive(Error, Debug)]
pub enum FetchError {
    #[error("invalid URL: {0}")]
    InvalidUrl(String),

    #[error("host is not in the allow-list: {0}")]
    Forbidden(String),

    #[error("{0}")]
    Http(String),

    #[error("{0}")]
    Connection(String),

    #[error("{0}")]
    Timeout(String),

    #[error("{0}")]
    Request(String),
}

impl FetchError {
    fn from_transport(err: reqwest::Error) -> Self {
        // A connect timeout is reported as a connection failure.
        if err.is_connect() {
            FetchError::Connection(err.to_string())
        } else if err.is_timeout() {
            FetchError::Timeout(err.to_string())
        } else if err.is_status() {
            FetchError::Http(err.to_string())
        } else {
            FetchError::Request(err.to_string())
        }
    }
}

/// Parses `raw` and requires both a scheme and a network location.
pub fn validate_url(raw: &str) -> Result<Url, FetchError> {
    if raw.trim().is_empty() {
        return Err(FetchError::InvalidUrl("empty URL".to_string()));
    }

    let url = Url::parse(raw).map_err(|e| FetchError::InvalidUrl(format!("{}: {}", raw, e)))?;
    match url.host_str() {
        Some(host) if !host.is_empty() => Ok(url),
        _ => Err(FetchError::InvalidUrl(format!("{}: missing host", raw))),
    }
}

/// Hosts a fetch may target. An empty list allows every host.
#[derive(Debug, Clone, Default)]
pub struct FetchPolicy {
    allowed_hosts: Vec<String>,
}

impl FetchPolicy {
    pub fn new<I, S>(allowed_hosts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let allowed_hosts = allowed_hosts
            .into_iter()
            .map(|h| h.as_ref().trim().to_ascii_lowercase())
            .filter(|h| !h.is_empty())
            .collect();
        Self { allowed_hosts }
    }

    pub fn is_restricted(&self) -> bool {
        !self.allowed_hosts.is_empty()
    }

    /// Exact host match, or `*.example.com` matching any subdomain of
    /// `example.com`.
    pub fn allows(&self, url: &Url) -> bool {
        if self.allowed_hosts.is_empty() {
            return true;
        }
        let Some(host) = url.host_str() else {
            return false;
        };
        let host = host.to_ascii_lowercase();

        self.allowed_hosts.iter().any(|pattern| {
            if let Some(suffix) = pattern.strip_prefix("*.") {
                host.len() > suffix.len()
                    && host.ends_with(suffix)
                    && host[..host.len() - suffix.len()].ends_with('.')
            } else {
                host == *pattern
            }
        })
    }
}

/// Formats a non-success status the way the HTTP error is reported to
/// callers, e.g. `404 Client Error: Not Found for url: https://x/y.pdf`.
pub fn status_error_message(status: StatusCode, url: &Url) -> String {
    let reason = status.canonical_reason().unwrap_or("Unknown");
    let code = status.as_u16();
    if status.is_client_error() {
        format!("{} Client Error: {} for url: {}", code, reason, url)
    } else if status.is_server_error() {
        format!("{} Server Error: {} for url: {}", code, reason, url)
    } else {
        format!("{} Error: {} for url: {}", code, reason, url)
    }
}

/// Downloads documents with a single GET per call.
#[derive(Debug, Clone)]
pub struct DocumentFetcher {
    client: Client,
    policy: FetchPolicy,
}

impl DocumentFetcher {
    pub fn new(policy: FetchPolicy) -> Result<Self, FetchError> {
        let client = Client::builder()
            .build()
            .map_err(|e| FetchError::Request(format!("failed to create HTTP client: {}", e)))?;
        Ok(Self { client, policy })
    }

    /// Fetches the raw body of `url`. No retry; the transport's default
    /// timeout applies.
    pub async fn fetch(&self, url: &Url) -> Result<Bytes, FetchError> {
        if !self.policy.allows(url) {
            warn!(target: "fetch", url = %url, "Host rejected by allow-list");
            return Err(FetchError::Forbidden(
                url.host_str().unwrap_or_default().to_string(),
            ));
        }

        info!(target: "fetch", url = %url, "Starting HTTP fetch");
        let started = std::time::Instant::now();

        let response = self
            .client
            .get(url.as_str())
            .send()
            .await
            .map_err(|e| {
                warn!(target: "fetch", url = %url, "HTTP transport error: {}", e);
                FetchError::from_transport(e)
            })?;

        let status = response.status();
        if !status.is_success() {
            warn!(target: "fetch", url = %url, status = status.as_u16(), "HTTP non-success status");
            return Err(FetchError::Http(status_error_message(status, url)));
        }

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|ct| ct.to_str().ok())
            .map(|s| s.to_string());

        let body = response.bytes().await.map_err(|e| {
            warn!(target: "fetch", url = %url, "Body read failed: {}", e);
            FetchError::from_transport(e)
        })?;

        let head = &body[..body.len().min(512)];
        if !is_pdf(content_type.as_deref(), head) {
            warn!(target: "fetch", url = %url, ct = ?content_type, "Response does not look like a PDF");
        }

        info!(
            target: "fetch",
            url = %url,
            size = body.len(),
            ct = ?content_type,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "HTTP fetch completed"
        );
        Ok(body)
    }
}
