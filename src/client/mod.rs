use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::header::{self, HeaderMap, HeaderValue};
use reqwest::{Client, ClientBuilder, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::debug;

use crate::config::GeneratorConfig;
use crate::models::alias::{
    Envelope, GenerateBody, GenerateResult, HmeEmail, ListResult, ReserveBody,
};

#[cfg(test)]
pub(crate) mod stub;

/// Query parameters the vendor expects on every call.
const CLIENT_PARAMS: [(&str, &str); 4] = [
    ("clientBuildNumber", "2413Project28"),
    ("clientMasteringNumber", "2413B20"),
    ("clientId", ""),
    ("dsid", ""),
];

const LANG_CODE: &str = "en-us";
const RESERVE_NOTE: &str = "Generated by hme-generator";
const USER_AGENT: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/123.0.0.0 Safari/537.36";
const ORIGIN: &str = "https://www.icloud.com";
/// Longest slice of a non-JSON error body carried into the failure reason.
const BODY_EXCERPT_CHARS: usize = 200;

/// The single failure shape every vendor call collapses into.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ServiceError {
    #[error("request timed out")]
    Timeout,
    #[error("transport error: {0}")]
    Transport(String),
    #[error("{0}")]
    Rejected(String),
    #[error("malformed response: {0}")]
    Malformed(String),
}

impl ServiceError {
    pub fn reason(&self) -> String {
        self.to_string()
    }

    fn from_transport(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout
        } else {
            Self::Transport(err.to_string())
        }
    }
}

/// Remote operations against the alias vendor.
#[async_trait]
pub trait AliasService: Send + Sync {
    /// Mints a candidate alias without activating it.
    async fn generate(&self) -> Result<String, ServiceError>;

    /// Activates a previously generated alias.
    async fn reserve(&self, address: &str) -> Result<(), ServiceError>;

    async fn list(&self) -> Result<Vec<HmeEmail>, ServiceError>;
}

#[derive(Clone)]
pub struct HmeClient {
    inner: Client,
    base_url_v1: String,
    base_url_v2: String,
    label: String,
    timeout: Duration,
}

impl HmeClient {
    pub fn new(config: &GeneratorConfig, cookie: Option<&str>) -> Result<Self> {
        let timeout = config.request_timeout();
        assert!(
            !config.base_url_v1.is_empty() && !config.base_url_v2.is_empty(),
            "Vendor base URLs must be provided"
        );
        assert!(
            timeout >= Duration::from_millis(100),
            "Timeout below 100ms is unsafe"
        );

        let headers = default_headers(cookie.unwrap_or_default())?;
        let client = ClientBuilder::new()
            .timeout(timeout)
            .default_headers(headers)
            .build()
            .context("Failed to build vendor HTTP client")?;

        Ok(Self {
            inner: client,
            base_url_v1: config.base_url_v1.trim_end_matches('/').to_string(),
            base_url_v2: config.base_url_v2.trim_end_matches('/').to_string(),
            label: config.label.clone(),
            timeout,
        })
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    async fn call<T: DeserializeOwned>(
        &self,
        request: RequestBuilder,
        operation: &'static str,
    ) -> Result<Option<T>, ServiceError> {
        let response = request
            .query(&CLIENT_PARAMS)
            .send()
            .await
            .map_err(ServiceError::from_transport)?;
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(ServiceError::from_transport)?;
        debug!("{operation} answered with HTTP {status}");
        classify_response(status, &body, operation)
    }
}

/// Maps a vendor answer onto its payload or a [`ServiceError`].
///
/// A JSON envelope always wins, whatever the status. Non-JSON bodies on an
/// error status keep the status line and a body excerpt so that a plain-text
/// "Too many requests" still reads as a rate limit.
fn classify_response<T: DeserializeOwned>(
    status: StatusCode,
    body: &str,
    operation: &str,
) -> Result<Option<T>, ServiceError> {
    match serde_json::from_str::<Envelope<T>>(body) {
        Ok(envelope) => envelope.into_outcome().map_err(ServiceError::Rejected),
        Err(_) if !status.is_success() => {
            let excerpt: String = body.trim().chars().take(BODY_EXCERPT_CHARS).collect();
            let reason = if excerpt.is_empty() {
                format!("{operation} returned HTTP {status}")
            } else {
                format!("{operation} returned HTTP {status}: {excerpt}")
            };
            Err(ServiceError::Rejected(reason))
        }
        Err(err) => Err(ServiceError::Malformed(format!("{operation}: {err}"))),
    }
}

#[async_trait]
impl AliasService for HmeClient {
    async fn generate(&self) -> Result<String, ServiceError> {
        let request = self
            .inner
            .post(format!("{}/generate", self.base_url_v1))
            .json(&GenerateBody {
                lang_code: LANG_CODE,
            });
        let result: Option<GenerateResult> = self.call(request, "generate").await?;
        result
            .map(|result| result.hme)
            .filter(|address| !address.is_empty())
            .ok_or_else(|| ServiceError::Malformed("generate: missing alias address".to_string()))
    }

    async fn reserve(&self, address: &str) -> Result<(), ServiceError> {
        assert!(!address.is_empty(), "Cannot reserve an empty alias");
        let request = self
            .inner
            .post(format!("{}/reserve", self.base_url_v1))
            .json(&ReserveBody {
                hme: address,
                label: &self.label,
                note: RESERVE_NOTE,
            });
        let _: Option<Value> = self.call(request, "reserve").await?;
        Ok(())
    }

    async fn list(&self) -> Result<Vec<HmeEmail>, ServiceError> {
        let request = self.inner.get(format!("{}/list", self.base_url_v2));
        let result: Option<ListResult> = self.call(request, "list").await?;
        Ok(result.map(|result| result.hme_emails).unwrap_or_default())
    }
}

fn default_headers(cookie: &str) -> Result<HeaderMap> {
    let mut headers = HeaderMap::new();
    headers.insert(header::CONNECTION, HeaderValue::from_static("keep-alive"));
    headers.insert(header::PRAGMA, HeaderValue::from_static("no-cache"));
    headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-cache"));
    headers.insert(header::USER_AGENT, HeaderValue::from_static(USER_AGENT));
    headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("text/plain"));
    headers.insert(header::ACCEPT, HeaderValue::from_static("*/*"));
    headers.insert(header::ORIGIN, HeaderValue::from_static(ORIGIN));
    headers.insert(header::REFERER, HeaderValue::from_static("https://www.icloud.com/"));
    headers.insert(
        header::ACCEPT_LANGUAGE,
        HeaderValue::from_static("en-US,en-GB;q=0.9,en;q=0.8"),
    );
    let cookie = cookie.trim();
    if !cookie.is_empty() {
        let value = HeaderValue::from_str(cookie).context("Cookie contains invalid characters")?;
        headers.insert(header::COOKIE, value);
    }
    Ok(headers)
}
