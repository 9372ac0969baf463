//! Transport-independent request/response values and the HTTP transport seam.

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;

use crate::error::SessionError;

pub const AUTHORIZATION: &str = "authorization";

/// An outgoing request as a plain value.
///
/// Header names are stored lowercased. Modifying operations return a new
/// value and leave the receiver untouched.
#[derive(Debug, Clone, PartialEq)]
pub struct HttpRequest {
    pub method: String,
    pub url: String,
    pub headers: BTreeMap<String, String>,
    pub body: Option<serde_json::Value>,
}

impl HttpRequest {
    pub fn new(method: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            url: url.into(),
            headers: BTreeMap::new(),
            body: None,
        }
    }

    pub fn get(url: impl Into<String>) -> Self {
        Self::new("GET", url)
    }

    pub fn post(url: impl Into<String>) -> Self {
        Self::new("POST", url)
    }

    /// Copy of this request with `name` set to `value`.
    pub fn with_header(&self, name: &str, value: impl Into<String>) -> Self {
        let mut next = self.clone();
        next.headers.insert(name.to_ascii_lowercase(), value.into());
        next
    }

    /// Copy of this request carrying a JSON body.
    pub fn with_json(&self, body: serde_json::Value) -> Self {
        let mut next = self.clone();
        next.body = Some(body);
        next
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }
}

/// A received response; any status is a response, not an error.
#[derive(Debug, Clone, PartialEq)]
pub struct HttpResponse {
    pub status: u16,
    pub headers: BTreeMap<String, String>,
    pub body: String,
}

impl HttpResponse {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            headers: BTreeMap::new(),
            body: body.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn json<T: DeserializeOwned>(&self) -> Result<T, SessionError> {
        Ok(serde_json::from_str(&self.body)?)
    }
}

/// Turn a non-2xx response into [`SessionError::Api`].
pub fn error_for_status(response: HttpResponse) -> Result<HttpResponse, SessionError> {
    if response.is_success() {
        Ok(response)
    } else {
        Err(SessionError::api(response.status, &response.body))
    }
}

/// Sends requests. Fails only when no response was received.
#[async_trait]
pub trait HttpTransport: Send + Sync {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, SessionError>;
}

/// [`HttpTransport`] over a shared `reqwest::Client`.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new(timeout: Duration) -> Result<Self, SessionError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .pool_max_idle_per_host(10)
            .build()?;
        Ok(Self { client })
    }

    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, SessionError> {
        let method = reqwest::Method::from_bytes(request.method.to_ascii_uppercase().as_bytes())
            .map_err(|_| {
                SessionError::InvalidRequest(format!("invalid method: {}", request.method))
            })?;

        let mut builder = self.client.request(method, &request.url);
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let resp = builder.send().await?;
        let status = resp.status().as_u16();
        let headers = resp
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_string(), v.to_string()))
            })
            .collect();
        let body = resp.text().await?;

        tracing::debug!(method = %request.method, url = %request.url, status, "HTTP response");
        Ok(HttpResponse {
            status,
            headers,
            body,
        })
    }
}
