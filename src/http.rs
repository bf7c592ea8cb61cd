// HTTP plumbing: a tiny request/response model, the `HttpTransport` seam
// the rest of the crate talks through, and the blocking reqwest
// implementation used by the CLI.

use std::collections::HashMap;
use std::fmt;
use std::io::Read;
use std::time::Duration;

use reqwest::blocking::Client;
use serde_json::Value;
use tracing::debug;

use crate::config::ClientConfig;
use crate::error::{Result, SharepointError};

/// HTTP methods the SharePoint REST surface needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    Get,
    Post,
    Delete,
}

/// A fully described request. Built by the API client and the
/// authenticators, executed by an `HttpTransport`.
#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub method: HttpMethod,
    pub url: String,
    pub headers: HashMap<String, String>,
    pub body: Option<Vec<u8>>,
}

impl HttpRequest {
    pub fn new(method: HttpMethod, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            headers: HashMap::new(),
            body: None,
        }
    }

    pub fn get(url: impl Into<String>) -> Self {
        Self::new(HttpMethod::Get, url)
    }

    pub fn post(url: impl Into<String>) -> Self {
        Self::new(HttpMethod::Post, url)
    }

    pub fn delete(url: impl Into<String>) -> Self {
        Self::new(HttpMethod::Delete, url)
    }

    pub fn header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(key.into(), value.into());
        self
    }

    pub fn bearer_token(self, token: &str) -> Self {
        self.header("Authorization", format!("Bearer {}", token))
    }

    pub fn accept_json(self) -> Self {
        self.header("Accept", "application/json")
    }

    pub fn body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = Some(body.into());
        self
    }
}

/// A buffered response. Header names are stored lower-cased.
#[derive(Debug, Clone, Default)]
pub struct HttpResponse {
    pub status: u16,
    pub headers: HashMap<String, String>,
    pub body: Vec<u8>,
}

impl HttpResponse {
    pub fn new(status: u16, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            headers: HashMap::new(),
            body: body.into(),
        }
    }

    pub fn with_header(mut self, key: &str, value: impl Into<String>) -> Self {
        self.headers.insert(key.to_ascii_lowercase(), value.into());
        self
    }

    /// Case-insensitive header lookup.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// A response whose body is read lazily, used for downloads.
pub struct StreamingResponse {
    pub status: u16,
    pub reader: Box<dyn Read + Send>,
}

impl fmt::Debug for StreamingResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamingResponse")
            .field("status", &self.status)
            .finish_non_exhaustive()
    }
}

/// The single primitive the client core depends on.
///
/// Implementations must keep cookies across calls made on the same
/// instance and must not share them with other instances.
pub trait HttpTransport {
    /// Execute a request and buffer the whole response body.
    fn send(&self, request: HttpRequest) -> Result<HttpResponse>;

    /// Execute a request and hand back the body as a stream.
    fn open(&self, request: HttpRequest) -> Result<StreamingResponse>;
}

/// Blocking reqwest transport with its own cookie store.
pub struct ReqwestTransport {
    client: Client,
}

impl ReqwestTransport {
    pub fn new(config: &ClientConfig) -> Result<Self> {
        let client = Client::builder()
            .cookie_store(true)
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent(config.user_agent.as_str())
            .build()?;
        Ok(Self { client })
    }

    fn build(&self, request: HttpRequest) -> reqwest::blocking::RequestBuilder {
        let method = match request.method {
            HttpMethod::Get => reqwest::Method::GET,
            HttpMethod::Post => reqwest::Method::POST,
            HttpMethod::Delete => reqwest::Method::DELETE,
        };
        let mut builder = self.client.request(method, &request.url);
        for (key, value) in request.headers {
            builder = builder.header(key, value);
        }
        if let Some(body) = request.body {
            builder = builder.body(body);
        }
        builder
    }
}

impl HttpTransport for ReqwestTransport {
    fn send(&self, request: HttpRequest) -> Result<HttpResponse> {
        debug!(method = ?request.method, url = %request.url, "Sending request");
        let response = self.build(request).send()?;
        let status = response.status().as_u16();
        let headers = collect_headers(response.headers());
        let body = response.bytes()?.to_vec();
        debug!(status, bytes = body.len(), "Received response");
        Ok(HttpResponse {
            status,
            headers,
            body,
        })
    }

    fn open(&self, request: HttpRequest) -> Result<StreamingResponse> {
        debug!(method = ?request.method, url = %request.url, "Opening stream");
        let response = self.build(request).send()?;
        Ok(StreamingResponse {
            status: response.status().as_u16(),
            reader: Box::new(response),
        })
    }
}

fn collect_headers(headers: &reqwest::header::HeaderMap) -> HashMap<String, String> {
    headers
        .iter()
        .filter_map(|(name, value)| {
            value
                .to_str()
                .ok()
                .map(|v| (name.as_str().to_ascii_lowercase(), v.to_string()))
        })
        .collect()
}

/// Inspect a REST response body for a service-side error.
///
/// Blank bodies are fine. A JSON body carrying `odata.error` becomes a
/// `Remote` error with the service message; anything that is not a JSON
/// object becomes `UnknownService` with the raw body.
pub fn check_for_error(body: &[u8]) -> Result<()> {
    let text = String::from_utf8_lossy(body);
    if text.trim().is_empty() {
        return Ok(());
    }

    let json: Value = serde_json::from_str(&text)
        .map_err(|_| SharepointError::UnknownService(text.to_string()))?;

    if !json.is_object() {
        return Err(SharepointError::UnknownService(text.into_owned()));
    }

    match json.get("odata.error") {
        None => Ok(()),
        Some(error) => match error.pointer("/message/value").and_then(Value::as_str) {
            Some(message) => Err(SharepointError::Remote(message.to_string())),
            None => Err(SharepointError::UnknownService(text.into_owned())),
        },
    }
}
