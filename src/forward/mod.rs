//! Backend request forwarding.
//!
//! The gateway holds no business data; every domain operation is forwarded
//! to the backend REST service over HTTP with the caller's bearer token
//! attached. Backend responses pass through verbatim, status code included.
//! A backend 403 is data to relay, not a gateway error. Only transport-level
//! failures become [`ForwardError`]s, which the HTTP layer maps to
//! gateway-minted 502/504 responses.
//!
//! There is no automatic retry. Several proxied operations (status updates,
//! advisor assignment) are not idempotent, and a timeout does not prove the
//! backend never processed the request.

use crate::handler::{HandlerResponse, HeaderVec, ResponseBody};
use anyhow::Context;
use http::Method;
use serde_json::Value;
use std::fmt;
use std::time::{Duration, Instant};
use tracing::{debug, error, warn};

/// Transport-level forwarding failure.
#[derive(Debug)]
pub enum ForwardError {
    /// The backend did not answer within the configured deadline.
    Timeout { url: String },
    /// Connection to the backend could not be established, or broke.
    Unreachable {
        url: String,
        source: reqwest::Error,
    },
    /// The backend answered with something the gateway could not read.
    InvalidResponse { url: String, reason: String },
}

impl ForwardError {
    /// Gateway-minted status for this failure class.
    pub fn status(&self) -> u16 {
        match self {
            ForwardError::Timeout { .. } => 504,
            ForwardError::Unreachable { .. } | ForwardError::InvalidResponse { .. } => 502,
        }
    }

    /// Client-facing message. Structured and small; no internal addresses.
    pub fn public_message(&self) -> &'static str {
        match self {
            ForwardError::Timeout { .. } => "Backend request timed out",
            ForwardError::Unreachable { .. } => "Backend service unavailable",
            ForwardError::InvalidResponse { .. } => "Backend returned an unreadable response",
        }
    }

    pub fn log(&self) {
        match self {
            ForwardError::Timeout { url } => {
                error!(url = %url, "backend request timed out");
            }
            ForwardError::Unreachable { url, source } => {
                error!(url = %url, error = %source, "backend unreachable");
            }
            ForwardError::InvalidResponse { url, reason } => {
                warn!(url = %url, reason = %reason, "unreadable backend response");
            }
        }
    }
}

impl fmt::Display for ForwardError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ForwardError::Timeout { url } => write!(f, "request to {url} timed out"),
            ForwardError::Unreachable { url, source } => {
                write!(f, "{url} unreachable: {source}")
            }
            ForwardError::InvalidResponse { url, reason } => {
                write!(f, "unreadable response from {url}: {reason}")
            }
        }
    }
}

impl std::error::Error for ForwardError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ForwardError::Unreachable { source, .. } => Some(source),
            _ => None,
        }
    }
}

/// Payload of a backend reply, classified by content type.
#[derive(Debug, Clone, PartialEq)]
pub enum ReplyPayload {
    /// JSON body, parsed. The common case for the REST backend.
    Json(Value),
    /// Anything else (invoice PDFs, mostly). Bytes pass through untouched
    /// along with the headers a download needs.
    Binary {
        content_type: String,
        content_disposition: Option<String>,
        bytes: Vec<u8>,
    },
    /// Empty body (204s and the occasional bare status).
    Empty,
}

/// A backend reply: verbatim status plus classified payload.
#[derive(Debug, Clone, PartialEq)]
pub struct BackendReply {
    pub status: u16,
    pub payload: ReplyPayload,
}

impl BackendReply {
    fn from_parts(
        status: u16,
        content_type: String,
        content_disposition: Option<String>,
        bytes: Vec<u8>,
    ) -> Self {
        let payload = if bytes.is_empty() {
            ReplyPayload::Empty
        } else if is_json(&content_type) {
            match serde_json::from_slice::<Value>(&bytes) {
                Ok(value) => ReplyPayload::Json(value),
                // Advertised JSON that does not parse still passes through
                // byte for byte.
                Err(_) => ReplyPayload::Binary {
                    content_type,
                    content_disposition,
                    bytes,
                },
            }
        } else {
            ReplyPayload::Binary {
                content_type: if content_type.is_empty() {
                    "application/octet-stream".to_string()
                } else {
                    content_type
                },
                content_disposition,
                bytes,
            }
        };
        Self { status, payload }
    }

    /// The JSON payload, if this reply carried one.
    pub fn json(&self) -> Option<&Value> {
        match &self.payload {
            ReplyPayload::Json(value) => Some(value),
            _ => None,
        }
    }

    /// Convert into the response the gateway sends to its own client,
    /// preserving status and download headers.
    pub fn into_response(self) -> HandlerResponse {
        match self.payload {
            ReplyPayload::Json(value) => HandlerResponse::json(self.status, value),
            ReplyPayload::Empty => {
                HandlerResponse::new(self.status, HeaderVec::new(), ResponseBody::Empty)
            }
            ReplyPayload::Binary {
                content_type,
                content_disposition,
                bytes,
            } => {
                let mut response =
                    HandlerResponse::new(self.status, HeaderVec::new(), ResponseBody::Bytes(bytes));
                response.set_header("Content-Type", content_type);
                if let Some(disposition) = content_disposition {
                    response.set_header("Content-Disposition", disposition);
                }
                response
            }
        }
    }
}

fn is_json(content_type: &str) -> bool {
    let ct = content_type.trim();
    ct.starts_with("application/json") || ct.split(';').next().is_some_and(|t| t.ends_with("+json"))
}

/// Blocking HTTP client for the upstream backend.
pub struct BackendClient {
    base_url: String,
    client: reqwest::blocking::Client,
}

impl fmt::Debug for BackendClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BackendClient")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

impl BackendClient {
    pub fn new(
        base_url: &str,
        connect_timeout: Duration,
        read_timeout: Duration,
    ) -> anyhow::Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .connect_timeout(connect_timeout)
            .timeout(read_timeout)
            .build()
            .context("failed to build backend HTTP client")?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Forward an authenticated request. The credential goes upstream as
    /// `Authorization: Bearer <token>` regardless of how it arrived at the
    /// gateway.
    pub fn forward(
        &self,
        credential: &str,
        method: Method,
        path: &str,
        body: Option<&Value>,
    ) -> Result<BackendReply, ForwardError> {
        self.send(Some(credential), method, path, body)
    }

    /// Forward without a credential. Used for the login proxy, where the
    /// point of the call is to obtain a token.
    pub fn forward_anonymous(
        &self,
        method: Method,
        path: &str,
        body: Option<&Value>,
    ) -> Result<BackendReply, ForwardError> {
        self.send(None, method, path, body)
    }

    fn send(
        &self,
        credential: Option<&str>,
        method: Method,
        path: &str,
        body: Option<&Value>,
    ) -> Result<BackendReply, ForwardError> {
        let url = format!("{}{}", self.base_url, path);
        let method_name = method.as_str().to_string();
        let req_method = reqwest::Method::from_bytes(method.as_str().as_bytes()).map_err(|e| {
            ForwardError::InvalidResponse {
                url: url.clone(),
                reason: format!("unsupported method: {e}"),
            }
        })?;

        let mut builder = self.client.request(req_method, &url);
        if let Some(token) = credential {
            builder = builder.bearer_auth(token);
        }
        if let Some(json) = body {
            builder = builder.json(json);
        }

        let started = Instant::now();
        let response = builder.send().map_err(|e| classify(e, &url))?;
        let status = response.status().as_u16();
        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_string();
        let content_disposition = response
            .headers()
            .get(reqwest::header::CONTENT_DISPOSITION)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let bytes = response
            .bytes()
            .map_err(|e| classify(e, &url))?
            .to_vec();

        debug!(
            method = %method_name,
            url = %url,
            status = status,
            bytes = bytes.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "backend reply"
        );
        Ok(BackendReply::from_parts(
            status,
            content_type,
            content_disposition,
            bytes,
        ))
    }
}

fn classify(err: reqwest::Error, url: &str) -> ForwardError {
    if err.is_timeout() {
        ForwardError::Timeout {
            url: url.to_string(),
        }
    } else if err.is_decode() || err.is_body() {
        ForwardError::InvalidResponse {
            url: url.to_string(),
            reason: err.to_string(),
        }
    } else {
        ForwardError::Unreachable {
            url: url.to_string(),
            source: err,
        }
    }
}
