//! HTTP request parsing.
//!
//! Converts a raw `may_minihttp` request into a [`ParsedRequest`] the rest
//! of the pipeline works with: lower-cased header names, split-out cookies,
//! decoded query parameters, and an eagerly parsed JSON body.

use crate::handler::HeaderVec;
use crate::router::ParamVec;
use serde_json::Value;
use std::io::Read;
use std::sync::Arc;
use tracing::{debug, warn};

/// A fully parsed incoming request.
#[derive(Debug, Clone)]
pub struct ParsedRequest {
    pub method: String,
    /// Path without the query string.
    pub path: String,
    /// Headers with lower-cased names, in arrival order.
    pub headers: HeaderVec,
    /// Cookies split out of the `Cookie` header(s).
    pub cookies: HeaderVec,
    /// Query parameters, percent-decoded, in arrival order.
    pub query_params: ParamVec,
    /// JSON body if one was present and parseable.
    pub body: Option<Value>,
}

impl ParsedRequest {
    pub fn get_header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .rfind(|(k, _)| k.as_ref().eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn get_cookie(&self, name: &str) -> Option<&str> {
        self.cookies
            .iter()
            .rfind(|(k, _)| k.as_ref() == name)
            .map(|(_, v)| v.as_str())
    }

    /// Last-write-wins query parameter lookup.
    pub fn get_query(&self, name: &str) -> Option<&str> {
        self.query_params
            .iter()
            .rfind(|(k, _)| k.as_ref() == name)
            .map(|(_, v)| v.as_str())
    }
}

/// Split `Cookie` headers into name/value pairs.
pub fn parse_cookies(headers: &HeaderVec) -> HeaderVec {
    let mut cookies = HeaderVec::new();
    for (name, value) in headers {
        if name.as_ref() != "cookie" {
            continue;
        }
        for pair in value.split(';') {
            let mut parts = pair.trim().splitn(2, '=');
            if let (Some(k), Some(v)) = (parts.next(), parts.next()) {
                cookies.push((Arc::from(k.trim()), v.trim().to_string()));
            }
        }
    }
    cookies
}

/// Decode the query string portion of a request path.
pub fn parse_query_params(path: &str) -> ParamVec {
    let mut params = ParamVec::new();
    if let Some(query) = path.splitn(2, '?').nth(1) {
        for (k, v) in url::form_urlencoded::parse(query.as_bytes()) {
            params.push((Arc::from(k.as_ref()), v.into_owned()));
        }
    }
    params
}

/// Parse a raw request. Never fails; unreadable pieces degrade to empty.
pub fn parse_request(req: may_minihttp::Request) -> ParsedRequest {
    let method = req.method().to_ascii_uppercase();
    let raw_path = req.path().to_string();

    let mut headers = HeaderVec::new();
    for h in req.headers() {
        let value = String::from_utf8_lossy(h.value).to_string();
        headers.push((Arc::from(h.name.to_ascii_lowercase().as_str()), value));
    }
    debug!(count = headers.len(), "headers extracted");

    let cookies = parse_cookies(&headers);
    let query_params = parse_query_params(&raw_path);
    let path = raw_path
        .splitn(2, '?')
        .next()
        .unwrap_or(raw_path.as_str())
        .to_string();

    // body() consumes the request, so it goes last
    let mut body_str = String::new();
    let body = match req.body().read_to_string(&mut body_str) {
        Ok(0) => None,
        Ok(_) => match serde_json::from_str::<Value>(&body_str) {
            Ok(value) => {
                debug!(bytes = body_str.len(), "JSON body parsed");
                Some(value)
            }
            Err(e) => {
                warn!(error = %e, "request body is not valid JSON, ignoring");
                None
            }
        },
        Err(e) => {
            warn!(error = %e, "failed to read request body");
            None
        }
    };

    ParsedRequest {
        method,
        path,
        headers,
        cookies,
        query_params,
        body,
    }
}
