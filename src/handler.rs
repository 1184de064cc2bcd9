//! Handler request and response types.
//!
//! Handlers are plain functions invoked inline on the request coroutine;
//! there is no dispatch queue between the HTTP layer and a handler, so a
//! failure can never leave a half-processed request parked anywhere.

use crate::ids::{RequestId, SessionId};
use crate::router::ParamVec;
use http::Method;
use serde_json::{json, Value};
use smallvec::SmallVec;
use std::sync::Arc;

/// Inline capacity for header vectors. Typical browser requests carry
/// 8-14 headers.
pub const MAX_INLINE_HEADERS: usize = 16;

/// Header storage that avoids heap allocation for typical requests.
/// Names are stored lower-cased.
pub type HeaderVec = SmallVec<[(Arc<str>, String); MAX_INLINE_HEADERS]>;

/// Everything a handler gets to see about a request.
#[derive(Debug, Clone)]
pub struct HandlerRequest {
    pub request_id: RequestId,
    pub method: Method,
    pub path: String,
    pub handler_name: &'static str,
    pub path_params: ParamVec,
    pub query_params: ParamVec,
    pub headers: HeaderVec,
    pub cookies: HeaderVec,
    /// Parsed JSON body, when the request carried one.
    pub body: Option<Value>,
    /// Session for this request. The entry may not exist yet; it is created
    /// the first time a token is bound.
    pub session_id: SessionId,
    /// True when the request did not present a usable session cookie.
    pub session_fresh: bool,
}

impl HandlerRequest {
    /// Last-write-wins lookup, matching duplicate-key semantics of query
    /// strings.
    pub fn get_path_param(&self, name: &str) -> Option<&str> {
        self.path_params
            .iter()
            .rfind(|(k, _)| k.as_ref() == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn get_query_param(&self, name: &str) -> Option<&str> {
        self.query_params
            .iter()
            .rfind(|(k, _)| k.as_ref() == name)
            .map(|(_, v)| v.as_str())
    }

    /// Case-insensitive header lookup.
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
}

/// Response body shapes a handler can produce.
#[derive(Debug, Clone, PartialEq)]
pub enum ResponseBody {
    Json(Value),
    /// Raw bytes, e.g. a proxied PDF. Content type travels in the headers.
    Bytes(Vec<u8>),
    Empty,
}

/// A handler's answer, later written to the wire by the server layer.
#[derive(Debug, Clone, PartialEq)]
pub struct HandlerResponse {
    pub status: u16,
    pub headers: HeaderVec,
    pub body: ResponseBody,
}

impl HandlerResponse {
    pub fn new(status: u16, headers: HeaderVec, body: ResponseBody) -> Self {
        Self {
            status,
            headers,
            body,
        }
    }

    /// JSON response with the content type set.
    pub fn json(status: u16, body: Value) -> Self {
        let mut headers = HeaderVec::new();
        headers.push((Arc::from("Content-Type"), "application/json".to_string()));
        Self {
            status,
            headers,
            body: ResponseBody::Json(body),
        }
    }

    /// JSON error envelope: `{"error": <message>}`.
    pub fn error(status: u16, message: &str) -> Self {
        Self::json(status, json!({ "error": message }))
    }

    /// 302 redirect.
    pub fn redirect(location: &str) -> Self {
        let mut headers = HeaderVec::new();
        headers.push((Arc::from("Location"), location.to_string()));
        Self {
            status: 302,
            headers,
            body: ResponseBody::Empty,
        }
    }

    pub fn get_header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .rfind(|(k, _)| k.as_ref().eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Set a header, replacing any existing value under the same name.
    pub fn set_header(&mut self, name: &str, value: impl Into<String>) {
        self.headers
            .retain(|(k, _)| !k.as_ref().eq_ignore_ascii_case(name));
        self.headers.push((Arc::from(name), value.into()));
    }
}
