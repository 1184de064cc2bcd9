//! Writing handler responses to the wire.

use crate::handler::{HandlerResponse, ResponseBody};
use may_minihttp::Response;
use serde_json::Value;

pub fn status_reason(status: u16) -> &'static str {
    match status {
        200 => "OK",
        201 => "Created",
        204 => "No Content",
        302 => "Found",
        400 => "Bad Request",
        401 => "Unauthorized",
        403 => "Forbidden",
        404 => "Not Found",
        405 => "Method Not Allowed",
        500 => "Internal Server Error",
        502 => "Bad Gateway",
        503 => "Service Unavailable",
        504 => "Gateway Timeout",
        _ => "OK",
    }
}

/// Write a [`HandlerResponse`] out through may_minihttp.
///
/// may_minihttp takes `&'static str` header lines, so dynamic headers
/// (Location, Set-Cookie, proxied Content-Type) are leaked. Header strings
/// are tiny and bounded per response.
pub fn write_handler_response(res: &mut Response, response: HandlerResponse) {
    res.status_code(response.status as usize, status_reason(response.status));

    let mut has_content_type = false;
    for (name, value) in &response.headers {
        if name.as_ref().eq_ignore_ascii_case("content-type") {
            has_content_type = true;
            if value == "application/json" {
                res.header("Content-Type: application/json");
                continue;
            }
        }
        let line = format!("{}: {}", name, value).into_boxed_str();
        res.header(Box::leak(line));
    }

    match response.body {
        ResponseBody::Json(value) => {
            if !has_content_type {
                res.header("Content-Type: application/json");
            }
            res.body_vec(serde_json::to_vec(&value).unwrap_or_default());
        }
        ResponseBody::Bytes(bytes) => {
            if !has_content_type {
                res.header("Content-Type: application/octet-stream");
            }
            res.body_vec(bytes);
        }
        ResponseBody::Empty => {}
    }
}

/// Shortcut for infrastructure-level JSON errors written before a
/// [`HandlerResponse`] exists (parse failures, unknown routes).
pub fn write_json_error(res: &mut Response, status: u16, body: Value) {
    res.status_code(status as usize, status_reason(status));
    res.header("Content-Type: application/json");
    res.body_vec(body.to_string().into_bytes());
}
