//! API proxy handlers.
//!
//! Each handler forwards one backend operation with the caller's token and
//! relays the reply verbatim. What used to be a controller class per
//! resource collapses into a few lines here because resolution, validation,
//! and role checks already happened in the pipeline.

use super::Gateway;
use crate::auth::{SecurityContext, SharedIdentity};
use crate::forward::ForwardError;
use crate::handler::{HandlerRequest, HandlerResponse};
use http::Method;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::info;

/// Identity bound by the pipeline. Registered handlers on protected routes
/// always run with one; a missing identity is answered, not panicked on.
fn current_identity() -> Result<SharedIdentity, HandlerResponse> {
    SecurityContext::current()
        .ok_or_else(|| HandlerResponse::error(401, "Authentication required"))
}

/// Forward to the backend with the caller's credential and relay the reply.
fn proxy(gateway: &Gateway, method: Method, path: &str, body: Option<&Value>) -> HandlerResponse {
    let identity = match current_identity() {
        Ok(identity) => identity,
        Err(response) => return response,
    };
    match gateway.backend.forward(&identity.token, method, path, body) {
        Ok(reply) => reply.into_response(),
        Err(err) => forward_failure(err),
    }
}

fn forward_failure(err: ForwardError) -> HandlerResponse {
    err.log();
    HandlerResponse::error(err.status(), err.public_message())
}

#[derive(Debug, Deserialize)]
struct LoginRequest {
    email: String,
    password: String,
}

/// Proxy the login call and bind the returned token to the session.
///
/// The backend answers 200 with a `token` field on success; any failure
/// status passes through untouched and leaves the session unbound.
pub fn login(gateway: &Gateway, req: &HandlerRequest) -> HandlerResponse {
    let Some(body) = &req.body else {
        return HandlerResponse::error(400, "Request body required");
    };
    let login: LoginRequest = match serde_json::from_value(body.clone()) {
        Ok(parsed) => parsed,
        Err(_) => return HandlerResponse::error(400, "email and password are required"),
    };
    let upstream_body = json!({ "email": login.email, "password": login.password });

    match gateway
        .backend
        .forward_anonymous(Method::POST, "/auth/login", Some(&upstream_body))
    {
        Ok(reply) => {
            if reply.status == 200 {
                if let Some(token) = reply.json().and_then(|v| v.get("token")).and_then(Value::as_str)
                {
                    gateway.sessions.handle(req.session_id).bind_token(token);
                    info!(session_id = %req.session_id, "login succeeded, token bound to session");
                }
            }
            reply.into_response()
        }
        Err(err) => forward_failure(err),
    }
}

pub fn list_customers(gateway: &Gateway, _req: &HandlerRequest) -> HandlerResponse {
    proxy(gateway, Method::GET, "/api/customers", None)
}

pub fn create_customer(gateway: &Gateway, req: &HandlerRequest) -> HandlerResponse {
    let Some(body) = &req.body else {
        return HandlerResponse::error(400, "Request body required");
    };
    proxy(gateway, Method::POST, "/api/customers", Some(body))
}

pub fn list_service_requests(gateway: &Gateway, _req: &HandlerRequest) -> HandlerResponse {
    proxy(gateway, Method::GET, "/service-requests", None)
}

pub fn create_service_request(gateway: &Gateway, req: &HandlerRequest) -> HandlerResponse {
    let Some(body) = &req.body else {
        return HandlerResponse::error(400, "Request body required");
    };
    proxy(gateway, Method::POST, "/service-requests", Some(body))
}

pub fn get_service_request(gateway: &Gateway, req: &HandlerRequest) -> HandlerResponse {
    let Some(id) = req.get_path_param("id") else {
        return HandlerResponse::error(400, "Missing service request id");
    };
    proxy(
        gateway,
        Method::GET,
        &format!("/service-requests/{}", urlencoding::encode(id)),
        None,
    )
}

/// `PUT /admin/api/service-requests/{id}/assign?advisorId=N`
///
/// The advisor id arrives as a query parameter from the admin UI and goes
/// upstream as a JSON body. Non-numeric ids are rejected here instead of
/// surfacing as a backend 500.
pub fn assign_service_request(gateway: &Gateway, req: &HandlerRequest) -> HandlerResponse {
    let Some(id) = req.get_path_param("id") else {
        return HandlerResponse::error(400, "Missing service request id");
    };
    let advisor_id: i64 = match req.get_query_param("advisorId").map(str::parse) {
        Some(Ok(value)) => value,
        Some(Err(_)) => return HandlerResponse::error(400, "advisorId must be numeric"),
        None => return HandlerResponse::error(400, "advisorId query parameter is required"),
    };
    let body = json!({ "advisorId": advisor_id });
    proxy(
        gateway,
        Method::PUT,
        &format!("/service-requests/{}/assign", urlencoding::encode(id)),
        Some(&body),
    )
}

/// `PUT /admin/api/service-requests/{id}/status?status=X`
pub fn update_service_request_status(gateway: &Gateway, req: &HandlerRequest) -> HandlerResponse {
    let Some(id) = req.get_path_param("id") else {
        return HandlerResponse::error(400, "Missing service request id");
    };
    let Some(status) = req.get_query_param("status").filter(|s| !s.is_empty()) else {
        return HandlerResponse::error(400, "status query parameter is required");
    };
    let body = json!({ "status": status });
    proxy(
        gateway,
        Method::PUT,
        &format!("/service-requests/{}/status", urlencoding::encode(id)),
        Some(&body),
    )
}

pub fn list_service_advisors(gateway: &Gateway, _req: &HandlerRequest) -> HandlerResponse {
    proxy(gateway, Method::GET, "/service-advisors", None)
}

pub fn vehicles_under_service(gateway: &Gateway, _req: &HandlerRequest) -> HandlerResponse {
    proxy(
        gateway,
        Method::GET,
        "/vehicle-tracking/vehicles-under-service",
        None,
    )
}

pub fn completed_services(gateway: &Gateway, _req: &HandlerRequest) -> HandlerResponse {
    proxy(
        gateway,
        Method::GET,
        "/vehicle-tracking/completed-services",
        None,
    )
}

/// Invoice PDFs stream back byte for byte with their download headers.
pub fn download_invoice(gateway: &Gateway, req: &HandlerRequest) -> HandlerResponse {
    let Some(id) = req.get_path_param("id") else {
        return HandlerResponse::error(400, "Missing invoice id");
    };
    proxy(
        gateway,
        Method::GET,
        &format!("/invoices/{}/download", urlencoding::encode(id)),
        None,
    )
}

pub fn advisor_service_requests(gateway: &Gateway, _req: &HandlerRequest) -> HandlerResponse {
    proxy(
        gateway,
        Method::GET,
        "/serviceAdvisor/api/service-requests",
        None,
    )
}

pub fn advisor_update_status(gateway: &Gateway, req: &HandlerRequest) -> HandlerResponse {
    let Some(id) = req.get_path_param("id") else {
        return HandlerResponse::error(400, "Missing service request id");
    };
    let Some(status) = req.get_query_param("status").filter(|s| !s.is_empty()) else {
        return HandlerResponse::error(400, "status query parameter is required");
    };
    let body = json!({ "status": status });
    proxy(
        gateway,
        Method::PUT,
        &format!(
            "/serviceAdvisor/api/service-requests/{}/status",
            urlencoding::encode(id)
        ),
        Some(&body),
    )
}
