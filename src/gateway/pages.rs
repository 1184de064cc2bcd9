//! Page handlers.
//!
//! The gateway serves page descriptors: a view name plus the model the UI
//! needs, as JSON. Data comes from the backend with the caller's token; a
//! backend 401 during page assembly means the bound token went stale, which
//! renders as a login redirect rather than a broken page.

use super::Gateway;
use crate::auth::{SecurityContext, SharedIdentity};
use crate::handler::{HandlerRequest, HandlerResponse};
use http::Method;
use serde_json::{json, Map, Value};
use tracing::info;

fn page(view: &str, mut model: Map<String, Value>) -> HandlerResponse {
    model.insert("view".to_string(), json!(view));
    HandlerResponse::json(200, Value::Object(model))
}

fn current_identity() -> Result<SharedIdentity, HandlerResponse> {
    SecurityContext::current()
        .ok_or_else(|| HandlerResponse::redirect("/admin/login?error=session_expired"))
}

/// Fetch one backend resource for a page model.
///
/// A 200 yields the JSON payload; a backend 401 aborts the page with a
/// login redirect (the bound token no longer works upstream); any other
/// backend status degrades to `null` so the page still renders; transport
/// failures redirect with `server_error`.
fn fetch_for_page(gateway: &Gateway, token: &str, path: &str) -> Result<Value, HandlerResponse> {
    match gateway.backend.forward(token, Method::GET, path, None) {
        Ok(reply) if reply.status == 200 => {
            Ok(reply.json().cloned().unwrap_or(Value::Null))
        }
        Ok(reply) if reply.status == 401 => {
            Err(HandlerResponse::redirect("/admin/login?error=session_expired"))
        }
        Ok(_) => Ok(Value::Null),
        Err(err) => {
            err.log();
            Err(HandlerResponse::redirect("/admin/login?error=server_error"))
        }
    }
}

/// Public login page. Echoes the error and logout indicators from the
/// query string so the view can explain why the visitor landed here.
pub fn admin_login_page(_gateway: &Gateway, req: &HandlerRequest) -> HandlerResponse {
    let mut model = Map::new();
    if let Some(error) = req.get_query_param("error") {
        model.insert("error".to_string(), json!(error));
    }
    if req.get_query_param("logout").is_some() {
        model.insert("logout".to_string(), json!(true));
    }
    page("admin/login", model)
}

/// Drop the session binding and send the browser back to the login page.
pub fn logout(gateway: &Gateway, req: &HandlerRequest) -> HandlerResponse {
    gateway.sessions.handle(req.session_id).invalidate();
    info!(session_id = %req.session_id, "logout, session invalidated");
    HandlerResponse::redirect("/admin/login?logout=true")
}

pub fn admin_dashboard_page(gateway: &Gateway, _req: &HandlerRequest) -> HandlerResponse {
    let identity = match current_identity() {
        Ok(identity) => identity,
        Err(response) => return response,
    };
    let requests = match fetch_for_page(gateway, &identity.token, "/service-requests") {
        Ok(value) => value,
        Err(response) => return response,
    };

    let mut model = Map::new();
    model.insert("subject".to_string(), json!(identity.subject));
    model.insert("roles".to_string(), json!(identity.roles.names()));
    if let Value::Array(items) = &requests {
        let mut by_status: Map<String, Value> = Map::new();
        for item in items {
            let status = item
                .get("status")
                .and_then(Value::as_str)
                .unwrap_or("UNKNOWN");
            let count = by_status
                .get(status)
                .and_then(Value::as_u64)
                .unwrap_or(0);
            by_status.insert(status.to_string(), json!(count + 1));
        }
        model.insert("totalRequests".to_string(), json!(items.len()));
        model.insert("byStatus".to_string(), Value::Object(by_status));
    } else {
        model.insert("totalRequests".to_string(), json!(0));
        model.insert("byStatus".to_string(), json!({}));
    }
    model.insert("serviceRequests".to_string(), requests);
    page("admin/dashboard", model)
}

/// Service request workbench: the request list plus the advisor roster for
/// the assignment dropdown.
pub fn admin_service_requests_page(gateway: &Gateway, _req: &HandlerRequest) -> HandlerResponse {
    let identity = match current_identity() {
        Ok(identity) => identity,
        Err(response) => return response,
    };
    let requests = match fetch_for_page(gateway, &identity.token, "/service-requests") {
        Ok(value) => value,
        Err(response) => return response,
    };
    let advisors = match fetch_for_page(gateway, &identity.token, "/service-advisors") {
        Ok(value) => value,
        Err(response) => return response,
    };

    let mut model = Map::new();
    model.insert("subject".to_string(), json!(identity.subject));
    model.insert("serviceRequests".to_string(), requests);
    model.insert("serviceAdvisors".to_string(), advisors);
    page("admin/service-requests", model)
}

pub fn admin_customers_page(gateway: &Gateway, _req: &HandlerRequest) -> HandlerResponse {
    let identity = match current_identity() {
        Ok(identity) => identity,
        Err(response) => return response,
    };
    let customers = match fetch_for_page(gateway, &identity.token, "/api/customers") {
        Ok(value) => value,
        Err(response) => return response,
    };

    let mut model = Map::new();
    model.insert("subject".to_string(), json!(identity.subject));
    model.insert("customers".to_string(), customers);
    page("admin/customers", model)
}

pub fn advisor_dashboard_page(gateway: &Gateway, _req: &HandlerRequest) -> HandlerResponse {
    let identity = match current_identity() {
        Ok(identity) => identity,
        Err(response) => return response,
    };
    let assigned = match fetch_for_page(
        gateway,
        &identity.token,
        "/serviceAdvisor/api/service-requests",
    ) {
        Ok(value) => value,
        Err(response) => return response,
    };

    let mut model = Map::new();
    model.insert("subject".to_string(), json!(identity.subject));
    model.insert(
        "displayName".to_string(),
        json!(identity.display_name.clone().unwrap_or_default()),
    );
    model.insert("assignedRequests".to_string(), assigned);
    page("advisor/dashboard", model)
}
