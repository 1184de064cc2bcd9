//! End-to-end tests driving a running gateway over HTTP with a mock backend.

use serde_json::{json, Value};
use std::sync::{Arc, Mutex};

mod common;
use common::{
    client, free_port, json_response, mint_token, pdf_response, read_body_json, request_header,
    session_cookie, tamper, MockBackend, TestGateway,
};

/// Backend serving the handful of resources the admin surface reads.
fn admin_backend() -> MockBackend {
    MockBackend::start(|req| {
        let url = req.url().to_string();
        match url.as_str() {
            "/api/customers" => json_response(200, &json!([{"id": 1, "name": "Dana Cole"}])),
            "/service-requests" => json_response(
                200,
                &json!([
                    {"id": 5, "status": "PENDING"},
                    {"id": 6, "status": "COMPLETED"},
                    {"id": 7, "status": "PENDING"}
                ]),
            ),
            "/service-advisors" => json_response(200, &json!([{"id": 2, "name": "Sam Reyes"}])),
            _ => json_response(404, &json!({"error": "unknown path"})),
        }
    })
}

fn admin_token() -> String {
    mint_token("admin@shop.test", &["ADMIN"], 300)
}

#[test]
fn test_health_endpoint_needs_no_credential() {
    let backend = admin_backend();
    let tg = TestGateway::start(backend.url());

    let res = client().get(tg.url("/health")).send().unwrap();
    assert_eq!(res.status().as_u16(), 200);
    assert_eq!(res.json::<Value>().unwrap(), json!({"status": "ok"}));
}

#[test]
fn test_parameter_token_authenticates_and_sets_the_session_cookie() {
    let seen_auth = Arc::new(Mutex::new(Vec::<Option<String>>::new()));
    let capture = Arc::clone(&seen_auth);
    let backend = MockBackend::start(move |req| {
        capture
            .lock()
            .unwrap()
            .push(request_header(req, "Authorization"));
        json_response(200, &json!([{"id": 1}]))
    });
    let tg = TestGateway::start(backend.url());
    let token = admin_token();

    // First visit: token in the link.
    let res = client()
        .get(tg.url("/admin/api/customers"))
        .query(&[("token", token.as_str())])
        .send()
        .unwrap();
    assert_eq!(res.status().as_u16(), 200);
    let cookie = session_cookie(&res).expect("parameter login should set the session cookie");

    // Second visit: cookie only. The session tier supplies the token.
    let res = client()
        .get(tg.url("/admin/api/customers"))
        .header("Cookie", format!("sb_session={cookie}"))
        .send()
        .unwrap();
    assert_eq!(res.status().as_u16(), 200);
    assert!(
        session_cookie(&res).is_none(),
        "an established session should not be re-issued"
    );

    // The backend saw the same bearer credential both times.
    let seen = seen_auth.lock().unwrap();
    assert_eq!(seen.len(), 2);
    let expected = format!("Bearer {token}");
    assert!(seen.iter().all(|a| a.as_deref() == Some(expected.as_str())));
}

#[test]
fn test_missing_credential_on_api_route_is_401_json() {
    let backend = admin_backend();
    let tg = TestGateway::start(backend.url());

    let res = client().get(tg.url("/admin/api/customers")).send().unwrap();
    assert_eq!(res.status().as_u16(), 401);
    assert_eq!(
        res.json::<Value>().unwrap(),
        json!({"error": "Authentication required"})
    );
}

#[test]
fn test_missing_credential_on_page_route_redirects_to_login() {
    let backend = admin_backend();
    let tg = TestGateway::start(backend.url());

    let res = client().get(tg.url("/admin/dashboard")).send().unwrap();
    assert_eq!(res.status().as_u16(), 302);
    assert_eq!(
        res.headers().get("location").unwrap(),
        "/admin/login?error=session_expired"
    );
}

#[test]
fn test_tampered_token_on_page_route_redirects_with_invalid_token() {
    let backend = admin_backend();
    let tg = TestGateway::start(backend.url());

    let res = client()
        .get(tg.url("/admin/dashboard"))
        .query(&[("token", tamper(&admin_token()).as_str())])
        .send()
        .unwrap();
    assert_eq!(res.status().as_u16(), 302);
    assert_eq!(
        res.headers().get("location").unwrap(),
        "/admin/login?error=invalid_token"
    );
}

#[test]
fn test_expired_token_on_api_route_is_401() {
    let backend = admin_backend();
    let tg = TestGateway::start(backend.url());
    let expired = mint_token("admin@shop.test", &["ADMIN"], -120);

    let res = client()
        .get(tg.url("/admin/api/customers"))
        .header("Authorization", format!("Bearer {expired}"))
        .send()
        .unwrap();
    assert_eq!(res.status().as_u16(), 401);
    assert_eq!(
        res.json::<Value>().unwrap(),
        json!({"error": "Invalid or expired token"})
    );
}

#[test]
fn test_wrong_role_is_403_not_401() {
    let backend = admin_backend();
    let tg = TestGateway::start(backend.url());
    let customer = mint_token("kim@example.com", &["CUSTOMER"], 300);

    let res = client()
        .get(tg.url("/admin/api/customers"))
        .header("Authorization", format!("Bearer {customer}"))
        .send()
        .unwrap();
    assert_eq!(res.status().as_u16(), 403);
    assert_eq!(res.json::<Value>().unwrap(), json!({"error": "Access denied"}));
}

#[test]
fn test_wrong_role_on_page_route_redirects_with_access_denied() {
    let backend = admin_backend();
    let tg = TestGateway::start(backend.url());

    // An admin is still not a service advisor.
    let res = client()
        .get(tg.url("/advisor/dashboard"))
        .query(&[("token", admin_token().as_str())])
        .send()
        .unwrap();
    assert_eq!(res.status().as_u16(), 302);
    assert_eq!(
        res.headers().get("location").unwrap(),
        "/admin/login?error=access_denied"
    );
}

#[test]
fn test_login_proxies_credentials_and_binds_the_session() {
    let minted = admin_token();
    let for_backend = minted.clone();
    let backend = MockBackend::start(move |req| {
        let method = req.method().to_string();
        let url = req.url().to_string();
        match (method.as_str(), url.as_str()) {
            ("POST", "/auth/login") => {
                let body = read_body_json(req);
                if body["email"] == json!("admin@shop.test")
                    && body["password"] == json!("wrench-set-9")
                {
                    json_response(200, &json!({"token": for_backend, "role": "ADMIN"}))
                } else {
                    json_response(401, &json!({"error": "Invalid credentials"}))
                }
            }
            ("GET", "/service-requests") => json_response(200, &json!([])),
            _ => json_response(404, &json!({"error": "unknown path"})),
        }
    });
    let tg = TestGateway::start(backend.url());

    let res = client()
        .post(tg.url("/admin/api/login"))
        .json(&json!({"email": "admin@shop.test", "password": "wrench-set-9"}))
        .send()
        .unwrap();
    assert_eq!(res.status().as_u16(), 200);
    let cookie = session_cookie(&res).expect("login should set the session cookie");
    let body = res.json::<Value>().unwrap();
    assert_eq!(body["token"], json!(minted));

    // The bound session alone now opens a protected page.
    let res = client()
        .get(tg.url("/admin/dashboard"))
        .header("Cookie", format!("sb_session={cookie}"))
        .send()
        .unwrap();
    assert_eq!(res.status().as_u16(), 200);
    let page = res.json::<Value>().unwrap();
    assert_eq!(page["view"], json!("admin/dashboard"));
    assert_eq!(page["subject"], json!("admin@shop.test"));
}

#[test]
fn test_failed_login_passes_through_and_leaves_no_session() {
    let backend = MockBackend::start(|_req| json_response(401, &json!({"error": "Invalid credentials"})));
    let tg = TestGateway::start(backend.url());

    let res = client()
        .post(tg.url("/admin/api/login"))
        .json(&json!({"email": "admin@shop.test", "password": "wrong"}))
        .send()
        .unwrap();
    assert_eq!(res.status().as_u16(), 401);
    assert_eq!(
        res.json::<Value>().unwrap(),
        json!({"error": "Invalid credentials"})
    );
    assert_eq!(tg.gateway.sessions.len(), 0);
}

#[test]
fn test_login_without_fields_is_rejected_before_the_backend() {
    let backend = admin_backend();
    let tg = TestGateway::start(backend.url());

    let res = client()
        .post(tg.url("/admin/api/login"))
        .json(&json!({"email": "admin@shop.test"}))
        .send()
        .unwrap();
    assert_eq!(res.status().as_u16(), 400);
    assert_eq!(
        res.json::<Value>().unwrap(),
        json!({"error": "email and password are required"})
    );
}

#[test]
fn test_logout_invalidates_the_session() {
    let backend = admin_backend();
    let tg = TestGateway::start(backend.url());
    let token = admin_token();

    let res = client()
        .get(tg.url("/admin/api/customers"))
        .query(&[("token", token.as_str())])
        .send()
        .unwrap();
    let cookie = session_cookie(&res).unwrap();
    assert_eq!(tg.gateway.sessions.len(), 1);

    let res = client()
        .get(tg.url("/admin/logout"))
        .header("Cookie", format!("sb_session={cookie}"))
        .send()
        .unwrap();
    assert_eq!(res.status().as_u16(), 302);
    assert_eq!(
        res.headers().get("location").unwrap(),
        "/admin/login?logout=true"
    );
    assert_eq!(tg.gateway.sessions.len(), 0);

    // The old cookie no longer authenticates anything.
    let res = client()
        .get(tg.url("/admin/api/customers"))
        .header("Cookie", format!("sb_session={cookie}"))
        .send()
        .unwrap();
    assert_eq!(res.status().as_u16(), 401);
}

#[test]
fn test_header_credential_does_not_create_a_session() {
    let backend = admin_backend();
    let tg = TestGateway::start(backend.url());

    let res = client()
        .get(tg.url("/admin/api/customers"))
        .header("Authorization", format!("Bearer {}", admin_token()))
        .send()
        .unwrap();
    assert_eq!(res.status().as_u16(), 200);
    assert!(session_cookie(&res).is_none());
    assert_eq!(tg.gateway.sessions.len(), 0);
}

#[test]
fn test_rehydrate_policy_binds_header_credentials() {
    let backend = admin_backend();
    let mut config = TestGateway::config_for(backend.url());
    config.auth.persist_header_tokens = true;
    let tg = TestGateway::start_with_config(config);

    let res = client()
        .get(tg.url("/admin/api/customers"))
        .header("Authorization", format!("Bearer {}", admin_token()))
        .send()
        .unwrap();
    assert_eq!(res.status().as_u16(), 200);
    assert!(session_cookie(&res).is_some());
    assert_eq!(tg.gateway.sessions.len(), 1);
}

#[test]
fn test_backend_403_passes_through_with_its_body() {
    let backend = MockBackend::start(|req| {
        if req.url() == "/service-requests/9" {
            json_response(403, &json!({"error": "not your service request"}))
        } else {
            json_response(404, &json!({"error": "unknown path"}))
        }
    });
    let tg = TestGateway::start(backend.url());

    let res = client()
        .get(tg.url("/admin/api/service-requests/9"))
        .header("Authorization", format!("Bearer {}", admin_token()))
        .send()
        .unwrap();
    assert_eq!(res.status().as_u16(), 403);
    assert_eq!(
        res.json::<Value>().unwrap(),
        json!({"error": "not your service request"})
    );

    // A relayed backend 403 is not a gateway authorization denial.
    let metrics = client().get(tg.url("/metrics")).send().unwrap().text().unwrap();
    assert!(metrics.contains("servicebay_forbidden_total 0"));
}

#[test]
fn test_invoice_download_streams_binary_with_headers() {
    let backend = MockBackend::start(|req| {
        if req.url() == "/invoices/7/download" {
            pdf_response(b"%PDF-1.4 servicebay", "invoice-7.pdf")
        } else {
            json_response(404, &json!({"error": "unknown path"}))
        }
    });
    let tg = TestGateway::start(backend.url());

    let res = client()
        .get(tg.url("/admin/api/invoices/7/download"))
        .header("Authorization", format!("Bearer {}", admin_token()))
        .send()
        .unwrap();
    assert_eq!(res.status().as_u16(), 200);
    assert_eq!(
        res.headers().get("content-type").unwrap(),
        "application/pdf"
    );
    assert_eq!(
        res.headers().get("content-disposition").unwrap(),
        "attachment; filename=invoice-7.pdf"
    );
    assert_eq!(res.bytes().unwrap().as_ref(), b"%PDF-1.4 servicebay");
}

#[test]
fn test_advisor_surface_requires_the_advisor_role() {
    let backend = MockBackend::start(|req| {
        if req.url() == "/serviceAdvisor/api/service-requests" {
            json_response(200, &json!([{"id": 5, "status": "PENDING"}]))
        } else {
            json_response(404, &json!({"error": "unknown path"}))
        }
    });
    let tg = TestGateway::start(backend.url());
    let advisor = mint_token("sam@shop.test", &["SERVICEADVISOR"], 300);

    let res = client()
        .get(tg.url("/advisor/api/service-requests"))
        .header("Authorization", format!("Bearer {advisor}"))
        .send()
        .unwrap();
    assert_eq!(res.status().as_u16(), 200);

    let res = client()
        .get(tg.url("/advisor/api/service-requests"))
        .header("Authorization", format!("Bearer {}", admin_token()))
        .send()
        .unwrap();
    assert_eq!(res.status().as_u16(), 403);
}

#[test]
fn test_assignment_validates_the_advisor_id() {
    let backend = admin_backend();
    let tg = TestGateway::start(backend.url());
    let token = admin_token();

    let res = client()
        .put(tg.url("/admin/api/service-requests/5/assign"))
        .query(&[("advisorId", "abc")])
        .header("Authorization", format!("Bearer {token}"))
        .send()
        .unwrap();
    assert_eq!(res.status().as_u16(), 400);
    assert_eq!(
        res.json::<Value>().unwrap(),
        json!({"error": "advisorId must be numeric"})
    );

    let res = client()
        .put(tg.url("/admin/api/service-requests/5/assign"))
        .header("Authorization", format!("Bearer {token}"))
        .send()
        .unwrap();
    assert_eq!(res.status().as_u16(), 400);
    assert_eq!(
        res.json::<Value>().unwrap(),
        json!({"error": "advisorId query parameter is required"})
    );
}

#[test]
fn test_unknown_path_is_404() {
    let backend = admin_backend();
    let tg = TestGateway::start(backend.url());

    let res = client().get(tg.url("/no/such/path")).send().unwrap();
    assert_eq!(res.status().as_u16(), 404);
    let body = res.json::<Value>().unwrap();
    assert_eq!(body["error"], json!("Not Found"));
    assert_eq!(body["path"], json!("/no/such/path"));
}

#[test]
fn test_known_path_with_wrong_method_is_405() {
    let backend = admin_backend();
    let tg = TestGateway::start(backend.url());

    let res = client().delete(tg.url("/admin/api/customers")).send().unwrap();
    assert_eq!(res.status().as_u16(), 405);
    assert_eq!(
        res.json::<Value>().unwrap(),
        json!({"error": "Method Not Allowed"})
    );
}

#[test]
fn test_preflight_is_answered_before_routing() {
    let backend = admin_backend();
    let tg = TestGateway::start(backend.url());

    let res = client()
        .request(reqwest::Method::OPTIONS, tg.url("/admin/api/customers"))
        .send()
        .unwrap();
    assert_eq!(res.status().as_u16(), 204);
    assert_eq!(
        res.headers().get("access-control-allow-origin").unwrap(),
        "*"
    );
}

#[test]
fn test_unreachable_backend_is_502_and_counted() {
    let dead_backend = format!("http://127.0.0.1:{}", free_port());
    let tg = TestGateway::start(&dead_backend);

    let res = client()
        .get(tg.url("/admin/api/customers"))
        .header("Authorization", format!("Bearer {}", admin_token()))
        .send()
        .unwrap();
    assert_eq!(res.status().as_u16(), 502);
    assert_eq!(
        res.json::<Value>().unwrap(),
        json!({"error": "Backend service unavailable"})
    );

    let metrics = client().get(tg.url("/metrics")).send().unwrap().text().unwrap();
    assert!(metrics.contains("servicebay_backend_errors_total 1"));
}

#[test]
fn test_metrics_exposition_covers_the_gateway_counters() {
    let backend = admin_backend();
    let tg = TestGateway::start(backend.url());
    let token = admin_token();

    // One authenticated request twice: the second validation is a cache hit.
    for _ in 0..2 {
        let res = client()
            .get(tg.url("/admin/api/customers"))
            .header("Authorization", format!("Bearer {token}"))
            .send()
            .unwrap();
        assert_eq!(res.status().as_u16(), 200);
    }
    let res = client().get(tg.url("/admin/api/customers")).send().unwrap();
    assert_eq!(res.status().as_u16(), 401);

    let metrics = client().get(tg.url("/metrics")).send().unwrap().text().unwrap();
    assert!(metrics.contains("servicebay_requests_total 3"));
    assert!(metrics.contains("servicebay_auth_failures_total 1"));
    assert!(metrics.contains("servicebay_claims_cache_hits_total 1"));
    assert!(metrics.contains("servicebay_claims_cache_misses_total 1"));
    assert!(metrics.contains("servicebay_sessions_active 0"));
    assert!(metrics.contains("servicebay_top_level_requests_total"));
}

#[test]
fn test_login_page_echoes_error_and_logout_indicators() {
    let backend = admin_backend();
    let tg = TestGateway::start(backend.url());

    let res = client()
        .get(tg.url("/admin/login"))
        .query(&[("error", "invalid_token"), ("logout", "true")])
        .send()
        .unwrap();
    assert_eq!(res.status().as_u16(), 200);
    let page = res.json::<Value>().unwrap();
    assert_eq!(page["view"], json!("admin/login"));
    assert_eq!(page["error"], json!("invalid_token"));
    assert_eq!(page["logout"], json!(true));
}

#[test]
fn test_dashboard_aggregates_service_request_statuses() {
    let backend = admin_backend();
    let tg = TestGateway::start(backend.url());

    let res = client()
        .get(tg.url("/admin/dashboard"))
        .query(&[("token", admin_token().as_str())])
        .send()
        .unwrap();
    assert_eq!(res.status().as_u16(), 200);
    let page = res.json::<Value>().unwrap();
    assert_eq!(page["totalRequests"], json!(3));
    assert_eq!(page["byStatus"]["PENDING"], json!(2));
    assert_eq!(page["byStatus"]["COMPLETED"], json!(1));
}

#[test]
fn test_stale_session_binding_redirects_from_pages() {
    // The gateway accepts the cached token, but the backend now answers 401.
    let backend = MockBackend::start(|_req| json_response(401, &json!({"error": "expired"})));
    let tg = TestGateway::start(backend.url());

    let res = client()
        .get(tg.url("/admin/dashboard"))
        .query(&[("token", admin_token().as_str())])
        .send()
        .unwrap();
    assert_eq!(res.status().as_u16(), 302);
    assert_eq!(
        res.headers().get("location").unwrap(),
        "/admin/login?error=session_expired"
    );
}
