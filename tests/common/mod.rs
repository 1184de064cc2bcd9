#![allow(dead_code)]

use jsonwebtoken::{encode, EncodingKey, Header};
use servicebay::auth::Claims;
use servicebay::config::GatewayConfig;
use servicebay::gateway::Gateway;
use servicebay::server::{GatewayService, HttpServer, ServerHandle};
use std::io::Cursor;
use std::sync::{Arc, Once};
use std::thread;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// HMAC secret shared by minted test tokens and the gateway under test.
pub const TEST_SECRET: &str = "servicebay-test-secret-0123456789";

/// Ensures May coroutines are configured only once per test binary.
static MAY_INIT: Once = Once::new();

pub fn setup_may_runtime() {
    MAY_INIT.call_once(|| {
        may::config().set_stack_size(0x8000);
    });
}

pub fn unix_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("clock before unix epoch")
        .as_secs() as i64
}

/// Mint an HS256 token with the given roles. Negative `ttl_secs` produces
/// an already-expired token.
pub fn mint_token(sub: &str, roles: &[&str], ttl_secs: i64) -> String {
    mint_token_with_secret(TEST_SECRET, sub, roles, ttl_secs)
}

pub fn mint_token_with_secret(secret: &str, sub: &str, roles: &[&str], ttl_secs: i64) -> String {
    let now = unix_now();
    let claims = Claims {
        sub: sub.to_string(),
        name: Some(format!("{sub} (test)")),
        role: None,
        roles: roles.iter().map(|r| r.to_string()).collect(),
        exp: now + ttl_secs,
        iat: Some(now),
    };
    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .expect("mint token")
}

/// Corrupt a token's signature while keeping it structurally valid.
pub fn tamper(token: &str) -> String {
    let mut tampered = token.to_string();
    let last = tampered.pop().expect("non-empty token");
    tampered.push(if last == 'A' { 'B' } else { 'A' });
    tampered
}

pub fn free_port() -> u16 {
    std::net::TcpListener::bind("127.0.0.1:0")
        .expect("bind ephemeral port")
        .local_addr()
        .expect("local addr")
        .port()
}

pub type MockResponse = tiny_http::Response<Cursor<Vec<u8>>>;

/// In-process HTTP backend for forwarding tests. Serves every request with
/// the given closure until dropped.
pub struct MockBackend {
    server: Arc<tiny_http::Server>,
    url: String,
    join: Option<thread::JoinHandle<()>>,
}

impl MockBackend {
    pub fn start<F>(respond: F) -> Self
    where
        F: Fn(&mut tiny_http::Request) -> MockResponse + Send + Sync + 'static,
    {
        let server = Arc::new(tiny_http::Server::http("127.0.0.1:0").expect("bind mock backend"));
        let addr = server.server_addr().to_ip().expect("mock backend ip addr");
        let worker = Arc::clone(&server);
        let join = thread::spawn(move || {
            for mut request in worker.incoming_requests() {
                let response = respond(&mut request);
                let _ = request.respond(response);
            }
        });
        Self {
            server,
            url: format!("http://{addr}"),
            join: Some(join),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

impl Drop for MockBackend {
    fn drop(&mut self) {
        self.server.unblock();
        if let Some(join) = self.join.take() {
            let _ = join.join();
        }
    }
}

pub fn json_response(status: u16, body: &serde_json::Value) -> MockResponse {
    tiny_http::Response::from_data(body.to_string().into_bytes())
        .with_status_code(status)
        .with_header(
            tiny_http::Header::from_bytes(&b"Content-Type"[..], &b"application/json"[..])
                .expect("header"),
        )
}

pub fn pdf_response(bytes: &[u8], filename: &str) -> MockResponse {
    let disposition = format!("attachment; filename={filename}");
    tiny_http::Response::from_data(bytes.to_vec())
        .with_status_code(200)
        .with_header(
            tiny_http::Header::from_bytes(&b"Content-Type"[..], &b"application/pdf"[..])
                .expect("header"),
        )
        .with_header(
            tiny_http::Header::from_bytes(&b"Content-Disposition"[..], disposition.as_bytes())
                .expect("header"),
        )
}

pub fn request_header(req: &tiny_http::Request, name: &'static str) -> Option<String> {
    req.headers()
        .iter()
        .find(|h| h.field.equiv(name))
        .map(|h| h.value.as_str().to_string())
}

pub fn read_body_json(req: &mut tiny_http::Request) -> serde_json::Value {
    let mut raw = String::new();
    let _ = req.as_reader().read_to_string(&mut raw);
    serde_json::from_str(&raw).unwrap_or(serde_json::Value::Null)
}

/// A running gateway wired to a backend URL, stopped on drop.
pub struct TestGateway {
    pub base_url: String,
    pub gateway: Arc<Gateway>,
    handle: Option<ServerHandle>,
}

impl TestGateway {
    pub fn config_for(backend_url: &str) -> GatewayConfig {
        let mut config = GatewayConfig::default();
        config.addr = format!("127.0.0.1:{}", free_port());
        config.backend.base_url = backend_url.to_string();
        config.backend.connect_timeout_ms = 500;
        config.backend.read_timeout_ms = 1_000;
        config.auth.jwt_secret = TEST_SECRET.to_string();
        config.auth.leeway_secs = 0;
        config.session.ttl_secs = 60;
        config
    }

    pub fn start(backend_url: &str) -> Self {
        Self::start_with_config(Self::config_for(backend_url))
    }

    pub fn start_with_config(config: GatewayConfig) -> Self {
        setup_may_runtime();
        let addr = config.addr.clone();
        let gateway = Arc::new(Gateway::from_config(config).expect("gateway from config"));
        let service = GatewayService::new(Arc::clone(&gateway))
            .expect("build gateway service")
            .with_default_middleware();
        let handle = HttpServer(service).start(&addr).expect("start gateway");
        handle.wait_ready().expect("gateway ready");
        Self {
            base_url: format!("http://{addr}"),
            gateway,
            handle: Some(handle),
        }
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

impl Drop for TestGateway {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.stop();
        }
    }
}

/// Client with redirects disabled so 302s can be asserted directly.
pub fn client() -> reqwest::blocking::Client {
    reqwest::blocking::Client::builder()
        .redirect(reqwest::redirect::Policy::none())
        .timeout(Duration::from_secs(5))
        .build()
        .expect("build test client")
}

/// Extract the session cookie value from a response's Set-Cookie header.
pub fn session_cookie(response: &reqwest::blocking::Response) -> Option<String> {
    let set_cookie = response.headers().get(reqwest::header::SET_COOKIE)?;
    let raw = set_cookie.to_str().ok()?;
    let pair = raw.split(';').next()?;
    let mut parts = pair.splitn(2, '=');
    match (parts.next(), parts.next()) {
        (Some("sb_session"), Some(value)) => Some(value.to_string()),
        _ => None,
    }
}
