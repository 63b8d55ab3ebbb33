//! Shared fixtures for the API integration tests.
#![allow(dead_code)]

use std::net::SocketAddr;

use axum::Router;
use axum::body::Body;
use axum::extract::ConnectInfo;
use axum::http::header::{CONTENT_TYPE, COOKIE, HOST, SET_COOKIE, USER_AGENT};
use axum::http::{HeaderMap, Method, Request, StatusCode};
use axum::response::Response;
use neothink_api::{ServerState, create_router};
use neothink_baas::{ClientFactory, MemoryBaas, User};
use neothink_core::Config;
use serde_json::Value;
use tower::ServiceExt;

pub const HUB: &str = "hub.example.com";
pub const UA: &str = "integration-tests/1.0";
/// Peer address of every request unless a test sets its own. It is a
/// trusted proxy, so tests can pick client addresses with `X-Forwarded-For`.
pub const PROXY: &str = "10.0.0.254:443";

pub fn proxy() -> SocketAddr {
    PROXY.parse().unwrap()
}

pub struct TestApp {
    pub baas: MemoryBaas,
    pub state: ServerState,
    pub router: Router,
}

pub struct TestResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Value,
}

impl TestResponse {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }
}

impl TestApp {
    pub fn new() -> Self {
        Self::with_config(Config::memory())
    }

    pub fn with_config(config: Config) -> Self {
        let baas = MemoryBaas::new();
        let clients = ClientFactory::memory(baas.clone());
        Self::with_clients(config, clients, baas)
    }

    /// `baas` is what [`TestApp::events`] and fixtures read; `clients` may
    /// route some traffic elsewhere.
    pub fn with_clients(mut config: Config, clients: ClientFactory, baas: MemoryBaas) -> Self {
        config.security.trusted_proxies.push(proxy().ip());
        let state = ServerState::with_clients(config, clients).expect("state");
        let router = create_router(state.clone());
        Self {
            baas,
            state,
            router,
        }
    }

    /// A seeded account and a live access token for it.
    pub fn user(&self, email: &str, role: &str) -> (User, String) {
        let user = self.baas.seed_user(email, "correct horse battery", role);
        let token = self.baas.issue_session(&user);
        (user, token)
    }

    pub async fn send(&self, request: Request<Body>) -> TestResponse {
        send_to(&self.router, request).await
    }

    pub async fn get(&self, path: &str, token: Option<&str>) -> TestResponse {
        self.send(request(Method::GET, HUB, path, token, None).body(Body::empty()).unwrap())
            .await
    }

    /// Fetch a fresh token and return `(token, cookie header value)`.
    pub async fn csrf(&self) -> (String, String) {
        let response = self.get("/api/csrf-token", None).await;
        assert_eq!(response.status, StatusCode::OK);
        let token = response.body["data"]["token"]
            .as_str()
            .expect("token")
            .to_string();
        let cookie = response
            .header(SET_COOKIE.as_str())
            .expect("cookie")
            .split(';')
            .next()
            .unwrap()
            .to_string();
        (token, cookie)
    }

    /// A state-changing request carrying a fresh CSRF token pair.
    pub async fn mutate(
        &self,
        method: Method,
        path: &str,
        token: Option<&str>,
        body: Value,
    ) -> TestResponse {
        let (csrf, cookie) = self.csrf().await;
        let request = request(method, HUB, path, token, Some((&csrf, &cookie)))
            .header(CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap();
        self.send(request).await
    }

    pub fn events(&self, event_type: &str) -> Vec<Value> {
        self.baas
            .rows(neothink_core::tables::SECURITY_EVENTS)
            .into_iter()
            .filter(|row| row["event_type"] == event_type)
            .collect()
    }
}

/// Send `request` through `router`, from [`PROXY`] unless the request
/// already carries a peer address.
pub async fn send_to(router: &Router, mut request: Request<Body>) -> TestResponse {
    if request.extensions().get::<ConnectInfo<SocketAddr>>().is_none() {
        request.extensions_mut().insert(ConnectInfo(proxy()));
    }
    let response = router.clone().oneshot(request).await.expect("infallible");
    read(response).await
}

pub async fn read(response: Response) -> TestResponse {
    let status = response.status();
    let headers = response.headers().clone();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body");
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    TestResponse {
        status,
        headers,
        body,
    }
}

pub fn request(
    method: Method,
    host: &str,
    path: &str,
    token: Option<&str>,
    csrf: Option<(&str, &str)>,
) -> axum::http::request::Builder {
    let mut builder = Request::builder()
        .method(method)
        .uri(path)
        .header(HOST, host)
        .header(USER_AGENT, UA);
    if let Some(token) = token {
        builder = builder.header("authorization", format!("Bearer {}", token));
    }
    if let Some((header_token, cookie)) = csrf {
        builder = builder
            .header("x-csrf-token", header_token)
            .header(COOKIE, cookie);
    }
    builder
}
