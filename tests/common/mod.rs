#![allow(dead_code)]

use std::process::{Child, Command, Stdio};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use async_trait::async_trait;
use axum::{
    body::{to_bytes, Body},
    http::{header, HeaderMap, Method, Request, StatusCode},
    Router,
};
use parking_lot::Mutex;
use serde_json::Value;
use tower::ServiceExt;

use marquee_api::auth::authentication_ttl;
use marquee_api::config::{AppConfig, Environment};
use marquee_api::database::models::{Password, TokenScope, User};
use marquee_api::database::Repositories;
use marquee_api::mailer::{MailError, MailTransport, Mailer, Message};
use marquee_api::middleware::RateLimiter;
use marquee_api::server::{self, AppState};

/// Records every message instead of sending it.
#[derive(Default)]
pub struct CapturingTransport {
    pub messages: Mutex<Vec<Message>>,
}

#[async_trait]
impl MailTransport for CapturingTransport {
    async fn deliver(&self, message: &Message) -> Result<(), MailError> {
        self.messages.lock().push(message.clone());
        Ok(())
    }
}

pub fn test_config() -> AppConfig {
    let mut config = AppConfig::preset(Environment::Development);
    config.database.url = None;
    config.limiter.enabled = false;
    config.security.cors_trusted_origins = Vec::new();
    config
}

/// In-process application over the memory store.
pub struct TestApp {
    pub router: Router,
    pub state: AppState,
    pub mail: Arc<CapturingTransport>,
}

pub struct TestResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Value,
}

impl TestApp {
    pub fn new() -> Self {
        Self::build(None)
    }

    pub fn with_limiter(rps: f64, burst: u32) -> Self {
        Self::build(Some(Arc::new(RateLimiter::new(rps, burst))))
    }

    fn build(limiter: Option<Arc<RateLimiter>>) -> Self {
        let mail = Arc::new(CapturingTransport::default());
        let mailer = Mailer::new(mail.clone(), "Marquee <no-reply@marquee.local>");
        let state = AppState::new(test_config(), Repositories::memory(), mailer, None);
        let router = server::router(state.clone(), limiter);
        Self { router, state, mail }
    }

    pub async fn send(&self, request: Request<Body>) -> TestResponse {
        let response = self.router.clone().oneshot(request).await.expect("router is infallible");
        let status = response.status();
        let headers = response.headers().clone();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.expect("read body");
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).expect("response body is JSON")
        };
        TestResponse { status, headers, body }
    }

    pub async fn request(&self, method: Method, uri: &str, token: Option<&str>, body: Option<Value>) -> TestResponse {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
        }
        let body = match body {
            Some(json) => {
                builder = builder.header(header::CONTENT_TYPE, "application/json");
                Body::from(json.to_string())
            }
            None => Body::empty(),
        };
        self.send(builder.body(body).expect("valid request")).await
    }

    pub async fn get(&self, uri: &str, token: Option<&str>) -> TestResponse {
        self.request(Method::GET, uri, token, None).await
    }

    /// Inserts a user directly (low bcrypt cost) with the given state and
    /// permissions, and returns it with a fresh authentication token.
    pub async fn user_with_token(&self, email: &str, activated: bool, permissions: &[&str]) -> (User, String) {
        let hash = bcrypt::hash("pa55word1234", 4).expect("hash");
        let mut user = User::new("Test User".into(), email.into(), Password::from_hash(hash.into_bytes()));
        user.activated = activated;
        let user = self.state.repos.users.insert(user).await.expect("insert user");
        if !permissions.is_empty() {
            self.state
                .repos
                .permissions
                .add_for_user(user.id, permissions)
                .await
                .expect("grant permissions");
        }
        let token = self
            .state
            .tokens
            .issue(user.id, authentication_ttl(), TokenScope::Authentication)
            .await
            .expect("issue token");
        (user, token.plaintext)
    }

    /// Waits for the welcome mail to `recipient` and pulls the activation
    /// token out of its body.
    pub async fn activation_token_for(&self, recipient: &str) -> Result<String> {
        let deadline = Instant::now() + Duration::from_secs(5);
        loop {
            let found = self
                .mail
                .messages
                .lock()
                .iter()
                .find(|m| m.to == recipient)
                .map(|m| m.text.clone());
            if let Some(text) = found {
                let start = text.find("{\"token\": \"").context("no token in mail")? + "{\"token\": \"".len();
                return Ok(text[start..start + 26].to_string());
            }
            if Instant::now() > deadline {
                anyhow::bail!("no welcome mail for {}", recipient);
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    }
}

/// The real binary on a free port, over the memory store.
pub struct TestServer {
    pub port: u16,
    pub base_url: String,
    child: Child,
}

impl TestServer {
    pub fn spawn() -> Result<Self> {
        let port = portpicker::pick_unused_port().context("failed to pick free port")?;
        let base_url = format!("http://127.0.0.1:{}", port);

        let child = Command::new(env!("CARGO_BIN_EXE_marquee-api"))
            .env("PORT", port.to_string())
            .env("APP_ENV", "development")
            .env("DATABASE_URL", "")
            .env("SMTP_HOST", "")
            .env("LIMITER_ENABLED", "false")
            .env("CORS_TRUSTED_ORIGINS", "")
            .stdin(Stdio::null())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .spawn()
            .context("failed to spawn server binary")?;

        Ok(Self { port, base_url, child })
    }

    pub async fn wait_ready(&self, timeout: Duration) -> Result<()> {
        let client = reqwest::Client::new();
        let deadline = Instant::now() + timeout;
        let url = format!("{}/v1/healthcheck", self.base_url);
        while Instant::now() < deadline {
            if let Ok(resp) = client.get(&url).send().await {
                if resp.status() == reqwest::StatusCode::OK {
                    return Ok(());
                }
            }
            tokio::time::sleep(Duration::from_millis(150)).await;
        }
        anyhow::bail!("server did not become ready on {} within {:?}", self.base_url, timeout)
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}
