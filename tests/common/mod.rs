//! Shared utilities for integration testing.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use request_guard::config::GuardConfig;
use request_guard::http::{Collaborators, HttpServer};
use request_guard::lifecycle::Shutdown;
use request_guard::security::{
    BucketStore, Identity, IdentityError, IdentityVerifier, MailError, Mailer, MemoryBucketStore,
    RateBucket, SystemClock,
};
use tokio::net::TcpListener;

pub const ORIGIN: &str = "http://localhost:8080";
pub const CSRF_TOKEN: &str = "test-csrf-token-0123456789abcdef";
pub const WEBHOOK_SECRET: &str = "whsec_integration";

/// Identity provider fake: `good-token` is user-1, `outage` simulates a provider failure.
pub struct FakeIdentity;

#[async_trait]
impl IdentityVerifier for FakeIdentity {
    async fn verify(&self, token: &str) -> Result<Identity, IdentityError> {
        match token {
            "good-token" => Ok(Identity {
                subject: "user-1".into(),
            }),
            "outage" => Err(IdentityError::Unavailable("connection refused".into())),
            _ => Err(IdentityError::InvalidToken),
        }
    }
}

/// Mailer that records every send and can be switched to failing or slow.
#[derive(Default)]
pub struct RecordingMailer {
    pub resets: Mutex<Vec<String>>,
    pub contacts: Mutex<Vec<String>>,
    pub failing: AtomicBool,
    pub delay_ms: AtomicU64,
}

impl RecordingMailer {
    pub fn reset_count(&self) -> usize {
        self.resets.lock().unwrap().len()
    }

    pub fn contact_count(&self) -> usize {
        self.contacts.lock().unwrap().len()
    }

    async fn outcome(&self) -> Result<(), MailError> {
        let delay = self.delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }
        if self.failing.load(Ordering::SeqCst) {
            Err(MailError::Delivery("smtp timeout".into()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl Mailer for RecordingMailer {
    async fn send_password_reset(&self, email: &str, _redirect_to: &str) -> Result<(), MailError> {
        self.outcome().await?;
        self.resets.lock().unwrap().push(email.to_string());
        Ok(())
    }

    async fn send_contact_message(&self, _name: &str, email: &str, _message: &str) -> Result<(), MailError> {
        self.outcome().await?;
        self.contacts.lock().unwrap().push(email.to_string());
        Ok(())
    }
}

pub struct TestServer {
    pub addr: SocketAddr,
    pub mailer: Arc<RecordingMailer>,
    pub shutdown: Shutdown,
}

impl TestServer {
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.shutdown.trigger();
    }
}

/// Config used by most tests: webhook secret set, apex host redirected.
pub fn test_config() -> GuardConfig {
    let mut config = GuardConfig::default();
    config.site.alternate_hosts = vec!["example.test".into()];
    config.webhook.secret = WEBHOOK_SECRET.into();
    config
}

/// Bucket store that remembers every key written through it.
#[derive(Default)]
pub struct RecordingStore {
    inner: MemoryBucketStore,
    pub upserts: Arc<Mutex<Vec<String>>>,
}

impl BucketStore for RecordingStore {
    fn get(&self, key: &str) -> Option<RateBucket> {
        self.inner.get(key)
    }

    fn upsert(&mut self, key: &str, bucket: RateBucket) {
        self.upserts.lock().unwrap().push(key.to_string());
        self.inner.upsert(key, bucket);
    }

    fn sweep(&mut self, now_ms: u64) -> usize {
        self.inner.sweep(now_ms)
    }

    fn clear(&mut self) {
        self.inner.clear();
    }

    fn len(&self) -> usize {
        self.inner.len()
    }
}

/// Start the real server on an ephemeral port.
pub async fn spawn_server(config: GuardConfig) -> TestServer {
    spawn_server_with_mailer(config, RecordingMailer::default()).await
}

pub async fn spawn_server_with_mailer(config: GuardConfig, mailer: RecordingMailer) -> TestServer {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let mailer = Arc::new(mailer);
    let collaborators = Collaborators::new(Arc::new(SystemClock), Arc::new(FakeIdentity), mailer.clone());

    let shutdown = Shutdown::new();
    let server = HttpServer::new(config, collaborators);
    tokio::spawn(server.run(listener, shutdown.subscribe()));

    TestServer { addr, mailer, shutdown }
}

/// Client that reports redirects instead of following them.
pub fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .redirect(reqwest::redirect::Policy::none())
        .build()
        .unwrap()
}

/// A same-origin browser POST carrying a matching CSRF cookie and header.
pub fn browser_post(client: &reqwest::Client, url: String) -> reqwest::RequestBuilder {
    client
        .post(url)
        .header("origin", ORIGIN)
        .header("cookie", format!("csrf_token={}", CSRF_TOKEN))
        .header("x-csrf-token", CSRF_TOKEN)
}

/// Poll until `done` holds; detached work (mail delivery) finishes after the reply.
pub async fn eventually(done: impl Fn() -> bool) {
    for _ in 0..100 {
        if done() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert!(done(), "condition not reached within 2s");
}
