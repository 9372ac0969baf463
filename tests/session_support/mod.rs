#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use iam_session::auth::{CredentialBundle, MemoryStorage, SessionManager, TokenStore};
use iam_session::config::SessionConfig;
use iam_session::error::SessionError;
use iam_session::http::{HttpRequest, HttpResponse, HttpTransport, ReqwestTransport};
use iam_session::interceptor::LoginRedirect;
use iam_session::util::clock::now_ms;
use iam_session::util::retry::RetryPolicy;
use serde_json::json;
use tokio::sync::Notify;

pub const IAM: &str = "https://iam.test";
pub const API: &str = "https://api.test";

/// One canned reply for a URL.
pub enum Reply {
    Respond(HttpResponse),
    /// Wait for the notify, then respond.
    Gated(Arc<Notify>, HttpResponse),
}

/// A request seen by [`ScriptedTransport`], with the paused-clock instant it arrived.
#[derive(Debug, Clone)]
pub struct Seen {
    pub request: HttpRequest,
    pub at: tokio::time::Instant,
}

/// In-memory transport answering from per-URL reply queues.
///
/// Unscripted URLs get a 404.
#[derive(Default)]
pub struct ScriptedTransport {
    replies: Mutex<HashMap<String, VecDeque<Reply>>>,
    seen: Mutex<Vec<Seen>>,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, url: &str, reply: Reply) {
        self.replies
            .lock()
            .expect("replies lock poisoned")
            .entry(url.to_string())
            .or_default()
            .push_back(reply);
    }

    pub fn respond(&self, url: &str, status: u16, body: serde_json::Value) {
        self.push(url, Reply::Respond(HttpResponse::new(status, body.to_string())));
    }

    pub fn seen(&self) -> Vec<Seen> {
        self.seen.lock().expect("seen lock poisoned").clone()
    }

    pub fn calls_to(&self, url: &str) -> Vec<Seen> {
        self.seen()
            .into_iter()
            .filter(|s| s.request.url == url)
            .collect()
    }
}

#[async_trait]
impl HttpTransport for ScriptedTransport {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, SessionError> {
        self.seen.lock().expect("seen lock poisoned").push(Seen {
            request: request.clone(),
            at: tokio::time::Instant::now(),
        });
        let reply = self
            .replies
            .lock()
            .expect("replies lock poisoned")
            .get_mut(&request.url)
            .and_then(VecDeque::pop_front);
        match reply {
            Some(Reply::Respond(response)) => Ok(response),
            Some(Reply::Gated(notify, response)) => {
                notify.notified().await;
                Ok(response)
            }
            None => Ok(HttpResponse::new(404, "unscripted")),
        }
    }
}

/// Counts redirect signals.
#[derive(Default)]
pub struct RecordingRedirect {
    count: AtomicUsize,
}

impl RecordingRedirect {
    pub fn count(&self) -> usize {
        self.count.load(Ordering::SeqCst)
    }
}

impl LoginRedirect for RecordingRedirect {
    fn redirect_to_login(&self) {
        self.count.fetch_add(1, Ordering::SeqCst);
    }
}

pub fn config(iam_base: &str, api_base: &str, retry: RetryPolicy) -> SessionConfig {
    SessionConfig::builder()
        .iam_base_url(iam_base)
        .api_base_url(api_base)
        .app_slug("orders-portal")
        .refresh_retry(retry)
        .build()
}

pub fn no_retry() -> RetryPolicy {
    RetryPolicy::none()
}

pub fn memory_session(
    config: &SessionConfig,
    transport: Arc<dyn HttpTransport>,
) -> (Arc<MemoryStorage>, Arc<SessionManager>) {
    let storage = Arc::new(MemoryStorage::new());
    let store = TokenStore::new(storage.clone());
    (storage, Arc::new(SessionManager::new(config, store, transport)))
}

pub fn reqwest_transport() -> Arc<ReqwestTransport> {
    Arc::new(ReqwestTransport::new(Duration::from_secs(5)).expect("reqwest client"))
}

/// Persist a bundle expiring `expires_in` seconds from now.
pub fn seed_bundle(session: &SessionManager, access: &str, refresh: Option<&str>, expires_in: i64) {
    let bundle = CredentialBundle::issued(
        "Bearer",
        expires_in,
        access,
        refresh.map(String::from),
        now_ms(),
    );
    session.store().write_bundle(&bundle).expect("seed bundle");
}

pub fn token_json(access: &str, refresh: Option<&str>, expires_in: i64) -> serde_json::Value {
    let mut token = json!({
        "token_type": "Bearer",
        "expires_in": expires_in,
        "access_token": access,
    });
    if let Some(refresh) = refresh {
        token["refresh_token"] = json!(refresh);
    }
    token
}
