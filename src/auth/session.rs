use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde_json::{json, Value};

use super::store::{FileStorage, TokenStore};
use super::token::CredentialBundle;
use super::types::{
    LoginFailure, LoginRequest, LoginResponse, RefreshRequest, RefreshResponse, Success,
    WhoAmIResponse,
};
use crate::config::SessionConfig;
use crate::error::SessionError;
use crate::http::{error_for_status, HttpRequest, HttpResponse, HttpTransport, ReqwestTransport};
use crate::policy::{AuthPolicy, LOGIN_PATH, LOGOUT_PATH, REFRESH_PATH, WHOAMI_PATH};
use crate::util::clock::now_ms;
use crate::util::flag::BusyFlag;
use crate::util::retry::RetryPolicy;

pub const IAM_CLIENT_HEADER: &str = "X-IAM-Client";
pub const APP_ID_HEADER: &str = "X-App-Id";

/// Login, logout, identity hydration and token refresh against the identity backend.
///
/// Owns the refresh lock: at most one refresh call is in flight per manager,
/// and callers arriving while it is held fail immediately with
/// [`SessionError::RefreshInProgress`].
///
/// # Example
/// ```no_run
/// use std::sync::atomic::{AtomicU64, Ordering};
/// use std::sync::Arc;
/// use iam_session::auth::{MemoryStorage, SessionManager, TokenStore};
/// use iam_session::config::SessionConfig;
/// use iam_session::http::ReqwestTransport;
///
/// # async fn example() -> iam_session::error::Result<()> {
/// let config = SessionConfig::builder()
///     .iam_base_url("https://iam.example.com")
///     .app_slug("orders")
///     .build();
/// let store = TokenStore::new(Arc::new(MemoryStorage::new()));
/// let transport = Arc::new(ReqwestTransport::new(config.request_timeout())?);
/// let session = SessionManager::new(&config, store, transport);
///
/// let response = session.login("me@example.com", "secret", None).await?;
/// if response.is_success() {
///     session.load_identity(None, None).await?;
/// }
/// # Ok(())
/// # }
/// ```
pub struct SessionManager {
    policy: AuthPolicy,
    app_slug: String,
    near_expiry_threshold_secs: u64,
    retry: RetryPolicy,
    store: TokenStore,
    transport: Arc<dyn HttpTransport>,
    refresh_lock: BusyFlag,
    /// Bumped whenever local state is cleared.
    logout_generation: AtomicU64,
}

impl std::fmt::Debug for SessionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionManager")
            .field("policy", &self.policy)
            .field("app_slug", &self.app_slug)
            .field("retry", &self.retry)
            .field("refreshing", &self.refresh_lock.is_held())
            .finish_non_exhaustive()
    }
}

impl SessionManager {
    pub fn new(config: &SessionConfig, store: TokenStore, transport: Arc<dyn HttpTransport>) -> Self {
        Self {
            policy: config.policy(),
            app_slug: config.app_slug.clone(),
            near_expiry_threshold_secs: config.near_expiry_threshold_secs,
            retry: config.refresh_retry.clone(),
            store,
            transport,
            refresh_lock: BusyFlag::new(),
            logout_generation: AtomicU64::new(0),
        }
    }

    /// File-backed store under the configured directory and a reqwest transport.
    pub fn from_config(config: &SessionConfig) -> Result<Self, SessionError> {
        config.validate()?;
        let storage = FileStorage::new(config.resolved_storage_dir());
        let store = TokenStore::new(Arc::new(storage));
        let transport = Arc::new(ReqwestTransport::new(config.request_timeout())?);
        Ok(Self::new(config, store, transport))
    }

    pub fn policy(&self) -> &AuthPolicy {
        &self.policy
    }

    pub fn store(&self) -> &TokenStore {
        &self.store
    }

    pub fn near_expiry_threshold_secs(&self) -> u64 {
        self.near_expiry_threshold_secs
    }

    /// Submit credentials. A well-formed failure is returned as a value.
    pub async fn login(
        &self,
        identifier: &str,
        secret: &str,
        scope: Option<&str>,
    ) -> Result<LoginResponse, SessionError> {
        let body = LoginRequest {
            identifier: identifier.to_string(),
            secret: secret.to_string(),
            app_slug: self.app_slug.clone(),
            scope: scope
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string),
        };
        let request =
            HttpRequest::post(self.policy.iam_url(LOGIN_PATH)).with_json(serde_json::to_value(&body)?);
        let response = self.send(request).await?;

        if !response.is_success() {
            if let Ok(failure) = serde_json::from_str::<LoginFailure>(&response.body) {
                if !failure.success {
                    tracing::info!(code = %failure.code, status = response.status, "login rejected");
                    return Ok(LoginResponse::Failure(failure));
                }
            }
            return Err(SessionError::api(response.status, &response.body));
        }

        let parsed: LoginResponse = response.json()?;
        match &parsed {
            LoginResponse::Success(ok) if !ok.token.access_token.is_empty() => {
                let bundle = ok.token.clone().into_bundle(None, now_ms());
                self.store.write_bundle(&bundle)?;
                tracing::info!(
                    rid = %ok.rid,
                    expires_in = ?ok.token.expires_in,
                    "login succeeded"
                );
            }
            LoginResponse::Success(ok) => {
                tracing::warn!(rid = %ok.rid, "login succeeded without an access token");
            }
            LoginResponse::Failure(failure) => {
                tracing::info!(code = %failure.code, rid = %failure.rid, "login rejected");
            }
        }
        Ok(parsed)
    }

    /// Fetch whoami and scopes, optionally scoped to a client and app, and cache them.
    pub async fn load_identity(
        &self,
        client_id: Option<u64>,
        app_id: Option<u64>,
    ) -> Result<Success, SessionError> {
        let mut request = HttpRequest::get(self.policy.iam_url(WHOAMI_PATH));
        if let Some(client_id) = client_id {
            request = request.with_header(IAM_CLIENT_HEADER, client_id.to_string());
        }
        if let Some(app_id) = app_id {
            request = request.with_header(APP_ID_HEADER, app_id.to_string());
        }

        let response = error_for_status(self.send(request).await?)?;
        let identity: WhoAmIResponse = response.json()?;
        let whoami = identity.whoami.unwrap_or_else(|| json!({}));
        let scopes = identity.allowed_scopes.unwrap_or_default();
        self.store.write_identity(&whoami, &scopes)?;
        tracing::debug!(scopes = scopes.len(), "identity cached");
        Ok(Success::OK)
    }

    /// End the session. Local state is always cleared, after the optional
    /// backend revoke call settles; this never fails.
    pub async fn logout(&self, call_backend: bool) {
        if call_backend {
            let request = HttpRequest::post(self.policy.iam_url(LOGOUT_PATH)).with_json(json!({}));
            match self.send(request).await.and_then(error_for_status) {
                Ok(_) => tracing::debug!("backend session revoked"),
                Err(e) => tracing::warn!(error = %e, "backend logout failed; clearing local session anyway"),
            }
        }
        self.clear();
        tracing::info!("session cleared");
    }

    /// Exchange the stored refresh token for a new bundle.
    ///
    /// Transport failures are retried per the configured [`RetryPolicy`].
    /// The lock is held across all attempts and released on every exit path.
    /// A refresh that settles after the session was cleared is discarded.
    pub async fn refresh(&self) -> Result<CredentialBundle, SessionError> {
        let refresh_token = self
            .store
            .read_bundle()
            .and_then(|b| b.refresh_token)
            .filter(|t| !t.is_empty())
            .ok_or(SessionError::NoRefreshToken)?;
        let _guard = self
            .refresh_lock
            .try_acquire()
            .ok_or(SessionError::RefreshInProgress)?;
        let generation = self.logout_generation.load(Ordering::Acquire);

        let body = serde_json::to_value(RefreshRequest {
            refresh_token: refresh_token.clone(),
        })?;
        let request = HttpRequest::post(self.policy.iam_url(REFRESH_PATH)).with_json(body);

        let response = self
            .retry
            .execute(
                || {
                    let request = request.clone();
                    async move { error_for_status(self.transport.send(request).await?) }
                },
                SessionError::is_transport,
            )
            .await
            .inspect_err(|e| tracing::warn!(error = %e, "token refresh failed"))?;

        let token = response.json::<RefreshResponse>()?.into_token();
        if token.access_token.is_empty() {
            return Err(SessionError::RefreshFailed(
                "response carried no access token".to_string(),
            ));
        }
        if token.expires_in.is_none() {
            return Err(SessionError::RefreshFailed(
                "response carried no expires_in".to_string(),
            ));
        }
        if self.logout_generation.load(Ordering::Acquire) != generation {
            tracing::info!("session cleared during refresh; discarding new token");
            return Err(SessionError::RefreshFailed(
                "session ended while refreshing".to_string(),
            ));
        }
        let bundle = token.into_bundle(Some(refresh_token), now_ms());
        self.store.write_bundle(&bundle)?;
        tracing::info!(expires_in = ?bundle.expires_in, "token refreshed");
        Ok(bundle)
    }

    pub fn is_refreshing(&self) -> bool {
        self.refresh_lock.is_held()
    }

    pub fn is_authenticated(&self) -> bool {
        self.store.access_token().is_some()
    }

    pub fn access_token(&self) -> Option<String> {
        self.store.access_token()
    }

    pub fn ms_left(&self) -> i64 {
        self.store.ms_until_expiry()
    }

    pub fn is_near_expiry(&self, threshold_secs: u64) -> bool {
        self.store.is_near_expiry(threshold_secs)
    }

    pub fn raw_bundle(&self) -> Option<CredentialBundle> {
        self.store.read_bundle()
    }

    pub fn has_scope(&self, scope: &str) -> bool {
        self.store.has_scope(scope)
    }

    pub fn whoami(&self) -> Value {
        self.store.whoami()
    }

    pub fn scopes(&self) -> Vec<String> {
        self.store.scopes()
    }

    /// Clear local state without contacting the backend.
    pub fn clear(&self) {
        self.logout_generation.fetch_add(1, Ordering::AcqRel);
        self.store.clear();
    }

    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, SessionError> {
        let token = self.store.access_token();
        let method = request.method.clone();
        let request = self.policy.attach_if_required(&request, token.as_deref(), &method);
        self.transport.send(request).await
    }
}
