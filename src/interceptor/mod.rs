//! Bearer credential interceptor with proactive and 401-driven refresh.
//!
//! Every outgoing request passes through [`AuthInterceptor::intercept`]:
//!
//! 1. The credential is attached according to [`AuthPolicy`](crate::policy::AuthPolicy).
//! 2. The identity refresh endpoint is forwarded untouched, so a refresh can
//!    never recurse into another refresh.
//! 3. Protected requests whose token is near expiry refresh first and go out
//!    with the new token.
//! 4. A 401 from the protected backend triggers at most one refresh and one
//!    retry. Any failure after that ends the session.

use std::sync::Arc;

use async_trait::async_trait;

use crate::auth::SessionManager;
use crate::error::SessionError;
use crate::http::{error_for_status, HttpRequest, HttpResponse, HttpTransport};
use crate::util::flag::BusyFlag;

/// Navigation hook invoked when the session ends for good.
pub trait LoginRedirect: Send + Sync {
    fn redirect_to_login(&self);
}

impl<F> LoginRedirect for F
where
    F: Fn() + Send + Sync,
{
    fn redirect_to_login(&self) {
        self()
    }
}

/// Redirect hook that does nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoRedirect;

impl LoginRedirect for NoRedirect {
    fn redirect_to_login(&self) {}
}

/// Applies session policy in front of another [`HttpTransport`].
pub struct AuthInterceptor {
    session: Arc<SessionManager>,
    next: Arc<dyn HttpTransport>,
    redirect: Arc<dyn LoginRedirect>,
    refreshing: BusyFlag,
    near_expiry_threshold_secs: u64,
}

impl AuthInterceptor {
    pub fn new(
        session: Arc<SessionManager>,
        next: Arc<dyn HttpTransport>,
        redirect: Arc<dyn LoginRedirect>,
    ) -> Self {
        let near_expiry_threshold_secs = session.near_expiry_threshold_secs();
        Self {
            session,
            next,
            redirect,
            refreshing: BusyFlag::new(),
            near_expiry_threshold_secs,
        }
    }

    pub fn with_near_expiry_threshold(mut self, secs: u64) -> Self {
        self.near_expiry_threshold_secs = secs;
        self
    }

    pub fn session(&self) -> &Arc<SessionManager> {
        &self.session
    }

    pub async fn intercept(&self, request: HttpRequest) -> Result<HttpResponse, SessionError> {
        let policy = self.session.policy();
        let method = request.method.clone();
        let token = self.session.access_token();
        let mut attached = policy.attach_if_required(&request, token.as_deref(), &method);

        if policy.is_refresh_endpoint(&request.url) {
            tracing::debug!(url = %request.url, "refresh endpoint; forwarding as-is");
            return self.forward(attached).await;
        }

        let protected = policy.is_protected(&request.url);
        let mut refreshed = false;

        if protected
            && token.is_some()
            && !self.refreshing.is_held()
            && self.session.is_near_expiry(self.near_expiry_threshold_secs)
        {
            if let Some(_guard) = self.refreshing.try_acquire() {
                tracing::debug!(url = %request.url, "token near expiry; refreshing before dispatch");
                match self.session.refresh().await {
                    Ok(_) => refreshed = true,
                    Err(e) if e.is_transient() => {
                        tracing::debug!("refresh already in flight; using the current token");
                    }
                    Err(e) => {
                        self.end_session(&e).await;
                        return Err(e);
                    }
                }
            }
            let token = self.session.access_token();
            attached = policy.attach_if_required(&request, token.as_deref(), &method);
        }

        let err = match self.forward(attached).await {
            Ok(response) => return Ok(response),
            Err(e) => e,
        };
        if !protected || !err.is_unauthorized() {
            return Err(err);
        }
        if refreshed {
            // refresh budget for this request is already spent
            self.end_session(&err).await;
            return Err(err);
        }

        let has_refresh_token = self
            .session
            .raw_bundle()
            .is_some_and(|b| b.has_refresh_token());
        let guard = if has_refresh_token {
            self.refreshing.try_acquire()
        } else {
            None
        };
        let Some(guard) = guard else {
            self.end_session(&err).await;
            return Err(err);
        };

        tracing::debug!(url = %request.url, "401 from protected backend; refreshing once");
        let refresh_result = self.session.refresh().await;
        drop(guard);
        if let Err(e) = refresh_result {
            self.end_session(&e).await;
            return Err(e);
        }

        let token = self.session.access_token();
        let retry = policy.attach_if_required(&request, token.as_deref(), &method);
        match self.forward(retry).await {
            Ok(response) => Ok(response),
            Err(e) => {
                self.end_session(&e).await;
                Err(e)
            }
        }
    }

    async fn forward(&self, request: HttpRequest) -> Result<HttpResponse, SessionError> {
        error_for_status(self.next.send(request).await?)
    }

    async fn end_session(&self, cause: &SessionError) {
        tracing::warn!(error = %cause, "session ended; redirecting to login");
        self.session.logout(false).await;
        self.redirect.redirect_to_login();
    }
}

#[async_trait]
impl HttpTransport for AuthInterceptor {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, SessionError> {
        self.intercept(request).await
    }
}
