//! Per-backend bearer credential policy.
//!
//! Decides from a request's URL and method whether it targets the protected
//! backend, whether it is a public identity endpoint, whether it is the
//! refresh call, and whether an `Authorization` header must be attached.

use crate::http::{HttpRequest, AUTHORIZATION};

/// Identity endpoints served without a bearer credential.
pub const DEFAULT_PUBLIC_PATHS: &[&str] = &[
    "/api/auth/login",
    "/api/auth/refresh",
    "/api/auth/register",
    "/api/auth/password/forgot",
    "/api/auth/password/reset",
    "/api/auth/verify",
];

pub const LOGIN_PATH: &str = "/api/auth/login";
pub const REFRESH_PATH: &str = "/api/auth/refresh";
pub const LOGOUT_PATH: &str = "/api/auth/logout";
pub const WHOAMI_PATH: &str = "/api/auth/whoami";

/// Stateless credential policy for one protected backend and one identity backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthPolicy {
    api_base: String,
    iam_base: String,
    public_endpoints: Vec<String>,
    refresh_endpoint: String,
}

impl AuthPolicy {
    /// Build a policy. Bases lose trailing slashes; public paths are joined
    /// onto the identity base.
    pub fn new<S: AsRef<str>>(api_base: &str, iam_base: &str, public_paths: &[S]) -> Self {
        let api_base = normalize_base(api_base);
        let iam_base = normalize_base(iam_base);
        let public_endpoints = public_paths
            .iter()
            .map(|p| format!("{iam_base}{}", p.as_ref()))
            .collect();
        let refresh_endpoint = format!("{iam_base}{REFRESH_PATH}");
        Self {
            api_base,
            iam_base,
            public_endpoints,
            refresh_endpoint,
        }
    }

    pub fn with_default_public_paths(api_base: &str, iam_base: &str) -> Self {
        Self::new(api_base, iam_base, DEFAULT_PUBLIC_PATHS)
    }

    pub fn api_base(&self) -> &str {
        &self.api_base
    }

    pub fn iam_base(&self) -> &str {
        &self.iam_base
    }

    /// Absolute URL of an identity backend path.
    pub fn iam_url(&self, path: &str) -> String {
        format!("{}{path}", self.iam_base)
    }

    pub fn is_protected(&self, url: &str) -> bool {
        belongs_to(&self.api_base, url)
    }

    pub fn is_identity(&self, url: &str) -> bool {
        belongs_to(&self.iam_base, url)
    }

    /// Prefix match: sub-paths of a public path are public too.
    pub fn is_public(&self, url: &str) -> bool {
        self.is_identity(url)
            && self
                .public_endpoints
                .iter()
                .any(|endpoint| url.starts_with(endpoint.as_str()))
    }

    pub fn requires_credential(&self, url: &str, method: &str) -> bool {
        if is_preflight(method) {
            return false;
        }
        if self.is_protected(url) {
            return true;
        }
        if self.is_identity(url) {
            return !self.is_public(url);
        }
        false
    }

    pub fn is_refresh_endpoint(&self, url: &str) -> bool {
        self.is_identity(url) && url.starts_with(self.refresh_endpoint.as_str())
    }

    /// Copy of `request` with a bearer credential when the policy requires one,
    /// otherwise an identical copy.
    pub fn attach_if_required(
        &self,
        request: &HttpRequest,
        token: Option<&str>,
        method: &str,
    ) -> HttpRequest {
        match token {
            Some(token) if !token.is_empty() && self.requires_credential(&request.url, method) => {
                tracing::debug!(url = %request.url, "attaching bearer credential");
                request.with_header(AUTHORIZATION, format!("Bearer {token}"))
            }
            _ => request.clone(),
        }
    }
}

/// True iff `url` starts with `base`. An empty base matches nothing.
pub fn belongs_to(base: &str, url: &str) -> bool {
    !base.is_empty() && url.starts_with(base)
}

pub fn is_preflight(method: &str) -> bool {
    method.eq_ignore_ascii_case("OPTIONS")
}

pub fn normalize_base(base: &str) -> String {
    base.trim().trim_end_matches('/').to_string()
}
