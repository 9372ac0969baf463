//! Convenience re-exports for common use.

pub use crate::auth::{
    CredentialBundle, FileStorage, KeyValueStorage, LoginErrorCode, LoginResponse, MemoryStorage,
    SessionManager, TokenStore,
};
pub use crate::config::SessionConfig;
pub use crate::error::{Result, SessionError};
pub use crate::http::{HttpRequest, HttpResponse, HttpTransport, ReqwestTransport};
pub use crate::interceptor::{AuthInterceptor, LoginRedirect, NoRedirect};
pub use crate::policy::AuthPolicy;
