//! iam-session — client-side IAM session manager
//!
//! Keeps a bearer credential bundle for an identity backend, attaches it to
//! requests bound for a protected backend, refreshes it before it expires,
//! and recovers from `401` responses with a single refresh-and-retry cycle.
//!
//! # Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use iam_session::prelude::*;
//!
//! # async fn example() -> iam_session::error::Result<()> {
//! let config = SessionConfig::from_env();
//! let session = Arc::new(SessionManager::from_config(&config)?);
//! let transport = Arc::new(ReqwestTransport::new(config.request_timeout())?);
//! let client = AuthInterceptor::new(session.clone(), transport, Arc::new(NoRedirect));
//!
//! session.login("me@example.com", "secret", None).await?;
//! let url = format!("{}/orders", config.api_base_url);
//! let response = client.intercept(HttpRequest::get(url)).await?;
//! println!("{}", response.body);
//! # Ok(())
//! # }
//! ```

pub mod auth;
pub mod config;
pub mod error;
pub mod http;
pub mod interceptor;
pub mod policy;
pub mod prelude;
pub mod util;

#[cfg(feature = "cli")]
pub mod cli;
