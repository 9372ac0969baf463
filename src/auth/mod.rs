//! Credential storage, identity backend wire types and the session manager.

pub mod session;
pub mod store;
pub mod token;
pub mod types;

pub use session::SessionManager;
pub use store::{FileStorage, KeyValueStorage, MemoryStorage, TokenStore};
pub use token::{CredentialBundle, TokenPayload};
pub use types::{LoginErrorCode, LoginFailure, LoginResponse, LoginSuccess, Success};
