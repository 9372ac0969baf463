//! Identity backend request and response shapes.

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use strum::{Display, EnumString};

use super::token::TokenPayload;

/// Body of `POST /api/auth/login`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LoginRequest {
    #[serde(rename = "email")]
    pub identifier: String,
    #[serde(rename = "password")]
    pub secret: String,
    pub app_slug: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
}

/// Fixed set of structural login failure codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum LoginErrorCode {
    InvalidCredentials,
    ClientRequired,
    ScopeNotAllowed,
    AppNotFound,
    ConfigMissing,
    OauthError,
    LoginInternal,
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoginSuccess {
    pub success: bool,
    pub token: TokenPayload,
    #[serde(default)]
    pub whoami: Value,
    #[serde(default)]
    pub allowed_scopes: Vec<String>,
    #[serde(default)]
    pub rid: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoginFailure {
    pub success: bool,
    pub code: LoginErrorCode,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub rid: String,
}

/// Login outcome, discriminated by the `success` flag.
///
/// A well-formed failure is a value, not an error.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum LoginResponse {
    Success(LoginSuccess),
    Failure(LoginFailure),
}

impl LoginResponse {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }

    pub fn failure_code(&self) -> Option<LoginErrorCode> {
        match self {
            Self::Failure(f) => Some(f.code),
            Self::Success(_) => None,
        }
    }

    pub fn rid(&self) -> &str {
        match self {
            Self::Success(s) => &s.rid,
            Self::Failure(f) => &f.rid,
        }
    }
}

impl<'de> Deserialize<'de> for LoginResponse {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        let success = value
            .get("success")
            .and_then(Value::as_bool)
            .ok_or_else(|| D::Error::missing_field("success"))?;
        if success {
            serde_json::from_value(value)
                .map(Self::Success)
                .map_err(D::Error::custom)
        } else {
            serde_json::from_value(value)
                .map(Self::Failure)
                .map_err(D::Error::custom)
        }
    }
}

/// Body of `POST /api/auth/refresh`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RefreshRequest {
    pub refresh_token: String,
}

/// Refresh response in either accepted shape.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum RefreshResponse {
    Wrapped { token: TokenPayload },
    Flat(TokenPayload),
}

impl RefreshResponse {
    pub fn into_token(self) -> TokenPayload {
        match self {
            Self::Wrapped { token } => token,
            Self::Flat(token) => token,
        }
    }
}

/// Body of `GET /api/auth/whoami`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct WhoAmIResponse {
    #[serde(default)]
    pub whoami: Option<Value>,
    #[serde(default)]
    pub allowed_scopes: Option<Vec<String>>,
}

/// Marker returned by operations whose only result is success.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Success {
    pub success: bool,
}

impl Success {
    pub const OK: Self = Self { success: true };
}
