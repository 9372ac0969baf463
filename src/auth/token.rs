use serde::{Deserialize, Serialize};

/// Credential bundle persisted by the token store.
///
/// `expiry_absolute` is the only time value compared against "now"; it is
/// stored under `exp_abs`, the key existing sessions were written with.
///
/// # Example
/// ```
/// use iam_session::auth::CredentialBundle;
///
/// let bundle = CredentialBundle::issued(
///     "Bearer",
///     3600,
///     "access",
///     Some("refresh".to_string()),
///     1_700_000_000_000,
/// );
/// assert_eq!(bundle.expiry_absolute, Some(1_700_003_600_000));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CredentialBundle {
    #[serde(default)]
    pub token_type: String,
    #[serde(default)]
    pub expires_in: Option<i64>,
    pub access_token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    #[serde(rename = "exp_abs", default, skip_serializing_if = "Option::is_none")]
    pub expiry_absolute: Option<i64>,
}

impl CredentialBundle {
    /// Bundle issued at `now_ms`, with its absolute expiry computed once.
    pub fn issued(
        token_type: impl Into<String>,
        expires_in: i64,
        access_token: impl Into<String>,
        refresh_token: Option<String>,
        now_ms: i64,
    ) -> Self {
        Self {
            token_type: token_type.into(),
            expires_in: Some(expires_in),
            access_token: access_token.into(),
            refresh_token,
            expiry_absolute: Some(expiry_from(now_ms, expires_in)),
        }
    }

    /// Fill a missing absolute expiry from `expires_in`.
    ///
    /// Returns true when the bundle changed and must be persisted again.
    pub fn backfill_expiry(&mut self, now_ms: i64) -> bool {
        match (self.expiry_absolute, self.expires_in) {
            (None, Some(expires_in)) if expires_in != 0 => {
                self.expiry_absolute = Some(expiry_from(now_ms, expires_in));
                true
            }
            _ => false,
        }
    }

    /// Milliseconds until expiry, never negative; `0` when unknown.
    pub fn ms_until_expiry(&self, now_ms: i64) -> i64 {
        self.expiry_absolute
            .map(|exp| (exp - now_ms).max(0))
            .unwrap_or(0)
    }

    pub fn has_refresh_token(&self) -> bool {
        self.refresh_token.as_deref().is_some_and(|t| !t.is_empty())
    }
}

/// Token object as returned by the identity backend on login and refresh.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenPayload {
    #[serde(default)]
    pub token_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_in: Option<i64>,
    #[serde(default)]
    pub access_token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
}

impl TokenPayload {
    /// Bundle for this payload issued at `now_ms`.
    ///
    /// `previous_refresh` is carried forward when the payload omits one.
    /// Without `expires_in` the expiry stays unknown.
    pub fn into_bundle(self, previous_refresh: Option<String>, now_ms: i64) -> CredentialBundle {
        let refresh_token = self
            .refresh_token
            .filter(|t| !t.is_empty())
            .or(previous_refresh);
        CredentialBundle {
            token_type: self.token_type,
            expires_in: self.expires_in,
            access_token: self.access_token,
            refresh_token,
            expiry_absolute: self.expires_in.map(|secs| expiry_from(now_ms, secs)),
        }
    }
}

fn expiry_from(now_ms: i64, expires_in: i64) -> i64 {
    now_ms.saturating_add(expires_in.saturating_mul(1000))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn serializes_expiry_under_legacy_key() {
        let bundle = CredentialBundle::issued("Bearer", 60, "a", None, 1_000);
        let json = serde_json::to_value(&bundle).unwrap();
        assert_eq!(json["exp_abs"], 61_000);
        assert!(json.get("expiry_absolute").is_none());
        assert!(json.get("refresh_token").is_none());
    }

    #[test]
    fn reads_exp_abs_and_ignores_other_expiry_keys() {
        let bundle: CredentialBundle = serde_json::from_str(
            r#"{"access_token":"a","expires_in":60,"exp_abs":7,"expiry_absolute":5}"#,
        )
        .unwrap();
        assert_eq!(bundle.expiry_absolute, Some(7));

        let unkeyed: CredentialBundle =
            serde_json::from_str(r#"{"access_token":"a","expiry_absolute":5}"#).unwrap();
        assert_eq!(unkeyed.expiry_absolute, None);
    }

    #[test]
    fn backfill_only_when_missing() {
        let mut legacy: CredentialBundle =
            serde_json::from_str(r#"{"token_type":"Bearer","expires_in":30,"access_token":"a"}"#)
                .unwrap();
        assert!(legacy.backfill_expiry(10_000));
        assert_eq!(legacy.expiry_absolute, Some(40_000));
        assert!(!legacy.backfill_expiry(99_000));
        assert_eq!(legacy.expiry_absolute, Some(40_000));

        let mut unknown: CredentialBundle =
            serde_json::from_str(r#"{"access_token":"a"}"#).unwrap();
        assert!(!unknown.backfill_expiry(10_000));
        assert_eq!(unknown.expiry_absolute, None);
    }

    #[test]
    fn ms_until_expiry_clamps_at_zero() {
        let now = 1_000_000;
        let mut bundle = CredentialBundle::issued("Bearer", 0, "a", None, now);
        bundle.expiry_absolute = Some(now - 5000);
        assert_eq!(bundle.ms_until_expiry(now), 0);
        bundle.expiry_absolute = None;
        assert_eq!(bundle.ms_until_expiry(now), 0);
        bundle.expiry_absolute = Some(now + 1234);
        assert_eq!(bundle.ms_until_expiry(now), 1234);
    }

    #[test]
    fn payload_carries_previous_refresh_token_forward() {
        let payload = TokenPayload {
            token_type: "Bearer".to_string(),
            expires_in: Some(120),
            access_token: "new".to_string(),
            refresh_token: None,
        };
        let bundle = payload.into_bundle(Some("old-refresh".to_string()), 0);
        assert_eq!(bundle.refresh_token.as_deref(), Some("old-refresh"));
        assert_eq!(bundle.expiry_absolute, Some(120_000));

        let rotated = TokenPayload {
            token_type: "Bearer".to_string(),
            expires_in: Some(120),
            access_token: "new".to_string(),
            refresh_token: Some("rotated".to_string()),
        };
        let bundle = rotated.into_bundle(Some("old-refresh".to_string()), 0);
        assert_eq!(bundle.refresh_token.as_deref(), Some("rotated"));
    }

    #[test]
    fn payload_without_lifetime_has_unknown_expiry() {
        let payload: TokenPayload = serde_json::from_str(r#"{"access_token":"a"}"#).unwrap();
        assert_eq!(payload.expires_in, None);
        let bundle = payload.into_bundle(None, 1_000);
        assert_eq!(bundle.expires_in, None);
        assert_eq!(bundle.expiry_absolute, None);
    }
}
