use std::collections::HashMap;
use std::fs;
use std::io::Write;
#[cfg(unix)]
use std::os::unix::fs::OpenOptionsExt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use serde::de::DeserializeOwned;
use serde_json::Value;

use super::token::CredentialBundle;
use crate::error::SessionError;
use crate::util::clock::now_ms;

pub const BUNDLE_KEY: &str = "iam_token";
pub const WHOAMI_KEY: &str = "iam_whoami";
pub const SCOPES_KEY: &str = "iam_allowed_scopes";

static TEMP_SEQ: AtomicU64 = AtomicU64::new(0);

/// Durable string-keyed storage.
pub trait KeyValueStorage: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>, SessionError>;
    fn set(&self, key: &str, value: &str) -> Result<(), SessionError>;
    /// Removing a missing key is not an error.
    fn remove(&self, key: &str) -> Result<(), SessionError>;
}

/// In-process storage, for tests and embedding.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.lock().map(|e| e.contains_key(key)).unwrap_or(false)
    }

    pub fn len(&self) -> usize {
        self.lock().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, HashMap<String, String>>, SessionError> {
        self.entries
            .lock()
            .map_err(|_| SessionError::Storage("memory storage lock poisoned".to_string()))
    }
}

impl KeyValueStorage for MemoryStorage {
    fn get(&self, key: &str) -> Result<Option<String>, SessionError> {
        Ok(self.lock()?.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), SessionError> {
        self.lock()?.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), SessionError> {
        self.lock()?.remove(key);
        Ok(())
    }
}

/// File-backed storage: one JSON file per key under a directory.
///
/// # Example
/// ```no_run
/// use iam_session::auth::{FileStorage, KeyValueStorage};
///
/// let storage = FileStorage::new("/tmp/iam-session");
/// storage.set("iam_token", "{}")?;
/// # Ok::<(), iam_session::error::SessionError>(())
/// ```
#[derive(Debug, Clone)]
pub struct FileStorage {
    base_dir: PathBuf,
}

impl FileStorage {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    fn key_path(&self, key: &str) -> Result<PathBuf, SessionError> {
        let valid = !key.is_empty()
            && key
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
        if !valid {
            return Err(SessionError::Storage(format!("invalid storage key: {key:?}")));
        }
        Ok(self.base_dir.join(format!("{key}.json")))
    }
}

impl KeyValueStorage for FileStorage {
    fn get(&self, key: &str) -> Result<Option<String>, SessionError> {
        let path = self.key_path(key)?;
        match fs::read_to_string(&path) {
            Ok(data) => Ok(Some(data)),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(SessionError::Io(err)),
        }
    }

    /// Replaces the entry through a temp file and rename, so readers never
    /// see a partial value.
    fn set(&self, key: &str, value: &str) -> Result<(), SessionError> {
        let path = self.key_path(key)?;
        fs::create_dir_all(&self.base_dir)?;
        let seq = TEMP_SEQ.fetch_add(1, Ordering::Relaxed);
        let temp_path = self
            .base_dir
            .join(format!(".{key}.{}-{seq}.tmp", std::process::id()));
        let written =
            write_private(&temp_path, value.as_bytes()).and_then(|()| fs::rename(&temp_path, &path));
        if let Err(err) = written {
            let _ = fs::remove_file(&temp_path);
            return Err(SessionError::Io(err));
        }
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), SessionError> {
        let path = self.key_path(key)?;
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(SessionError::Io(err)),
        }
    }
}

/// Write `data` to a fresh owner-only file.
fn write_private(path: &Path, data: &[u8]) -> std::io::Result<()> {
    let mut options = fs::OpenOptions::new();
    options.write(true).create_new(true);
    #[cfg(unix)]
    options.mode(0o600);
    let mut file = options.open(path)?;
    file.write_all(data)?;
    file.sync_all()
}

/// Single source of truth for the credential bundle and cached identity.
///
/// Reads never fail: missing or unparseable entries read as "no session".
#[derive(Clone)]
pub struct TokenStore {
    storage: Arc<dyn KeyValueStorage>,
}

impl std::fmt::Debug for TokenStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenStore").finish_non_exhaustive()
    }
}

impl TokenStore {
    pub fn new(storage: Arc<dyn KeyValueStorage>) -> Self {
        Self { storage }
    }

    pub fn storage(&self) -> &Arc<dyn KeyValueStorage> {
        &self.storage
    }

    /// Current bundle, backfilling and persisting a missing absolute expiry.
    pub fn read_bundle(&self) -> Option<CredentialBundle> {
        let mut bundle: CredentialBundle = self.read_json(BUNDLE_KEY)?;
        if bundle.backfill_expiry(now_ms()) {
            tracing::debug!("backfilled missing absolute expiry on stored bundle");
            if let Err(e) = self.write_bundle(&bundle) {
                tracing::warn!(error = %e, "failed to persist backfilled bundle");
            }
        }
        Some(bundle)
    }

    pub fn write_bundle(&self, bundle: &CredentialBundle) -> Result<(), SessionError> {
        let serialized = serde_json::to_string(bundle)?;
        self.storage.set(BUNDLE_KEY, &serialized)
    }

    /// Remove bundle, whoami and scopes. Idempotent.
    pub fn clear(&self) {
        for key in [BUNDLE_KEY, WHOAMI_KEY, SCOPES_KEY] {
            if let Err(e) = self.storage.remove(key) {
                tracing::warn!(key, error = %e, "failed to remove session entry");
            }
        }
    }

    pub fn access_token(&self) -> Option<String> {
        self.read_bundle()
            .map(|b| b.access_token)
            .filter(|t| !t.is_empty())
    }

    /// Milliseconds left; `0` when no bundle or expiry is known.
    pub fn ms_until_expiry(&self) -> i64 {
        self.read_bundle()
            .map(|b| b.ms_until_expiry(now_ms()))
            .unwrap_or(0)
    }

    /// True iff a bundle with known expiry has at most `threshold_secs` left.
    pub fn is_near_expiry(&self, threshold_secs: u64) -> bool {
        let Some(bundle) = self.read_bundle() else {
            return false;
        };
        if bundle.expiry_absolute.is_none() {
            return false;
        }
        let threshold_ms = i64::try_from(threshold_secs.saturating_mul(1000)).unwrap_or(i64::MAX);
        bundle.ms_until_expiry(now_ms()) <= threshold_ms
    }

    pub fn write_identity(&self, whoami: &Value, scopes: &[String]) -> Result<(), SessionError> {
        self.storage.set(WHOAMI_KEY, &serde_json::to_string(whoami)?)?;
        self.storage.set(SCOPES_KEY, &serde_json::to_string(scopes)?)
    }

    /// Cached whoami record; an empty object when none.
    pub fn whoami(&self) -> Value {
        self.read_json(WHOAMI_KEY)
            .unwrap_or_else(|| Value::Object(Default::default()))
    }

    pub fn scopes(&self) -> Vec<String> {
        self.read_json(SCOPES_KEY).unwrap_or_default()
    }

    pub fn has_scope(&self, scope: &str) -> bool {
        self.scopes().iter().any(|s| s == scope)
    }

    fn read_json<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let raw = match self.storage.get(key) {
            Ok(Some(raw)) => raw,
            Ok(None) => return None,
            Err(e) => {
                tracing::warn!(key, error = %e, "failed to read session entry");
                return None;
            }
        };
        match serde_json::from_str(&raw) {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::warn!(key, error = %e, "discarding unparseable session entry");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    fn memory_store() -> (Arc<MemoryStorage>, TokenStore) {
        let storage = Arc::new(MemoryStorage::new());
        (storage.clone(), TokenStore::new(storage))
    }

    fn bundle(expires_in: i64) -> CredentialBundle {
        CredentialBundle::issued(
            "Bearer",
            expires_in,
            "access",
            Some("refresh".to_string()),
            now_ms(),
        )
    }

    #[test]
    fn bundle_round_trip() {
        let (_storage, store) = memory_store();
        let original = bundle(3600);
        store.write_bundle(&original).unwrap();
        assert_eq!(store.read_bundle(), Some(original));
        assert_eq!(store.access_token().as_deref(), Some("access"));
    }

    #[test]
    fn legacy_bundle_is_backfilled_and_persisted() {
        let (storage, store) = memory_store();
        storage
            .set(
                BUNDLE_KEY,
                r#"{"token_type":"Bearer","expires_in":600,"access_token":"legacy"}"#,
            )
            .unwrap();

        let before = now_ms();
        let read = store.read_bundle().unwrap();
        let exp = read.expiry_absolute.unwrap();
        assert!(exp >= before + 600_000 && exp <= now_ms() + 600_000);

        let raw: Value = serde_json::from_str(&storage.get(BUNDLE_KEY).unwrap().unwrap()).unwrap();
        assert_eq!(raw["exp_abs"], exp);
        assert_eq!(store.read_bundle(), Some(read));
    }

    #[test]
    fn unparseable_bundle_reads_as_no_session() {
        let (storage, store) = memory_store();
        storage.set(BUNDLE_KEY, "{not json").unwrap();
        assert_eq!(store.read_bundle(), None);
        assert_eq!(store.access_token(), None);
        assert_eq!(store.ms_until_expiry(), 0);
        assert!(!store.is_near_expiry(60));
    }

    #[test]
    fn expired_bundle_reports_zero_and_near_expiry() {
        let (_storage, store) = memory_store();
        let mut expired = bundle(0);
        expired.expiry_absolute = Some(now_ms() - 5000);
        store.write_bundle(&expired).unwrap();
        assert_eq!(store.ms_until_expiry(), 0);
        assert!(store.is_near_expiry(0));
    }

    #[test]
    fn near_expiry_threshold() {
        let (_storage, store) = memory_store();
        store.write_bundle(&bundle(3600)).unwrap();
        assert!(!store.is_near_expiry(60));
        assert!(store.is_near_expiry(4000));
    }

    #[test]
    fn clear_removes_all_keys_and_is_idempotent() {
        let (storage, store) = memory_store();
        store.write_bundle(&bundle(60)).unwrap();
        store
            .write_identity(&serde_json::json!({"id": 7}), &["read".to_string()])
            .unwrap();
        assert_eq!(storage.len(), 3);

        store.clear();
        assert!(storage.is_empty());
        store.clear();
        assert!(storage.is_empty());
    }

    #[test]
    fn identity_cache_defaults() {
        let (_storage, store) = memory_store();
        assert_eq!(store.whoami(), serde_json::json!({}));
        assert!(store.scopes().is_empty());
        store
            .write_identity(
                &serde_json::json!({"id": 1, "email": "a@b.c"}),
                &["orders:read".to_string(), "orders:write".to_string()],
            )
            .unwrap();
        assert_eq!(store.whoami()["email"], "a@b.c");
        assert!(store.has_scope("orders:read"));
        assert!(!store.has_scope("orders"));
    }

    #[test]
    fn file_storage_round_trip_and_remove() {
        let dir = TempDir::new().unwrap();
        let storage = FileStorage::new(dir.path().join("nested"));
        assert_eq!(storage.get(BUNDLE_KEY).unwrap(), None);
        storage.set(BUNDLE_KEY, "{\"a\":1}").unwrap();
        assert_eq!(storage.get(BUNDLE_KEY).unwrap().as_deref(), Some("{\"a\":1}"));
        storage.remove(BUNDLE_KEY).unwrap();
        storage.remove(BUNDLE_KEY).unwrap();
        assert_eq!(storage.get(BUNDLE_KEY).unwrap(), None);
    }

    #[test]
    fn file_storage_rejects_path_like_keys() {
        let dir = TempDir::new().unwrap();
        let storage = FileStorage::new(dir.path());
        assert!(matches!(
            storage.set("../escape", "x"),
            Err(SessionError::Storage(_))
        ));
    }

    #[cfg(unix)]
    #[test]
    fn file_storage_restricts_permissions() {
        use std::os::unix::fs::PermissionsExt;

        let dir = TempDir::new().unwrap();
        let storage = FileStorage::new(dir.path());
        storage.set(BUNDLE_KEY, "{}").unwrap();
        let mode = fs::metadata(dir.path().join("iam_token.json"))
            .unwrap()
            .permissions()
            .mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[test]
    fn file_storage_overwrite_leaves_no_temp_files() {
        let dir = TempDir::new().unwrap();
        let storage = FileStorage::new(dir.path().join("nested"));
        storage.set(BUNDLE_KEY, "first").unwrap();
        storage.set(BUNDLE_KEY, "second").unwrap();

        assert_eq!(storage.get(BUNDLE_KEY).unwrap().as_deref(), Some("second"));
        let names: Vec<String> = fs::read_dir(dir.path().join("nested"))
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["iam_token.json".to_string()]);
    }
}
