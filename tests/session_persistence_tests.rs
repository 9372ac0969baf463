use std::fs;
use std::sync::Arc;

use iam_session::auth::{CredentialBundle, FileStorage, KeyValueStorage, TokenStore};
use iam_session::util::clock::now_ms;
use serde_json::json;
use tempfile::TempDir;

fn file_store(temp_dir: &TempDir) -> TokenStore {
    TokenStore::new(Arc::new(FileStorage::new(temp_dir.path())))
}

#[test]
fn bundle_survives_a_new_store_instance() {
    let temp_dir = TempDir::new().unwrap();
    let bundle = CredentialBundle::issued("Bearer", 3600, "a-1", Some("r-1".into()), now_ms());
    file_store(&temp_dir).write_bundle(&bundle).unwrap();

    let reopened = file_store(&temp_dir);
    assert_eq!(reopened.read_bundle(), Some(bundle));
    assert_eq!(reopened.access_token().as_deref(), Some("a-1"));

    let raw = fs::read_to_string(temp_dir.path().join("iam_token.json")).unwrap();
    let json: serde_json::Value = serde_json::from_str(&raw).unwrap();
    assert_eq!(json["access_token"], "a-1");
    assert!(json["exp_abs"].is_i64());
}

#[test]
fn legacy_bundle_without_absolute_expiry_is_backfilled_on_read() {
    let temp_dir = TempDir::new().unwrap();
    let storage = FileStorage::new(temp_dir.path());
    storage
        .set(
            "iam_token",
            &json!({"token_type": "Bearer", "expires_in": 120, "access_token": "a"}).to_string(),
        )
        .unwrap();

    let before = now_ms();
    let bundle = file_store(&temp_dir).read_bundle().unwrap();
    let exp = bundle.expiry_absolute.unwrap();
    assert!(exp >= before + 120_000 && exp <= now_ms() + 120_000);

    let persisted: serde_json::Value =
        serde_json::from_str(&storage.get("iam_token").unwrap().unwrap()).unwrap();
    assert_eq!(persisted["exp_abs"], exp);
}

#[test]
fn corrupt_bundle_reads_as_no_session() {
    let temp_dir = TempDir::new().unwrap();
    fs::write(temp_dir.path().join("iam_token.json"), "{not json").unwrap();

    let store = file_store(&temp_dir);
    assert_eq!(store.read_bundle(), None);
    assert_eq!(store.access_token(), None);
    assert!(!store.is_near_expiry(60));
    assert_eq!(store.ms_until_expiry(), 0);
}

#[test]
fn clear_removes_every_session_file_and_is_idempotent() {
    let temp_dir = TempDir::new().unwrap();
    let store = file_store(&temp_dir);
    store
        .write_bundle(&CredentialBundle::issued("Bearer", 60, "a", None, now_ms()))
        .unwrap();
    store
        .write_identity(&json!({"id": 3}), &["orders:read".to_string()])
        .unwrap();
    assert_eq!(fs::read_dir(temp_dir.path()).unwrap().count(), 3);

    store.clear();
    store.clear();

    assert_eq!(fs::read_dir(temp_dir.path()).unwrap().count(), 0);
    assert_eq!(store.whoami(), json!({}));
    assert!(store.scopes().is_empty());
}

#[cfg(unix)]
#[test]
fn session_files_are_owner_only() {
    use std::os::unix::fs::PermissionsExt;

    let temp_dir = TempDir::new().unwrap();
    file_store(&temp_dir)
        .write_bundle(&CredentialBundle::issued("Bearer", 60, "a", None, now_ms()))
        .unwrap();

    let mode = fs::metadata(temp_dir.path().join("iam_token.json"))
        .unwrap()
        .permissions()
        .mode();
    assert_eq!(mode & 0o777, 0o600);
}
