//! Integration tests for the seen-UID store (src/seen.rs).

use std::collections::BTreeSet;

use pretty_assertions::assert_eq;
use tempfile::TempDir;

use spamsweep::seen::{load_seen, Role, SeenStore};

fn uids(list: &[u32]) -> BTreeSet<u32> {
    list.iter().copied().collect()
}

fn store() -> (TempDir, SeenStore) {
    let tmp = TempDir::new().unwrap();
    let store = SeenStore::new(tmp.path().join("trackdeadbeef"));
    (tmp, store)
}

#[test]
fn test_missing_file_reads_empty() {
    let (_tmp, store) = store();
    assert!(store.read(1, Role::Inbox).is_empty());
}

#[test]
fn test_write_then_read() {
    let (_tmp, store) = store();
    store.write(42, &uids(&[1, 2]), &uids(&[5]), Role::Inbox).unwrap();
    assert_eq!(store.read(42, Role::Inbox), uids(&[1, 2, 5]));
}

#[test]
fn test_other_uidvalidity_reads_empty() {
    let (_tmp, store) = store();
    store.write(42, &uids(&[1, 2]), &uids(&[]), Role::Inbox).unwrap();
    assert!(store.read(43, Role::Inbox).is_empty());
}

#[test]
fn test_roles_use_separate_files() {
    let (_tmp, store) = store();
    store.write(1, &uids(&[1]), &uids(&[]), Role::LearnSpam).unwrap();
    store.write(1, &uids(&[2]), &uids(&[]), Role::LearnHam).unwrap();
    assert_eq!(store.read(1, Role::LearnSpam), uids(&[1]));
    assert_eq!(store.read(1, Role::LearnHam), uids(&[2]));
    assert!(store.read(1, Role::Inbox).is_empty());
    assert!(store.path(Role::LearnSpam).to_string_lossy().ends_with("trackdeadbeefspam"));
}

#[test]
fn test_file_format() {
    let (_tmp, store) = store();
    store.write(7, &uids(&[3, 1]), &uids(&[2]), Role::Inbox).unwrap();
    let data = std::fs::read_to_string(store.path(Role::Inbox)).unwrap();
    assert_eq!(data, r#"{"uidvalidity":7,"uids":[1,2,3]}"#);
    let parsed = load_seen(data.as_bytes()).unwrap();
    assert_eq!(parsed.uidvalidity, 7);
}

#[test]
fn test_corrupt_file_reads_empty() {
    let (_tmp, store) = store();
    std::fs::write(store.path(Role::Inbox), "not json").unwrap();
    assert!(store.read(7, Role::Inbox).is_empty());
}

#[test]
fn test_write_is_byte_identical() {
    let (_tmp, store) = store();
    store.write(7, &uids(&[1]), &uids(&[2]), Role::Inbox).unwrap();
    let first = std::fs::read(store.path(Role::Inbox)).unwrap();
    store.write(7, &uids(&[1, 2]), &uids(&[]), Role::Inbox).unwrap();
    assert_eq!(std::fs::read(store.path(Role::Inbox)).unwrap(), first);
}

#[test]
fn test_update_skips_unchanged() {
    let (_tmp, store) = store();
    let previous = uids(&[1, 2]);
    assert!(store.update(7, &uids(&[]), &uids(&[]), &previous, Role::Inbox).unwrap());
    assert!(!store.update(7, &previous, &previous, &uids(&[]), Role::Inbox).unwrap());
    assert!(store.update(7, &previous, &uids(&[2]), &uids(&[]), Role::Inbox).unwrap());
    assert_eq!(store.read(7, Role::Inbox), uids(&[2]));
}

#[cfg(unix)]
#[test]
fn test_owner_only_permissions() {
    use std::os::unix::fs::PermissionsExt;
    let (_tmp, store) = store();
    store.write(7, &uids(&[1]), &uids(&[]), Role::Inbox).unwrap();
    let mode = std::fs::metadata(store.path(Role::Inbox)).unwrap().permissions().mode();
    assert_eq!(mode & 0o777, 0o600);
}
