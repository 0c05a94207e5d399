use filemesh_storage::{FileStore, MetadataStore, StorageError, content_id};
use filemesh_types::{FileName, STAGING_PREFIX};
use pretty_assertions::assert_eq;
use std::fs;
use std::sync::Arc;
use tempfile::TempDir;

fn name(s: &str) -> FileName {
    FileName::parse(s).unwrap()
}

fn open_store() -> (TempDir, FileStore) {
    let dir = tempfile::tempdir().unwrap();
    let store =
        FileStore::open(dir.path().join("storage"), dir.path().join("metadata.json")).unwrap();
    (dir, store)
}

// ── Store / fetch ───────────────────────────────────────────────

#[test]
fn write_then_read_roundtrip() {
    let (_dir, store) = open_store();
    let record = store.write(&name("x"), b"hello").unwrap();

    assert_eq!(store.read(&name("x")).unwrap(), b"hello");
    assert_eq!(record.size_bytes, 5);
    assert_eq!(record.content_id, content_id(b"hello"));
    assert_eq!(store.metadata().get(&name("x")).unwrap(), Some(record));
}

#[test]
fn overwrite_keeps_upload_time() {
    let (_dir, store) = open_store();
    let first = store.write(&name("x"), b"one").unwrap();
    let second = store.write(&name("x"), b"second version").unwrap();

    assert_eq!(second.uploaded_at, first.uploaded_at);
    assert!(second.modified_at >= first.modified_at);
    assert_eq!(second.size_bytes, 14);
    assert_ne!(second.content_id, first.content_id);
    assert_eq!(store.read(&name("x")).unwrap(), b"second version");
}

#[test]
fn empty_file_is_stored() {
    let (_dir, store) = open_store();
    let record = store.write(&name("empty"), b"").unwrap();
    assert_eq!(record.size_bytes, 0);
    assert_eq!(store.read(&name("empty")).unwrap(), Vec::<u8>::new());
}

#[test]
fn read_missing_is_not_found() {
    let (_dir, store) = open_store();
    let err = store.read(&name("ghost")).unwrap_err();
    assert!(err.is_not_found());
}

#[test]
fn no_staging_files_left_after_write() {
    let (_dir, store) = open_store();
    store.write(&name("x"), b"data").unwrap();

    let entries: Vec<String> = fs::read_dir(store.root())
        .unwrap()
        .map(|e| e.unwrap().file_name().into_string().unwrap())
        .collect();
    assert_eq!(entries, vec!["x".to_string()]);
}

#[test]
fn sanitized_traversal_stays_inside_root() {
    let (dir, store) = open_store();
    let evil = FileName::sanitize("../../metadata.json").unwrap();
    store.write(&evil, b"pwned").unwrap();

    assert!(store.root().join("metadata.json").exists());
    let meta: serde_json::Value =
        serde_json::from_slice(&fs::read(dir.path().join("metadata.json")).unwrap()).unwrap();
    assert!(meta.get("metadata.json").is_some());
}

// ── Delete ──────────────────────────────────────────────────────

#[test]
fn delete_removes_file_and_record() {
    let (_dir, store) = open_store();
    store.write(&name("x"), b"hello").unwrap();

    assert!(store.delete(&name("x")).unwrap());
    assert!(store.read(&name("x")).unwrap_err().is_not_found());
    assert_eq!(store.metadata().get(&name("x")).unwrap(), None);
}

#[test]
fn delete_twice_is_idempotent() {
    let (_dir, store) = open_store();
    store.write(&name("x"), b"hello").unwrap();
    store.write(&name("keep"), b"other").unwrap();

    assert!(store.delete(&name("x")).unwrap());
    let after_first = store.list().unwrap();

    assert!(!store.delete(&name("x")).unwrap());
    let after_second = store.list().unwrap();

    assert_eq!(after_first, after_second);
}

#[test]
fn delete_drops_stray_record() {
    let (_dir, store) = open_store();
    store.write(&name("x"), b"hello").unwrap();
    fs::remove_file(store.path_of(&name("x"))).unwrap();

    assert!(!store.delete(&name("x")).unwrap());
    assert_eq!(store.metadata().get(&name("x")).unwrap(), None);
}

// ── Listing & lazy hashing ──────────────────────────────────────

#[test]
fn list_hashes_unrecorded_files() {
    let (_dir, store) = open_store();
    fs::write(store.root().join("dropped.txt"), b"placed by hand").unwrap();
    assert_eq!(store.metadata().get(&name("dropped.txt")).unwrap(), None);

    let records = store.list().unwrap();

    assert_eq!(records.len(), 1);
    assert_eq!(records[0].content_id, content_id(b"placed by hand"));
    assert_eq!(records[0].size_bytes, 14);
    assert!(store.metadata().get(&name("dropped.txt")).unwrap().is_some());
}

#[test]
fn list_rehashes_when_size_changed_behind_our_back() {
    let (_dir, store) = open_store();
    store.write(&name("x"), b"short").unwrap();
    fs::write(store.path_of(&name("x")), b"much longer content").unwrap();

    let record = store.record(&name("x")).unwrap();
    assert_eq!(record.content_id, content_id(b"much longer content"));
    assert_eq!(record.size_bytes, 19);
}

#[test]
fn list_prunes_orphan_records() {
    let (_dir, store) = open_store();
    store.write(&name("gone"), b"bye").unwrap();
    store.write(&name("kept"), b"hi").unwrap();
    fs::remove_file(store.path_of(&name("gone"))).unwrap();

    let records = store.list().unwrap();

    assert_eq!(records.len(), 1);
    assert_eq!(records[0].name, name("kept"));
    assert_eq!(store.metadata().get(&name("gone")).unwrap(), None);
}

#[test]
fn list_skips_directories_and_staging_files() {
    let (_dir, store) = open_store();
    fs::create_dir(store.root().join("subdir")).unwrap();
    fs::write(store.root().join(format!("{STAGING_PREFIX}abc")), b"partial").unwrap();
    store.write(&name("real"), b"content").unwrap();

    let names: Vec<String> = store
        .list()
        .unwrap()
        .into_iter()
        .map(|r| r.name.to_string())
        .collect();
    assert_eq!(names, vec!["real".to_string()]);
    assert_eq!(store.file_count().unwrap(), 1);
}

#[cfg(unix)]
#[test]
fn list_skips_symlinks() {
    let (dir, store) = open_store();
    let outside = dir.path().join("outside.txt");
    fs::write(&outside, b"secret").unwrap();
    std::os::unix::fs::symlink(&outside, store.root().join("link.txt")).unwrap();

    assert!(store.list().unwrap().is_empty());
    assert!(store.read(&name("link.txt")).unwrap_err().is_not_found());
}

#[test]
fn list_records_every_dropped_file_in_one_scan() {
    let (dir, store) = open_store();
    for n in ["c", "a", "b"] {
        fs::write(store.root().join(n), n.as_bytes()).unwrap();
    }
    store.write(&name("known"), b"k").unwrap();

    let names: Vec<String> = store
        .list()
        .unwrap()
        .into_iter()
        .map(|r| r.name.to_string())
        .collect();
    assert_eq!(names, vec!["a", "b", "c", "known"]);

    let reopened = MetadataStore::open(dir.path().join("metadata.json")).unwrap();
    assert_eq!(reopened.len().unwrap(), 4);
    assert_eq!(
        reopened.get(&name("b")).unwrap().unwrap().content_id,
        content_id(b"b")
    );
}

/// Removes all permissions from `path`. Returns `false` when the file is
/// still readable afterwards (running as root), so the caller can bail out.
#[cfg(unix)]
fn make_unreadable(path: &std::path::Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(0o000)).unwrap();
    fs::File::open(path).is_err()
}

#[cfg(unix)]
#[test]
fn list_skips_unreadable_file() {
    let (_dir, store) = open_store();
    store.write(&name("good.txt"), b"fine").unwrap();
    let locked = store.root().join("locked.txt");
    fs::write(&locked, b"no access").unwrap();
    if !make_unreadable(&locked) {
        eprintln!("skipping: file permissions are not enforced for this user");
        return;
    }

    let records = store.list().unwrap();

    assert_eq!(records.len(), 1);
    assert_eq!(records[0].name, name("good.txt"));
    assert_eq!(store.metadata().get(&name("locked.txt")).unwrap(), None);
    let view = store.local_view().unwrap();
    assert_eq!(view.keys().cloned().collect::<Vec<_>>(), vec![name("good.txt")]);
}

#[cfg(unix)]
#[test]
fn unreadable_file_keeps_its_existing_record() {
    let (_dir, store) = open_store();
    let before = store.write(&name("locked.txt"), b"v1").unwrap();
    let path = store.path_of(&name("locked.txt"));
    fs::write(&path, b"version two").unwrap();
    if !make_unreadable(&path) {
        eprintln!("skipping: file permissions are not enforced for this user");
        return;
    }

    assert!(store.list().unwrap().is_empty());
    assert_eq!(store.metadata().get(&name("locked.txt")).unwrap(), Some(before));
}

#[test]
fn local_view_maps_names_to_identities() {
    let (_dir, store) = open_store();
    store.write(&name("a"), b"1").unwrap();
    store.write(&name("b"), b"2").unwrap();

    let view = store.local_view().unwrap();
    assert_eq!(view.len(), 2);
    assert_eq!(view[&name("a")], content_id(b"1"));
    assert_eq!(view[&name("b")], content_id(b"2"));
}

// ── Open / recovery ─────────────────────────────────────────────

#[test]
fn open_removes_stale_staging_files() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path().join("storage");
    fs::create_dir_all(&root).unwrap();
    let stale = root.join(format!("{STAGING_PREFIX}dead"));
    fs::write(&stale, b"half").unwrap();

    let _store = FileStore::open(&root, dir.path().join("metadata.json")).unwrap();
    assert!(!stale.exists());
}

#[test]
fn records_survive_restart() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path().join("storage");
    let meta = dir.path().join("metadata.json");

    let original = {
        let store = FileStore::open(&root, &meta).unwrap();
        store.write(&name("x"), b"persist me").unwrap()
    };

    let store = FileStore::open(&root, &meta).unwrap();
    assert_eq!(store.record(&name("x")).unwrap(), original);
}

#[test]
fn in_memory_metadata_works() {
    let dir = tempfile::tempdir().unwrap();
    let store = FileStore::with_metadata(dir.path(), MetadataStore::open_in_memory()).unwrap();
    store.write(&name("x"), b"abc").unwrap();
    assert_eq!(store.list().unwrap().len(), 1);
}

#[test]
fn write_into_missing_root_fails_without_record() {
    let (_dir, store) = open_store();
    fs::remove_dir_all(store.root()).unwrap();

    let err = store.write(&name("x"), b"data").unwrap_err();
    assert!(matches!(err, StorageError::Io(_)));
    assert_eq!(store.metadata().get(&name("x")).unwrap(), None);
}

#[test]
fn concurrent_writers_leave_consistent_state() {
    let (_dir, store) = open_store();
    let store = Arc::new(store);

    let handles: Vec<_> = (0..8)
        .map(|i| {
            let store = Arc::clone(&store);
            std::thread::spawn(move || {
                let body = format!("writer {i}");
                store.write(&name("shared"), body.as_bytes()).unwrap();
            })
        })
        .collect();
    for h in handles {
        h.join().unwrap();
    }

    let bytes = store.read(&name("shared")).unwrap();
    let record = store.record(&name("shared")).unwrap();
    assert_eq!(record.content_id, content_id(&bytes));
    assert_eq!(record.size_bytes, bytes.len() as u64);
}
