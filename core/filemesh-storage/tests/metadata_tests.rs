use chrono::{TimeZone, Utc};
use filemesh_storage::{MetadataStore, StorageError};
use filemesh_types::{ContentId, FileName, FileRecord};
use pretty_assertions::assert_eq;

fn name(s: &str) -> FileName {
    FileName::parse(s).unwrap()
}

fn record(n: &str, hash: &str, size: u64) -> FileRecord {
    let t = Utc.with_ymd_and_hms(2026, 1, 2, 3, 4, 5).unwrap();
    FileRecord::new(name(n), ContentId::new(hash), size, t)
}

// ── Basic operations ────────────────────────────────────────────

#[test]
fn in_memory_put_get_delete() {
    let store = MetadataStore::open_in_memory();
    assert!(store.is_empty().unwrap());

    store.put(record("a.txt", "h1", 1)).unwrap();
    assert_eq!(store.get(&name("a.txt")).unwrap(), Some(record("a.txt", "h1", 1)));
    assert_eq!(store.len().unwrap(), 1);

    assert!(store.delete(&name("a.txt")).unwrap());
    assert_eq!(store.get(&name("a.txt")).unwrap(), None);
}

#[test]
fn delete_absent_is_not_an_error() {
    let store = MetadataStore::open_in_memory();
    assert!(!store.delete(&name("ghost")).unwrap());
    assert!(!store.delete(&name("ghost")).unwrap());
}

#[test]
fn put_replaces_existing() {
    let store = MetadataStore::open_in_memory();
    store.put(record("a.txt", "h1", 1)).unwrap();
    store.put(record("a.txt", "h2", 2)).unwrap();

    let got = store.get(&name("a.txt")).unwrap().unwrap();
    assert_eq!(got.content_id, ContentId::new("h2"));
    assert_eq!(got.size_bytes, 2);
    assert_eq!(store.len().unwrap(), 1);
}

#[test]
fn list_is_ordered_by_name() {
    let store = MetadataStore::open_in_memory();
    store.put(record("c", "h", 1)).unwrap();
    store.put(record("a", "h", 1)).unwrap();
    store.put(record("b", "h", 1)).unwrap();

    let names: Vec<String> = store
        .list()
        .unwrap()
        .into_iter()
        .map(|r| r.name.to_string())
        .collect();
    assert_eq!(names, vec!["a", "b", "c"]);
}

// ── Persistence ─────────────────────────────────────────────────

#[test]
fn missing_backing_file_starts_empty() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("metadata.json");
    let store = MetadataStore::open(&path).unwrap();

    assert!(store.is_empty().unwrap());
    assert!(!path.exists());
}

#[test]
fn survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("metadata.json");

    {
        let store = MetadataStore::open(&path).unwrap();
        store.put(record("a.txt", "h1", 10)).unwrap();
        store.put(record("b.txt", "h2", 20)).unwrap();
        store.delete(&name("b.txt")).unwrap();
    }

    let reopened = MetadataStore::open(&path).unwrap();
    assert_eq!(reopened.list().unwrap(), vec![record("a.txt", "h1", 10)]);
}

#[test]
fn creates_parent_directories() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("state").join("nested").join("metadata.json");
    let store = MetadataStore::open(&path).unwrap();
    store.put(record("a.txt", "h1", 1)).unwrap();
    assert!(path.exists());
}

#[test]
fn on_disk_format_is_keyed_by_filename() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("metadata.json");
    let store = MetadataStore::open(&path).unwrap();
    store.put(record("a.txt", "abc", 3)).unwrap();

    let json: serde_json::Value = serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
    let entry = &json["a.txt"];
    assert_eq!(entry["hash"], "abc");
    assert_eq!(entry["size"], 3);
    assert!(entry["uploaded"].is_string());
    assert!(entry["modified"].is_string());
}

#[test]
fn missing_hash_loads_as_empty_identity() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("metadata.json");
    std::fs::write(
        &path,
        r#"{"x.bin":{"size":4,"uploaded":"2026-01-01T00:00:00Z","modified":"2026-01-01T00:00:00Z"}}"#,
    )
    .unwrap();

    let store = MetadataStore::open(&path).unwrap();
    let got = store.get(&name("x.bin")).unwrap().unwrap();
    assert!(got.needs_hash());
}

#[test]
fn corrupt_backing_file_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("metadata.json");
    std::fs::write(&path, b"{ not json").unwrap();

    assert!(matches!(
        MetadataStore::open(&path),
        Err(StorageError::Serialization(_))
    ));
}

#[test]
fn unsafe_key_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("metadata.json");
    std::fs::write(
        &path,
        r#"{"../x":{"hash":"h","size":1,"uploaded":"2026-01-01T00:00:00Z","modified":"2026-01-01T00:00:00Z"}}"#,
    )
    .unwrap();

    assert!(matches!(
        MetadataStore::open(&path),
        Err(StorageError::InvalidName(_))
    ));
}

#[test]
fn no_temp_file_left_after_write() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("metadata.json");
    let store = MetadataStore::open(&path).unwrap();
    store.put(record("a.txt", "h1", 1)).unwrap();

    let leftovers: Vec<_> = std::fs::read_dir(dir.path())
        .unwrap()
        .map(|e| e.unwrap().file_name())
        .filter(|n| n != "metadata.json")
        .collect();
    assert!(leftovers.is_empty(), "unexpected files: {leftovers:?}");
}
