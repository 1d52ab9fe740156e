//! Keyed record stores backing the assembler.
//!
//! A store only has to offer get, conditional upsert and delete by key. Every
//! successful write bumps the record's version; conditional writes compare
//! against that version and fail with
//! [`ChoreoError::ConcurrentEditConflict`] when it has moved.

use std::{
    collections::{BTreeMap, HashMap},
    ffi::OsString,
    fs::{File, OpenOptions},
    io::Write,
    path::{Path, PathBuf},
    sync::{Arc, Mutex, MutexGuard, OnceLock, PoisonError},
};

use fs2::FileExt;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tempfile::NamedTempFile;

use crate::{ChoreoError, Result};

/// A stored value together with its version token.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredRecord {
    pub version: u64,
    pub value: Value,
}

/// Precondition attached to a write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VersionCheck {
    /// Last write wins.
    Any,
    /// The key must not exist yet.
    Absent,
    /// The stored version must still be this one.
    Exactly(u64),
}

impl VersionCheck {
    pub fn from_token(token: Option<u64>) -> Self {
        token.map_or(VersionCheck::Absent, VersionCheck::Exactly)
    }

    fn expected(self) -> Option<u64> {
        match self {
            VersionCheck::Exactly(version) => Some(version),
            VersionCheck::Any | VersionCheck::Absent => None,
        }
    }

    fn admits(self, current: Option<u64>) -> bool {
        match self {
            VersionCheck::Any => true,
            VersionCheck::Absent => current.is_none(),
            VersionCheck::Exactly(version) => current == Some(version),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpsertOptions {
    pub conflict_key: String,
    pub check: VersionCheck,
}

impl UpsertOptions {
    pub fn keyed(conflict_key: impl Into<String>) -> Self {
        Self {
            conflict_key: conflict_key.into(),
            check: VersionCheck::Any,
        }
    }

    pub fn with_check(mut self, check: VersionCheck) -> Self {
        self.check = check;
        self
    }
}

/// Persistence collaborator.
#[allow(async_fn_in_trait)]
pub trait RecordStore {
    async fn get(&self, collection: &str, key: &str) -> Result<Option<StoredRecord>>;

    /// Writes `value` under `options.conflict_key` and returns the new version.
    async fn upsert(&self, collection: &str, value: Value, options: &UpsertOptions) -> Result<u64>;

    /// Returns whether a record was removed.
    async fn delete(&self, collection: &str, key: &str) -> Result<bool>;
}

impl<T: RecordStore> RecordStore for Arc<T> {
    async fn get(&self, collection: &str, key: &str) -> Result<Option<StoredRecord>> {
        (**self).get(collection, key).await
    }

    async fn upsert(&self, collection: &str, value: Value, options: &UpsertOptions) -> Result<u64> {
        (**self).upsert(collection, value, options).await
    }

    async fn delete(&self, collection: &str, key: &str) -> Result<bool> {
        (**self).delete(collection, key).await
    }
}

type Collections = BTreeMap<String, BTreeMap<String, StoredRecord>>;

fn apply_upsert(
    collections: &mut Collections,
    collection: &str,
    value: Value,
    options: &UpsertOptions,
) -> Result<u64> {
    let records = collections.entry(collection.to_string()).or_default();
    let current = records.get(&options.conflict_key).map(|r| r.version);

    if !options.check.admits(current) {
        return Err(ChoreoError::ConcurrentEditConflict {
            id: options.conflict_key.clone(),
            expected: options.check.expected(),
            found: current,
        });
    }

    let version = current.unwrap_or(0) + 1;
    records.insert(options.conflict_key.clone(), StoredRecord { version, value });
    Ok(version)
}

fn apply_delete(collections: &mut Collections, collection: &str, key: &str) -> bool {
    collections
        .get_mut(collection)
        .map(|records| records.remove(key).is_some())
        .unwrap_or(false)
}

/// Process-local store, mainly for tests and single-run tooling.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    collections: Mutex<Collections>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, Collections>> {
        self.collections
            .lock()
            .map_err(|_| ChoreoError::msg("record store has been poisoned"))
    }
}

impl RecordStore for InMemoryStore {
    async fn get(&self, collection: &str, key: &str) -> Result<Option<StoredRecord>> {
        let collections = self.lock()?;
        Ok(collections
            .get(collection)
            .and_then(|records| records.get(key))
            .cloned())
    }

    async fn upsert(&self, collection: &str, value: Value, options: &UpsertOptions) -> Result<u64> {
        let mut collections = self.lock()?;
        apply_upsert(&mut collections, collection, value, options)
    }

    async fn delete(&self, collection: &str, key: &str) -> Result<bool> {
        let mut collections = self.lock()?;
        Ok(apply_delete(&mut collections, collection, key))
    }
}

/// Store that keeps every collection in a single JSON document on disk.
///
/// Writes go through a temp file in the same directory followed by a rename,
/// so a crash mid-write leaves the previous document intact. Every
/// read-check-write runs under a lock shared by all handles on the same path
/// in this process and an exclusive OS lock on a sidecar `.lock` file, so
/// conditional writes from separate handles or processes cannot interleave.
#[derive(Debug)]
pub struct JsonFileStore {
    path: PathBuf,
    write_lock: Arc<tokio::sync::Mutex<()>>,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        Self {
            write_lock: path_lock(&path),
            path,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn read_document(&self) -> std::io::Result<Collections> {
        match tokio::fs::read(&self.path).await {
            Ok(bytes) => parse_document(&bytes),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(Collections::new()),
            Err(err) => Err(err),
        }
    }

    /// Runs `apply` against the current document while holding both locks and
    /// writes the document back when `apply` reports a change.
    async fn transact<T, F>(&self, collection: &str, key: &str, apply: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut Collections) -> Result<(T, bool)> + Send + 'static,
    {
        let _guard = self.write_lock.lock().await;
        let path = self.path.clone();
        let collection = collection.to_string();
        let key = key.to_string();

        tokio::task::spawn_blocking(move || {
            let persistence = |e: std::io::Error| ChoreoError::persistence(&collection, &key, e);
            let _file_lock = lock_file(&path).map_err(persistence)?;
            let mut collections = read_document_blocking(&path).map_err(persistence)?;
            let (out, changed) = apply(&mut collections)?;
            if changed {
                write_document(&path, &collections).map_err(persistence)?;
            }
            Ok(out)
        })
        .await
        .map_err(|e| ChoreoError::msg(format!("record store task failed: {e}")))?
    }
}

fn path_lock(path: &Path) -> Arc<tokio::sync::Mutex<()>> {
    static LOCKS: OnceLock<Mutex<HashMap<PathBuf, Arc<tokio::sync::Mutex<()>>>>> = OnceLock::new();

    let key = std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf());
    let mut locks = LOCKS
        .get_or_init(Default::default)
        .lock()
        .unwrap_or_else(PoisonError::into_inner);
    locks.entry(key).or_default().clone()
}

fn document_dir(path: &Path) -> &Path {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    }
}

/// Exclusive lock on `<document>.lock`, released when the handle drops.
fn lock_file(path: &Path) -> std::io::Result<File> {
    let mut name = path
        .file_name()
        .map(OsString::from)
        .unwrap_or_else(|| OsString::from("store"));
    name.push(".lock");

    std::fs::create_dir_all(document_dir(path))?;
    let file = OpenOptions::new()
        .create(true)
        .truncate(false)
        .write(true)
        .open(path.with_file_name(name))?;
    file.lock_exclusive()?;
    Ok(file)
}

fn parse_document(bytes: &[u8]) -> std::io::Result<Collections> {
    if bytes.is_empty() {
        return Ok(Collections::new());
    }
    serde_json::from_slice(bytes).map_err(std::io::Error::other)
}

fn read_document_blocking(path: &Path) -> std::io::Result<Collections> {
    match std::fs::read(path) {
        Ok(bytes) => parse_document(&bytes),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(Collections::new()),
        Err(err) => Err(err),
    }
}

fn write_document(path: &Path, collections: &Collections) -> std::io::Result<()> {
    let data = serde_json::to_vec_pretty(collections).map_err(std::io::Error::other)?;
    let dir = document_dir(path);
    std::fs::create_dir_all(dir)?;
    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(&data)?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

impl RecordStore for JsonFileStore {
    async fn get(&self, collection: &str, key: &str) -> Result<Option<StoredRecord>> {
        let mut collections = self
            .read_document()
            .await
            .map_err(|e| ChoreoError::persistence(collection, key, e))?;
        Ok(collections
            .get_mut(collection)
            .and_then(|records| records.remove(key)))
    }

    async fn upsert(&self, collection: &str, value: Value, options: &UpsertOptions) -> Result<u64> {
        let name = collection.to_string();
        let owned = options.clone();
        self.transact(collection, &options.conflict_key, move |collections| {
            let version = apply_upsert(collections, &name, value, &owned)?;
            Ok((version, true))
        })
        .await
    }

    async fn delete(&self, collection: &str, key: &str) -> Result<bool> {
        let name = collection.to_string();
        let owned = key.to_string();
        self.transact(collection, key, move |collections| {
            let removed = apply_delete(collections, &name, &owned);
            Ok((removed, removed))
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[tokio::test]
    async fn versions_increase_on_every_write() {
        let store = InMemoryStore::new();
        let options = UpsertOptions::keyed("w1");

        assert_eq!(store.upsert("programs", json!({"a": 1}), &options).await.unwrap(), 1);
        assert_eq!(store.upsert("programs", json!({"a": 2}), &options).await.unwrap(), 2);

        let stored = store.get("programs", "w1").await.unwrap().unwrap();
        assert_eq!(stored.version, 2);
        assert_eq!(stored.value, json!({"a": 2}));
    }

    #[tokio::test]
    async fn conditional_writes_detect_stale_versions() {
        let store = InMemoryStore::new();
        let create = UpsertOptions::keyed("w1").with_check(VersionCheck::Absent);
        store.upsert("programs", json!(1), &create).await.unwrap();

        let err = store.upsert("programs", json!(2), &create).await.unwrap_err();
        assert!(matches!(
            err,
            ChoreoError::ConcurrentEditConflict {
                expected: None,
                found: Some(1),
                ..
            }
        ));

        let stale = UpsertOptions::keyed("w1").with_check(VersionCheck::Exactly(7));
        assert!(store.upsert("programs", json!(3), &stale).await.is_err());

        let fresh = UpsertOptions::keyed("w1").with_check(VersionCheck::Exactly(1));
        assert_eq!(store.upsert("programs", json!(3), &fresh).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn delete_is_key_scoped() {
        let store = InMemoryStore::new();
        store.upsert("programs", json!(1), &UpsertOptions::keyed("a")).await.unwrap();
        store.upsert("programs", json!(2), &UpsertOptions::keyed("b")).await.unwrap();

        assert!(store.delete("programs", "a").await.unwrap());
        assert!(!store.delete("programs", "a").await.unwrap());
        assert!(!store.delete("schedules", "b").await.unwrap());
        assert!(store.get("programs", "b").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn file_store_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("programs.json");

        let store = JsonFileStore::new(&path);
        assert!(store.get("programs", "w1").await.unwrap().is_none());
        store
            .upsert("programs", json!({"title": "Morning"}), &UpsertOptions::keyed("w1"))
            .await
            .unwrap();

        let reopened = JsonFileStore::new(&path);
        let stored = reopened.get("programs", "w1").await.unwrap().unwrap();
        assert_eq!(stored.version, 1);
        assert_eq!(stored.value["title"], "Morning");

        assert!(reopened.delete("programs", "w1").await.unwrap());
        assert!(store.get("programs", "w1").await.unwrap().is_none());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn racing_conditional_writes_from_separate_handles_admit_one() {
        for _ in 0..50 {
            let dir = tempfile::tempdir().unwrap();
            let path = dir.path().join("programs.json");
            JsonFileStore::new(&path)
                .upsert("programs", json!("seed"), &UpsertOptions::keyed("w1"))
                .await
                .unwrap();

            let writers: Vec<_> = ["a", "b"]
                .into_iter()
                .map(|author| {
                    let store = JsonFileStore::new(&path);
                    tokio::spawn(async move {
                        let options = UpsertOptions::keyed("w1").with_check(VersionCheck::Exactly(1));
                        store.upsert("programs", json!(author), &options).await
                    })
                })
                .collect();

            let mut stored = 0;
            let mut conflicts = 0;
            for writer in writers {
                match writer.await.unwrap() {
                    Ok(version) => {
                        assert_eq!(version, 2);
                        stored += 1;
                    }
                    Err(ChoreoError::ConcurrentEditConflict {
                        expected: Some(1),
                        found: Some(2),
                        ..
                    }) => conflicts += 1,
                    Err(other) => panic!("unexpected error: {other}"),
                }
            }
            assert_eq!((stored, conflicts), (1, 1));

            let current = JsonFileStore::new(&path).get("programs", "w1").await.unwrap().unwrap();
            assert_eq!(current.version, 2);
        }
    }

    #[tokio::test]
    async fn rejected_write_leaves_the_document_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("programs.json");
        let store = JsonFileStore::new(&path);
        store
            .upsert("programs", json!(1), &UpsertOptions::keyed("w1"))
            .await
            .unwrap();
        let before = std::fs::read(&path).unwrap();

        let stale = UpsertOptions::keyed("w1").with_check(VersionCheck::Absent);
        assert!(store.upsert("programs", json!(2), &stale).await.is_err());
        assert!(!store.delete("programs", "missing").await.unwrap());
        assert_eq!(std::fs::read(&path).unwrap(), before);
        assert!(dir.path().join("programs.json.lock").exists());
    }

    #[tokio::test]
    async fn corrupt_file_surfaces_as_persistence_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("programs.json");
        std::fs::write(&path, b"not json").unwrap();

        let store = JsonFileStore::new(&path);
        let err = store.get("programs", "w1").await.unwrap_err();
        assert!(matches!(err, ChoreoError::Persistence { .. }));
    }
}
