//! Atomic blob + metadata persistence with per-entity advisory locking.

use std::fs::{self, File, OpenOptions};
use std::io::{ErrorKind as IoErrorKind, Read, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use fs2::FileExt;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::error::{DbError, ErrorKind};
use crate::naming::validate_entity_names;

/// The only algorithm entity metadata may declare.
pub const ENTITY_ALG: &str = "AES-GCM";

/// How long a lock acquisition may spin before surfacing as an error.
const LOCK_WAIT: Duration = Duration::from_secs(5);
/// Sleep between advisory-lock attempts.
const LOCK_RETRY: Duration = Duration::from_millis(10);

/// Storage subsystem errors.
#[derive(Error, Debug)]
pub enum StoreError {
    /// Name failed charset validation; no path was constructed
    #[error("{0}")]
    InvalidName(String),

    /// Neither blob nor metadata exists
    #[error("entity not found")]
    NotFound,

    /// One half of the pair is missing or the metadata does not parse
    #[error("entity storage is corrupt")]
    Corrupt,

    /// Advisory lock was not acquired within the bounded wait
    #[error("entity lock wait timed out")]
    LockTimeout,

    /// Underlying filesystem failure
    #[error("storage I/O error")]
    Io(#[from] std::io::Error),
}

pub type StoreResult<T> = Result<T, StoreError>;

impl From<StoreError> for DbError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::InvalidName(msg) => DbError::bad_input(msg),
            StoreError::NotFound => DbError::not_found("entity not found"),
            // Corrupt state and lock/I/O trouble are all reported as a
            // generic internal failure; details stay in the logs.
            StoreError::Corrupt | StoreError::LockTimeout | StoreError::Io(_) => {
                DbError::new(ErrorKind::Internal, "storage error")
            }
        }
    }
}

// ============================================================================
// Entity Metadata
// ============================================================================

/// Plaintext sidecar describing one persisted entity version.
///
/// Field names are a stable on-disk contract; external tooling reads these
/// files directly.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EntityMetadata {
    /// Identifier of the master key the blob is sealed under.
    pub key_id: String,
    /// Always `"AES-GCM"`.
    pub alg: String,
    /// Base64 of the 12-byte nonce for this version.
    pub iv: String,
    /// Base64 of the 16-byte authentication tag.
    pub tag: String,
    /// Schema the payload was validated against; empty means none.
    #[serde(default)]
    pub schema_id: String,
    /// Monotonically increasing per entity, starting at 1.
    pub version: u64,
    /// Worker that performed the write.
    pub writer_id: String,
    /// Write time, RFC 3339.
    pub timestamp: DateTime<Utc>,
    /// Provenance: addressed database.
    pub database: String,
    /// Provenance: addressed key.
    pub entity_key: String,
}

// ============================================================================
// Lock Guard
// ============================================================================

/// RAII advisory lock on an entity's `.lock` file. Unlocks on drop, so every
/// exit path, including errors, releases the lock. The lock file itself is
/// never deleted.
struct EntityLock {
    file: File,
}

impl EntityLock {
    fn acquire(path: &Path, exclusive: bool) -> StoreResult<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(path)?;

        let deadline = Instant::now() + LOCK_WAIT;
        loop {
            let attempt = if exclusive {
                fs2::FileExt::try_lock_exclusive(&file)
            } else {
                fs2::FileExt::try_lock_shared(&file)
            };
            match attempt {
                Ok(()) => return Ok(Self { file }),
                Err(e)
                    if e.kind() == IoErrorKind::WouldBlock
                        || fs2::lock_contended_error().kind() == e.kind() =>
                {
                    if Instant::now() >= deadline {
                        return Err(StoreError::LockTimeout);
                    }
                    std::thread::sleep(LOCK_RETRY);
                }
                Err(e) => return Err(StoreError::Io(e)),
            }
        }
    }
}

impl Drop for EntityLock {
    fn drop(&mut self) {
        let _ = self.file.unlock();
    }
}

// ============================================================================
// FileStore
// ============================================================================

/// Durable, atomic storage of entities under one `files/` directory.
///
/// All operations are synchronous; async callers run them on a blocking
/// thread.
#[derive(Debug, Clone)]
pub struct FileStore {
    files_dir: PathBuf,
}

impl FileStore {
    /// Open (and create if needed) the `files/` directory under the shared
    /// filesystem root.
    pub fn open(shared_fs_root: &Path) -> StoreResult<Self> {
        let files_dir = shared_fs_root.join("files");
        fs::create_dir_all(&files_dir)?;
        Ok(Self { files_dir })
    }

    /// Directory the store writes into.
    pub fn files_dir(&self) -> &Path {
        &self.files_dir
    }

    fn stem(database: &str, key: &str) -> String {
        format!("{database}_{key}")
    }

    fn blob_path(&self, stem: &str) -> PathBuf {
        self.files_dir.join(format!("{stem}.json.enc"))
    }

    fn meta_path(&self, stem: &str) -> PathBuf {
        self.files_dir.join(format!("{stem}.meta.json"))
    }

    fn lock_path(&self, stem: &str) -> PathBuf {
        self.files_dir.join(format!("{stem}.lock"))
    }

    /// Read an entity under a shared lock.
    ///
    /// Returns [`StoreError::NotFound`] when neither file exists and
    /// [`StoreError::Corrupt`] when exactly one does or the metadata does
    /// not parse.
    pub fn read(&self, database: &str, key: &str) -> StoreResult<(Vec<u8>, EntityMetadata)> {
        self.read_with(database, key, |blob, metadata| {
            Ok((blob.to_vec(), metadata.clone()))
        })
    }

    /// Read an entity and run `f` on it while the shared lock is still
    /// held. Readers that decrypt and publish to a cache do both inside
    /// `f`: a writer cannot rename new files under them, so a cache entry
    /// published here can never be staler than the disk state it was read
    /// from.
    pub fn read_with<T, F>(&self, database: &str, key: &str, f: F) -> StoreResult<T>
    where
        F: FnOnce(&[u8], &EntityMetadata) -> StoreResult<T>,
    {
        validate_entity_names(database, key).map_err(|e| StoreError::InvalidName(e.to_string()))?;
        let stem = Self::stem(database, key);
        let _lock = EntityLock::acquire(&self.lock_path(&stem), false)?;

        let blob = read_optional(&self.blob_path(&stem))?;
        let meta = read_optional(&self.meta_path(&stem))?;

        match (blob, meta) {
            (None, None) => Err(StoreError::NotFound),
            (Some(blob), Some(meta_bytes)) => {
                let metadata: EntityMetadata =
                    serde_json::from_slice(&meta_bytes).map_err(|_| StoreError::Corrupt)?;
                f(&blob, &metadata)
            }
            _ => Err(StoreError::Corrupt),
        }
    }

    /// Run a read-modify-write transaction under the exclusive entity lock.
    ///
    /// `f` receives the previously persisted metadata (if any) and returns
    /// the new blob and metadata; both files are then written atomically.
    /// `committed` runs after the renames while the lock is still held;
    /// that is the slot where writers publish to their cache, so cache state can
    /// never run ahead of or behind the files. This is also how writers
    /// compute `version = prev + 1` without racing other processes.
    pub fn update<F, G>(
        &self,
        database: &str,
        key: &str,
        f: F,
        committed: G,
    ) -> StoreResult<EntityMetadata>
    where
        F: FnOnce(Option<&EntityMetadata>) -> StoreResult<(Vec<u8>, EntityMetadata)>,
        G: FnOnce(&EntityMetadata),
    {
        validate_entity_names(database, key).map_err(|e| StoreError::InvalidName(e.to_string()))?;
        let stem = Self::stem(database, key);
        let _lock = EntityLock::acquire(&self.lock_path(&stem), true)?;

        let prev = match read_optional(&self.meta_path(&stem))? {
            Some(bytes) => serde_json::from_slice::<EntityMetadata>(&bytes).ok(),
            None => None,
        };

        let (blob, metadata) = f(prev.as_ref())?;
        let meta_bytes = serde_json::to_vec_pretty(&metadata).map_err(|_| StoreError::Corrupt)?;

        // Blob first, metadata second: a crash between the renames leaves a
        // metadata file whose tag fails to authenticate the blob, which
        // readers already treat as an integrity failure.
        write_atomic(&self.blob_path(&stem), &blob)?;
        write_atomic(&self.meta_path(&stem), &meta_bytes)?;

        committed(&metadata);
        Ok(metadata)
    }

    /// Write an entity unconditionally (exclusive lock, atomic rename).
    pub fn write(
        &self,
        database: &str,
        key: &str,
        blob: Vec<u8>,
        metadata: EntityMetadata,
    ) -> StoreResult<()> {
        self.update(database, key, move |_| Ok((blob, metadata)), |_| {})?;
        Ok(())
    }
}

fn read_optional(path: &Path) -> StoreResult<Option<Vec<u8>>> {
    match File::open(path) {
        Ok(mut file) => {
            let mut buf = Vec::new();
            file.read_to_end(&mut buf)?;
            Ok(Some(buf))
        }
        Err(e) if e.kind() == IoErrorKind::NotFound => Ok(None),
        Err(e) => Err(StoreError::Io(e)),
    }
}

/// Write `bytes` to a same-directory temp file, fsync, and rename over the
/// target. Readers either see the old file or the new one, never a prefix.
fn write_atomic(target: &Path, bytes: &[u8]) -> StoreResult<()> {
    let mut rng = rand::thread_rng();
    let tmp = target.with_file_name(format!(
        "{}.tmp-{:08x}",
        target
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("entity"),
        rng.next_u32()
    ));

    let mut file = File::create(&tmp)?;
    file.write_all(bytes)?;
    file.sync_all()?;
    drop(file);

    match fs::rename(&tmp, target) {
        Ok(()) => Ok(()),
        Err(e) => {
            let _ = fs::remove_file(&tmp);
            Err(StoreError::Io(e))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn sample_metadata(database: &str, key: &str, version: u64) -> EntityMetadata {
        EntityMetadata {
            key_id: "key-00112233".to_string(),
            alg: ENTITY_ALG.to_string(),
            iv: "AAAAAAAAAAAAAAAA".to_string(),
            tag: "AAAAAAAAAAAAAAAAAAAAAA==".to_string(),
            schema_id: String::new(),
            version,
            writer_id: "test-worker".to_string(),
            timestamp: Utc::now(),
            database: database.to_string(),
            entity_key: key.to_string(),
        }
    }

    fn store() -> (TempDir, FileStore) {
        let dir = TempDir::new().unwrap();
        let store = FileStore::open(dir.path()).unwrap();
        (dir, store)
    }

    #[test]
    fn test_write_read_roundtrip() {
        let (_dir, store) = store();
        let meta = sample_metadata("chatdb", "Chat_id", 1);
        store
            .write("chatdb", "Chat_id", b"ciphertext".to_vec(), meta.clone())
            .unwrap();

        let (blob, read_meta) = store.read("chatdb", "Chat_id").unwrap();
        assert_eq!(blob, b"ciphertext");
        assert_eq!(read_meta.version, 1);
        assert_eq!(read_meta.alg, ENTITY_ALG);
    }

    #[test]
    fn test_missing_entity_is_not_found() {
        let (_dir, store) = store();
        assert!(matches!(
            store.read("chatdb", "absent"),
            Err(StoreError::NotFound)
        ));
    }

    #[test]
    fn test_half_pair_is_corrupt() {
        let (_dir, store) = store();
        let meta = sample_metadata("chatdb", "Chat_id", 1);
        store
            .write("chatdb", "Chat_id", b"blob".to_vec(), meta)
            .unwrap();

        fs::remove_file(store.files_dir().join("chatdb_Chat_id.json.enc")).unwrap();
        assert!(matches!(
            store.read("chatdb", "Chat_id"),
            Err(StoreError::Corrupt)
        ));
    }

    #[test]
    fn test_unparsable_metadata_is_corrupt() {
        let (_dir, store) = store();
        let meta = sample_metadata("chatdb", "Chat_id", 1);
        store
            .write("chatdb", "Chat_id", b"blob".to_vec(), meta)
            .unwrap();

        fs::write(store.files_dir().join("chatdb_Chat_id.meta.json"), b"{broken").unwrap();
        assert!(matches!(
            store.read("chatdb", "Chat_id"),
            Err(StoreError::Corrupt)
        ));
    }

    #[test]
    fn test_update_sees_previous_metadata() {
        let (_dir, store) = store();
        store
            .write("chatdb", "V", b"v1".to_vec(), sample_metadata("chatdb", "V", 1))
            .unwrap();

        let mut committed_version = 0;
        let new_meta = store
            .update(
                "chatdb",
                "V",
                |prev| {
                    let version = prev.map(|m| m.version + 1).unwrap_or(1);
                    Ok((b"v2".to_vec(), sample_metadata("chatdb", "V", version)))
                },
                |meta| committed_version = meta.version,
            )
            .unwrap();
        assert_eq!(new_meta.version, 2);
        assert_eq!(committed_version, 2, "committed hook must see the new metadata");

        let (blob, meta) = store.read("chatdb", "V").unwrap();
        assert_eq!(blob, b"v2");
        assert_eq!(meta.version, 2);
    }

    #[test]
    fn test_invalid_names_never_touch_disk() {
        let (dir, store) = store();
        for (db, key) in [
            ("../evil", "Chat_id"),
            ("chatdb", "foo/../../etc/passwd"),
            ("chatdb", ".."),
            ("", "k"),
        ] {
            assert!(matches!(
                store.read(db, key),
                Err(StoreError::InvalidName(_))
            ));
            assert!(matches!(
                store.write(db, key, vec![], sample_metadata("d", "k", 1)),
                Err(StoreError::InvalidName(_))
            ));
        }
        let entries: Vec<_> = fs::read_dir(dir.path().join("files")).unwrap().collect();
        assert!(entries.is_empty(), "no files may be created for bad names");
    }

    #[test]
    fn test_no_temp_residue_after_writes() {
        let (_dir, store) = store();
        for i in 0..20u64 {
            store
                .write("chatdb", "T", format!("blob-{i}").into_bytes(), sample_metadata("chatdb", "T", i + 1))
                .unwrap();
        }
        let leftovers: Vec<_> = fs::read_dir(store.files_dir())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().contains(".tmp-"))
            .collect();
        assert!(leftovers.is_empty(), "temp files leaked: {leftovers:?}");
    }

    #[test]
    fn test_lock_file_persists() {
        let (_dir, store) = store();
        store
            .write("chatdb", "L", b"x".to_vec(), sample_metadata("chatdb", "L", 1))
            .unwrap();
        assert!(store.files_dir().join("chatdb_L.lock").exists());
        let _ = store.read("chatdb", "L").unwrap();
        assert!(store.files_dir().join("chatdb_L.lock").exists());
    }

    #[test]
    fn test_concurrent_writers_linearize() {
        let (_dir, store) = store();
        let threads: Vec<_> = (0..8)
            .map(|_| {
                let store = store.clone();
                std::thread::spawn(move || {
                    for _ in 0..5 {
                        store
                            .update(
                                "chatdb",
                                "Race",
                                |prev| {
                                    let version = prev.map(|m| m.version + 1).unwrap_or(1);
                                    Ok((
                                        format!("v{version}").into_bytes(),
                                        sample_metadata("chatdb", "Race", version),
                                    ))
                                },
                                |_| {},
                            )
                            .unwrap();
                    }
                })
            })
            .collect();
        for t in threads {
            t.join().unwrap();
        }

        let (blob, meta) = store.read("chatdb", "Race").unwrap();
        assert_eq!(meta.version, 40, "every write must bump the version once");
        assert_eq!(blob, format!("v{}", meta.version).into_bytes());
    }
}
