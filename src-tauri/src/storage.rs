use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};

use tracing::{debug, warn};

use crate::error::StorageError;

const SLOT_EXTENSION: &str = "json";
const MAX_KEY_LEN: usize = 120;

/// Named durable text slots, the local-storage model the front-end grew up on.
///
/// One key holds one whole snapshot; there is no partial update.
pub trait SlotStore: Send + Sync {
    /// Returns None if the key was never written, and
    /// `StorageError::Corrupt` if the stored bytes are not text.
    fn get(&self, key: &str) -> Result<Option<String>, StorageError>;

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError>;

    fn remove(&self, key: &str) -> Result<(), StorageError>;

    /// Moves an undecodable payload out of the way so the next write does not
    /// destroy it. Returns where it went, if anywhere.
    fn quarantine(&self, _key: &str) -> Result<Option<String>, StorageError> {
        Ok(None)
    }
}

impl<T: SlotStore + ?Sized> SlotStore for std::sync::Arc<T> {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        (**self).get(key)
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        (**self).set(key, value)
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        (**self).remove(key)
    }

    fn quarantine(&self, key: &str) -> Result<Option<String>, StorageError> {
        (**self).quarantine(key)
    }
}

/// Keys become file stems, so only a conservative alphabet is allowed.
pub fn validate_key(key: &str) -> Result<&str, StorageError> {
    let trimmed = key.trim();
    let valid = !trimmed.is_empty()
        && trimmed.len() <= MAX_KEY_LEN
        && trimmed != "."
        && trimmed != ".."
        && trimmed
            .chars()
            .all(|ch| ch.is_ascii_alphanumeric() || ch == '-' || ch == '_' || ch == '.');
    if valid {
        Ok(trimmed)
    } else {
        Err(StorageError::InvalidKey(key.to_string()))
    }
}

/// File-per-key store under one root directory.
pub struct FileSlotStore {
    root: PathBuf,
}

impl FileSlotStore {
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let root = root.into();
        fs::create_dir_all(&root).map_err(|err| StorageError::io(&root, err))?;
        debug!("slot store opened at {}", root.display());
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn slot_path(&self, key: &str) -> Result<PathBuf, StorageError> {
        let key = validate_key(key)?;
        Ok(self.root.join(format!("{key}.{SLOT_EXTENSION}")))
    }
}

fn companion_path(path: &Path, suffix: &str) -> PathBuf {
    let file_name = path
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or("slot.json");
    path.with_file_name(format!("{file_name}{suffix}"))
}

fn backup_path(path: &Path) -> PathBuf {
    companion_path(path, ".bak")
}

fn next_corrupt_path(path: &Path) -> PathBuf {
    let ms = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or(0);
    let base = companion_path(path, &format!(".corrupt-{ms}"));
    let mut candidate = base.clone();
    let mut suffix = 1;
    while candidate.exists() {
        candidate = companion_path(&base, &format!("-{suffix}"));
        suffix += 1;
    }
    candidate
}

/// Temp file, then `.bak` rotation, then rename into place. If the final
/// rename fails the previous snapshot is put back.
fn write_atomically(path: &Path, content: &str) -> Result<(), StorageError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|err| StorageError::io(parent, err))?;
    }

    let temp_path = companion_path(path, ".tmp");
    let backup = backup_path(path);

    fs::write(&temp_path, content).map_err(|err| StorageError::io(&temp_path, err))?;
    if let Ok(file) = fs::OpenOptions::new().write(true).open(&temp_path) {
        let _ = file.sync_all();
    }

    let had_existing = path.exists();
    if had_existing {
        if backup.exists() {
            fs::remove_file(&backup).map_err(|err| StorageError::io(&backup, err))?;
        }
        fs::rename(path, &backup).map_err(|err| StorageError::io(&backup, err))?;
    }

    if let Err(err) = fs::rename(&temp_path, path) {
        let _ = fs::remove_file(&temp_path);
        if had_existing && !path.exists() && backup.exists() {
            let _ = fs::rename(&backup, path);
        }
        return Err(StorageError::io(path, err));
    }
    Ok(())
}

impl SlotStore for FileSlotStore {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        let path = self.slot_path(key)?;
        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(StorageError::io(path, err)),
        };
        String::from_utf8(bytes)
            .map(Some)
            .map_err(|err| StorageError::Corrupt {
                key: key.to_string(),
                reason: err.to_string(),
            })
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let path = self.slot_path(key)?;
        write_atomically(&path, value)
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        let path = self.slot_path(key)?;
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(StorageError::io(path, err)),
        }
    }

    fn quarantine(&self, key: &str) -> Result<Option<String>, StorageError> {
        let path = self.slot_path(key)?;
        if !path.exists() {
            return Ok(None);
        }
        let target = next_corrupt_path(&path);
        fs::rename(&path, &target).map_err(|err| StorageError::io(&target, err))?;
        warn!(
            "quarantined corrupt slot {key} to {}",
            target.display()
        );
        Ok(Some(target.to_string_lossy().to_string()))
    }
}

/// In-memory slots, for tests and for running without a data directory.
#[derive(Default)]
pub struct MemorySlotStore {
    slots: Mutex<HashMap<String, String>>,
    fail_writes: AtomicBool,
}

impl MemorySlotStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_entry(key: &str, value: &str) -> Self {
        let store = Self::default();
        store
            .lock()
            .insert(key.to_string(), value.to_string());
        store
    }

    /// Makes every following `set`/`remove` fail until switched back.
    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, String>> {
        match self.slots.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn check_writable(&self) -> Result<(), StorageError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StorageError::Other("memory slot store is read-only".to_string()));
        }
        Ok(())
    }
}

impl SlotStore for MemorySlotStore {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        let key = validate_key(key)?;
        Ok(self.lock().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let key = validate_key(key)?;
        self.check_writable()?;
        self.lock().insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        let key = validate_key(key)?;
        self.check_writable()?;
        self.lock().remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn key_validation() {
        assert!(validate_key("maintenanceData").is_ok());
        assert!(validate_key("kanban-board_v2").is_ok());
        assert!(validate_key("../etc/passwd").is_err());
        assert!(validate_key("a/b").is_err());
        assert!(validate_key("..").is_err());
        assert!(validate_key("").is_err());
    }

    #[test]
    fn file_store_missing_key_is_none() {
        let tmp = TempDir::new().unwrap();
        let store = FileSlotStore::open(tmp.path()).unwrap();
        assert_eq!(store.get("maintenanceData").unwrap(), None);
    }

    #[test]
    fn file_store_keeps_previous_snapshot_as_backup() {
        let tmp = TempDir::new().unwrap();
        let store = FileSlotStore::open(tmp.path()).unwrap();
        store.set("maintenanceData", "[1]").unwrap();
        store.set("maintenanceData", "[1,2]").unwrap();

        assert_eq!(store.get("maintenanceData").unwrap().as_deref(), Some("[1,2]"));
        let path = store.slot_path("maintenanceData").unwrap();
        let backup = fs::read_to_string(backup_path(&path)).unwrap();
        assert_eq!(backup, "[1]");
        assert!(!companion_path(&path, ".tmp").exists());
    }

    #[test]
    fn file_store_remove_is_idempotent() {
        let tmp = TempDir::new().unwrap();
        let store = FileSlotStore::open(tmp.path()).unwrap();
        store.set("console", "{}").unwrap();
        store.remove("console").unwrap();
        store.remove("console").unwrap();
        assert_eq!(store.get("console").unwrap(), None);
    }

    #[test]
    fn quarantine_moves_payload_aside() {
        let tmp = TempDir::new().unwrap();
        let store = FileSlotStore::open(tmp.path()).unwrap();
        store.set("maintenanceData", "{not json").unwrap();

        let moved = store.quarantine("maintenanceData").unwrap().unwrap();
        assert!(moved.contains(".corrupt-"));
        assert_eq!(fs::read_to_string(&moved).unwrap(), "{not json");
        assert_eq!(store.get("maintenanceData").unwrap(), None);
        assert_eq!(store.quarantine("maintenanceData").unwrap(), None);
    }

    #[test]
    fn non_utf8_slot_reads_as_corrupt() {
        let tmp = TempDir::new().unwrap();
        let store = FileSlotStore::open(tmp.path()).unwrap();
        let path = store.slot_path("maintenanceData").unwrap();
        fs::write(&path, [0xff, 0xfe, b'[', b']']).unwrap();

        let err = store.get("maintenanceData").unwrap_err();
        assert!(err.is_corrupt());
        assert!(store.quarantine("maintenanceData").unwrap().is_some());
        assert_eq!(store.get("maintenanceData").unwrap(), None);
    }

    #[test]
    fn memory_store_can_refuse_writes() {
        let store = MemorySlotStore::with_entry("console", "{}");
        store.fail_writes(true);
        assert!(store.set("console", "[]").is_err());
        assert_eq!(store.get("console").unwrap().as_deref(), Some("{}"));
        store.fail_writes(false);
        store.set("console", "[]").unwrap();
        assert_eq!(store.len(), 1);
    }
}
