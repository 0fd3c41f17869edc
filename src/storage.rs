//! Durable string key/value storage for session state.
//!
//! Values are JSON blobs. Each UI mode owns its own keys, listed below, so
//! that the evaluation caches never collide with saved games or settings.

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::warn;

use crate::error::GameError;

/// Analysis view: array of nullable results indexed by move.
pub const EVALUATION_TABLE: &str = "evaluationTable";
/// Live-play view: map of position key to result.
pub const LIVE_EVALUATION_TABLE: &str = "liveEvaluationTable";
/// PGN handed from a finished game to the analysis view.
pub const SAVED_PGN: &str = "savedPGN";
pub const VS_GAME_STATE: &str = "vsChessGameState";
pub const VS_AI_GAME_STATE: &str = "vsAiChessGameState";
pub const AI_SETTINGS: &str = "aiSettings";

pub trait Storage: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;
    fn set(&self, key: &str, value: String) -> Result<(), GameError>;
    fn remove(&self, key: &str) -> Result<(), GameError>;
}

/// Decode the blob under `key`. A blob that no longer decodes is treated as
/// absent so a stale format never blocks startup.
pub fn load_json<T: DeserializeOwned>(storage: &dyn Storage, key: &str) -> Option<T> {
    let text = storage.get(key)?;
    match serde_json::from_str(&text) {
        Ok(value) => Some(value),
        Err(e) => {
            warn!(key, error = %e, "discarding undecodable stored value");
            None
        }
    }
}

pub fn save_json<T: Serialize + ?Sized>(
    storage: &dyn Storage,
    key: &str,
    value: &T,
) -> Result<(), GameError> {
    storage.set(key, serde_json::to_string(value)?)
}

#[derive(Debug, Default)]
pub struct MemoryStorage {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Storage for MemoryStorage {
    fn get(&self, key: &str) -> Option<String> {
        let entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries.get(key).cloned()
    }

    fn set(&self, key: &str, value: String) -> Result<(), GameError> {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries.insert(key.to_owned(), value);
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), GameError> {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries.remove(key);
        Ok(())
    }
}

/// All keys in one JSON object on disk, rewritten on every change.
#[derive(Debug)]
pub struct FileStorage {
    path: PathBuf,
    entries: Mutex<BTreeMap<String, String>>,
}

impl FileStorage {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, GameError> {
        let path = path.as_ref().to_path_buf();
        let entries = match fs::read_to_string(&path) {
            Ok(text) if !text.trim().is_empty() => serde_json::from_str(&text)?,
            Ok(_) => BTreeMap::new(),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => return Err(e.into()),
        };
        Ok(Self {
            path,
            entries: Mutex::new(entries),
        })
    }

    fn flush(&self, entries: &BTreeMap<String, String>) -> Result<(), GameError> {
        let tmp = self.path.with_extension("tmp");
        fs::write(&tmp, serde_json::to_vec_pretty(entries)?)?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

impl Storage for FileStorage {
    fn get(&self, key: &str) -> Option<String> {
        let entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries.get(key).cloned()
    }

    fn set(&self, key: &str, value: String) -> Result<(), GameError> {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries.insert(key.to_owned(), value);
        self.flush(&entries)
    }

    fn remove(&self, key: &str) -> Result<(), GameError> {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        if entries.remove(key).is_some() {
            self.flush(&entries)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scratch_path(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("chess-annotator-{}", std::process::id()));
        fs::create_dir_all(&dir).unwrap();
        let path = dir.join(name);
        let _ = fs::remove_file(&path);
        path
    }

    #[test]
    fn memory_storage_basics() {
        let s = MemoryStorage::new();
        assert_eq!(s.get(SAVED_PGN), None);
        s.set(SAVED_PGN, "1. e4 *".to_owned()).unwrap();
        assert_eq!(s.get(SAVED_PGN).as_deref(), Some("1. e4 *"));
        s.remove(SAVED_PGN).unwrap();
        assert_eq!(s.get(SAVED_PGN), None);
    }

    #[test]
    fn json_helpers_skip_stale_blobs() {
        let s = MemoryStorage::new();
        save_json(&s, AI_SETTINGS, &vec![1, 2, 3]).unwrap();
        assert_eq!(load_json::<Vec<i32>>(&s, AI_SETTINGS), Some(vec![1, 2, 3]));
        s.set(AI_SETTINGS, "{broken".to_owned()).unwrap();
        assert_eq!(load_json::<Vec<i32>>(&s, AI_SETTINGS), None);
    }

    #[test]
    fn file_storage_survives_reopen() {
        let path = scratch_path("reopen.json");
        {
            let s = FileStorage::open(&path).unwrap();
            s.set(VS_GAME_STATE, "{}".to_owned()).unwrap();
            s.set(SAVED_PGN, "*".to_owned()).unwrap();
            s.remove(SAVED_PGN).unwrap();
        }
        let s = FileStorage::open(&path).unwrap();
        assert_eq!(s.get(VS_GAME_STATE).as_deref(), Some("{}"));
        assert_eq!(s.get(SAVED_PGN), None);
        fs::remove_file(&path).unwrap();
    }

    #[test]
    fn file_storage_rejects_corrupt_file() {
        let path = scratch_path("corrupt.json");
        fs::write(&path, "not json").unwrap();
        assert!(matches!(FileStorage::open(&path), Err(GameError::Storage(_))));
        fs::remove_file(&path).unwrap();
    }
}
