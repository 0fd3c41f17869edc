//! Per-mode evaluation cache backed by [`Storage`].
//!
//! The analysis view keeps a table indexed by ply (0 is the starting
//! position, `n` the position after `n` moves) because a loaded game fixes
//! the position for every index. The live-play view has no stable index and
//! keys by position instead. The two never share entries.
//!
//! Each table slot also remembers the position it was computed for, and a
//! lookup whose position differs is a miss. A table left behind by another
//! game can then cost a request but never shows a wrong score.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::storage::{self, EVALUATION_TABLE, LIVE_EVALUATION_TABLE, Storage};
use crate::types::{EvaluationResult, PositionKey};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheMode {
    Analysis,
    LivePlay,
}

impl CacheMode {
    pub fn storage_key(self) -> &'static str {
        match self {
            CacheMode::Analysis => EVALUATION_TABLE,
            CacheMode::LivePlay => LIVE_EVALUATION_TABLE,
        }
    }
}

/// What a poll is about: the position, and for the analysis view its ply.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub position: PositionKey,
    pub ply: Option<usize>,
}

impl CacheKey {
    pub fn position(position: PositionKey) -> Self {
        Self {
            position,
            ply: None,
        }
    }

    pub fn at_ply(position: PositionKey, ply: usize) -> Self {
        Self {
            position,
            ply: Some(ply),
        }
    }
}

/// One slot of the analysis table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct TableEntry {
    fen: PositionKey,
    #[serde(flatten)]
    result: EvaluationResult,
}

pub struct EvaluationCache {
    mode: CacheMode,
    storage: Arc<dyn Storage>,
    table: Vec<Option<TableEntry>>,
    positions: BTreeMap<PositionKey, EvaluationResult>,
}

impl EvaluationCache {
    /// Load whatever the previous session persisted for `mode`.
    pub fn open(mode: CacheMode, storage: Arc<dyn Storage>) -> Self {
        let mut cache = Self {
            mode,
            storage,
            table: Vec::new(),
            positions: BTreeMap::new(),
        };
        match mode {
            CacheMode::Analysis => {
                cache.table = storage::load_json(&*cache.storage, EVALUATION_TABLE).unwrap_or_default();
            }
            CacheMode::LivePlay => {
                cache.positions =
                    storage::load_json(&*cache.storage, LIVE_EVALUATION_TABLE).unwrap_or_default();
            }
        }
        cache
    }

    pub fn mode(&self) -> CacheMode {
        self.mode
    }

    pub fn get(&self, key: &CacheKey) -> Option<EvaluationResult> {
        match self.mode {
            CacheMode::Analysis => {
                let entry = self.table.get(key.ply?)?.as_ref()?;
                if entry.fen != key.position {
                    debug!(
                        fen = %key.position,
                        cached = %entry.fen,
                        "analysis slot holds another position"
                    );
                    return None;
                }
                Some(entry.result)
            }
            CacheMode::LivePlay => self.positions.get(&key.position).copied(),
        }
    }

    /// Store `result` unless the key already has an entry. Returns whether it
    /// was stored. Persistence failures are logged; the entry stays in memory.
    pub fn record(&mut self, key: &CacheKey, result: EvaluationResult) -> bool {
        if self.get(key).is_some() {
            return false;
        }
        let persisted = match self.mode {
            CacheMode::Analysis => {
                let Some(ply) = key.ply else {
                    debug!(fen = %key.position, "analysis cache needs a ply, not recording");
                    return false;
                };
                if self.table.len() <= ply {
                    self.table.resize(ply + 1, None);
                }
                // a stale slot from another game is overwritten
                self.table[ply] = Some(TableEntry {
                    fen: key.position.clone(),
                    result,
                });
                storage::save_json(&*self.storage, EVALUATION_TABLE, &self.table)
            }
            CacheMode::LivePlay => {
                self.positions.insert(key.position.clone(), result);
                storage::save_json(&*self.storage, LIVE_EVALUATION_TABLE, &self.positions)
            }
        };
        if let Err(e) = persisted {
            warn!(error = %e, mode = ?self.mode, "failed to persist evaluation cache");
        }
        true
    }

    /// Forget every entry, e.g. on a new game or a newly loaded PGN.
    pub fn clear(&mut self) {
        self.table.clear();
        self.positions.clear();
        if let Err(e) = self.storage.remove(self.mode.storage_key()) {
            warn!(error = %e, mode = ?self.mode, "failed to clear evaluation cache");
        }
    }

    pub fn len(&self) -> usize {
        match self.mode {
            CacheMode::Analysis => self.table.iter().flatten().count(),
            CacheMode::LivePlay => self.positions.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStorage;

    fn storage() -> Arc<dyn Storage> {
        Arc::new(MemoryStorage::new())
    }

    #[test]
    fn analysis_table_persists_as_nullable_array() {
        let store = storage();
        let mut cache = EvaluationCache::open(CacheMode::Analysis, store.clone());
        let key = CacheKey::at_ply(PositionKey::starting(), 2);
        assert!(cache.record(&key, EvaluationResult::centipawns(30, 12)));

        let raw = store.get(EVALUATION_TABLE).unwrap();
        assert_eq!(
            raw,
            format!(
                r#"[null,null,{{"fen":"{}","kind":"cp","value":30,"depth":12}}]"#,
                PositionKey::starting()
            )
        );

        let reopened = EvaluationCache::open(CacheMode::Analysis, store);
        assert_eq!(reopened.get(&key), Some(EvaluationResult::centipawns(30, 12)));
        assert_eq!(reopened.get(&CacheKey::at_ply(PositionKey::starting(), 0)), None);
        assert_eq!(reopened.len(), 1);
    }

    #[test]
    fn entries_are_write_once() {
        let mut cache = EvaluationCache::open(CacheMode::LivePlay, storage());
        let key = CacheKey::position(PositionKey::starting());
        assert!(cache.record(&key, EvaluationResult::centipawns(20, 20)));
        assert!(!cache.record(&key, EvaluationResult::centipawns(90, 24)));
        assert_eq!(cache.get(&key), Some(EvaluationResult::centipawns(20, 20)));
    }

    #[test]
    fn modes_use_separate_stores() {
        let store = storage();
        let mut live = EvaluationCache::open(CacheMode::LivePlay, store.clone());
        live.record(
            &CacheKey::at_ply(PositionKey::starting(), 0),
            EvaluationResult::centipawns(20, 20),
        );
        let analysis = EvaluationCache::open(CacheMode::Analysis, store);
        assert!(analysis.get(&CacheKey::at_ply(PositionKey::starting(), 0)).is_none());
    }

    #[test]
    fn analysis_ignores_keys_without_ply() {
        let mut cache = EvaluationCache::open(CacheMode::Analysis, storage());
        let key = CacheKey::position(PositionKey::starting());
        assert!(!cache.record(&key, EvaluationResult::centipawns(1, 1)));
        assert!(cache.is_empty());
    }

    #[test]
    fn analysis_slot_for_another_position_is_a_miss() {
        let store = storage();
        let mut cache = EvaluationCache::open(CacheMode::Analysis, store.clone());
        let f3 = PositionKey::parse("rnbqkbnr/pppppppp/8/8/8/5P2/PPPPP1PP/RNBQKBNR b KQkq - 0 1").unwrap();
        let e4 = PositionKey::parse("rnbqkbnr/pppppppp/8/8/4P3/8/PPPP1PPP/RNBQKBNR b KQkq - 0 1").unwrap();
        cache.record(&CacheKey::at_ply(f3.clone(), 1), EvaluationResult::centipawns(900, 12));

        let mut reopened = EvaluationCache::open(CacheMode::Analysis, store);
        let key = CacheKey::at_ply(e4, 1);
        assert_eq!(reopened.get(&key), None);
        assert!(reopened.record(&key, EvaluationResult::centipawns(30, 12)));
        assert_eq!(reopened.get(&key), Some(EvaluationResult::centipawns(30, 12)));
        assert_eq!(reopened.get(&CacheKey::at_ply(f3, 1)), None);
    }

    #[test]
    fn legacy_table_without_positions_is_discarded() {
        let store = storage();
        store
            .set(EVALUATION_TABLE, r#"[{"kind":"cp","value":30,"depth":12}]"#.to_owned())
            .unwrap();
        let cache = EvaluationCache::open(CacheMode::Analysis, store);
        assert!(cache.is_empty());
    }

    #[test]
    fn clear_drops_persisted_entries() {
        let store = storage();
        let mut cache = EvaluationCache::open(CacheMode::LivePlay, store.clone());
        cache.record(
            &CacheKey::position(PositionKey::starting()),
            EvaluationResult::mate(2, 20),
        );
        cache.clear();
        assert!(cache.is_empty());
        assert_eq!(store.get(LIVE_EVALUATION_TABLE), None);
    }
}
