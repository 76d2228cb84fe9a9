//! Registries of spent nullifier hashes, partitioned by external nullifier.
//!
//! Entries are only ever added within a scope; a scope is dropped as a whole
//! when it rotates out with [`NullifierRegistry::retire_scope`].

use parking_lot::Mutex;
use sled::{Db, Tree};
use std::collections::{HashMap, HashSet};
use std::path::Path;
use tracing::{debug, error, info};

use crate::field::FieldElement;
use greeter_types::{GreeterError, GreeterResult, FIELD_ELEMENT_SIZE};

/// Set of consumed nullifier hashes per scope.
pub trait NullifierRegistry: Send + Sync {
    /// Insert `hash` under `scope`. Returns `true` when newly inserted and
    /// `false` when already present. Linearizable: of any number of
    /// concurrent calls with the same arguments exactly one returns `true`.
    fn check_and_insert(&self, hash: FieldElement, scope: FieldElement) -> GreeterResult<bool>;

    /// Whether `hash` was already spent under `scope`.
    fn contains(&self, hash: FieldElement, scope: FieldElement) -> GreeterResult<bool>;

    /// Number of spent hashes recorded under `scope`.
    fn len_for_scope(&self, scope: FieldElement) -> GreeterResult<usize>;

    /// Forget every entry of `scope`. Returns how many were removed.
    fn retire_scope(&self, scope: FieldElement) -> GreeterResult<usize>;
}

/// In-process registry.
#[derive(Default)]
pub struct MemoryNullifierRegistry {
    scopes: Mutex<HashMap<FieldElement, HashSet<FieldElement>>>,
}

impl MemoryNullifierRegistry {
    /// Empty registry.
    pub fn new() -> Self {
        Self::default()
    }
}

impl NullifierRegistry for MemoryNullifierRegistry {
    fn check_and_insert(&self, hash: FieldElement, scope: FieldElement) -> GreeterResult<bool> {
        Ok(self.scopes.lock().entry(scope).or_default().insert(hash))
    }

    fn contains(&self, hash: FieldElement, scope: FieldElement) -> GreeterResult<bool> {
        Ok(self
            .scopes
            .lock()
            .get(&scope)
            .is_some_and(|set| set.contains(&hash)))
    }

    fn len_for_scope(&self, scope: FieldElement) -> GreeterResult<usize> {
        Ok(self.scopes.lock().get(&scope).map_or(0, HashSet::len))
    }

    fn retire_scope(&self, scope: FieldElement) -> GreeterResult<usize> {
        let removed = self.scopes.lock().remove(&scope).map_or(0, |set| set.len());
        debug!(scope = %scope, removed, "Retired nullifier scope");
        Ok(removed)
    }
}

/// Registry persisted in a sled tree. Key is `scope || hash`, value the
/// acceptance time in unix milliseconds.
pub struct SledNullifierRegistry {
    _db: Db,
    tree: Tree,
}

impl SledNullifierRegistry {
    const TREE_NAME: &'static str = "nullifiers";

    /// Open or create the registry database at `path`.
    pub fn open(path: &Path) -> GreeterResult<Self> {
        info!("Opening nullifier registry at {:?}", path);
        let db = sled::Config::new()
            .path(path)
            .open()
            .map_err(|e| GreeterError::Storage(format!("Failed to open database: {}", e)))?;
        Self::from_db(db)
    }

    /// Registry backed by a temporary database, removed on drop.
    pub fn temporary() -> GreeterResult<Self> {
        let db = sled::Config::new()
            .temporary(true)
            .open()
            .map_err(|e| GreeterError::Storage(format!("Failed to open temp database: {}", e)))?;
        Self::from_db(db)
    }

    fn from_db(db: Db) -> GreeterResult<Self> {
        let tree = db.open_tree(Self::TREE_NAME).map_err(|e| {
            GreeterError::Storage(format!("Failed to open {} tree: {}", Self::TREE_NAME, e))
        })?;
        Ok(Self { _db: db, tree })
    }

    /// Claim `key` and make the claim durable. A claim that cannot be
    /// flushed is withdrawn again before the error is returned.
    fn insert_durably(
        &self,
        key: &[u8],
        value: &[u8],
        flush: impl FnOnce(&Tree) -> sled::Result<usize>,
    ) -> GreeterResult<bool> {
        let swapped = self
            .tree
            .compare_and_swap(key, None as Option<&[u8]>, Some(value))
            .map_err(|e| GreeterError::Storage(e.to_string()))?;

        if swapped.is_err() {
            return Ok(false);
        }

        if let Err(e) = flush(&self.tree) {
            error!(error = %e, "Failed to flush nullifier, withdrawing it");
            if let Err(undo) = self
                .tree
                .compare_and_swap(key, Some(value), None as Option<&[u8]>)
            {
                error!(error = %undo, "Failed to withdraw unflushed nullifier");
            }
            return Err(GreeterError::Storage(format!("Failed to flush nullifier: {}", e)));
        }
        Ok(true)
    }

    fn key(hash: FieldElement, scope: FieldElement) -> [u8; 2 * FIELD_ELEMENT_SIZE] {
        let mut key = [0u8; 2 * FIELD_ELEMENT_SIZE];
        key[..FIELD_ELEMENT_SIZE].copy_from_slice(&scope.to_bytes());
        key[FIELD_ELEMENT_SIZE..].copy_from_slice(&hash.to_bytes());
        key
    }
}

impl NullifierRegistry for SledNullifierRegistry {
    fn check_and_insert(&self, hash: FieldElement, scope: FieldElement) -> GreeterResult<bool> {
        let accepted_at = chrono::Utc::now().timestamp_millis().to_be_bytes();
        self.insert_durably(&Self::key(hash, scope), &accepted_at, Tree::flush)
    }

    fn contains(&self, hash: FieldElement, scope: FieldElement) -> GreeterResult<bool> {
        self.tree
            .contains_key(Self::key(hash, scope))
            .map_err(|e| GreeterError::Storage(e.to_string()))
    }

    fn len_for_scope(&self, scope: FieldElement) -> GreeterResult<usize> {
        let mut count = 0;
        for entry in self.tree.scan_prefix(scope.to_bytes()) {
            entry.map_err(|e| GreeterError::Storage(e.to_string()))?;
            count += 1;
        }
        Ok(count)
    }

    fn retire_scope(&self, scope: FieldElement) -> GreeterResult<usize> {
        let mut removed = 0;
        for entry in self.tree.scan_prefix(scope.to_bytes()) {
            let (key, _) = entry.map_err(|e| GreeterError::Storage(e.to_string()))?;
            self.tree
                .remove(key)
                .map_err(|e| GreeterError::Storage(e.to_string()))?;
            removed += 1;
        }
        self.tree
            .flush()
            .map_err(|e| GreeterError::Storage(e.to_string()))?;
        debug!(scope = %scope, removed, "Retired nullifier scope");
        Ok(removed)
    }
}
