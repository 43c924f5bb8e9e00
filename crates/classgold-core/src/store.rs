use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::RwLock;
use thiserror::Error;

/// Record store failures, surfaced to callers as IO errors.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("record store IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("record store serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("record store unavailable: {0}")]
    Unavailable(String),
}

/// One record collection per entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Collection {
    Users,
    Products,
    Quests,
    Submissions,
    Transactions,
    OpeningBalances,
}

impl Collection {
    pub const ALL: [Collection; 6] = [
        Collection::Users,
        Collection::Products,
        Collection::Quests,
        Collection::Submissions,
        Collection::Transactions,
        Collection::OpeningBalances,
    ];

    /// Stable storage key.
    pub fn key(self) -> &'static str {
        match self {
            Self::Users => "app_users",
            Self::Products => "app_products",
            Self::Quests => "app_quests",
            Self::Submissions => "app_submissions",
            Self::Transactions => "app_transactions",
            Self::OpeningBalances => "app_opening_balances",
        }
    }
}

impl fmt::Display for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

/// Durable mapping from collection to an ordered sequence of records.
///
/// Calls are synchronous and all-or-nothing per collection. `load` returns
/// `None` for a collection that was never written, which lets the economy
/// seed defaults on first read.
pub trait RecordStore: Send + Sync {
    fn label(&self) -> &'static str;

    fn load(&self, collection: Collection) -> Result<Option<Vec<Value>>, StoreError>;

    fn save(&self, collection: Collection, records: Vec<Value>) -> Result<(), StoreError>;

    /// Drop every collection.
    fn clear(&self) -> Result<(), StoreError>;
}

/// Process-memory backend.
#[derive(Debug, Default)]
pub struct MemoryStore {
    collections: RwLock<BTreeMap<Collection, Vec<Value>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl RecordStore for MemoryStore {
    fn label(&self) -> &'static str {
        "memory"
    }

    fn load(&self, collection: Collection) -> Result<Option<Vec<Value>>, StoreError> {
        let collections = self
            .collections
            .read()
            .map_err(|_| StoreError::Unavailable("memory store lock poisoned".to_string()))?;
        Ok(collections.get(&collection).cloned())
    }

    fn save(&self, collection: Collection, records: Vec<Value>) -> Result<(), StoreError> {
        let mut collections = self
            .collections
            .write()
            .map_err(|_| StoreError::Unavailable("memory store lock poisoned".to_string()))?;
        collections.insert(collection, records);
        Ok(())
    }

    fn clear(&self) -> Result<(), StoreError> {
        let mut collections = self
            .collections
            .write()
            .map_err(|_| StoreError::Unavailable("memory store lock poisoned".to_string()))?;
        collections.clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unwritten_collection_loads_as_none() {
        let store = MemoryStore::new();
        assert!(store.load(Collection::Quests).unwrap().is_none());

        store.save(Collection::Quests, Vec::new()).unwrap();
        assert_eq!(store.load(Collection::Quests).unwrap(), Some(Vec::new()));
    }

    #[test]
    fn clear_forgets_every_collection() {
        let store = MemoryStore::new();
        store
            .save(Collection::Users, vec![serde_json::json!({"id": "s1"})])
            .unwrap();
        store.clear().unwrap();
        assert!(store.load(Collection::Users).unwrap().is_none());
    }

    #[test]
    fn collection_keys_are_stable() {
        let keys: Vec<&str> = Collection::ALL.iter().map(|c| c.key()).collect();
        assert_eq!(
            keys,
            [
                "app_users",
                "app_products",
                "app_quests",
                "app_submissions",
                "app_transactions",
                "app_opening_balances"
            ]
        );
    }
}
