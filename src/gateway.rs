//! Aggregated read surface over the whole store.
//!
//! Consumers that render or export the journal want everything at once, not
//! seven round trips. The gateway fans out over the collections and inherits
//! the store's read-path policy: a failing collection shows up empty rather
//! than failing the whole snapshot.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::store::RecordStore;
use crate::types::{Collection, Record};

pub struct DataGateway {
    store: Arc<RecordStore>,
}

impl DataGateway {
    pub fn new(store: Arc<RecordStore>) -> Self {
        DataGateway { store }
    }

    pub fn store(&self) -> &Arc<RecordStore> {
        &self.store
    }

    /// Full snapshot: every collection, newest first within each.
    pub async fn all_tables(&self) -> BTreeMap<Collection, Vec<Record>> {
        let mut tables = BTreeMap::new();
        for collection in Collection::ALL {
            tables.insert(collection, self.store.get_all(collection).await);
        }
        tables
    }

    /// Snapshot limited to records created within the last `days` days.
    pub async fn recent(&self, days: u32) -> BTreeMap<Collection, Vec<Record>> {
        let mut tables = BTreeMap::new();
        for collection in Collection::ALL {
            tables.insert(collection, self.store.get_recent(collection, days).await);
        }
        tables
    }

    /// Record count per collection.
    pub async fn stats(&self) -> BTreeMap<Collection, u64> {
        let mut stats = BTreeMap::new();
        for collection in Collection::ALL {
            stats.insert(collection, self.store.count(collection).await);
        }
        stats
    }
}
