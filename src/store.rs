use std::collections::BTreeMap;

use parking_lot::RwLock;

use crate::record::Record;

/// Records written during this process lifetime, keyed by id.
#[derive(Debug, Default)]
pub struct RecordStore {
    items: RwLock<BTreeMap<String, Record>>,
}

impl RecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.items.read().contains_key(id)
    }

    pub fn insert(&self, record: Record) {
        self.items.write().insert(record.id.clone(), record);
    }

    /// All records, ordered by id.
    pub fn list(&self) -> Vec<Record> {
        self.items.read().values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.items.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.read().is_empty()
    }
}
