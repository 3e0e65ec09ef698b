//! A volatile, in-memory [`KVStore`] for unit tests.

use std::{
    collections::BTreeMap,
    sync::{Arc, Mutex},
};

use super::pluggables::{KVGet, KVStore, WriteBatch};

#[derive(Clone, Default)]
pub(crate) struct MemDB(Arc<Mutex<BTreeMap<Vec<u8>, Vec<u8>>>>);

impl MemDB {
    pub(crate) fn new() -> MemDB {
        MemDB::default()
    }
}

impl KVStore for MemDB {
    type WriteBatch = MemWriteBatch;

    fn write(&mut self, wb: Self::WriteBatch) {
        let mut map = self.0.lock().unwrap();
        for (key, value) in wb.0 {
            match value {
                Some(value) => map.insert(key, value),
                None => map.remove(&key),
            };
        }
    }
}

impl KVGet for MemDB {
    fn get(&self, key: &[u8]) -> Option<Vec<u8>> {
        self.0.lock().unwrap().get(key).cloned()
    }
}

/// Writes and deletions, applied in the order they were made.
pub(crate) struct MemWriteBatch(Vec<(Vec<u8>, Option<Vec<u8>>)>);

impl WriteBatch for MemWriteBatch {
    fn new() -> Self {
        MemWriteBatch(Vec::new())
    }

    fn set(&mut self, key: &[u8], value: &[u8]) {
        self.0.push((key.to_vec(), Some(value.to_vec())));
    }

    fn delete(&mut self, key: &[u8]) {
        self.0.push((key.to_vec(), None));
    }
}
