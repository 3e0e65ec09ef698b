//! A volatile, in-memory [`KVStore`] shared by every handle cloned from it.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};

use rbft_node::ledger::pluggables::{KVGet, KVStore, WriteBatch};

/// An in-memory implementation of [`KVStore`]. Cloning a `MemDB` gives another handle to the same
/// store, so a node can be "restarted" on the data a previous node left behind.
#[derive(Clone)]
pub(crate) struct MemDB {
    map: Arc<Mutex<HashMap<Vec<u8>, Vec<u8>>>>,
    // How many more writes land before the store stops persisting anything. `None` if unlimited.
    writes_left: Arc<Mutex<Option<usize>>>,
}

impl MemDB {
    /// Create a new, empty `MemDB`.
    pub(crate) fn new() -> MemDB {
        MemDB {
            map: Arc::new(Mutex::new(HashMap::new())),
            writes_left: Arc::new(Mutex::new(None)),
        }
    }

    /// Simulate a crash: after `writes` more writes, every write is lost.
    pub(crate) fn crash_after(&self, writes: usize) {
        *self.writes_left.lock().unwrap() = Some(writes);
    }

    /// Persist writes again, e.g., once the node that crashed is restarted.
    pub(crate) fn recover(&self) {
        *self.writes_left.lock().unwrap() = None;
    }
}

impl KVStore for MemDB {
    type WriteBatch = MemWriteBatch;

    fn write(&mut self, wb: Self::WriteBatch) {
        match &mut *self.writes_left.lock().unwrap() {
            Some(0) => return,
            Some(writes_left) => *writes_left -= 1,
            None => (),
        }
        let mut map = self.map.lock().unwrap();
        for (key, change) in wb.changes {
            if let Some(value) = change {
                map.insert(key, value);
            } else {
                map.remove(&key);
            }
        }
    }
}

impl KVGet for MemDB {
    fn get(&self, key: &[u8]) -> Option<Vec<u8>> {
        self.map.lock().unwrap().get(key).cloned()
    }
}

// The latest change to each key: `Some` sets it, `None` deletes it.
pub(crate) struct MemWriteBatch {
    changes: HashMap<Vec<u8>, Option<Vec<u8>>>,
}

impl WriteBatch for MemWriteBatch {
    fn new() -> Self {
        MemWriteBatch {
            changes: HashMap::new(),
        }
    }

    fn set(&mut self, key: &[u8], value: &[u8]) {
        self.changes.insert(key.to_vec(), Some(value.to_vec()));
    }

    fn delete(&mut self, key: &[u8]) {
        self.changes.insert(key.to_vec(), None);
    }
}
