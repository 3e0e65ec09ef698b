/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Traits for pluggable ledger and state persistence.
//!
//! The node does not ship a storage engine. Library users provide one by implementing [`KVStore`] over
//! a key-value database of their choice. Ledgers, states, and the request index all write to the same
//! store, each under its own [key prefix](super::variables).

use borsh::BorshDeserialize;

use super::{Key, LedgerError};

/// A key-value store that applies write batches atomically.
pub trait KVStore: KVGet + Clone + Send + 'static {
    type WriteBatch: WriteBatch;

    fn write(&mut self, wb: Self::WriteBatch);
}

pub trait KVGet {
    fn get(&self, key: &[u8]) -> Option<Vec<u8>>;

    /// Get the Borsh-deserialized value stored at `key`, or `None` if the key is not set.
    fn get_value<T: BorshDeserialize>(&self, key: &[u8], which: Key) -> Result<Option<T>, LedgerError> {
        match self.get(key) {
            Some(bytes) => Ok(Some(T::deserialize(&mut bytes.as_slice()).map_err(
                |err| LedgerError::DeserializeValueError {
                    key: which,
                    source: err,
                },
            )?)),
            None => Ok(None),
        }
    }
}

/// Writes and deletions collected to be applied in one [`KVStore::write`].
pub trait WriteBatch {
    fn new() -> Self;
    fn set(&mut self, key: &[u8], value: &[u8]);
    fn delete(&mut self, key: &[u8]);
}
