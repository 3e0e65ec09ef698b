/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Key-value states derived from ledgers.
//!
//! Writes are first kept *pending* in memory, each one extending the state's head hash:
//!
//! ```text
//! head' = SHA256(head || len(key) || key || value)
//! ```
//!
//! A prefix of the pending writes can then be committed by naming the head hash it ends at, or the
//! pending writes can be reverted back to an earlier head.

use borsh::BorshSerialize;

use crate::types::{
    crypto_primitives::hash_parts,
    data_types::{CryptoHash, LedgerId},
};

use super::{
    pluggables::{KVGet, KVStore, WriteBatch},
    variables::{self, concat},
    Key, LedgerError,
};

struct PendingWrite {
    key: Vec<u8>,
    value: Vec<u8>,
    head_after: CryptoHash,
}

pub struct State<K: KVStore> {
    ledger_id: LedgerId,
    kv_store: K,
    committed_head: CryptoHash,
    pending: Vec<PendingWrite>,
}

impl<K: KVStore> State<K> {
    pub fn open(ledger_id: LedgerId, kv_store: K) -> Result<State<K>, LedgerError> {
        let committed_head = kv_store
            .get_value(
                &head_key(ledger_id),
                Key::CommittedStateHead { ledger_id },
            )?
            .unwrap_or(CryptoHash::zero());

        Ok(State {
            ledger_id,
            kv_store,
            committed_head,
            pending: Vec::new(),
        })
    }

    /// Get the value at `key`. If `is_committed` is false, pending writes are visible.
    pub fn get(&self, key: &[u8], is_committed: bool) -> Option<Vec<u8>> {
        if !is_committed {
            if let Some(write) = self.pending.iter().rev().find(|write| write.key == key) {
                return Some(write.value.clone());
            }
        }
        self.kv_store.get(&value_key(self.ledger_id, key))
    }

    /// Set `key` to `value` as a pending write.
    pub fn set(&mut self, key: &[u8], value: &[u8]) {
        let head_after = hash_parts(&[
            &self.head_hash().bytes(),
            &(key.len() as u64).to_le_bytes(),
            key,
            value,
        ]);
        self.pending.push(PendingWrite {
            key: key.to_vec(),
            value: value.to_vec(),
            head_after,
        });
    }

    /// Head hash including pending writes.
    pub fn head_hash(&self) -> CryptoHash {
        self.pending
            .last()
            .map(|write| write.head_after)
            .unwrap_or(self.committed_head)
    }

    pub fn committed_head_hash(&self) -> CryptoHash {
        self.committed_head
    }

    pub fn is_empty(&self) -> bool {
        self.committed_head == CryptoHash::zero() && self.pending.is_empty()
    }

    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }

    /// Commit pending writes up to the one that produced `root`, or every pending write if `root` is
    /// `None`.
    pub fn commit(&mut self, root: Option<CryptoHash>) -> Result<(), LedgerError> {
        let mut wb = K::WriteBatch::new();
        if self.stage_commit(&mut wb, root)? {
            self.kv_store.write(wb);
        }
        Ok(())
    }

    /// Like [`commit`](Self::commit), but leaves writing `wb` to the caller. Returns whether anything
    /// was staged.
    pub fn stage_commit(
        &mut self,
        wb: &mut K::WriteBatch,
        root: Option<CryptoHash>,
    ) -> Result<bool, LedgerError> {
        let count = match root {
            None => self.pending.len(),
            Some(root) => self.pending_count_at(root)?,
        };
        if count == 0 {
            return Ok(false);
        }

        for write in self.pending.drain(0..count) {
            wb.set(&value_key(self.ledger_id, &write.key), &write.value);
            self.committed_head = write.head_after;
        }
        wb.set(
            &head_key(self.ledger_id),
            &self.committed_head.try_to_vec().unwrap(),
        );

        Ok(true)
    }

    /// Drop every pending write made after the state's head was `head`.
    pub fn revert_to_head(&mut self, head: CryptoHash) -> Result<(), LedgerError> {
        let keep = self.pending_count_at(head)?;
        self.pending.truncate(keep);
        Ok(())
    }

    /// Drop every pending write.
    pub fn revert_to_committed(&mut self) {
        self.pending.clear();
    }

    // Number of pending writes that must be applied on top of the committed state to reach `head`.
    fn pending_count_at(&self, head: CryptoHash) -> Result<usize, LedgerError> {
        if head == self.committed_head {
            return Ok(0);
        }
        self.pending
            .iter()
            .position(|write| write.head_after == head)
            .map(|index| index + 1)
            .ok_or(LedgerError::StateRootNotFound {
                ledger_id: self.ledger_id,
                root: head,
            })
    }
}

fn value_key(ledger_id: LedgerId, key: &[u8]) -> Vec<u8> {
    concat(&concat(&variables::COMMITTED_STATE, &[ledger_id.as_byte()]), key)
}

fn head_key(ledger_id: LedgerId) -> Vec<u8> {
    concat(&variables::COMMITTED_STATE_HEAD, &[ledger_id.as_byte()])
}
