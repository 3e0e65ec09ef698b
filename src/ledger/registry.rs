/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! The node's ledgers, each paired with the state derived from it.

use crate::types::data_types::{CryptoHash, LedgerId, LedgerInfo};

use super::{ledger::Ledger, pluggables::KVStore, state::State, LedgerError};

pub struct LedgerHandle<K: KVStore> {
    pub ledger: Ledger<K>,
    pub state: State<K>,
}

impl<K: KVStore> LedgerHandle<K> {
    pub fn open(ledger_id: LedgerId, kv_store: K) -> Result<LedgerHandle<K>, LedgerError> {
        Ok(LedgerHandle {
            ledger: Ledger::open(ledger_id, kv_store.clone())?,
            state: State::open(ledger_id, kv_store)?,
        })
    }

    pub fn ledger_id(&self) -> LedgerId {
        self.ledger.ledger_id()
    }

    pub fn size(&self) -> u64 {
        self.ledger.size()
    }

    pub fn root_hash(&self) -> CryptoHash {
        self.ledger.root_hash()
    }

    pub fn uncommitted_root_hash(&self) -> CryptoHash {
        self.ledger.uncommitted_root_hash()
    }

    pub fn info(&self) -> LedgerInfo {
        LedgerInfo {
            ledger_id: self.ledger_id(),
            size: self.size(),
            root_hash: self.root_hash(),
        }
    }

    /// Whether this ledger contains the ledger described by `info` as a prefix.
    pub fn satisfies(&self, info: &LedgerInfo) -> Result<bool, LedgerError> {
        if info.size > self.size() {
            return Ok(false);
        }
        Ok(self.ledger.root_hash_at(info.size)? == Some(info.root_hash))
    }

    /// Discard uncommitted transactions and pending state writes. Returns the number of transactions
    /// discarded.
    pub fn revert_uncommitted(&mut self) -> usize {
        self.state.revert_to_committed();
        self.ledger.discard_all_uncommitted()
    }
}

/// Owns one [`LedgerHandle`] per [`LedgerId`].
pub struct LedgerRegistry<K: KVStore> {
    pool: LedgerHandle<K>,
    domain: LedgerHandle<K>,
}

impl<K: KVStore> LedgerRegistry<K> {
    pub fn open(kv_store: K) -> Result<LedgerRegistry<K>, LedgerError> {
        Ok(LedgerRegistry {
            pool: LedgerHandle::open(LedgerId::Pool, kv_store.clone())?,
            domain: LedgerHandle::open(LedgerId::Domain, kv_store)?,
        })
    }

    pub fn get(&self, ledger_id: LedgerId) -> &LedgerHandle<K> {
        match ledger_id {
            LedgerId::Pool => &self.pool,
            LedgerId::Domain => &self.domain,
        }
    }

    pub fn get_mut(&mut self, ledger_id: LedgerId) -> &mut LedgerHandle<K> {
        match ledger_id {
            LedgerId::Pool => &mut self.pool,
            LedgerId::Domain => &mut self.domain,
        }
    }

    /// The [`LedgerInfo`] of every ledger, in catch-up order.
    pub fn infos(&self) -> Vec<LedgerInfo> {
        LedgerId::all()
            .iter()
            .map(|ledger_id| self.get(*ledger_id).info())
            .collect()
    }
}
