/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Append-only transaction logs.
//!
//! Every ledger is a sequence of [`Transaction`]s numbered from 1. The ledger's root hash at size `n`
//! is defined recursively as:
//!
//! ```text
//! root(0) = [0; 32]
//! root(n) = SHA256(root(n - 1) || borsh(txn(n)))
//! ```
//!
//! so two ledgers with the same root at the same size contain the same transactions. Roots at every
//! size (the "hash store") are persisted next to the transactions, and can be rebuilt from the
//! transactions with [`Ledger::recover`].
//!
//! Transactions produced by applying an ordered batch are first appended as *uncommitted*, so that
//! the roots they produce can be checked against the ones agreed during ordering, and are then either
//! committed or discarded.

use borsh::BorshSerialize;

use crate::types::{
    crypto_primitives::hash_parts,
    data_types::{CryptoHash, LedgerId, SeqNo},
    request::Transaction,
};

use super::{
    pluggables::{KVGet, KVStore, WriteBatch},
    variables::{self, concat},
    Key, LedgerError,
};

/// Information that lets a client check that a transaction is part of a ledger.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MerkleInfo {
    pub seq_no: SeqNo,
    /// The ledger's root hash right after the transaction was appended.
    pub root_hash_at_seq_no: CryptoHash,
    pub ledger_size: u64,
    pub root_hash: CryptoHash,
}

pub struct Ledger<K: KVStore> {
    ledger_id: LedgerId,
    kv_store: K,
    size: u64,
    root_hash: CryptoHash,
    uncommitted: Vec<(Transaction, CryptoHash)>,
}

impl<K: KVStore> Ledger<K> {
    /// Open the ledger identified by `ledger_id` in `kv_store`, rebuilding its hash store if the root
    /// at its current size is missing.
    pub fn open(ledger_id: LedgerId, kv_store: K) -> Result<Ledger<K>, LedgerError> {
        let size = kv_store
            .get_value::<u64>(&size_key(ledger_id), Key::LedgerSize { ledger_id })?
            .unwrap_or(0);

        let mut ledger = Ledger {
            ledger_id,
            kv_store,
            size,
            root_hash: CryptoHash::zero(),
            uncommitted: Vec::new(),
        };
        ledger.root_hash = match ledger.root_hash_at(size)? {
            Some(root_hash) => root_hash,
            None => ledger.recover()?,
        };

        Ok(ledger)
    }

    /// Recompute the root hash at every size from the persisted transactions and write them back to the
    /// hash store. Returns the root hash at the ledger's current size.
    pub fn recover(&mut self) -> Result<CryptoHash, LedgerError> {
        log::info!(
            "Rebuilding the hash store of the {} ledger ({} transactions).",
            self.ledger_id,
            self.size
        );

        let mut wb = K::WriteBatch::new();
        let mut root_hash = CryptoHash::zero();
        for seq_no in 1..=self.size {
            let seq_no = SeqNo::new(seq_no);
            let txn = self
                .get_by_seq_no(seq_no)?
                .ok_or(LedgerError::ValueExpectedButNotFound {
                    key: Key::Transaction {
                        ledger_id: self.ledger_id,
                        seq_no,
                    },
                })?;
            root_hash = next_root(&root_hash, &txn);
            wb.set(
                &root_key(self.ledger_id, seq_no.int()),
                &root_hash.try_to_vec().unwrap(),
            );
        }
        self.kv_store.write(wb);
        self.root_hash = root_hash;

        Ok(root_hash)
    }

    pub fn ledger_id(&self) -> LedgerId {
        self.ledger_id
    }

    /// Number of committed transactions.
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Number of committed and uncommitted transactions.
    pub fn uncommitted_size(&self) -> u64 {
        self.size + self.uncommitted.len() as u64
    }

    pub fn root_hash(&self) -> CryptoHash {
        self.root_hash
    }

    /// Root hash as if every uncommitted transaction were committed.
    pub fn uncommitted_root_hash(&self) -> CryptoHash {
        self.uncommitted
            .last()
            .map(|(_, root_hash)| *root_hash)
            .unwrap_or(self.root_hash)
    }

    pub fn uncommitted_count(&self) -> usize {
        self.uncommitted.len()
    }

    /// Append `txn` as an uncommitted transaction, assigning it the next sequence number.
    pub fn append_uncommitted(&mut self, mut txn: Transaction) -> SeqNo {
        let seq_no = SeqNo::new(self.uncommitted_size() + 1);
        txn.seq_no = seq_no;
        let root_hash = next_root(&self.uncommitted_root_hash(), &txn);
        self.uncommitted.push((txn, root_hash));
        seq_no
    }

    /// Commit the oldest `count` uncommitted transactions, returning them.
    pub fn commit_txns(&mut self, count: usize) -> Result<Vec<Transaction>, LedgerError> {
        let mut wb = K::WriteBatch::new();
        let committed = self.stage_commit_txns(&mut wb, count)?;
        self.kv_store.write(wb);
        Ok(committed)
    }

    /// Like [`commit_txns`](Self::commit_txns), but leaves writing `wb` to the caller, so that the
    /// transactions can be persisted atomically with other effects of the same batch.
    pub fn stage_commit_txns(
        &mut self,
        wb: &mut K::WriteBatch,
        count: usize,
    ) -> Result<Vec<Transaction>, LedgerError> {
        if count > self.uncommitted.len() {
            return Err(LedgerError::NotEnoughUncommitted {
                ledger_id: self.ledger_id,
                requested: count,
                available: self.uncommitted.len(),
            });
        }

        let committed: Vec<(Transaction, CryptoHash)> = self.uncommitted.drain(0..count).collect();
        for (txn, root_hash) in &committed {
            self.write_txn(wb, txn, root_hash);
        }
        if let Some((txn, root_hash)) = committed.last() {
            self.size = txn.seq_no.int();
            self.root_hash = *root_hash;
        }
        wb.set(&size_key(self.ledger_id), &self.size.try_to_vec().unwrap());

        Ok(committed.into_iter().map(|(txn, _)| txn).collect())
    }

    /// Discard the newest `count` uncommitted transactions.
    pub fn discard_txns(&mut self, count: usize) {
        let keep = self.uncommitted.len().saturating_sub(count);
        self.uncommitted.truncate(keep);
    }

    /// Discard every uncommitted transaction. Returns how many were discarded.
    pub fn discard_all_uncommitted(&mut self) -> usize {
        let count = self.uncommitted.len();
        self.uncommitted.clear();
        count
    }

    /// Append an already-agreed transaction (e.g., one received during catch-up) directly as committed.
    pub fn append(&mut self, txn: Transaction) -> Result<SeqNo, LedgerError> {
        let mut wb = K::WriteBatch::new();
        let seq_no = self.stage_append(&mut wb, txn)?;
        self.kv_store.write(wb);
        Ok(seq_no)
    }

    /// Like [`append`](Self::append), but leaves writing `wb` to the caller. Transactions staged into
    /// the same batch must be appended in sequence number order.
    pub fn stage_append(
        &mut self,
        wb: &mut K::WriteBatch,
        txn: Transaction,
    ) -> Result<SeqNo, LedgerError> {
        if !self.uncommitted.is_empty() {
            return Err(LedgerError::UncommittedTxnsPresent {
                ledger_id: self.ledger_id,
            });
        }
        let expected = SeqNo::new(self.size + 1);
        if txn.seq_no != expected {
            return Err(LedgerError::UnexpectedSeqNo {
                ledger_id: self.ledger_id,
                expected,
                actual: txn.seq_no,
            });
        }

        let root_hash = next_root(&self.root_hash, &txn);
        self.write_txn(wb, &txn, &root_hash);
        self.size = expected.int();
        self.root_hash = root_hash;
        wb.set(&size_key(self.ledger_id), &self.size.try_to_vec().unwrap());

        Ok(expected)
    }

    /// Get the committed transaction at `seq_no`.
    pub fn get_by_seq_no(&self, seq_no: SeqNo) -> Result<Option<Transaction>, LedgerError> {
        if seq_no.int() == 0 || seq_no.int() > self.size {
            return Ok(None);
        }
        self.kv_store.get_value(
            &txn_key(self.ledger_id, seq_no),
            Key::Transaction {
                ledger_id: self.ledger_id,
                seq_no,
            },
        )
    }

    /// Get the committed transactions with sequence numbers in `start..=end`, stopping early at the
    /// ledger's size.
    pub fn get_range(&self, start: SeqNo, end: SeqNo) -> Result<Vec<Transaction>, LedgerError> {
        let mut txns = Vec::new();
        for seq_no in start.int().max(1)..=end.int().min(self.size) {
            let seq_no = SeqNo::new(seq_no);
            let txn = self
                .get_by_seq_no(seq_no)?
                .ok_or(LedgerError::ValueExpectedButNotFound {
                    key: Key::Transaction {
                        ledger_id: self.ledger_id,
                        seq_no,
                    },
                })?;
            txns.push(txn);
        }
        Ok(txns)
    }

    /// Get the ledger's root hash when it had `size` committed transactions.
    pub fn root_hash_at(&self, size: u64) -> Result<Option<CryptoHash>, LedgerError> {
        if size == 0 {
            return Ok(Some(CryptoHash::zero()));
        }
        if size > self.size {
            return Ok(None);
        }
        self.kv_store.get_value(
            &root_key(self.ledger_id, size),
            Key::RootHashAt {
                ledger_id: self.ledger_id,
                size,
            },
        )
    }

    pub fn merkle_info(&self, seq_no: SeqNo) -> Result<Option<MerkleInfo>, LedgerError> {
        if seq_no.int() == 0 {
            return Ok(None);
        }
        Ok(self
            .root_hash_at(seq_no.int())?
            .map(|root_hash_at_seq_no| MerkleInfo {
                seq_no,
                root_hash_at_seq_no,
                ledger_size: self.size,
                root_hash: self.root_hash,
            }))
    }

    /// Compute the root hash that results from appending `txns` to a ledger whose root is `from`.
    pub fn candidate_root(from: CryptoHash, txns: &[Transaction]) -> CryptoHash {
        txns.iter().fold(from, |root_hash, txn| next_root(&root_hash, txn))
    }

    fn write_txn(&self, wb: &mut K::WriteBatch, txn: &Transaction, root_hash: &CryptoHash) {
        wb.set(
            &txn_key(self.ledger_id, txn.seq_no),
            &txn.try_to_vec().unwrap(),
        );
        wb.set(
            &root_key(self.ledger_id, txn.seq_no.int()),
            &root_hash.try_to_vec().unwrap(),
        );
    }
}

fn next_root(prev: &CryptoHash, txn: &Transaction) -> CryptoHash {
    hash_parts(&[&prev.bytes(), &txn.try_to_vec().unwrap()])
}

fn txn_key(ledger_id: LedgerId, seq_no: SeqNo) -> Vec<u8> {
    concat(
        &concat(&variables::TRANSACTIONS, &[ledger_id.as_byte()]),
        &seq_no.to_le_bytes(),
    )
}

fn size_key(ledger_id: LedgerId) -> Vec<u8> {
    concat(&variables::LEDGER_SIZE, &[ledger_id.as_byte()])
}

fn root_key(ledger_id: LedgerId, size: u64) -> Vec<u8> {
    concat(
        &concat(&variables::ROOT_HASH_AT, &[ledger_id.as_byte()]),
        &size.to_le_bytes(),
    )
}
