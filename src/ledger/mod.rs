/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Persistent and in-memory stores of committed data: ledgers, states, and the indexes over them.
//!
//! - [`ledger`]: append-only transaction logs with a root hash chain.
//! - [`state`]: key-value states derived from the ledgers, with a head hash chain.
//! - [`registry`]: the pairing of every ledger with its state.
//! - [`seq_no_index`]: the request key to sequence number index.
//! - [`provenance`]: the sequence number range to three-phase key interval map.

pub mod ledger;

#[cfg(test)]
pub(crate) mod mem_db;

pub mod pluggables;

pub mod provenance;

pub mod registry;

pub mod seq_no_index;

pub mod state;

pub mod variables;

use crate::types::data_types::{CryptoHash, LedgerId, RequestKey, SeqNo};

/// Enumerates the ways reading from or writing to a ledger or state can fail.
#[derive(Debug)]
pub enum LedgerError {
    /// A value read from the key-value store could not be deserialized.
    DeserializeValueError { key: Key, source: std::io::Error },

    /// A value that must exist for the store to be consistent is missing.
    ValueExpectedButNotFound { key: Key },

    /// An attempt was made to commit more transactions than are uncommitted.
    NotEnoughUncommitted {
        ledger_id: LedgerId,
        requested: usize,
        available: usize,
    },

    /// Committed transactions cannot be appended while uncommitted ones are pending.
    UncommittedTxnsPresent { ledger_id: LedgerId },

    /// A transaction's sequence number does not follow the ledger's size.
    UnexpectedSeqNo {
        ledger_id: LedgerId,
        expected: SeqNo,
        actual: SeqNo,
    },

    /// The state has no pending or committed head with the given root.
    StateRootNotFound { ledger_id: LedgerId, root: CryptoHash },

    /// The roots produced by applying a batch differ from the ones agreed during ordering.
    RootMismatch {
        ledger_id: LedgerId,
        expected: CryptoHash,
        actual: CryptoHash,
    },
}

/// Identifies the key-value store entry an error is about.
#[derive(Debug)]
pub enum Key {
    Transaction { ledger_id: LedgerId, seq_no: SeqNo },
    LedgerSize { ledger_id: LedgerId },
    RootHashAt { ledger_id: LedgerId, size: u64 },
    CommittedStateHead { ledger_id: LedgerId },
    TxnSeqNo { request: RequestKey },
    LastExecuted3PC,
}
