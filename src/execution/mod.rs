/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Applying requests and transactions to ledgers and their states.
//!
//! Every [`LedgerId`] has exactly one [`LedgerTransactionApplier`]. [`Appliers::get`] matches on the
//! closed `LedgerId` enum, so a ledger without an applier cannot be expressed.
//!
//! Applying happens in two places:
//! 1. When an ordered batch is executed, [`LedgerTransactionApplier::apply_batch`] validates each
//!    request against the uncommitted state, appends the resulting transactions to the ledger as
//!    uncommitted, and writes their state effects as pending writes.
//! 2. When a transaction is received during catch-up, it is appended directly as committed and its
//!    state effects are written with [`LedgerTransactionApplier::update_state`] and committed
//!    immediately.
//!
//! In both cases, the effects a committed transaction has outside of its own ledger (on the pool's
//! membership, or on the identities known to the authenticator) are reported by
//! [`LedgerTransactionApplier::effect`].

pub mod domain;
pub mod pool;

use crate::{
    ledger::{pluggables::KVStore, registry::LedgerRegistry},
    types::{
        data_types::{Identifier, LedgerId, RequestKey, VerifyingKeyBytes},
        request::{Request, Role, Transaction},
    },
};

pub use domain::DomainLedgerApplier;
pub use pool::PoolLedgerApplier;

/// The result of applying a batch of requests.
#[derive(Clone, Debug, Default)]
pub struct AppliedBatch {
    /// Transactions appended to the ledger as uncommitted, in order.
    pub txns: Vec<Transaction>,
    /// Requests that failed dynamic validation, with the reason.
    pub rejected: Vec<(RequestKey, String)>,
}

/// A consequence of a committed transaction outside of its own ledger and state.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TxnEffect {
    /// The set of validators recorded in the pool state changed.
    PoolMembershipChanged,
    /// An identity was registered or updated in the domain state.
    IdentityRegistered {
        identifier: Identifier,
        verkey: VerifyingKeyBytes,
        role: Option<Role>,
    },
}

pub trait LedgerTransactionApplier<K: KVStore> {
    fn ledger_id(&self) -> LedgerId;

    /// Check `request` against the uncommitted states of `ledgers`.
    fn validate(&self, ledgers: &LedgerRegistry<K>, request: &Request) -> Result<(), String>;

    /// Write the state effects of `txn` as pending writes.
    fn update_state(&self, ledgers: &mut LedgerRegistry<K>, txn: &Transaction);

    /// The effect of `txn` outside of its own ledger, once committed.
    fn effect(&self, txn: &Transaction) -> Option<TxnEffect>;

    /// Validate and apply `requests` in order, appending one uncommitted transaction per valid request.
    fn apply_batch(
        &self,
        ledgers: &mut LedgerRegistry<K>,
        requests: &[Request],
        pp_time: u64,
    ) -> AppliedBatch {
        let mut applied = AppliedBatch::default();
        for request in requests {
            if request.operation.ledger_id() != self.ledger_id() {
                applied.rejected.push((
                    request.key(),
                    format!("operation does not belong to the {} ledger", self.ledger_id()),
                ));
                continue;
            }
            if let Err(reason) = self.validate(ledgers, request) {
                applied.rejected.push((request.key(), reason));
                continue;
            }

            let mut txn = Transaction::from_request(request, pp_time);
            txn.seq_no = ledgers
                .get_mut(self.ledger_id())
                .ledger
                .append_uncommitted(txn.clone());
            self.update_state(ledgers, &txn);
            applied.txns.push(txn);
        }
        applied
    }
}

/// The applier of every ledger.
#[derive(Clone, Copy, Debug, Default)]
pub struct Appliers {
    pool: PoolLedgerApplier,
    domain: DomainLedgerApplier,
}

impl Appliers {
    pub fn get<K: KVStore>(&self, ledger_id: LedgerId) -> &dyn LedgerTransactionApplier<K> {
        match ledger_id {
            LedgerId::Pool => &self.pool,
            LedgerId::Domain => &self.domain,
        }
    }
}
