/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Executing ordered batches exactly once.
//!
//! The key of the last batch executed by the master is persisted in the same write as the batch's
//! transactions, state, and request index entries, so a crash leaves either all of them or none. A
//! batch whose key is not above it is never executed again, whether it is delivered twice by the
//! replica, replayed from the stash after catch-up, or already covered by transactions that catch-up
//! appended.

use std::time::{Instant, SystemTime};

use borsh::BorshSerialize;

use crate::{
    errors::NodeError,
    events::*,
    ledger::{
        pluggables::{KVGet, KVStore, WriteBatch},
        variables, Key, LedgerError,
    },
    networking::{
        messages::{ClientMessage, Reject, Reply},
        network::Network,
    },
    replicas::replica::{Ordered, Replica},
    requests::RequestSender,
    types::{
        data_types::{CryptoHash, LedgerId, NodeMode, PpSeqNo, ThreePhaseKey, ViewNumber},
        request::Request,
    },
};

use super::Node;

impl<K: KVStore, N: Network, R: Replica> Node<K, N, R> {
    /// Handle a batch ordered by one of the instances.
    ///
    /// Batches ordered by backups only feed the monitor. Batches ordered by the master are executed, or
    /// stashed until catch-up ends if the node is not participating.
    pub fn process_ordered(&mut self, ordered: Ordered, now: Instant) -> Result<(), NodeError> {
        self.monitor
            .request_ordered(ordered.inst_id, ordered.req_keys.len());
        if !ordered.inst_id.is_master() {
            log::debug!(
                "Instance {} ordered {} at {}",
                ordered.inst_id,
                ordered.req_keys.len(),
                ordered.key()
            );
            return Ok(());
        }

        if self.mode != NodeMode::Participating {
            log::debug!("Stashing batch {} ordered while {}", ordered.key(), self.mode);
            self.stashed_ordered.push_back(ordered);
            return Ok(());
        }
        self.execute_ordered(ordered, now)
    }

    /// Execute every batch stashed during catch-up, in the order they were ordered.
    ///
    /// If a batch starts another catch-up round, the replay stops there. That batch and the ones
    /// after it stay stashed for the new round, and `false` is returned.
    pub(super) fn process_stashed_ordered_reqs(&mut self, now: Instant) -> bool {
        let mut stashed = std::mem::take(&mut self.stashed_ordered);
        if !stashed.is_empty() {
            log::info!("Processing {} batches stashed during catch-up", stashed.len());
        }
        let round = self.catchup_round;
        while let Some(ordered) = stashed.pop_front() {
            let result = self.execute_ordered(ordered.clone(), now);
            if self.catchup_round != round {
                log::info!(
                    "Batch {} restarted catch-up, keeping {} batches stashed",
                    ordered.key(),
                    stashed.len() + 1
                );
                stashed.push_front(ordered);
                stashed.append(&mut self.stashed_ordered);
                self.stashed_ordered = stashed;
                if let Err(err) = result {
                    self.handle_error(err, now);
                }
                return false;
            }
            if let Err(err) = result {
                self.handle_error(err, now);
            }
        }
        true
    }

    fn execute_ordered(&mut self, ordered: Ordered, now: Instant) -> Result<(), NodeError> {
        if self.is_executed(ordered.key()) {
            log::debug!("Batch {} was already executed", ordered.key());
            return Ok(());
        }

        let mut requests = Vec::with_capacity(ordered.req_keys.len());
        for key in &ordered.req_keys {
            match self.requests.get_finalised(key) {
                Some(request) => requests.push(request.clone()),
                None => {
                    log::warn!(
                        "Batch {} refers to request {} which is not finalised here",
                        ordered.key(),
                        key
                    );
                    return Ok(());
                }
            }
        }

        self.execute_batch(
            ordered.view_no,
            ordered.pp_seq_no,
            ordered.pp_time,
            &requests,
            ordered.ledger_id,
            ordered.state_root,
            ordered.txn_root,
            now,
        )
    }

    /// Apply `requests` to `ledger_id` and commit the result, as the batch ordered at
    /// `(view_no, pp_seq_no)`.
    ///
    /// If roots are given, the batch must produce them. Otherwise the batch is reverted and the node
    /// starts catching up.
    #[allow(clippy::too_many_arguments)]
    pub fn execute_batch(
        &mut self,
        view_no: ViewNumber,
        pp_seq_no: PpSeqNo,
        pp_time: u64,
        requests: &[Request],
        ledger_id: LedgerId,
        state_root: Option<CryptoHash>,
        txn_root: Option<CryptoHash>,
        now: Instant,
    ) -> Result<(), NodeError> {
        let key = ThreePhaseKey::new(view_no, pp_seq_no);
        if self.is_executed(key) {
            log::debug!("Batch {} was already executed", key);
            return Ok(());
        }

        // 1. Apply as uncommitted.
        let appliers = self.appliers;
        let applied = appliers
            .get::<K>(ledger_id)
            .apply_batch(&mut self.ledgers, requests, pp_time);

        // 2. Check the roots agreed during ordering.
        let handle = self.ledgers.get(ledger_id);
        let mismatch = match (txn_root, state_root) {
            (Some(expected), _) if expected != handle.uncommitted_root_hash() => {
                Some((expected, handle.uncommitted_root_hash()))
            }
            (_, Some(expected)) if expected != handle.state.head_hash() => {
                Some((expected, handle.state.head_hash()))
            }
            _ => None,
        };
        if let Some((expected, actual)) = mismatch {
            self.ledgers.get_mut(ledger_id).revert_uncommitted();
            log::error!(
                "Batch {} did not produce the agreed roots on the {} ledger, catching up",
                key,
                ledger_id
            );
            self.start_catchup(now);
            return Err(NodeError::Ledger(LedgerError::RootMismatch {
                ledger_id,
                expected,
                actual,
            }));
        }

        // 3. Commit the transactions, their state, their index entries, and the batch's key in one
        //    write.
        let mut wb = K::WriteBatch::new();
        let handle = self.ledgers.get_mut(ledger_id);
        let committed = handle.ledger.stage_commit_txns(&mut wb, applied.txns.len())?;
        handle.state.stage_commit(&mut wb, None)?;
        for txn in &committed {
            self.seq_no_index
                .stage_add(&mut wb, &txn.request_key(), ledger_id, txn.seq_no);
        }
        self.stage_last_executed(&mut wb, key);
        self.kv_store.write(wb);

        // 4. Carry out the effects of the new transactions, and record their provenance.
        for txn in &committed {
            if let Some(effect) = appliers.get::<K>(ledger_id).effect(txn) {
                self.apply_txn_effect(effect);
            }
        }
        if let (Some(first), Some(last)) = (committed.first(), committed.last()) {
            if let Err(err) = self
                .provenance
                .record(ledger_id, first.seq_no, last.seq_no, key)
            {
                log::error!("Could not record the provenance of batch {}: {:?}", key, err);
            }
        }
        log::info!(
            "Executed batch {} with {} transactions on the {} ledger",
            key,
            committed.len(),
            ledger_id
        );
        if let Some(first) = committed.first() {
            Event::publish(
                &self.event_publisher,
                Event::ExecuteBatch(ExecuteBatchEvent {
                    timestamp: SystemTime::now(),
                    ledger_id,
                    key,
                    first_seq_no: first.seq_no,
                    txn_count: committed.len(),
                }),
            );
        }

        // 5. Reply.
        for txn in committed {
            let request = txn.request_key();
            let root_hash = self
                .ledgers
                .get(ledger_id)
                .ledger
                .root_hash_at(txn.seq_no.int())?
                .unwrap_or(CryptoHash::zero());
            let seq_no = txn.seq_no;
            let reply = ClientMessage::Reply(Reply {
                txn,
                ledger_id,
                root_hash,
            });
            for sender in self.requests.senders(&request) {
                if let RequestSender::Client(client) = sender {
                    self.sender.send_to_client(client, reply.clone());
                    Event::publish(
                        &self.event_publisher,
                        Event::SendReply(SendReplyEvent {
                            timestamp: SystemTime::now(),
                            request,
                            ledger_id,
                            seq_no,
                        }),
                    );
                }
            }
            self.requests.remove(&request);
        }
        for (request, reason) in applied.rejected {
            log::debug!("Request {} rejected during execution: {}", request, reason);
            for sender in self.requests.senders(&request) {
                if let RequestSender::Client(client) = sender {
                    self.sender.send_to_client(
                        client,
                        ClientMessage::Reject(Reject {
                            identifier: request.identifier,
                            req_id: request.req_id,
                            reason: reason.clone(),
                        }),
                    );
                }
            }
            self.requests.remove(&request);
        }

        Ok(())
    }

    fn is_executed(&self, key: ThreePhaseKey) -> bool {
        self.last_executed.map_or(false, |last| key <= last)
    }

    /// Record `key` as executed, unless a later batch already was.
    pub(super) fn write_last_executed(&mut self, key: ThreePhaseKey) {
        let mut wb = K::WriteBatch::new();
        if self.stage_last_executed(&mut wb, key) {
            self.kv_store.write(wb);
        }
    }

    /// Stage `key` as executed into `wb`, unless a later batch already was. Returns whether it was
    /// staged.
    pub(super) fn stage_last_executed(
        &mut self,
        wb: &mut K::WriteBatch,
        key: ThreePhaseKey,
    ) -> bool {
        if self.is_executed(key) {
            return false;
        }
        wb.set(&variables::LAST_EXECUTED_3PC, &key.try_to_vec().unwrap());
        self.last_executed = Some(key);
        true
    }
}

pub(super) fn read_last_executed<K: KVStore>(
    kv_store: &K,
) -> Result<Option<ThreePhaseKey>, LedgerError> {
    kv_store.get_value(&variables::LAST_EXECUTED_3PC, Key::LastExecuted3PC)
}
