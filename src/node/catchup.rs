/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Catch-up rounds, as driven by the node.
//!
//! A round catches up the pool ledger (if the node keeps one) and then the domain ledger. Once every
//! ledger is caught up, the node either starts another round or starts participating.

use std::time::{Instant, SystemTime};

use ed25519_dalek::VerifyingKey;

use crate::{
    catchup::LedgerCaughtUp,
    errors::NodeError,
    events::*,
    ledger::pluggables::{KVStore, WriteBatch},
    networking::{messages::CatchupMessage, network::Network},
    replicas::replica::Replica,
    scheduler::DelayedAction,
    types::{
        data_types::{LedgerId, NodeMode},
        request::Transaction,
    },
};

use super::Node;

impl<K: KVStore, N: Network, R: Replica> Node<K, N, R> {
    /// Start a catch-up round from the first ledger the node keeps.
    pub(super) fn start_catchup(&mut self, now: Instant) {
        self.catchup_round += 1;
        self.catchup_txns_this_round = 0;
        self.catchup_last_3pc = None;
        for ledger_id in LedgerId::all() {
            self.catchup.mark_not_synced(ledger_id);
        }
        let first = if self.config.has_pool_ledger {
            LedgerId::Pool
        } else {
            LedgerId::Domain
        };
        self.start_ledger_catchup(first, now);
    }

    pub(super) fn start_domain_ledger_sync(&mut self, now: Instant) {
        self.start_ledger_catchup(LedgerId::Domain, now);
    }

    fn start_ledger_catchup(&mut self, ledger_id: LedgerId, now: Instant) {
        self.pre_ledger_catchup(ledger_id);
        self.actions
            .cancel(|action| *action == DelayedAction::CatchupTimeout(ledger_id));
        self.actions.schedule_after(
            now,
            self.config.catchup_timeout,
            DelayedAction::CatchupTimeout(ledger_id),
        );
        let last_3pc = self.last_executed;
        if let Some(done) = self.catchup.start(ledger_id, &self.ledgers, last_3pc) {
            self.on_ledger_caught_up(done, now);
        }
    }

    // Nothing speculative may remain under the transactions that catch-up appends.
    fn pre_ledger_catchup(&mut self, ledger_id: LedgerId) {
        self.set_mode(NodeMode::Syncing);
        if let Some(master) = self.replicas.master_mut() {
            let reverted = master.revert_unordered_batches(ledger_id);
            if reverted > 0 {
                log::info!("Reverted {} unordered batches of the {} ledger", reverted, ledger_id);
            }
        }
        self.ledgers.get_mut(ledger_id).revert_uncommitted();
        Event::publish(
            &self.event_publisher,
            Event::StartCatchup(StartCatchupEvent {
                timestamp: SystemTime::now(),
                ledger_id,
            }),
        );
    }

    pub(super) fn process_catchup_message(
        &mut self,
        msg: CatchupMessage,
        origin: VerifyingKey,
        now: Instant,
    ) -> Result<(), NodeError> {
        let last_3pc = self.last_executed;
        // Nodes outside the pool are served, but do not count towards our own catch-up.
        if !self.is_member(&origin) {
            match msg {
                CatchupMessage::LedgerStatus(status) => {
                    self.catchup
                        .prove_to_lagging(&status, origin, &self.ledgers, last_3pc)?
                }
                CatchupMessage::ReqLedgerStatus(req) => {
                    self.catchup
                        .process_req_ledger_status(&req, origin, &self.ledgers, last_3pc)
                }
                CatchupMessage::ConsProofRequest(req) => {
                    self.catchup
                        .process_cons_proof_request(&req, origin, &self.ledgers, last_3pc)?
                }
                CatchupMessage::CatchupReq(req) => {
                    self.catchup.process_catchup_req(&req, origin, &self.ledgers)?
                }
                CatchupMessage::ConsistencyProof(_) | CatchupMessage::CatchupRep(_) => {
                    log::debug!("Ignoring catch-up data from a node outside the pool")
                }
            }
            return Ok(());
        }

        match msg {
            CatchupMessage::LedgerStatus(status) => {
                if let Some(done) =
                    self.catchup
                        .process_ledger_status(&status, origin, &self.ledgers, last_3pc)?
                {
                    self.on_ledger_caught_up(done, now);
                }
            }
            CatchupMessage::ReqLedgerStatus(req) => {
                self.catchup
                    .process_req_ledger_status(&req, origin, &self.ledgers, last_3pc)
            }
            CatchupMessage::ConsistencyProof(proof) => {
                self.catchup
                    .process_consistency_proof(&proof, origin, &self.ledgers)
            }
            CatchupMessage::ConsProofRequest(req) => {
                self.catchup
                    .process_cons_proof_request(&req, origin, &self.ledgers, last_3pc)?
            }
            CatchupMessage::CatchupReq(req) => {
                self.catchup.process_catchup_req(&req, origin, &self.ledgers)?
            }
            CatchupMessage::CatchupRep(rep) => {
                let ledger_id = rep.ledger_id;
                let txns = self.catchup.process_catchup_rep(&rep, origin, &self.ledgers);
                if txns.is_empty() {
                    return Ok(());
                }
                self.append_caught_up_txns(ledger_id, &txns)?;
                let done = self.catchup.mark_caught_up(ledger_id, txns.len() as u64);
                self.on_ledger_caught_up(done, now);
            }
        }
        Ok(())
    }

    // Persist verified transactions, the state they produce, their index entries, and the key of the
    // last batch they cover in one write. Their effects on the pool and on the authenticator are
    // carried out once they are persisted.
    fn append_caught_up_txns(
        &mut self,
        ledger_id: LedgerId,
        txns: &[Transaction],
    ) -> Result<(), NodeError> {
        let mut wb = K::WriteBatch::new();
        for txn in txns {
            self.ledgers
                .get_mut(ledger_id)
                .ledger
                .stage_append(&mut wb, txn.clone())?;
            self.post_txn_from_catchup_added_to_ledger(&mut wb, ledger_id, txn);
        }
        self.ledgers
            .get_mut(ledger_id)
            .state
            .stage_commit(&mut wb, None)?;
        if let Some(last_3pc) = self.catchup.target_last_3pc(ledger_id) {
            self.stage_last_executed(&mut wb, last_3pc);
        }
        self.kv_store.write(wb);

        let appliers = self.appliers;
        for txn in txns {
            if let Some(effect) = appliers.get::<K>(ledger_id).effect(txn) {
                self.apply_txn_effect(effect);
            }
        }
        Ok(())
    }

    // Bring the state and the request index up to date with a transaction that catch-up appended.
    fn post_txn_from_catchup_added_to_ledger(
        &mut self,
        wb: &mut K::WriteBatch,
        ledger_id: LedgerId,
        txn: &Transaction,
    ) {
        let appliers = self.appliers;
        appliers
            .get::<K>(ledger_id)
            .update_state(&mut self.ledgers, txn);
        if !txn.is_genesis() {
            self.seq_no_index
                .stage_add(wb, &txn.request_key(), ledger_id, txn.seq_no);
        }
    }

    fn on_ledger_caught_up(&mut self, done: LedgerCaughtUp, now: Instant) {
        self.actions
            .cancel(|action| *action == DelayedAction::CatchupTimeout(done.ledger_id));
        log::info!(
            "Caught up the {} ledger with {} transactions",
            done.ledger_id,
            done.txns_applied
        );
        Event::publish(
            &self.event_publisher,
            Event::EndCatchup(EndCatchupEvent {
                timestamp: SystemTime::now(),
                ledger_id: done.ledger_id,
                txns_applied: done.txns_applied,
            }),
        );
        self.catchup_txns_this_round += done.txns_applied;
        self.catchup_last_3pc = self.catchup_last_3pc.max(done.last_3pc);

        match done.ledger_id {
            LedgerId::Pool => self.post_pool_ledger_caught_up(now),
            LedgerId::Domain => self.all_ledgers_caught_up(now),
        }
    }

    fn post_pool_ledger_caught_up(&mut self, now: Instant) {
        self.set_mode(NodeMode::Discovered);
        self.refresh_pool_membership();
        self.start_domain_ledger_sync(now);
    }

    fn all_ledgers_caught_up(&mut self, now: Instant) {
        let txns = self.catchup_txns_this_round;
        self.last_round_txns = Some(txns);
        if txns == 0 {
            self.rounds_without_progress += 1;
        } else {
            self.rounds_without_progress = 0;
        }

        if let Some(last_3pc) = self.catchup_last_3pc {
            if let Some(master) = self.replicas.master_mut() {
                if master.last_ordered_3pc() < last_3pc {
                    log::info!("Fast-forwarding the master replica to {}", last_3pc);
                    master.set_last_ordered_3pc(last_3pc);
                }
            }
            self.write_last_executed(last_3pc);
        }
        if !self.process_stashed_ordered_reqs(now) {
            return;
        }

        if self.is_catchup_needed() {
            log::info!("Still behind the pool after catching up, starting another round");
            self.start_catchup(now);
            return;
        }
        self.rounds_without_progress = 0;
        self.set_mode(NodeMode::Participating);
        self.decide_primaries(now);
    }

    /// Whether another catch-up round is needed before the node can participate.
    ///
    /// Outside a view change, another round is needed until a round applies nothing. During one, no
    /// further round is needed if the ledgers already hold everything the pool agreed on for the new
    /// view, or if the last round applied nothing and the master ordered every batch it had prepared
    /// before the view change. After too many rounds without progress the master gives up on its
    /// prepared batches and the node participates anyway.
    pub fn is_catchup_needed(&mut self) -> bool {
        if self.caught_up_for_current_view() {
            return false;
        }
        if self.last_round_txns == Some(0) && self.has_ordered_till_last_prepared() {
            return false;
        }
        if self.rounds_without_progress >= self.config.max_catchup_rounds_without_progress {
            log::warn!(
                "{} catch-up rounds made no progress, dropping the prepared certificate",
                self.rounds_without_progress
            );
            if let Some(master) = self.replicas.master_mut() {
                master.clear_last_prepared_before_view_change();
            }
            return false;
        }
        true
    }

    fn caught_up_for_current_view(&self) -> bool {
        if !self.view_changer.is_in_progress() {
            return self.last_round_txns == Some(0);
        }
        match self.selector.view_change_done_quorum() {
            Some((_, ledger_info)) => ledger_info.iter().all(|info| {
                self.ledgers
                    .get(info.ledger_id)
                    .satisfies(info)
                    .unwrap_or_else(|err| {
                        log::error!("Could not compare ledgers with the view change quorum: {:?}", err);
                        false
                    })
            }),
            None => false,
        }
    }

    fn has_ordered_till_last_prepared(&self) -> bool {
        match self.replicas.master() {
            Some(master) => master
                .last_prepared_before_view_change()
                .map_or(true, |prepared| master.last_ordered_3pc() >= prepared),
            None => true,
        }
    }

    pub(super) fn on_catchup_timeout(&mut self, ledger_id: LedgerId, now: Instant) {
        let last_3pc = self.last_executed;
        if self.catchup.on_timeout(ledger_id, &self.ledgers, last_3pc) {
            self.actions.schedule_after(
                now,
                self.config.catchup_timeout,
                DelayedAction::CatchupTimeout(ledger_id),
            );
        }
    }
}
