/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Carrying out view changes, primary selection, and connection changes.

use std::time::{Instant, SystemTime};

use ed25519_dalek::VerifyingKey;

use crate::{
    election::primary_selector::PrimaryDecision,
    errors::NodeError,
    events::*,
    ledger::pluggables::KVStore,
    networking::{messages::InstanceChange, network::Network},
    replicas::replica::Replica,
    scheduler::DelayedAction,
    types::{
        data_types::{LedgerId, NodeMode, NodeStatus, ViewNumber},
        suspicion::SuspicionCode,
    },
};

use super::Node;

impl<K: KVStore, N: Network, R: Replica> Node<K, N, R> {
    /// Record a peer's vote to change the view, starting the view change if the vote completes a
    /// quorum.
    pub(super) fn process_instance_change(
        &mut self,
        msg: &InstanceChange,
        origin: VerifyingKey,
        now: Instant,
    ) -> Result<(), NodeError> {
        self.view_changer.process_instance_change(msg, origin)?;
        log::debug!("Received instance change vote for view {}: {}", msg.view_no, msg.code);
        Event::publish(
            &self.event_publisher,
            Event::ReceiveInstanceChange(ReceiveInstanceChangeEvent {
                timestamp: SystemTime::now(),
                origin,
                view_no: msg.view_no,
                code: msg.code,
            }),
        );
        self.try_view_change(msg.view_no, now);
        Ok(())
    }

    /// Vote to move to `view_no`, unless the vote is stale or throttled.
    pub(super) fn send_instance_change(&mut self, view_no: ViewNumber, code: SuspicionCode, now: Instant) {
        let msg = match self.view_changer.send_instance_change(view_no, code, now) {
            Some(msg) => msg,
            None => return,
        };
        self.sender.broadcast(msg);
        Event::publish(
            &self.event_publisher,
            Event::SendInstanceChange(SendInstanceChangeEvent {
                timestamp: SystemTime::now(),
                view_no,
                code,
            }),
        );
        self.try_view_change(view_no, now);
    }

    fn try_view_change(&mut self, view_no: ViewNumber, now: Instant) {
        let quorum = self.quorums().view_change();
        if self.view_changer.can_view_change(view_no, quorum) {
            self.start_view_change(view_no, now);
        }
    }

    // Enter `view_no`: the replicas forget their primaries, and the node catches up before the
    // primaries of the new view are decided.
    fn start_view_change(&mut self, view_no: ViewNumber, now: Instant) {
        let deadline = self.view_changer.start_view_change(view_no, now);
        self.actions
            .cancel(|action| matches!(action, DelayedAction::CheckViewChangeCompleted(_)));
        self.actions
            .schedule(deadline, DelayedAction::CheckViewChangeCompleted(view_no));
        self.actions
            .cancel(|action| *action == DelayedAction::LostMasterPrimary);

        self.monitor.reset();
        self.replicas.set_view_no(view_no);
        for replica in self.replicas.iter_mut() {
            replica.on_view_change_start(view_no);
            replica.set_primary_name(None);
        }
        self.selector.view_change_started(view_no);
        Event::publish(
            &self.event_publisher,
            Event::StartViewChange(StartViewChangeEvent {
                timestamp: SystemTime::now(),
                view_no,
            }),
        );

        self.start_catchup(now);
    }

    pub(super) fn check_view_change_completed(&mut self, view_no: ViewNumber, now: Instant) {
        if let Some(next) = self.view_changer.check_view_change_completed(view_no) {
            self.send_instance_change(next, SuspicionCode::InstanceChangeTimeout, now);
        }
    }

    pub(super) fn check_performance(&mut self, now: Instant) {
        if self.mode != NodeMode::Participating || self.is_view_change_in_progress() {
            return;
        }
        if self.monitor.is_master_degraded() {
            log::warn!("The master instance is degraded relative to the backups");
            self.send_instance_change(self.view_no() + 1, SuspicionCode::PrimaryDegraded, now);
        }
    }

    pub(super) fn lost_master_primary(&mut self, now: Instant) {
        match self.master_primary() {
            Some(primary) if primary != self.me && !self.connected.contains(&primary) => {
                log::warn!("The master primary is still disconnected");
                self.send_instance_change(self.view_no() + 1, SuspicionCode::PrimaryDisconnected, now);
            }
            _ => (),
        }
    }

    /// Recompute the node's status, watch the master primary's connection, and greet newly joined
    /// peers with our ledger statuses.
    pub fn on_conns_changed(&mut self, joined: &[VerifyingKey], left: &[VerifyingKey], now: Instant) {
        for peer in joined {
            self.connected.insert(*peer);
        }
        for peer in left {
            self.connected.remove(peer);
        }

        // 1. Status.
        let quorums = self.quorums();
        let connected_members = self
            .selector
            .nodes()
            .iter()
            .filter(|node| **node != self.me && self.connected.contains(*node))
            .count()
            + 1;
        let status = if connected_members >= quorums.n() {
            NodeStatus::Started
        } else if connected_members > quorums.f() {
            NodeStatus::StartedHungry
        } else {
            NodeStatus::Starting
        };
        if status != self.status {
            log::info!("Connected to {} of {} nodes", connected_members, quorums.n());
            self.status = status;
            Event::publish(
                &self.event_publisher,
                Event::ChangeStatus(ChangeStatusEvent {
                    timestamp: SystemTime::now(),
                    status,
                }),
            );
        }

        // 2. Master primary.
        if let Some(primary) = self.master_primary().filter(|primary| *primary != self.me) {
            if left.contains(&primary) {
                self.schedule_lost_master_primary(now);
            } else if joined.contains(&primary) {
                self.actions
                    .cancel(|action| *action == DelayedAction::LostMasterPrimary);
            }
        }

        // 3. Greet joined members.
        let last_3pc = self.last_executed;
        let view_change_dones = self.selector.get_msgs_for_lagged_nodes();
        let members: Vec<VerifyingKey> = joined
            .iter()
            .filter(|peer| self.is_member(peer))
            .copied()
            .collect();
        for peer in &members {
            for ledger_id in LedgerId::all() {
                self.catchup
                    .send_ledger_status(*peer, ledger_id, &self.ledgers, last_3pc);
            }
            for msg in &view_change_dones {
                self.sender.send(*peer, msg.clone());
            }
        }
    }

    fn schedule_lost_master_primary(&mut self, now: Instant) {
        if self
            .actions
            .is_scheduled(|action| *action == DelayedAction::LostMasterPrimary)
        {
            return;
        }
        log::info!(
            "Master primary disconnected, voting for an instance change in {:?} unless it reconnects",
            self.config.tolerate_primary_disconnection
        );
        self.actions.schedule_after(
            now,
            self.config.tolerate_primary_disconnection,
            DelayedAction::LostMasterPrimary,
        );
    }

    /// Decide the primaries of the current view, broadcasting our `ViewChangeDone` if a view change is
    /// in progress.
    pub(super) fn decide_primaries(&mut self, now: Instant) {
        let (view_change_done, decision) = self.selector.decide_primaries(self.ledgers.infos());
        if let Some(msg) = view_change_done {
            log::info!("Sending view change done for view {}", msg.view_no);
            self.sender.broadcast(msg);
        }
        if let Some(decision) = decision {
            self.on_primaries_decided(decision, now);
        }
    }

    pub(super) fn on_primaries_decided(&mut self, decision: PrimaryDecision, now: Instant) {
        log::info!("Primaries decided for view {}", decision.view_no);
        self.assign_primaries(decision.view_no);

        if self.view_changer.is_in_progress() {
            self.view_changer.on_view_change_complete(decision.view_no);
            for replica in self.replicas.iter_mut() {
                replica.on_view_change_done(decision.view_no);
            }
            self.actions
                .cancel(|action| matches!(action, DelayedAction::CheckViewChangeCompleted(_)));
            Event::publish(
                &self.event_publisher,
                Event::CompleteViewChange(CompleteViewChangeEvent {
                    timestamp: SystemTime::now(),
                    view_no: decision.view_no,
                }),
            );
        }

        if let Some(primary) = self.master_primary() {
            if primary != self.me && !self.connected.contains(&primary) {
                self.schedule_lost_master_primary(now);
            }
        }

        if let Some(ledger_info) = decision.ledger_info {
            let mut behind = false;
            for info in &ledger_info {
                match self.ledgers.get(info.ledger_id).satisfies(info) {
                    Ok(true) => (),
                    Ok(false) => behind = true,
                    Err(err) => {
                        log::error!("Could not compare ledgers with the view change quorum: {:?}", err);
                        behind = true;
                    }
                }
            }
            if behind {
                log::info!("Behind the ledgers agreed for view {}, catching up", decision.view_no);
                self.start_catchup(now);
            }
        }
    }

    // Set the round robin's primary on every replica.
    pub(super) fn assign_primaries(&mut self, view_no: ViewNumber) {
        for replica in self.replicas.iter_mut() {
            let inst_id = replica.inst_id();
            let primary = self.selector.primary_for(view_no, inst_id);
            replica.set_primary_name(primary);
            if let Some(primary) = primary {
                log::debug!("Instance {} has primary {:?} in view {}", inst_id, primary, view_no);
                Event::publish(
                    &self.event_publisher,
                    Event::SelectPrimary(SelectPrimaryEvent {
                        timestamp: SystemTime::now(),
                        inst_id,
                        view_no,
                        primary,
                    }),
                );
            }
        }
    }
}
