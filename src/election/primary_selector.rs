/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Round-robin primary selection, confirmed by `ViewChangeDone` certificates after a view change.

use std::collections::{BTreeMap, HashMap};

use ed25519_dalek::VerifyingKey;

use crate::{
    errors::NodeError,
    networking::messages::ViewChangeDone,
    types::{
        data_types::{InstanceId, LedgerInfo, VerifyingKeyBytes, ViewNumber},
        quorums::Quorums,
        suspicion::SuspicionCode,
    },
};

/// The primaries of a view have been decided.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PrimaryDecision {
    pub view_no: ViewNumber,
    pub master_primary: VerifyingKey,
    /// The ledger info agreed by the `ViewChangeDone` quorum, or `None` if no view change took place.
    pub ledger_info: Option<Vec<LedgerInfo>>,
}

type Certificate = (VerifyingKeyBytes, Vec<LedgerInfo>);

pub struct PrimarySelector {
    me: VerifyingKey,
    nodes: Vec<VerifyingKey>,
    view_no: ViewNumber,
    view_change_in_progress: bool,
    view_change_dones: BTreeMap<ViewNumber, HashMap<VerifyingKey, Certificate>>,
    own_view_change_done: Option<ViewChangeDone>,
    decided_view: Option<ViewNumber>,
}

impl PrimarySelector {
    pub fn new(me: VerifyingKey) -> PrimarySelector {
        PrimarySelector {
            me,
            nodes: Vec::new(),
            view_no: ViewNumber::new(0),
            view_change_in_progress: false,
            view_change_dones: BTreeMap::new(),
            own_view_change_done: None,
            decided_view: None,
        }
    }

    /// Set the pool's validators. The round robin runs over them in ascending byte order.
    pub fn set_nodes(&mut self, mut nodes: Vec<VerifyingKey>) {
        nodes.sort_by_key(|node| node.to_bytes());
        nodes.dedup();
        self.nodes = nodes;
    }

    pub fn nodes(&self) -> &[VerifyingKey] {
        &self.nodes
    }

    pub fn quorums(&self) -> Quorums {
        Quorums::new(self.nodes.len())
    }

    pub fn view_no(&self) -> ViewNumber {
        self.view_no
    }

    pub fn decided_view(&self) -> Option<ViewNumber> {
        self.decided_view
    }

    pub fn view_change_started(&mut self, view_no: ViewNumber) {
        self.view_no = view_no;
        self.view_change_in_progress = true;
        self.own_view_change_done = None;
        self.decided_view = None;
        self.view_change_dones = self.view_change_dones.split_off(&view_no);
    }

    /// The primary of `inst_id` in `view_no`.
    pub fn primary_for(&self, view_no: ViewNumber, inst_id: InstanceId) -> Option<VerifyingKey> {
        if self.nodes.is_empty() {
            return None;
        }
        let index = (view_no.int() + inst_id.int() as u64) % self.nodes.len() as u64;
        self.nodes.get(index as usize).copied()
    }

    /// The primary of `inst_id` in the current view.
    pub fn next_primary_name(&self, inst_id: InstanceId) -> Option<VerifyingKey> {
        self.primary_for(self.view_no, inst_id)
    }

    /// Try to decide the primaries of the current view, with `ledger_info` describing our ledgers.
    ///
    /// Outside of a view change, the round robin is decided immediately. During one, our own
    /// `ViewChangeDone` is returned for broadcasting, and the decision waits for a quorum.
    pub fn decide_primaries(
        &mut self,
        ledger_info: Vec<LedgerInfo>,
    ) -> (Option<ViewChangeDone>, Option<PrimaryDecision>) {
        let master_primary = match self.next_primary_name(InstanceId::MASTER) {
            Some(primary) => primary,
            None => {
                log::warn!("Cannot decide primaries without knowing the pool's validators");
                return (None, None);
            }
        };

        if !self.view_change_in_progress {
            self.decided_view = Some(self.view_no);
            return (
                None,
                Some(PrimaryDecision {
                    view_no: self.view_no,
                    master_primary,
                    ledger_info: None,
                }),
            );
        }

        let own = ViewChangeDone {
            view_no: self.view_no,
            name: master_primary.to_bytes(),
            ledger_info,
        };
        self.record(self.me, &own);
        self.own_view_change_done = Some(own.clone());
        (Some(own), self.try_decide())
    }

    /// Record a peer's `ViewChangeDone`, deciding the primaries if it completes a quorum.
    pub fn process_view_change_done(
        &mut self,
        msg: &ViewChangeDone,
        from: VerifyingKey,
    ) -> Result<Option<PrimaryDecision>, NodeError> {
        if msg.view_no != self.view_no {
            return Err(NodeError::Stale {
                reason: format!(
                    "view change done for view {} received in view {}",
                    msg.view_no, self.view_no
                ),
            });
        }
        if !self.nodes.contains(&from) {
            return Err(NodeError::Malformed {
                reason: String::from("view change done from a node outside the pool"),
            });
        }
        let expected = self.next_primary_name(InstanceId::MASTER);
        if expected.map(|primary| primary.to_bytes()) != Some(msg.name) {
            return Err(NodeError::Suspicious {
                node: from,
                reason: String::from("view change done names a primary other than the round robin's"),
                code: SuspicionCode::WrongPrimaryInViewChangeDone,
            });
        }

        self.record(from, msg);
        Ok(self.try_decide())
    }

    fn record(&mut self, from: VerifyingKey, msg: &ViewChangeDone) {
        self.view_change_dones
            .entry(msg.view_no)
            .or_default()
            .insert(from, (msg.name, msg.ledger_info.clone()));
    }

    // Decide once we sent our own ViewChangeDone and a quorum, including the new primary, agrees.
    fn try_decide(&mut self) -> Option<PrimaryDecision> {
        if !self.view_change_in_progress || self.own_view_change_done.is_none() {
            return None;
        }
        let (name, ledger_info) = self.view_change_done_quorum()?;
        let master_primary = VerifyingKey::from_bytes(&name).ok()?;
        self.view_change_in_progress = false;
        self.decided_view = Some(self.view_no);
        Some(PrimaryDecision {
            view_no: self.view_no,
            master_primary,
            ledger_info: Some(ledger_info),
        })
    }

    /// The `(primary, ledger info)` that `n - f` nodes, the named primary among them, agree on for the
    /// current view.
    pub fn view_change_done_quorum(&self) -> Option<(VerifyingKeyBytes, Vec<LedgerInfo>)> {
        let votes = self.view_change_dones.get(&self.view_no)?;
        let mut groups: HashMap<&Certificate, Vec<&VerifyingKey>> = HashMap::new();
        for (voter, certificate) in votes {
            groups.entry(certificate).or_default().push(voter);
        }
        let quorum = self.quorums().view_change_done();
        groups
            .into_iter()
            .find(|(certificate, voters)| {
                voters.len() >= quorum && voters.iter().any(|voter| voter.to_bytes() == certificate.0)
            })
            .map(|(certificate, _)| certificate.clone())
    }

    pub fn has_view_change_quorum(&self) -> bool {
        self.view_change_done_quorum().is_some()
    }

    pub fn is_view_change_in_progress(&self) -> bool {
        self.view_change_in_progress
    }

    /// Messages that let a node that missed the view change complete it.
    pub fn get_msgs_for_lagged_nodes(&self) -> Vec<ViewChangeDone> {
        self.own_view_change_done.iter().cloned().collect()
    }
}
