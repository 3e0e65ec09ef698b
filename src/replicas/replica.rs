/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! The pluggable three-phase ordering engine run by each instance.
//!
//! The node does not implement PRE-PREPARE/PREPARE/COMMIT voting itself. Library users provide it by
//! implementing [`Replica`]. The node only:
//! 1. Delivers three-phase messages and finalised requests into the replica.
//! 2. Collects the replica's outputs on every tick: messages to broadcast, suspicions against peers,
//!    and [`Ordered`] batches.
//! 3. Reads and overrides the replica's ordering bookkeeping around view changes and catch-up.

use ed25519_dalek::VerifyingKey;

use crate::{
    networking::messages::ThreePhaseMessage,
    types::{
        data_types::{CryptoHash, InstanceId, LedgerId, PpSeqNo, RequestKey, ThreePhaseKey, ViewNumber},
        request::Request,
        suspicion::SuspicionCode,
    },
};

/// A batch of requests that an instance has finished ordering.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Ordered {
    pub inst_id: InstanceId,
    pub view_no: ViewNumber,
    pub pp_seq_no: PpSeqNo,
    pub pp_time: u64,
    pub req_keys: Vec<RequestKey>,
    pub ledger_id: LedgerId,
    /// The state root the batch was agreed to produce, if the instance checks roots.
    pub state_root: Option<CryptoHash>,
    /// The ledger root the batch was agreed to produce, if the instance checks roots.
    pub txn_root: Option<CryptoHash>,
}

impl Ordered {
    pub fn key(&self) -> ThreePhaseKey {
        ThreePhaseKey::new(self.view_no, self.pp_seq_no)
    }
}

/// Something a replica wants the node to do.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ReplicaOutput {
    Ordered(Ordered),
    Broadcast(ThreePhaseMessage),
    Suspicion { node: VerifyingKey, code: SuspicionCode },
}

pub trait Replica: Send {
    fn inst_id(&self) -> InstanceId;

    /// Put a three-phase message from `from` into the replica's inbox.
    fn deliver(&mut self, msg: ThreePhaseMessage, from: VerifyingKey);

    /// Inform the replica that `request` is finalised and can be ordered.
    fn on_request_finalised(&mut self, request: &Request);

    /// Process at most `limit` messages from the inbox, returning everything in the outbox.
    fn service(&mut self, limit: usize) -> Vec<ReplicaOutput>;

    fn primary_name(&self) -> Option<VerifyingKey>;

    fn set_primary_name(&mut self, primary: Option<VerifyingKey>);

    fn is_primary(&self) -> bool;

    fn last_ordered_3pc(&self) -> ThreePhaseKey;

    /// Fast-forward the replica's bookkeeping, e.g., after catch-up applied batches ordered by others.
    fn set_last_ordered_3pc(&mut self, key: ThreePhaseKey);

    /// The last batch this replica had prepared when the current view change started.
    fn last_prepared_before_view_change(&self) -> Option<ThreePhaseKey>;

    fn clear_last_prepared_before_view_change(&mut self);

    /// Drop batches of `ledger_id` that were applied speculatively but not ordered. Returns how many
    /// batches were dropped.
    fn revert_unordered_batches(&mut self, ledger_id: LedgerId) -> usize;

    fn on_view_change_start(&mut self, view_no: ViewNumber);

    fn on_view_change_done(&mut self, view_no: ViewNumber);
}
