/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! The master instance and the backup instances, and routing of messages into them.
//!
//! ## Routing
//!
//! Three-phase messages go to the replica with the message's instance id. Election messages go to
//! the elector inbox. Before either happens, the message's instance id and view number are checked:
//!
//! |Check|Outcome|
//! |---|---|
//! |instance id not yet created|buffered until the instance is created|
//! |view number more than one view behind|discarded|
//! |view number ahead of the current view|buffered until the view becomes current|
//! |otherwise|delivered|
//!
//! Both buffers are FIFO per key, and are drained completely, in receipt order, when the instance is
//! created or the view becomes current.

use std::collections::{BTreeMap, VecDeque};

use ed25519_dalek::VerifyingKey;

use crate::{
    networking::messages::{ElectionMessage, ThreePhaseMessage},
    types::{
        data_types::{InstanceId, ViewNumber},
        quorums::Quorums,
        request::Request,
    },
};

use super::replica::{Replica, ReplicaOutput};

/// Creates the replica for an instance id.
pub type ReplicaFactory<R> = Box<dyn Fn(InstanceId) -> R + Send>;

/// What happened to a routed message.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Routing {
    Delivered,
    Buffered,
    Discarded,
}

#[derive(Clone, Debug)]
enum Routable {
    ThreePhase(ThreePhaseMessage),
    Election(ElectionMessage),
}

impl Routable {
    fn inst_id(&self) -> InstanceId {
        match self {
            Routable::ThreePhase(msg) => msg.inst_id(),
            Routable::Election(msg) => msg.inst_id(),
        }
    }

    fn view_no(&self) -> ViewNumber {
        match self {
            Routable::ThreePhase(msg) => msg.view_no(),
            Routable::Election(msg) => msg.view_no(),
        }
    }
}

pub struct ReplicaSet<R: Replica> {
    factory: ReplicaFactory<R>,
    replicas: Vec<R>,
    view_no: ViewNumber,
    future_instance_msgs: BTreeMap<InstanceId, VecDeque<(Routable, VerifyingKey)>>,
    future_view_msgs: BTreeMap<ViewNumber, VecDeque<(Routable, VerifyingKey)>>,
    elector_inbox: VecDeque<(ElectionMessage, VerifyingKey)>,
}

impl<R: Replica> ReplicaSet<R> {
    pub fn new(factory: ReplicaFactory<R>, view_no: ViewNumber) -> ReplicaSet<R> {
        ReplicaSet {
            factory,
            replicas: Vec::new(),
            view_no,
            future_instance_msgs: BTreeMap::new(),
            future_view_msgs: BTreeMap::new(),
            elector_inbox: VecDeque::new(),
        }
    }

    /// Create or remove trailing instances until there are `f + 1` for a pool of `node_count` nodes.
    /// Returns the number of instances added (positive) or removed (negative).
    pub fn adjust_replicas(&mut self, node_count: usize) -> i64 {
        let required = Quorums::new(node_count).required_instances();
        let before = self.replicas.len() as i64;

        while self.replicas.len() < required {
            let inst_id = InstanceId::new(self.replicas.len() as u32);
            log::info!("Creating replica instance {}", inst_id);
            self.replicas.push((self.factory)(inst_id));
            if let Some(buffered) = self.future_instance_msgs.remove(&inst_id) {
                for (msg, from) in buffered {
                    self.route(msg, from);
                }
            }
        }
        while self.replicas.len() > required {
            if let Some(removed) = self.replicas.pop() {
                log::info!("Removing replica instance {}", removed.inst_id());
            }
        }

        let count = InstanceId::new(self.replicas.len() as u32);
        self.future_instance_msgs.retain(|inst_id, _| *inst_id >= count);
        self.replicas.len() as i64 - before
    }

    pub fn send_to_replica(&mut self, msg: ThreePhaseMessage, from: VerifyingKey) -> Routing {
        self.route(Routable::ThreePhase(msg), from)
    }

    pub fn send_to_elector(&mut self, msg: ElectionMessage, from: VerifyingKey) -> Routing {
        self.route(Routable::Election(msg), from)
    }

    fn route(&mut self, msg: Routable, from: VerifyingKey) -> Routing {
        let inst_id = msg.inst_id();
        if inst_id.int() as usize >= self.replicas.len() {
            log::debug!("Buffering message for future instance {}", inst_id);
            self.future_instance_msgs
                .entry(inst_id)
                .or_default()
                .push_back((msg, from));
            return Routing::Buffered;
        }

        let view_no = msg.view_no();
        if view_no.int() + 1 < self.view_no.int() {
            log::debug!(
                "Discarding message for view {} received in view {}",
                view_no,
                self.view_no
            );
            return Routing::Discarded;
        }
        if view_no > self.view_no {
            log::debug!("Buffering message for future view {}", view_no);
            self.future_view_msgs
                .entry(view_no)
                .or_default()
                .push_back((msg, from));
            return Routing::Buffered;
        }

        match msg {
            Routable::ThreePhase(msg) => self.replicas[inst_id.int() as usize].deliver(msg, from),
            Routable::Election(msg) => self.elector_inbox.push_back((msg, from)),
        }
        Routing::Delivered
    }

    pub fn view_no(&self) -> ViewNumber {
        self.view_no
    }

    /// Move to `view_no`, replaying every buffered message for views up to it.
    pub fn set_view_no(&mut self, view_no: ViewNumber) {
        self.view_no = view_no;
        let later = self.future_view_msgs.split_off(&(view_no + 1));
        let ready = std::mem::replace(&mut self.future_view_msgs, later);
        for (_, buffered) in ready {
            for (msg, from) in buffered {
                self.route(msg, from);
            }
        }
    }

    /// Forward a finalised request to every instance.
    pub fn on_request_finalised(&mut self, request: &Request) {
        self.replicas
            .iter_mut()
            .for_each(|replica| replica.on_request_finalised(request));
    }

    /// Service every replica's inbox, returning their outputs in instance order.
    pub fn service_replicas(&mut self, limit: usize) -> Vec<(InstanceId, ReplicaOutput)> {
        let mut outputs = Vec::new();
        for replica in self.replicas.iter_mut() {
            let inst_id = replica.inst_id();
            outputs.extend(replica.service(limit).into_iter().map(|output| (inst_id, output)));
        }
        outputs
    }

    /// Take at most `limit` messages from the elector inbox.
    pub fn service_elector_inbox(&mut self, limit: usize) -> Vec<(ElectionMessage, VerifyingKey)> {
        let count = limit.min(self.elector_inbox.len());
        self.elector_inbox.drain(0..count).collect()
    }

    pub fn len(&self) -> usize {
        self.replicas.len()
    }

    pub fn is_empty(&self) -> bool {
        self.replicas.is_empty()
    }

    pub fn master(&self) -> Option<&R> {
        self.replicas.first()
    }

    pub fn master_mut(&mut self) -> Option<&mut R> {
        self.replicas.first_mut()
    }

    pub fn get(&self, inst_id: InstanceId) -> Option<&R> {
        self.replicas.get(inst_id.int() as usize)
    }

    pub fn get_mut(&mut self, inst_id: InstanceId) -> Option<&mut R> {
        self.replicas.get_mut(inst_id.int() as usize)
    }

    pub fn iter(&self) -> impl Iterator<Item = &R> {
        self.replicas.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut R> {
        self.replicas.iter_mut()
    }

    /// Number of messages waiting for an instance or a view.
    pub fn buffered_count(&self) -> usize {
        self.future_instance_msgs.values().map(VecDeque::len).sum::<usize>()
            + self.future_view_msgs.values().map(VecDeque::len).sum::<usize>()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use ed25519_dalek::SigningKey;
    use rand_core::OsRng;

    use super::*;
    use crate::{
        networking::messages::Commit,
        types::data_types::{LedgerId, PpSeqNo, ThreePhaseKey},
    };

    type Delivered = Arc<Mutex<Vec<(InstanceId, ThreePhaseMessage)>>>;

    struct RecordingReplica {
        inst_id: InstanceId,
        delivered: Delivered,
    }

    impl Replica for RecordingReplica {
        fn inst_id(&self) -> InstanceId {
            self.inst_id
        }
        fn deliver(&mut self, msg: ThreePhaseMessage, _: VerifyingKey) {
            self.delivered.lock().unwrap().push((self.inst_id, msg))
        }
        fn on_request_finalised(&mut self, _: &Request) {}
        fn service(&mut self, _: usize) -> Vec<ReplicaOutput> {
            Vec::new()
        }
        fn primary_name(&self) -> Option<VerifyingKey> {
            None
        }
        fn set_primary_name(&mut self, _: Option<VerifyingKey>) {}
        fn is_primary(&self) -> bool {
            false
        }
        fn last_ordered_3pc(&self) -> ThreePhaseKey {
            ThreePhaseKey::default()
        }
        fn set_last_ordered_3pc(&mut self, _: ThreePhaseKey) {}
        fn last_prepared_before_view_change(&self) -> Option<ThreePhaseKey> {
            None
        }
        fn clear_last_prepared_before_view_change(&mut self) {}
        fn revert_unordered_batches(&mut self, _: LedgerId) -> usize {
            0
        }
        fn on_view_change_start(&mut self, _: ViewNumber) {}
        fn on_view_change_done(&mut self, _: ViewNumber) {}
    }

    fn replica_set(view_no: u64) -> (ReplicaSet<RecordingReplica>, Delivered) {
        let delivered: Delivered = Arc::new(Mutex::new(Vec::new()));
        let sink = delivered.clone();
        let factory: ReplicaFactory<RecordingReplica> = Box::new(move |inst_id| RecordingReplica {
            inst_id,
            delivered: sink.clone(),
        });
        (ReplicaSet::new(factory, ViewNumber::new(view_no)), delivered)
    }

    fn commit(inst_id: u32, view_no: u64, pp_seq_no: u64) -> ThreePhaseMessage {
        ThreePhaseMessage::Commit(Commit {
            inst_id: InstanceId::new(inst_id),
            view_no: ViewNumber::new(view_no),
            pp_seq_no: PpSeqNo::new(pp_seq_no),
        })
    }

    #[test]
    fn adjust_replicas_follows_pool_size_test() {
        let (mut replicas, _) = replica_set(0);
        assert_eq!(replicas.adjust_replicas(4), 2);
        assert_eq!(replicas.adjust_replicas(7), 1);
        assert_eq!(replicas.len(), 3);
        assert_eq!(replicas.adjust_replicas(4), -1);
        assert_eq!(replicas.iter().last().unwrap().inst_id(), InstanceId::new(1));
        assert_eq!(replicas.adjust_replicas(4), 0);
    }

    #[test]
    fn view_acceptance_window_test() {
        let (mut replicas, delivered) = replica_set(5);
        replicas.adjust_replicas(4);
        let peer = SigningKey::generate(&mut OsRng).verifying_key();

        assert_eq!(replicas.send_to_replica(commit(0, 3, 1), peer), Routing::Discarded);
        assert_eq!(replicas.send_to_replica(commit(0, 4, 1), peer), Routing::Delivered);
        assert_eq!(replicas.send_to_replica(commit(1, 5, 1), peer), Routing::Delivered);
        assert_eq!(replicas.send_to_replica(commit(0, 6, 1), peer), Routing::Buffered);
        assert_eq!(delivered.lock().unwrap().len(), 2);
        assert_eq!(replicas.buffered_count(), 1);
    }

    #[test]
    fn buffered_messages_are_replayed_in_receipt_order_test() {
        let (mut replicas, delivered) = replica_set(0);
        replicas.adjust_replicas(4);
        let peer = SigningKey::generate(&mut OsRng).verifying_key();

        // 1. Instance 2 does not exist in a pool of 4.
        assert_eq!(replicas.send_to_replica(commit(2, 0, 1), peer), Routing::Buffered);
        assert_eq!(replicas.send_to_replica(commit(2, 0, 2), peer), Routing::Buffered);

        // 2. View 1 is not current yet.
        assert_eq!(replicas.send_to_replica(commit(0, 1, 3), peer), Routing::Buffered);
        assert_eq!(replicas.send_to_replica(commit(1, 1, 4), peer), Routing::Buffered);
        assert_eq!(replicas.buffered_count(), 4);
        assert!(delivered.lock().unwrap().is_empty());

        // 3. Growing the pool to 7 creates instance 2.
        replicas.adjust_replicas(7);
        assert_eq!(
            *delivered.lock().unwrap(),
            vec![
                (InstanceId::new(2), commit(2, 0, 1)),
                (InstanceId::new(2), commit(2, 0, 2)),
            ]
        );

        // 4. Entering view 1.
        replicas.set_view_no(ViewNumber::new(1));
        assert_eq!(replicas.buffered_count(), 0);
        let delivered = delivered.lock().unwrap();
        assert_eq!(delivered.len(), 4);
        assert_eq!(delivered[2], (InstanceId::new(0), commit(0, 1, 3)));
        assert_eq!(delivered[3], (InstanceId::new(1), commit(1, 1, 4)));
    }
}
