use std::collections::VecDeque;

use ed25519_dalek::VerifyingKey;
use rbft_node::{
    networking::messages::ThreePhaseMessage,
    replicas::replica::{Replica, ReplicaOutput},
    types::{
        data_types::{InstanceId, LedgerId, RequestKey, ThreePhaseKey, ViewNumber},
        request::Request,
    },
};

/// A replica that does not order anything by itself. Tests decide what it outputs with
/// [`push_output`](ScriptedReplica::push_output), and inspect what the node told it.
pub(crate) struct ScriptedReplica {
    inst_id: InstanceId,
    outbox: VecDeque<ReplicaOutput>,
    pub(crate) delivered: Vec<(ThreePhaseMessage, VerifyingKey)>,
    pub(crate) finalised: Vec<RequestKey>,
    primary: Option<VerifyingKey>,
    me: VerifyingKey,
    last_ordered: ThreePhaseKey,
    pub(crate) last_prepared: Option<ThreePhaseKey>,
    pub(crate) view_changes_started: Vec<ViewNumber>,
    pub(crate) view_changes_done: Vec<ViewNumber>,
    pub(crate) reverted: Vec<LedgerId>,
}

impl ScriptedReplica {
    pub(crate) fn new(inst_id: InstanceId, me: VerifyingKey) -> ScriptedReplica {
        ScriptedReplica {
            inst_id,
            outbox: VecDeque::new(),
            delivered: Vec::new(),
            finalised: Vec::new(),
            primary: None,
            me,
            last_ordered: ThreePhaseKey::default(),
            last_prepared: None,
            view_changes_started: Vec::new(),
            view_changes_done: Vec::new(),
            reverted: Vec::new(),
        }
    }

    pub(crate) fn push_output(&mut self, output: ReplicaOutput) {
        if let ReplicaOutput::Ordered(ordered) = &output {
            self.last_ordered = self.last_ordered.max(ordered.key());
        }
        self.outbox.push_back(output);
    }
}

impl Replica for ScriptedReplica {
    fn inst_id(&self) -> InstanceId {
        self.inst_id
    }

    fn deliver(&mut self, msg: ThreePhaseMessage, from: VerifyingKey) {
        self.delivered.push((msg, from));
    }

    fn on_request_finalised(&mut self, request: &Request) {
        self.finalised.push(request.key());
    }

    fn service(&mut self, limit: usize) -> Vec<ReplicaOutput> {
        let count = limit.min(self.outbox.len());
        self.outbox.drain(0..count).collect()
    }

    fn primary_name(&self) -> Option<VerifyingKey> {
        self.primary
    }

    fn set_primary_name(&mut self, primary: Option<VerifyingKey>) {
        self.primary = primary;
    }

    fn is_primary(&self) -> bool {
        self.primary == Some(self.me)
    }

    fn last_ordered_3pc(&self) -> ThreePhaseKey {
        self.last_ordered
    }

    fn set_last_ordered_3pc(&mut self, key: ThreePhaseKey) {
        self.last_ordered = key;
    }

    fn last_prepared_before_view_change(&self) -> Option<ThreePhaseKey> {
        self.last_prepared
    }

    fn clear_last_prepared_before_view_change(&mut self) {
        self.last_prepared = None;
    }

    fn revert_unordered_batches(&mut self, ledger_id: LedgerId) -> usize {
        self.reverted.push(ledger_id);
        0
    }

    fn on_view_change_start(&mut self, view_no: ViewNumber) {
        self.view_changes_started.push(view_no);
    }

    fn on_view_change_done(&mut self, view_no: ViewNumber) {
        self.view_changes_done.push(view_no);
    }
}
