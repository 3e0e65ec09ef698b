/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Definitions of node events for event handling and logging.
//!
//! Note: an event for a given action indicates that the action has been completed.

use std::sync::mpsc::Sender;
use std::time::SystemTime;

use ed25519_dalek::VerifyingKey;

use crate::types::{
    data_types::{Identifier, InstanceId, LedgerId, NodeMode, NodeStatus, RequestKey, SeqNo, ThreePhaseKey, ViewNumber},
    suspicion::SuspicionCode,
};

pub enum Event {
    // Lifecycle events.
    ChangeMode(ChangeModeEvent),
    ChangeStatus(ChangeStatusEvent),
    // Catch-up events.
    StartCatchup(StartCatchupEvent),
    EndCatchup(EndCatchupEvent),
    // Events that change persistent state.
    ExecuteBatch(ExecuteBatchEvent),
    SendReply(SendReplyEvent),
    // View change events.
    SendInstanceChange(SendInstanceChangeEvent),
    ReceiveInstanceChange(ReceiveInstanceChangeEvent),
    StartViewChange(StartViewChangeEvent),
    CompleteViewChange(CompleteViewChangeEvent),
    SelectPrimary(SelectPrimaryEvent),
    AdjustReplicas(AdjustReplicasEvent),
    // Fault events.
    Suspicion(SuspicionEvent),
    BlacklistClient(BlacklistClientEvent),
}

impl Event {
    pub(crate) fn publish(event_publisher: &Option<Sender<Event>>, event: Event) {
        if let Some(event_publisher) = event_publisher {
            let _ = event_publisher.send(event);
        }
    }
}

pub struct ChangeModeEvent {
    pub timestamp: SystemTime,
    pub mode: NodeMode,
}

pub struct ChangeStatusEvent {
    pub timestamp: SystemTime,
    pub status: NodeStatus,
}

pub struct StartCatchupEvent {
    pub timestamp: SystemTime,
    pub ledger_id: LedgerId,
}

pub struct EndCatchupEvent {
    pub timestamp: SystemTime,
    pub ledger_id: LedgerId,
    pub txns_applied: u64,
}

pub struct ExecuteBatchEvent {
    pub timestamp: SystemTime,
    pub ledger_id: LedgerId,
    pub key: ThreePhaseKey,
    pub first_seq_no: SeqNo,
    pub txn_count: usize,
}

pub struct SendReplyEvent {
    pub timestamp: SystemTime,
    pub request: RequestKey,
    pub ledger_id: LedgerId,
    pub seq_no: SeqNo,
}

pub struct SendInstanceChangeEvent {
    pub timestamp: SystemTime,
    pub view_no: ViewNumber,
    pub code: SuspicionCode,
}

pub struct ReceiveInstanceChangeEvent {
    pub timestamp: SystemTime,
    pub origin: VerifyingKey,
    pub view_no: ViewNumber,
    pub code: SuspicionCode,
}

pub struct StartViewChangeEvent {
    pub timestamp: SystemTime,
    pub view_no: ViewNumber,
}

pub struct CompleteViewChangeEvent {
    pub timestamp: SystemTime,
    pub view_no: ViewNumber,
}

pub struct SelectPrimaryEvent {
    pub timestamp: SystemTime,
    pub inst_id: InstanceId,
    pub view_no: ViewNumber,
    pub primary: VerifyingKey,
}

pub struct AdjustReplicasEvent {
    pub timestamp: SystemTime,
    pub delta: i64,
    pub count: usize,
}

pub struct SuspicionEvent {
    pub timestamp: SystemTime,
    pub node: VerifyingKey,
    pub code: SuspicionCode,
}

pub struct BlacklistClientEvent {
    pub timestamp: SystemTime,
    pub identifier: Identifier,
}
