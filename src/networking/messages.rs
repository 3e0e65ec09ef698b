/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Messages exchanged between nodes and between nodes and clients.
//!
//! Peer messages fall into five groups, each with its own enum:
//! 1. [`Propagate`] and [`InstanceChange`], handled by the node itself.
//! 2. [`ThreePhaseMessage`]s, routed to one of the node's replica instances.
//! 3. [`CatchupMessage`]s, handled by the catch-up coordinator.
//! 4. [`ElectionMessage`]s, routed to the primary selector.
//! 5. [`Batch`]es, which wrap any number of the above.
//!
//! All messages are Borsh-serializable. How they are framed on the wire is up to the
//! [networking provider](super::network::Network).

use borsh::{BorshDeserialize, BorshSerialize};

use crate::types::{
    data_types::{
        CryptoHash, Identifier, InstanceId, LedgerId, LedgerInfo, PpSeqNo, ReqId, RequestKey,
        ThreePhaseKey, VerifyingKeyBytes, ViewNumber,
    },
    request::{Request, Transaction},
    suspicion::SuspicionCode,
};

#[derive(Clone, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub enum Message {
    Propagate(Propagate),
    InstanceChange(InstanceChange),
    ThreePhase(ThreePhaseMessage),
    Catchup(CatchupMessage),
    Election(ElectionMessage),
    Batch(Batch),
}

/// Relays a client request to every other node so that it can be finalised.
#[derive(Clone, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct Propagate {
    pub request: Request,
}

/// A vote to move to `view_no` because the sender suspects the current master primary.
#[derive(Clone, Copy, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct InstanceChange {
    pub view_no: ViewNumber,
    pub code: SuspicionCode,
}

/// Wraps several Borsh-serialized messages for transport efficiency.
#[derive(Clone, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct Batch {
    pub messages: Vec<Vec<u8>>,
}

impl Batch {
    pub fn new(messages: &[Message]) -> Batch {
        Batch {
            messages: messages
                .iter()
                .map(|message| message.try_to_vec().unwrap())
                .collect(),
        }
    }

    /// Decode the wrapped messages. Fails if any of them is malformed.
    pub fn unpack(&self) -> Result<Vec<Message>, std::io::Error> {
        self.messages
            .iter()
            .map(|bytes| Message::try_from_slice(bytes))
            .collect()
    }
}

#[derive(Clone, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub enum ThreePhaseMessage {
    PrePrepare(PrePrepare),
    Prepare(Prepare),
    Commit(Commit),
    Checkpoint(Checkpoint),
    ThreePCState(ThreePCState),
}

impl ThreePhaseMessage {
    pub fn inst_id(&self) -> InstanceId {
        match self {
            ThreePhaseMessage::PrePrepare(msg) => msg.inst_id,
            ThreePhaseMessage::Prepare(msg) => msg.inst_id,
            ThreePhaseMessage::Commit(msg) => msg.inst_id,
            ThreePhaseMessage::Checkpoint(msg) => msg.inst_id,
            ThreePhaseMessage::ThreePCState(msg) => msg.inst_id,
        }
    }

    pub fn view_no(&self) -> ViewNumber {
        match self {
            ThreePhaseMessage::PrePrepare(msg) => msg.view_no,
            ThreePhaseMessage::Prepare(msg) => msg.view_no,
            ThreePhaseMessage::Commit(msg) => msg.view_no,
            ThreePhaseMessage::Checkpoint(msg) => msg.view_no,
            ThreePhaseMessage::ThreePCState(msg) => msg.view_no,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct PrePrepare {
    pub inst_id: InstanceId,
    pub view_no: ViewNumber,
    pub pp_seq_no: PpSeqNo,
    pub pp_time: u64,
    pub req_keys: Vec<RequestKey>,
    pub digest: CryptoHash,
    pub ledger_id: LedgerId,
    pub state_root: CryptoHash,
    pub txn_root: CryptoHash,
}

#[derive(Clone, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct Prepare {
    pub inst_id: InstanceId,
    pub view_no: ViewNumber,
    pub pp_seq_no: PpSeqNo,
    pub digest: CryptoHash,
    pub state_root: CryptoHash,
    pub txn_root: CryptoHash,
}

#[derive(Clone, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct Commit {
    pub inst_id: InstanceId,
    pub view_no: ViewNumber,
    pub pp_seq_no: PpSeqNo,
}

#[derive(Clone, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct Checkpoint {
    pub inst_id: InstanceId,
    pub view_no: ViewNumber,
    pub seq_no_start: PpSeqNo,
    pub seq_no_end: PpSeqNo,
    pub digest: CryptoHash,
}

/// Three-phase messages a replica re-sends to help a lagging peer.
#[derive(Clone, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct ThreePCState {
    pub inst_id: InstanceId,
    pub view_no: ViewNumber,
    pub pre_prepares: Vec<PrePrepare>,
    pub commits: Vec<Commit>,
}

#[derive(Clone, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub enum CatchupMessage {
    LedgerStatus(LedgerStatus),
    ReqLedgerStatus(ReqLedgerStatus),
    ConsistencyProof(ConsistencyProof),
    ConsProofRequest(ConsProofRequest),
    CatchupReq(CatchupReq),
    CatchupRep(CatchupRep),
}

impl CatchupMessage {
    pub fn ledger_id(&self) -> LedgerId {
        match self {
            CatchupMessage::LedgerStatus(msg) => msg.ledger_id,
            CatchupMessage::ReqLedgerStatus(msg) => msg.ledger_id,
            CatchupMessage::ConsistencyProof(msg) => msg.ledger_id,
            CatchupMessage::ConsProofRequest(msg) => msg.ledger_id,
            CatchupMessage::CatchupReq(msg) => msg.ledger_id,
            CatchupMessage::CatchupRep(msg) => msg.ledger_id,
        }
    }
}

/// The sender's view of one of its ledgers.
#[derive(Clone, Copy, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct LedgerStatus {
    pub ledger_id: LedgerId,
    pub size: u64,
    /// Three-phase key of the batch that produced the last transaction, if known.
    pub last_3pc: Option<ThreePhaseKey>,
    pub root_hash: CryptoHash,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct ReqLedgerStatus {
    pub ledger_id: LedgerId,
}

/// States that the sender's ledger extends a ledger of size `seq_no_start` and root `old_root_hash`
/// to size `seq_no_end` and root `new_root_hash`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct ConsistencyProof {
    pub ledger_id: LedgerId,
    pub seq_no_start: u64,
    pub seq_no_end: u64,
    pub last_3pc: Option<ThreePhaseKey>,
    pub old_root_hash: CryptoHash,
    pub new_root_hash: CryptoHash,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct ConsProofRequest {
    pub ledger_id: LedgerId,
    pub seq_no_start: u64,
    pub seq_no_end: u64,
}

/// Asks for transactions `seq_no_start..=seq_no_end`, as part of catching up to `catchup_till`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct CatchupReq {
    pub ledger_id: LedgerId,
    pub seq_no_start: u64,
    pub seq_no_end: u64,
    pub catchup_till: u64,
}

#[derive(Clone, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct CatchupRep {
    pub ledger_id: LedgerId,
    pub txns: Vec<Transaction>,
}

#[derive(Clone, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub enum ElectionMessage {
    Nomination(Nomination),
    Primary(Primary),
    Reelection(Reelection),
    ViewChangeDone(ViewChangeDone),
}

impl ElectionMessage {
    pub fn inst_id(&self) -> InstanceId {
        match self {
            ElectionMessage::Nomination(msg) => msg.inst_id,
            ElectionMessage::Primary(msg) => msg.inst_id,
            ElectionMessage::Reelection(msg) => msg.inst_id,
            ElectionMessage::ViewChangeDone(_) => InstanceId::MASTER,
        }
    }

    pub fn view_no(&self) -> ViewNumber {
        match self {
            ElectionMessage::Nomination(msg) => msg.view_no,
            ElectionMessage::Primary(msg) => msg.view_no,
            ElectionMessage::Reelection(msg) => msg.view_no,
            ElectionMessage::ViewChangeDone(msg) => msg.view_no,
        }
    }
}

/// Election messages of the voting-based primary election protocol. Nodes using round robin
/// selection only log and discard them.
#[derive(Clone, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct Nomination {
    pub inst_id: InstanceId,
    pub view_no: ViewNumber,
    pub name: VerifyingKeyBytes,
    pub ord_seq_no: u64,
}

#[derive(Clone, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct Primary {
    pub inst_id: InstanceId,
    pub view_no: ViewNumber,
    pub name: VerifyingKeyBytes,
    pub ord_seq_no: u64,
}

#[derive(Clone, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct Reelection {
    pub inst_id: InstanceId,
    pub view_no: ViewNumber,
    pub round: u64,
    pub tie_among: Vec<VerifyingKeyBytes>,
}

/// Declares that the sender has finished catching up for `view_no`, that it accepts `name` as the new
/// master primary, and the ledgers it caught up to.
#[derive(Clone, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct ViewChangeDone {
    pub view_no: ViewNumber,
    pub name: VerifyingKeyBytes,
    pub ledger_info: Vec<LedgerInfo>,
}

impl From<Propagate> for Message {
    fn from(value: Propagate) -> Self {
        Message::Propagate(value)
    }
}

impl From<InstanceChange> for Message {
    fn from(value: InstanceChange) -> Self {
        Message::InstanceChange(value)
    }
}

impl From<ThreePhaseMessage> for Message {
    fn from(value: ThreePhaseMessage) -> Self {
        Message::ThreePhase(value)
    }
}

impl From<CatchupMessage> for Message {
    fn from(value: CatchupMessage) -> Self {
        Message::Catchup(value)
    }
}

impl From<ElectionMessage> for Message {
    fn from(value: ElectionMessage) -> Self {
        Message::Election(value)
    }
}

impl From<LedgerStatus> for Message {
    fn from(value: LedgerStatus) -> Self {
        Message::Catchup(CatchupMessage::LedgerStatus(value))
    }
}

impl From<ReqLedgerStatus> for Message {
    fn from(value: ReqLedgerStatus) -> Self {
        Message::Catchup(CatchupMessage::ReqLedgerStatus(value))
    }
}

impl From<ConsistencyProof> for Message {
    fn from(value: ConsistencyProof) -> Self {
        Message::Catchup(CatchupMessage::ConsistencyProof(value))
    }
}

impl From<ConsProofRequest> for Message {
    fn from(value: ConsProofRequest) -> Self {
        Message::Catchup(CatchupMessage::ConsProofRequest(value))
    }
}

impl From<CatchupReq> for Message {
    fn from(value: CatchupReq) -> Self {
        Message::Catchup(CatchupMessage::CatchupReq(value))
    }
}

impl From<CatchupRep> for Message {
    fn from(value: CatchupRep) -> Self {
        Message::Catchup(CatchupMessage::CatchupRep(value))
    }
}

impl From<ViewChangeDone> for Message {
    fn from(value: ViewChangeDone) -> Self {
        Message::Election(ElectionMessage::ViewChangeDone(value))
    }
}

/// Messages a node sends to clients.
#[derive(Clone, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub enum ClientMessage {
    Reply(Reply),
    RequestAck(RequestAck),
    RequestNack(RequestNack),
    Reject(Reject),
}

/// The result of a committed request.
#[derive(Clone, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct Reply {
    pub txn: Transaction,
    pub ledger_id: LedgerId,
    /// The ledger's root hash right after the transaction was committed.
    pub root_hash: CryptoHash,
}

/// The request was accepted and will be ordered.
#[derive(Clone, Copy, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct RequestAck {
    pub identifier: Identifier,
    pub req_id: ReqId,
}

/// The request was refused before ordering.
#[derive(Clone, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct RequestNack {
    pub identifier: Identifier,
    pub req_id: ReqId,
    pub reason: String,
}

/// The request was ordered but could not be applied.
#[derive(Clone, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct Reject {
    pub identifier: Identifier,
    pub req_id: ReqId,
    pub reason: String,
}
