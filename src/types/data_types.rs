/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Types that exist only to store bytes and numbers, and do not have any major "active" behavior.

use std::{
    fmt::{self, Debug, Display, Formatter},
    hash::Hash,
    ops::{Add, AddAssign, Sub},
};

use borsh::{BorshDeserialize, BorshSerialize};

/// Number of a view: an epoch during which a fixed assignment of primaries to instances holds.
///
/// Views start at 0 and only ever increase.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Default, BorshSerialize, BorshDeserialize,
)]
pub struct ViewNumber(u64);

impl ViewNumber {
    /// Create a new `ViewNumber` with an `int` value.
    pub const fn new(int: u64) -> Self {
        Self(int)
    }

    /// Get the `u64` value of this `ViewNumber`.
    pub const fn int(&self) -> u64 {
        self.0
    }

    /// Get the `ViewNumber` that immediately precedes this one, or `None` if this is view 0.
    pub fn prev(&self) -> Option<ViewNumber> {
        self.0.checked_sub(1).map(ViewNumber)
    }
}

impl Display for ViewNumber {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        Display::fmt(&self.0, f)
    }
}

impl Add<u64> for ViewNumber {
    type Output = ViewNumber;
    fn add(self, rhs: u64) -> Self::Output {
        ViewNumber(self.0 + rhs)
    }
}

impl AddAssign<u64> for ViewNumber {
    fn add_assign(&mut self, rhs: u64) {
        self.0.add_assign(rhs)
    }
}

/// Sequence number of a PRE-PREPARE within a view, as assigned by an instance's primary.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Default, BorshSerialize, BorshDeserialize,
)]
pub struct PpSeqNo(u64);

impl PpSeqNo {
    pub const fn new(int: u64) -> Self {
        Self(int)
    }

    pub const fn int(&self) -> u64 {
        self.0
    }
}

impl Display for PpSeqNo {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        Display::fmt(&self.0, f)
    }
}

impl Add<u64> for PpSeqNo {
    type Output = PpSeqNo;
    fn add(self, rhs: u64) -> Self::Output {
        PpSeqNo(self.0 + rhs)
    }
}

/// Position of a transaction in a ledger. The first transaction of every ledger has `SeqNo` 1.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Default, BorshSerialize, BorshDeserialize,
)]
pub struct SeqNo(u64);

impl SeqNo {
    pub const fn new(int: u64) -> Self {
        Self(int)
    }

    pub const fn int(&self) -> u64 {
        self.0
    }

    /// Get the little-endian representation of the inner `u64` value of this `SeqNo`.
    pub fn to_le_bytes(&self) -> [u8; 8] {
        self.0.to_le_bytes()
    }
}

impl Display for SeqNo {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        Display::fmt(&self.0, f)
    }
}

impl Add<u64> for SeqNo {
    type Output = SeqNo;
    fn add(self, rhs: u64) -> Self::Output {
        SeqNo(self.0 + rhs)
    }
}

impl Sub<SeqNo> for SeqNo {
    type Output = u64;
    fn sub(self, rhs: SeqNo) -> Self::Output {
        self.0 - rhs.0
    }
}

/// Identifies one of the parallel ordering instances run by every node. Instance 0 is the master.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Default, BorshSerialize, BorshDeserialize,
)]
pub struct InstanceId(u32);

impl InstanceId {
    pub const MASTER: InstanceId = InstanceId(0);

    pub const fn new(int: u32) -> Self {
        Self(int)
    }

    pub const fn int(&self) -> u32 {
        self.0
    }

    pub const fn is_master(&self) -> bool {
        self.0 == 0
    }
}

impl Display for InstanceId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        Display::fmt(&self.0, f)
    }
}

/// Identifies a specific round of three-phase ordering: the view it happened in and the
/// PRE-PREPARE sequence number within that view.
///
/// The derived ordering compares `view_no` first and `pp_seq_no` second, which is the order in which
/// batches are ordered by the master instance.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Default, BorshSerialize, BorshDeserialize,
)]
pub struct ThreePhaseKey {
    pub view_no: ViewNumber,
    pub pp_seq_no: PpSeqNo,
}

impl ThreePhaseKey {
    pub const fn new(view_no: ViewNumber, pp_seq_no: PpSeqNo) -> Self {
        Self { view_no, pp_seq_no }
    }
}

impl Display for ThreePhaseKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.view_no, self.pp_seq_no)
    }
}

/// The ledgers a node maintains. Pool ledger transactions define node membership, domain ledger
/// transactions define identities and application data.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, BorshSerialize, BorshDeserialize,
)]
pub enum LedgerId {
    Pool,
    Domain,
}

impl LedgerId {
    /// Every ledger, in the order that they must be caught up.
    pub const fn all() -> [LedgerId; 2] {
        [LedgerId::Pool, LedgerId::Domain]
    }

    /// One-byte discriminant used in storage keys.
    pub const fn as_byte(&self) -> u8 {
        match self {
            LedgerId::Pool => 0,
            LedgerId::Domain => 1,
        }
    }
}

impl Display for LedgerId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            LedgerId::Pool => write!(f, "pool"),
            LedgerId::Domain => write!(f, "domain"),
        }
    }
}

/// The size and root hash of a ledger, as reported to peers.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, BorshSerialize, BorshDeserialize)]
pub struct LedgerInfo {
    pub ledger_id: LedgerId,
    pub size: u64,
    pub root_hash: CryptoHash,
}

/// A SHA256 digest.
#[derive(
    Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, BorshSerialize, BorshDeserialize,
)]
pub struct CryptoHash([u8; 32]);

impl CryptoHash {
    pub const fn new(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// The root hash of an empty ledger or an empty state.
    pub const fn zero() -> Self {
        Self([0; 32])
    }

    pub const fn bytes(&self) -> [u8; 32] {
        self.0
    }
}

impl From<[u8; 32]> for CryptoHash {
    fn from(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }
}

impl Debug for CryptoHash {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        for byte in &self.0[0..4] {
            write!(f, "{:02x}", byte)?;
        }
        write!(f, "..")
    }
}

/// Bytes of an Ed25519 verifying key, as carried in messages and transactions.
pub type VerifyingKeyBytes = [u8; 32];

/// Bytes of an Ed25519 signature.
#[derive(Clone, Copy, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct SignatureBytes([u8; 64]);

impl SignatureBytes {
    pub const fn new(bytes: [u8; 64]) -> Self {
        Self(bytes)
    }

    pub const fn bytes(&self) -> [u8; 64] {
        self.0
    }
}

impl Debug for SignatureBytes {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "SignatureBytes(..)")
    }
}

/// Identifies the author of a client request. For cryptonyms, the identifier is the author's verifying
/// key.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, BorshSerialize, BorshDeserialize,
)]
pub struct Identifier([u8; 32]);

impl Identifier {
    pub const fn new(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub const fn bytes(&self) -> [u8; 32] {
        self.0
    }
}

/// Client-chosen number that, together with an [`Identifier`], uniquely identifies a request.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, BorshSerialize, BorshDeserialize,
)]
pub struct ReqId(u64);

impl ReqId {
    pub const fn new(int: u64) -> Self {
        Self(int)
    }

    pub const fn int(&self) -> u64 {
        self.0
    }
}

/// `(identifier, req_id)`: the key under which requests are deduplicated.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, BorshSerialize, BorshDeserialize,
)]
pub struct RequestKey {
    pub identifier: Identifier,
    pub req_id: ReqId,
}

impl RequestKey {
    pub const fn new(identifier: Identifier, req_id: ReqId) -> Self {
        Self { identifier, req_id }
    }
}

impl Display for RequestKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{:02x}{:02x}..:{}", self.identifier.0[0], self.identifier.0[1], self.req_id.0)
    }
}

/// Opaque handle to a client connection, assigned by the networking provider.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, BorshSerialize, BorshDeserialize)]
pub struct ClientAddress(u64);

impl ClientAddress {
    pub const fn new(int: u64) -> Self {
        Self(int)
    }

    pub const fn int(&self) -> u64 {
        self.0
    }
}

/// The phase of a node's lifecycle. See [`Node`](crate::node::Node) for the transitions between modes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum NodeMode {
    /// The pool ledger is being caught up, so the pool's membership is not yet known.
    Starting,
    /// A ledger is being caught up.
    Syncing,
    /// The pool ledger is caught up.
    Discovered,
    /// Every ledger is caught up and the node takes part in ordering.
    Participating,
}

impl Display for NodeMode {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            NodeMode::Starting => write!(f, "starting"),
            NodeMode::Syncing => write!(f, "syncing"),
            NodeMode::Discovered => write!(f, "discovered"),
            NodeMode::Participating => write!(f, "participating"),
        }
    }
}

/// How well a node is connected to the rest of the pool.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum NodeStatus {
    /// Connected to fewer than `f + 1` nodes, counting itself.
    Starting,
    /// Connected to at least `f + 1` nodes, but not to every node.
    StartedHungry,
    /// Connected to every node in the pool.
    Started,
}
