/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Synchronizing one ledger at a time with the pool.
//!
//! ## Catching up a ledger
//!
//! 1. [`start`](CatchupCoordinator::start) broadcasts a `ReqLedgerStatus` and our `LedgerStatus`.
//! 2. Every peer answers the request with its own `LedgerStatus`. A peer whose ledger is larger than
//!    ours also answers our status with a `ConsistencyProof` from our size to its size.
//! 3. If `n - f - 1` peers report a ledger that is the same as ours or smaller, the ledger is caught
//!    up with zero transactions.
//! 4. Otherwise, once `f + 1` consistency proofs agree on the same end size and root, that size and
//!    root become the target. The missing range is split into chunks of `catchup_batch_size`, and each
//!    chunk is requested with a `CatchupReq` from one of the agreeing peers, picked at random.
//! 5. A `CatchupRep` is only accepted for the chunks that were requested from its sender, and a
//!    transaction that was already received is never replaced. Once the whole range is present, the
//!    root that appending it would produce is compared with the target root. On a match the
//!    transactions are handed to the node to be appended.
//! 6. On a mismatch, the root at the end of every chunk is requested from the pool with
//!    `ConsProofRequest`s. Once `f + 1` peers agree on each of these roots, every chunk is checked
//!    on its own. Only the chunks that do not match are dropped, and they are requested again from
//!    peers other than the ones that sent them.
//! 7. If a round makes no progress before its timeout, the outstanding requests are sent again.
//!
//! ## Serving peers
//!
//! Requests from peers that are catching up are answered from the committed ledgers, whether or not
//! this node is itself catching up.

use std::collections::{btree_map::Entry, BTreeMap, HashMap, HashSet};

use ed25519_dalek::VerifyingKey;
use rand::seq::SliceRandom;

use crate::{
    ledger::{ledger::Ledger, pluggables::KVStore, registry::LedgerRegistry, LedgerError},
    networking::{
        messages::{
            CatchupRep, CatchupReq, ConsProofRequest, ConsistencyProof, LedgerStatus, ReqLedgerStatus,
        },
        network::Network,
        sending::SenderHandle,
    },
    types::{
        data_types::{CryptoHash, LedgerId, SeqNo, ThreePhaseKey},
        quorums::Quorums,
        request::Transaction,
    },
};

/// The catch-up state of one ledger.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LedgerSyncState {
    NotSynced,
    Syncing,
    Synced,
}

/// A ledger finished catching up.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LedgerCaughtUp {
    pub ledger_id: LedgerId,
    pub txns_applied: u64,
    /// The highest three-phase key the quorum reported for the ledger.
    pub last_3pc: Option<ThreePhaseKey>,
}

#[derive(Clone, Copy, Debug)]
struct CatchupTarget {
    size: u64,
    root_hash: CryptoHash,
    last_3pc: Option<ThreePhaseKey>,
}

// A range of transactions requested from one provider.
#[derive(Clone, Copy, Debug)]
struct Chunk {
    end: u64,
    provider: VerifyingKey,
}

struct LedgerCatchup {
    state: LedgerSyncState,
    confirmations: HashSet<VerifyingKey>,
    confirmed_last_3pc: Option<ThreePhaseKey>,
    proofs: HashMap<VerifyingKey, ConsistencyProof>,
    target: Option<CatchupTarget>,
    providers: Vec<VerifyingKey>,
    // Keyed by the first sequence number of the chunk.
    chunks: BTreeMap<u64, Chunk>,
    // Providers that sent transactions which do not match the pool's roots.
    excluded: HashSet<VerifyingKey>,
    received: BTreeMap<u64, Transaction>,
    // While a mismatch is being traced, the roots peers reported for the end of every chunk but the
    // last.
    checkpoints: Option<BTreeMap<u64, HashMap<VerifyingKey, CryptoHash>>>,
    progressed: bool,
}

impl LedgerCatchup {
    fn new() -> LedgerCatchup {
        LedgerCatchup {
            state: LedgerSyncState::NotSynced,
            confirmations: HashSet::new(),
            confirmed_last_3pc: None,
            proofs: HashMap::new(),
            target: None,
            providers: Vec::new(),
            chunks: BTreeMap::new(),
            excluded: HashSet::new(),
            received: BTreeMap::new(),
            checkpoints: None,
            progressed: false,
        }
    }

    fn trusted_providers(&self, me: VerifyingKey) -> Vec<VerifyingKey> {
        self.providers
            .iter()
            .copied()
            .filter(|peer| *peer != me && !self.excluded.contains(peer))
            .collect()
    }

    fn provider_of(&self, seq_no: u64) -> Option<VerifyingKey> {
        self.chunks
            .range(..=seq_no)
            .next_back()
            .filter(|(_, chunk)| seq_no <= chunk.end)
            .map(|(_, chunk)| chunk.provider)
    }

    fn reset(&mut self) {
        *self = LedgerCatchup {
            state: LedgerSyncState::Syncing,
            ..LedgerCatchup::new()
        };
    }
}

pub struct CatchupCoordinator<N: Network> {
    me: VerifyingKey,
    sender: SenderHandle<N>,
    quorums: Quorums,
    catchup_batch_size: u64,
    ledgers: HashMap<LedgerId, LedgerCatchup>,
}

impl<N: Network> CatchupCoordinator<N> {
    pub fn new(me: VerifyingKey, network: N, quorums: Quorums, catchup_batch_size: u64) -> Self {
        Self {
            me,
            sender: SenderHandle::new(network),
            quorums,
            catchup_batch_size: catchup_batch_size.max(1),
            ledgers: LedgerId::all()
                .into_iter()
                .map(|ledger_id| (ledger_id, LedgerCatchup::new()))
                .collect(),
        }
    }

    pub fn set_quorums(&mut self, quorums: Quorums) {
        self.quorums = quorums;
    }

    pub fn state(&self, ledger_id: LedgerId) -> LedgerSyncState {
        self.ledger(ledger_id).state
    }

    pub fn is_syncing(&self, ledger_id: LedgerId) -> bool {
        self.state(ledger_id) == LedgerSyncState::Syncing
    }

    /// The three-phase key the pool reported with the transactions `ledger_id` is catching up to.
    pub fn target_last_3pc(&self, ledger_id: LedgerId) -> Option<ThreePhaseKey> {
        self.ledger(ledger_id)
            .target
            .and_then(|target| target.last_3pc)
    }

    /// Start a catch-up round for `ledger_id`. Returns the completion right away if the pool has no
    /// other node to confirm the ledger with.
    pub fn start<K: KVStore>(
        &mut self,
        ledger_id: LedgerId,
        ledgers: &LedgerRegistry<K>,
        last_3pc: Option<ThreePhaseKey>,
    ) -> Option<LedgerCaughtUp> {
        log::info!("Starting catch-up of the {} ledger", ledger_id);
        self.ledger_mut(ledger_id).reset();
        if self.quorums.ledger_status() == 0 {
            return Some(self.mark_caught_up(ledger_id, 0));
        }
        self.sender.broadcast(ReqLedgerStatus { ledger_id });
        self.sender.broadcast(ledger_status(ledgers, ledger_id, last_3pc));
        None
    }

    pub fn send_ledger_status<K: KVStore>(
        &mut self,
        peer: VerifyingKey,
        ledger_id: LedgerId,
        ledgers: &LedgerRegistry<K>,
        last_3pc: Option<ThreePhaseKey>,
    ) {
        self.sender.send(peer, ledger_status(ledgers, ledger_id, last_3pc))
    }

    pub fn process_req_ledger_status<K: KVStore>(
        &mut self,
        msg: &ReqLedgerStatus,
        from: VerifyingKey,
        ledgers: &LedgerRegistry<K>,
        last_3pc: Option<ThreePhaseKey>,
    ) {
        self.send_ledger_status(from, msg.ledger_id, ledgers, last_3pc)
    }

    /// Handle a peer's ledger status: prove our ledger to it if it is behind, and count it towards
    /// completing our own round if it is not ahead of us.
    pub fn process_ledger_status<K: KVStore>(
        &mut self,
        status: &LedgerStatus,
        from: VerifyingKey,
        ledgers: &LedgerRegistry<K>,
        last_3pc: Option<ThreePhaseKey>,
    ) -> Result<Option<LedgerCaughtUp>, LedgerError> {
        self.prove_to_lagging(status, from, ledgers, last_3pc)?;

        let ledger_id = status.ledger_id;
        let ours = ledgers.get(ledger_id);
        let quorum = self.quorums.ledger_status();
        let catchup = self.ledger_mut(ledger_id);
        if catchup.state != LedgerSyncState::Syncing || catchup.target.is_some() {
            return Ok(None);
        }
        let same = status.size == ours.size() && status.root_hash == ours.root_hash();
        if same || status.size < ours.size() {
            catchup.confirmations.insert(from);
            if same {
                catchup.confirmed_last_3pc = catchup.confirmed_last_3pc.max(status.last_3pc);
            }
        }
        if catchup.confirmations.len() >= quorum {
            log::info!("The {} ledger is confirmed up to date by {} peers", ledger_id, quorum);
            return Ok(Some(self.mark_caught_up(ledger_id, 0)));
        }
        Ok(None)
    }

    /// Send a consistency proof to a peer whose ledger is smaller than ours.
    pub fn prove_to_lagging<K: KVStore>(
        &mut self,
        status: &LedgerStatus,
        from: VerifyingKey,
        ledgers: &LedgerRegistry<K>,
        last_3pc: Option<ThreePhaseKey>,
    ) -> Result<(), LedgerError> {
        let ledger_id = status.ledger_id;
        let ours = ledgers.get(ledger_id);
        if status.size < ours.size() {
            if let Some(old_root_hash) = ours.ledger.root_hash_at(status.size)? {
                log::debug!(
                    "Peer is behind on the {} ledger ({} < {}), sending consistency proof",
                    ledger_id,
                    status.size,
                    ours.size()
                );
                self.sender.send(
                    from,
                    ConsistencyProof {
                        ledger_id,
                        seq_no_start: status.size,
                        seq_no_end: ours.size(),
                        last_3pc,
                        old_root_hash,
                        new_root_hash: ours.root_hash(),
                    },
                );
            }
        }
        Ok(())
    }

    /// Record a peer's consistency proof, fixing the catch-up target once `f + 1` proofs agree. Once
    /// the target is fixed, proofs instead report the roots at the ends of chunks whose transactions
    /// are being checked.
    pub fn process_consistency_proof<K: KVStore>(
        &mut self,
        proof: &ConsistencyProof,
        from: VerifyingKey,
        ledgers: &LedgerRegistry<K>,
    ) {
        let ledger_id = proof.ledger_id;
        let ours = ledgers.get(ledger_id);
        let quorum = self.quorums.consistency_proof();
        let catchup = self.ledger_mut(ledger_id);
        if catchup.state != LedgerSyncState::Syncing {
            return;
        }
        if catchup.target.is_some() {
            self.process_checkpoint(proof, from, ledgers);
            return;
        }
        if proof.seq_no_start != ours.size() || proof.seq_no_end <= ours.size() {
            log::debug!("Ignoring stale consistency proof for the {} ledger", ledger_id);
            return;
        }
        if proof.old_root_hash != ours.root_hash() {
            log::warn!(
                "Consistency proof for the {} ledger does not start at our root, ignoring it",
                ledger_id
            );
            return;
        }
        catchup.proofs.insert(from, *proof);
        catchup.progressed = true;

        let mut groups: HashMap<(u64, CryptoHash), Vec<VerifyingKey>> = HashMap::new();
        for (peer, proof) in &catchup.proofs {
            groups
                .entry((proof.seq_no_end, proof.new_root_hash))
                .or_default()
                .push(*peer);
        }
        let agreed = groups
            .into_iter()
            .filter(|(_, peers)| peers.len() >= quorum)
            .max_by_key(|((size, _), _)| *size);
        if let Some(((size, root_hash), providers)) = agreed {
            let last_3pc = providers
                .iter()
                .filter_map(|peer| catchup.proofs.get(peer).and_then(|proof| proof.last_3pc))
                .max();
            log::info!(
                "Catching up the {} ledger from {} to {}",
                ledger_id,
                ours.size(),
                size
            );
            catchup.target = Some(CatchupTarget {
                size,
                root_hash,
                last_3pc,
            });
            catchup.providers = providers;
            self.request_missing(ledger_id, ours.size());
        }
    }

    /// Buffer the transactions of a catch-up reply from `from`. Once every transaction up to the
    /// target is present and produces the target root, returns them in order for the node to append.
    pub fn process_catchup_rep<K: KVStore>(
        &mut self,
        rep: &CatchupRep,
        from: VerifyingKey,
        ledgers: &LedgerRegistry<K>,
    ) -> Vec<Transaction> {
        let ledger_id = rep.ledger_id;
        let size = ledgers.get(ledger_id).size();
        let catchup = self.ledger_mut(ledger_id);
        let target = match (catchup.state, catchup.target) {
            (LedgerSyncState::Syncing, Some(target)) => target,
            _ => return Vec::new(),
        };

        for txn in &rep.txns {
            let seq_no = txn.seq_no.int();
            if seq_no <= size || seq_no > target.size || txn.ledger_id() != ledger_id {
                continue;
            }
            if catchup.provider_of(seq_no) != Some(from) {
                log::debug!(
                    "Ignoring transaction {} of the {} ledger from a peer it was not requested from",
                    seq_no,
                    ledger_id
                );
                continue;
            }
            if let Entry::Vacant(entry) = catchup.received.entry(seq_no) {
                entry.insert(txn.clone());
                catchup.progressed = true;
            }
        }
        self.verify_received(ledger_id, ledgers)
    }

    // Returns the received transactions if they are complete and produce the target root. If they are
    // complete but produce another root, starts tracing which chunks are wrong.
    fn verify_received<K: KVStore>(
        &mut self,
        ledger_id: LedgerId,
        ledgers: &LedgerRegistry<K>,
    ) -> Vec<Transaction> {
        let ours = ledgers.get(ledger_id);
        let (size, root_hash) = (ours.size(), ours.root_hash());
        let catchup = self.ledger_mut(ledger_id);
        let target = match catchup.target {
            Some(target) => target,
            None => return Vec::new(),
        };
        if catchup.checkpoints.is_some()
            || (size + 1..=target.size).any(|seq_no| !catchup.received.contains_key(&seq_no))
        {
            return Vec::new();
        }

        let txns: Vec<Transaction> = catchup.received.values().cloned().collect();
        if Ledger::<K>::candidate_root(root_hash, &txns) == target.root_hash {
            catchup.received.clear();
            return txns;
        }
        log::error!(
            "Transactions received for the {} ledger do not produce the agreed root, checking them chunk by chunk",
            ledger_id
        );
        let ends: Vec<u64> = catchup
            .chunks
            .values()
            .map(|chunk| chunk.end)
            .filter(|end| *end < target.size)
            .collect();
        catchup.checkpoints = Some(ends.iter().map(|end| (*end, HashMap::new())).collect());
        for end in ends {
            self.sender.broadcast(ConsProofRequest {
                ledger_id,
                seq_no_start: size,
                seq_no_end: end,
            });
        }
        self.check_chunks(ledger_id, ledgers);
        Vec::new()
    }

    fn process_checkpoint<K: KVStore>(
        &mut self,
        proof: &ConsistencyProof,
        from: VerifyingKey,
        ledgers: &LedgerRegistry<K>,
    ) {
        let ledger_id = proof.ledger_id;
        let ours = ledgers.get(ledger_id);
        if proof.seq_no_start != ours.size() || proof.old_root_hash != ours.root_hash() {
            return;
        }
        let catchup = self.ledger_mut(ledger_id);
        let votes = match catchup
            .checkpoints
            .as_mut()
            .and_then(|checkpoints| checkpoints.get_mut(&proof.seq_no_end))
        {
            Some(votes) => votes,
            None => return,
        };
        votes.insert(from, proof.new_root_hash);
        catchup.progressed = true;
        self.check_chunks(ledger_id, ledgers);
    }

    // Once the pool agrees on the root at the end of every chunk, drop the chunks that do not lead from
    // the root before them to the root after them, and request them from other providers.
    fn check_chunks<K: KVStore>(&mut self, ledger_id: LedgerId, ledgers: &LedgerRegistry<K>) {
        let ours = ledgers.get(ledger_id);
        let (size, root_hash) = (ours.size(), ours.root_hash());
        let quorum = self.quorums.consistency_proof();
        let catchup = self.ledger_mut(ledger_id);
        let (target, checkpoints) = match (catchup.target, &catchup.checkpoints) {
            (Some(target), Some(checkpoints)) => (target, checkpoints),
            _ => return,
        };

        let mut agreed = BTreeMap::new();
        for (end, votes) in checkpoints {
            match agreed_root(votes, quorum) {
                Some(root) => agreed.insert(*end, root),
                None => return,
            };
        }
        agreed.insert(target.size, target.root_hash);

        let mut root = root_hash;
        let mut faulty = Vec::new();
        for (start, chunk) in &catchup.chunks {
            let expected = match agreed.get(&chunk.end) {
                Some(expected) => *expected,
                None => continue,
            };
            let txns: Vec<Transaction> = catchup
                .received
                .range(*start..=chunk.end)
                .map(|(_, txn)| txn.clone())
                .collect();
            if Ledger::<K>::candidate_root(root, &txns) != expected {
                faulty.push((*start, *chunk));
            }
            root = expected;
        }

        catchup.checkpoints = None;
        for (start, chunk) in faulty {
            log::warn!(
                "Transactions {}..={} of the {} ledger do not match the pool's roots, requesting them from another peer",
                start,
                chunk.end,
                ledger_id
            );
            catchup.excluded.insert(chunk.provider);
            catchup
                .received
                .retain(|seq_no, _| *seq_no < start || *seq_no > chunk.end);
        }
        self.request_missing(ledger_id, size);
    }

    /// Mark `ledger_id` as caught up after `txns_applied` transactions were appended.
    pub fn mark_caught_up(&mut self, ledger_id: LedgerId, txns_applied: u64) -> LedgerCaughtUp {
        let catchup = self.ledger_mut(ledger_id);
        catchup.state = LedgerSyncState::Synced;
        let last_3pc = match catchup.target {
            Some(target) => target.last_3pc,
            None => catchup.confirmed_last_3pc,
        };
        LedgerCaughtUp {
            ledger_id,
            txns_applied,
            last_3pc,
        }
    }

    /// Forget that a ledger was caught up, e.g., before another round of catch-up.
    pub fn mark_not_synced(&mut self, ledger_id: LedgerId) {
        self.ledger_mut(ledger_id).state = LedgerSyncState::NotSynced;
    }

    /// Called when the catch-up timeout of `ledger_id` fires. Returns true if the ledger is still
    /// syncing, in which case the timeout must be scheduled again.
    pub fn on_timeout<K: KVStore>(
        &mut self,
        ledger_id: LedgerId,
        ledgers: &LedgerRegistry<K>,
        last_3pc: Option<ThreePhaseKey>,
    ) -> bool {
        let me = self.me;
        let catchup = self.ledger_mut(ledger_id);
        if catchup.state != LedgerSyncState::Syncing {
            return false;
        }
        if std::mem::replace(&mut catchup.progressed, false) {
            return true;
        }

        log::warn!("Catch-up of the {} ledger made no progress, retrying", ledger_id);
        if catchup.target.is_some() && catchup.trusted_providers(me).is_empty() {
            log::warn!(
                "Every provider of the {} ledger sent transactions that do not match, starting over",
                ledger_id
            );
            catchup.reset();
        }
        match (catchup.target, &catchup.checkpoints) {
            (Some(_), Some(checkpoints)) => {
                let size = ledgers.get(ledger_id).size();
                let ends: Vec<u64> = checkpoints.keys().copied().collect();
                for end in ends {
                    self.sender.broadcast(ConsProofRequest {
                        ledger_id,
                        seq_no_start: size,
                        seq_no_end: end,
                    });
                }
            }
            (Some(_), None) => self.request_missing(ledger_id, ledgers.get(ledger_id).size()),
            (None, _) => {
                self.sender.broadcast(ReqLedgerStatus { ledger_id });
                self.sender.broadcast(ledger_status(ledgers, ledger_id, last_3pc));
            }
        }
        true
    }

    /// Answer a request for a consistency proof between two sizes of our ledger.
    pub fn process_cons_proof_request<K: KVStore>(
        &mut self,
        req: &ConsProofRequest,
        from: VerifyingKey,
        ledgers: &LedgerRegistry<K>,
        last_3pc: Option<ThreePhaseKey>,
    ) -> Result<(), LedgerError> {
        let ledger = &ledgers.get(req.ledger_id).ledger;
        let old_root_hash = ledger.root_hash_at(req.seq_no_start)?;
        let new_root_hash = ledger.root_hash_at(req.seq_no_end)?;
        match (old_root_hash, new_root_hash) {
            (Some(old_root_hash), Some(new_root_hash)) if req.seq_no_start < req.seq_no_end => {
                self.sender.send(
                    from,
                    ConsistencyProof {
                        ledger_id: req.ledger_id,
                        seq_no_start: req.seq_no_start,
                        seq_no_end: req.seq_no_end,
                        last_3pc,
                        old_root_hash,
                        new_root_hash,
                    },
                );
            }
            _ => log::debug!(
                "Cannot prove the {} ledger from {} to {}",
                req.ledger_id,
                req.seq_no_start,
                req.seq_no_end
            ),
        }
        Ok(())
    }

    /// Answer a request for committed transactions.
    pub fn process_catchup_req<K: KVStore>(
        &mut self,
        req: &CatchupReq,
        from: VerifyingKey,
        ledgers: &LedgerRegistry<K>,
    ) -> Result<(), LedgerError> {
        let ledger = &ledgers.get(req.ledger_id).ledger;
        let end = req
            .seq_no_end
            .min(req.catchup_till)
            .min(req.seq_no_start.saturating_add(self.catchup_batch_size - 1));
        if req.seq_no_start == 0 || req.seq_no_start > end || end > ledger.size() {
            log::debug!(
                "Cannot serve transactions {}..={} of the {} ledger",
                req.seq_no_start,
                req.seq_no_end,
                req.ledger_id
            );
            return Ok(());
        }
        let txns = ledger.get_range(SeqNo::new(req.seq_no_start), SeqNo::new(end))?;
        self.sender.send(
            from,
            CatchupRep {
                ledger_id: req.ledger_id,
                txns,
            },
        );
        Ok(())
    }

    // Request every chunk between our size and the target that is not complete, each from one provider
    // picked at random. Transactions already received for an incomplete chunk are dropped, so that a
    // chunk is only ever filled by the provider it is requested from.
    fn request_missing(&mut self, ledger_id: LedgerId, size: u64) {
        let batch_size = self.catchup_batch_size;
        let me = self.me;
        let catchup = self.ledger_mut(ledger_id);
        let target = match catchup.target {
            Some(target) => target,
            None => return,
        };
        let mut providers = catchup.trusted_providers(me);
        if providers.is_empty() {
            log::warn!("No trusted peer left to catch up the {} ledger from", ledger_id);
            return;
        }
        providers.shuffle(&mut rand::thread_rng());

        let mut requests = Vec::new();
        let mut start = size + 1;
        while start <= target.size {
            let end = (start + batch_size - 1).min(target.size);
            if (start..=end).any(|seq_no| !catchup.received.contains_key(&seq_no)) {
                catchup
                    .received
                    .retain(|seq_no, _| *seq_no < start || *seq_no > end);
                let provider = providers[requests.len() % providers.len()];
                catchup.chunks.insert(start, Chunk { end, provider });
                requests.push((
                    provider,
                    CatchupReq {
                        ledger_id,
                        seq_no_start: start,
                        seq_no_end: end,
                        catchup_till: target.size,
                    },
                ));
            }
            start = end + 1;
        }
        for (provider, request) in requests {
            self.sender.send(provider, request);
        }
    }

    fn ledger(&self, ledger_id: LedgerId) -> &LedgerCatchup {
        // Every ledger id is inserted in `new`.
        &self.ledgers[&ledger_id]
    }

    fn ledger_mut(&mut self, ledger_id: LedgerId) -> &mut LedgerCatchup {
        self.ledgers
            .entry(ledger_id)
            .or_insert_with(LedgerCatchup::new)
    }
}

fn ledger_status<K: KVStore>(
    ledgers: &LedgerRegistry<K>,
    ledger_id: LedgerId,
    last_3pc: Option<ThreePhaseKey>,
) -> LedgerStatus {
    let ledger = ledgers.get(ledger_id);
    LedgerStatus {
        ledger_id,
        size: ledger.size(),
        last_3pc,
        root_hash: ledger.root_hash(),
    }
}

// The root that at least `quorum` peers reported.
fn agreed_root(votes: &HashMap<VerifyingKey, CryptoHash>, quorum: usize) -> Option<CryptoHash> {
    let mut counts: HashMap<CryptoHash, usize> = HashMap::new();
    for root in votes.values() {
        *counts.entry(*root).or_default() += 1;
    }
    counts
        .into_iter()
        .find(|(_, count)| *count >= quorum)
        .map(|(root, _)| root)
}
