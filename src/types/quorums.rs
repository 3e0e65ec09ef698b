/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Quorum sizes for a pool of `n` nodes tolerating `f = floor((n - 1) / 3)` faulty nodes.
//!
//! All quorums are recomputed from the total pool membership (as recorded in the pool ledger), never
//! from the number of peers that happen to be connected.

/// The quorum sizes used by a node for a given pool size.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Quorums {
    n: usize,
    f: usize,
}

impl Quorums {
    pub fn new(n: usize) -> Quorums {
        Quorums {
            n,
            f: n.saturating_sub(1) / 3,
        }
    }

    /// Total number of nodes in the pool.
    pub fn n(&self) -> usize {
        self.n
    }

    /// Maximum number of faulty nodes tolerated.
    pub fn f(&self) -> usize {
        self.f
    }

    /// Number of ordering instances (one master plus `f` backups).
    pub fn required_instances(&self) -> usize {
        self.f + 1
    }

    /// Distinct propagations needed to finalise a request.
    pub fn propagate(&self) -> usize {
        self.f + 1
    }

    /// Distinct instance change votes needed to start a view change.
    pub fn view_change(&self) -> usize {
        2 * self.f + 1
    }

    /// Matching `ViewChangeDone` messages needed to accept a new primary.
    pub fn view_change_done(&self) -> usize {
        self.n - self.f
    }

    /// Matching ledger statuses from other nodes that confirm our ledger is up to date.
    pub fn ledger_status(&self) -> usize {
        (self.n - self.f).saturating_sub(1)
    }

    /// Matching consistency proofs that fix the target of a catch-up round.
    pub fn consistency_proof(&self) -> usize {
        self.f + 1
    }

    /// Matching replies a client needs before trusting a result.
    pub fn reply(&self) -> usize {
        self.f + 1
    }

    /// Whether `count` connected nodes (including ourselves) are enough to make progress.
    pub fn is_weak(&self, count: usize) -> bool {
        count >= self.f + 1
    }
}
