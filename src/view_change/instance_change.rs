/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

use std::collections::{BTreeMap, HashMap};

use ed25519_dalek::VerifyingKey;

use crate::types::{data_types::ViewNumber, suspicion::SuspicionCode};

/// A node's vote to move to `view_no`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct InstanceChangeVote {
    pub view_no: ViewNumber,
    pub voter: VerifyingKey,
    pub code: SuspicionCode,
}

/// Instance change votes, per proposed view. A voter counts once per view; its latest code is kept.
#[derive(Default)]
pub struct InstanceChangeVotes {
    votes: BTreeMap<ViewNumber, HashMap<VerifyingKey, SuspicionCode>>,
}

impl InstanceChangeVotes {
    pub fn new() -> InstanceChangeVotes {
        InstanceChangeVotes::default()
    }

    /// Record `vote`. Returns true if the voter had not voted for the view before.
    pub fn add(&mut self, vote: InstanceChangeVote) -> bool {
        self.votes
            .entry(vote.view_no)
            .or_default()
            .insert(vote.voter, vote.code)
            .is_none()
    }

    pub fn count(&self, view_no: ViewNumber) -> usize {
        self.votes.get(&view_no).map_or(0, HashMap::len)
    }

    pub fn has_voted(&self, view_no: ViewNumber, voter: &VerifyingKey) -> bool {
        self.votes
            .get(&view_no)
            .map_or(false, |votes| votes.contains_key(voter))
    }

    pub fn has_quorum(&self, view_no: ViewNumber, quorum: usize) -> bool {
        self.count(view_no) >= quorum
    }

    /// Drop the votes for every view below `view_no`.
    pub fn discard_below(&mut self, view_no: ViewNumber) {
        self.votes = self.votes.split_off(&view_no);
    }

    /// The highest view with any votes.
    pub fn highest_view(&self) -> Option<ViewNumber> {
        self.votes.keys().next_back().copied()
    }
}
