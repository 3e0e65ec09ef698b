/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Actions that the node performs at a later time.
//!
//! The node never blocks waiting for a timeout. Instead it schedules a [`DelayedAction`] and performs it
//! on the first tick at or after its deadline. Actions with the same deadline are performed in the
//! order they were scheduled.

use std::{
    collections::BTreeMap,
    mem,
    time::{Duration, Instant},
};

use crate::types::data_types::{LedgerId, ViewNumber};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DelayedAction {
    /// Propose the next view if the view change to this view has not completed.
    CheckViewChangeCompleted(ViewNumber),
    /// Vote for an instance change if the master primary is still disconnected.
    LostMasterPrimary,
    /// Re-broadcast ledger statuses if catch-up of the ledger has not progressed.
    CatchupTimeout(LedgerId),
    /// Compare the master's throughput with the backups'.
    CheckPerformance,
}

#[derive(Default)]
pub struct DelayedActions {
    queue: BTreeMap<(Instant, u64), DelayedAction>,
    next_id: u64,
}

impl DelayedActions {
    pub fn new() -> DelayedActions {
        DelayedActions::default()
    }

    pub fn schedule(&mut self, at: Instant, action: DelayedAction) {
        self.queue.insert((at, self.next_id), action);
        self.next_id += 1;
    }

    pub fn schedule_after(&mut self, now: Instant, delay: Duration, action: DelayedAction) {
        self.schedule(now + delay, action)
    }

    /// Remove and return every action whose deadline is at or before `now`, in deadline order.
    pub fn due(&mut self, now: Instant) -> Vec<DelayedAction> {
        let later = self.queue.split_off(&(now, u64::MAX));
        mem::replace(&mut self.queue, later).into_values().collect()
    }

    /// Drop every scheduled action that satisfies `predicate`.
    pub fn cancel(&mut self, predicate: impl Fn(&DelayedAction) -> bool) {
        self.queue.retain(|_, action| !predicate(action));
    }

    pub fn is_scheduled(&self, predicate: impl Fn(&DelayedAction) -> bool) -> bool {
        self.queue.values().any(predicate)
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }
}
