/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Bringing a node's ledgers up to date with the rest of the pool, and helping peers do the same.
//!
//! Ledgers are caught up one at a time, in the order of [`LedgerId::all`](crate::types::data_types::LedgerId::all).
//! The [`CatchupCoordinator`] only talks to peers and verifies what they send. The node appends the
//! verified transactions and decides when to move on to the next ledger.

pub mod coordinator;

pub use coordinator::{CatchupCoordinator, LedgerCaughtUp, LedgerSyncState};
