/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Selection of each instance's primary.
//!
//! The primary of instance `i` in view `v` is `nodes[(v + i) % n]`, where `nodes` are the pool's
//! validators sorted by verifying key. At view 0, and whenever a node (re)joins without a view change
//! in progress, the round robin is applied directly. After a view change, every node broadcasts a
//! [`ViewChangeDone`](crate::networking::messages::ViewChangeDone) naming the new master primary and
//! describing its ledgers, and the new primaries are accepted once `n - f` of them match.
//!
//! Nomination, Primary, and Reelection messages belong to an election protocol that round-robin
//! selection replaced. They are accepted from the network and dropped.

pub mod primary_selector;

pub use primary_selector::{PrimaryDecision, PrimarySelector};
