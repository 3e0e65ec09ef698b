/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Node-level orchestration for a multi-instance BFT replicated state machine.
//!
//! A node runs one master protocol instance, whose ordered batches are executed, and `f` backup
//! instances that exist to measure the master's performance. This crate drives everything around the
//! instances: routing messages to them, executing what the master orders, changing views when the
//! master misbehaves, and catching ledgers up with the pool.
//!
//! The ordering protocol itself is pluggable through the [`Replica`](replicas::replica::Replica)
//! trait, and so are networking ([`Network`](networking::network::Network)) and persistence
//! ([`KVStore`](ledger::pluggables::KVStore)).

pub mod authenticator;

pub mod catchup;

pub mod config;

pub mod election;

pub mod errors;

pub(crate) mod event_bus;

pub mod events;

pub mod execution;

pub mod keys;

pub mod ledger;

pub(crate) mod logging;

pub mod monitor;

pub mod networking;

pub mod node;

pub mod plugins;

pub mod replicas;

pub mod requests;

pub mod runner;

pub mod scheduler;

pub mod types;

pub mod view_change;
