/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! The pluggable peer-to-peer and client transport.

use std::collections::HashSet;

use ed25519_dalek::VerifyingKey;

use crate::types::{data_types::ClientAddress, request::Request};

use super::messages::{ClientMessage, Message};

pub trait Network: Clone + Send {
    /// Inform the networking provider of the current set of nodes in the pool, so that it can connect
    /// to new nodes and disconnect from removed ones.
    fn update_node_set(&mut self, nodes: Vec<VerifyingKey>);

    /// Send a message to all connected peers without blocking.
    fn broadcast(&mut self, message: Message);

    /// Send a message to the specified peer without blocking.
    fn send(&mut self, peer: VerifyingKey, message: Message);

    /// Receive a message from any peer. Returns immediately with a None if no message is available now.
    fn recv(&mut self) -> Option<(VerifyingKey, Message)>;

    /// The peers that are currently connected.
    fn connected_peers(&self) -> HashSet<VerifyingKey>;

    /// Send a message to a client without blocking.
    fn send_to_client(&mut self, client: ClientAddress, message: ClientMessage);

    /// Receive a request from any client. Returns immediately with a None if no request is available now.
    fn recv_from_client(&mut self) -> Option<(ClientAddress, Request)>;
}
