//! Functions and types for sending messages to peers and clients.

use ed25519_dalek::VerifyingKey;

use crate::types::data_types::ClientAddress;

use super::{
    messages::{ClientMessage, Message},
    network::Network,
};

/// Handle for sending and broadcasting messages to the [`Network`].
///
/// It can be used to send or broadcast instances of any type that implement the [`Into<Message>`]
/// trait.
#[derive(Clone)]
pub(crate) struct SenderHandle<N: Network> {
    network: N,
}

impl<N: Network> SenderHandle<N> {
    pub(crate) fn new(network: N) -> Self {
        Self { network }
    }

    pub(crate) fn send<S: Into<Message>>(&mut self, peer: VerifyingKey, msg: S) {
        self.network.send(peer, msg.into())
    }

    pub(crate) fn broadcast<S: Into<Message>>(&mut self, msg: S) {
        self.network.broadcast(msg.into())
    }

    pub(crate) fn send_to_client(&mut self, client: ClientAddress, msg: ClientMessage) {
        self.network.send_to_client(client, msg)
    }
}
