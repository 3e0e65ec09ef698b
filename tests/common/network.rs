use std::{
    collections::{HashMap, HashSet},
    sync::{
        mpsc::{self, Receiver, Sender, TryRecvError},
        Arc, Mutex,
    },
};

use ed25519_dalek::VerifyingKey;
use rbft_node::{
    networking::{
        messages::{ClientMessage, Message},
        network::Network,
    },
    types::{data_types::ClientAddress, request::Request},
};

/// A mock network stub which passes messages between peers using channels.
///
/// Only one peer of a mock network is usually driven by a node. Tests play the other peers by hand:
/// they send messages through the other peers' stubs and read what the node sent them from their
/// inboxes.
#[derive(Clone)]
pub(crate) struct NetworkStub {
    my_verifying_key: VerifyingKey,
    all_peers: HashMap<VerifyingKey, Sender<(VerifyingKey, Message)>>,
    inbox: Arc<Mutex<Receiver<(VerifyingKey, Message)>>>,
    connected: Arc<Mutex<HashSet<VerifyingKey>>>,
    client_sender: Sender<(ClientAddress, Request)>,
    client_inbox: Arc<Mutex<Receiver<(ClientAddress, Request)>>>,
    client_outbox: Arc<Mutex<Vec<(ClientAddress, ClientMessage)>>>,
}

impl NetworkStub {
    pub(crate) fn verifying_key(&self) -> VerifyingKey {
        self.my_verifying_key
    }

    /// Submit `request` to this peer as if `client` had sent it.
    pub(crate) fn submit(&self, client: ClientAddress, request: Request) {
        self.client_sender.send((client, request)).unwrap();
    }

    /// Take every message this peer sent to clients so far.
    pub(crate) fn take_client_messages(&self) -> Vec<(ClientAddress, ClientMessage)> {
        std::mem::take(&mut *self.client_outbox.lock().unwrap())
    }

    /// Take every message waiting in this peer's inbox.
    pub(crate) fn drain(&mut self) -> Vec<(VerifyingKey, Message)> {
        let mut messages = Vec::new();
        while let Some(message) = self.recv() {
            messages.push(message);
        }
        messages
    }

    pub(crate) fn disconnect(&self, peer: &VerifyingKey) {
        self.connected.lock().unwrap().remove(peer);
    }

    pub(crate) fn connect(&self, peer: VerifyingKey) {
        self.connected.lock().unwrap().insert(peer);
    }
}

impl Network for NetworkStub {
    fn update_node_set(&mut self, _: Vec<VerifyingKey>) {}

    fn broadcast(&mut self, message: Message) {
        for (peer, sender) in &self.all_peers {
            if *peer != self.my_verifying_key {
                let _ = sender.send((self.my_verifying_key, message.clone()));
            }
        }
    }

    fn send(&mut self, peer: VerifyingKey, message: Message) {
        if let Some(peer) = self.all_peers.get(&peer) {
            let _ = peer.send((self.my_verifying_key, message));
        }
    }

    fn recv(&mut self) -> Option<(VerifyingKey, Message)> {
        match self.inbox.lock().unwrap().try_recv() {
            Ok(o_m) => Some(o_m),
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Disconnected) => panic!(),
        }
    }

    fn connected_peers(&self) -> HashSet<VerifyingKey> {
        self.connected.lock().unwrap().clone()
    }

    fn send_to_client(&mut self, client: ClientAddress, message: ClientMessage) {
        self.client_outbox.lock().unwrap().push((client, message));
    }

    fn recv_from_client(&mut self) -> Option<(ClientAddress, Request)> {
        self.client_inbox.lock().unwrap().try_recv().ok()
    }
}

/// Create one connected stub per peer. Every stub starts out connected to every other peer.
pub(crate) fn mock_network(peers: impl Iterator<Item = VerifyingKey>) -> Vec<NetworkStub> {
    let mut all_peers = HashMap::new();
    let peer_and_inboxes: Vec<(VerifyingKey, Receiver<(VerifyingKey, Message)>)> = peers
        .map(|peer| {
            let (sender, receiver) = mpsc::channel();
            all_peers.insert(peer, sender);

            (peer, receiver)
        })
        .collect();

    peer_and_inboxes
        .into_iter()
        .map(|(my_verifying_key, inbox)| {
            let (client_sender, client_inbox) = mpsc::channel();
            let connected = all_peers
                .keys()
                .filter(|peer| **peer != my_verifying_key)
                .copied()
                .collect();
            NetworkStub {
                my_verifying_key,
                all_peers: all_peers.clone(),
                inbox: Arc::new(Mutex::new(inbox)),
                connected: Arc::new(Mutex::new(connected)),
                client_sender,
                client_inbox: Arc::new(Mutex::new(client_inbox)),
                client_outbox: Arc::new(Mutex::new(Vec::new())),
            }
        })
        .collect()
}
