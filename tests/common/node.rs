use std::{
    sync::mpsc::{self, Receiver},
    time::Instant,
};

use ed25519_dalek::{SigningKey, VerifyingKey};
use rand_core::OsRng;
use rbft_node::{
    config::Configuration,
    events::Event,
    networking::messages::LedgerStatus,
    node::Node,
    plugins::NodePluginRegistry,
    runner::RunningNode,
    types::{
        data_types::{Identifier, LedgerId, ThreePhaseKey},
        request::{NodeOperation, NodeService, NymOperation, Operation, Role},
    },
};

use super::{
    mem_db::MemDB,
    network::{mock_network, NetworkStub},
    replica::ScriptedReplica,
};

pub(crate) type TestNode = Node<MemDB, NetworkStub, ScriptedReplica>;

/// A pool of validators. The node under test is always the validator at index 0. The other validators
/// are played by the test through their network stubs.
pub(crate) struct Pool {
    pub(crate) keys: Vec<SigningKey>,
    pub(crate) networks: Vec<NetworkStub>,
    pub(crate) trustee: SigningKey,
}

impl Pool {
    pub(crate) fn new(n: usize) -> Pool {
        let keys: Vec<SigningKey> = (0..n).map(|_| SigningKey::generate(&mut OsRng)).collect();
        let networks = mock_network(keys.iter().map(|key| key.verifying_key()));
        Pool {
            keys,
            networks,
            trustee: SigningKey::generate(&mut OsRng),
        }
    }

    pub(crate) fn verifying_key(&self, index: usize) -> VerifyingKey {
        self.keys[index].verifying_key()
    }

    /// The validators in the order the pool assigns primaries in.
    pub(crate) fn round_robin(&self) -> Vec<VerifyingKey> {
        let mut nodes: Vec<VerifyingKey> = self.keys.iter().map(|key| key.verifying_key()).collect();
        nodes.sort_by_key(|node| node.to_bytes());
        nodes
    }

    /// One pool ledger transaction per validator, and one domain ledger transaction registering the
    /// trustee.
    pub(crate) fn genesis(&self) -> Vec<Operation> {
        let mut genesis: Vec<Operation> = self
            .keys
            .iter()
            .enumerate()
            .map(|(i, key)| {
                Operation::Node(NodeOperation {
                    dest: key.verifying_key().to_bytes(),
                    alias: format!("Node{}", i + 1),
                    services: vec![NodeService::Validator],
                })
            })
            .collect();
        genesis.push(Operation::Nym(NymOperation {
            dest: Identifier::new(self.trustee.verifying_key().to_bytes()),
            verkey: self.trustee.verifying_key().to_bytes(),
            role: Some(Role::Trustee),
        }));
        genesis
    }

    /// Write the genesis transactions into `kv_store` and build the node under test on it, without
    /// starting it.
    pub(crate) fn node_on(&self, kv_store: MemDB) -> (TestNode, Receiver<Event>) {
        RunningNode::initialize(kv_store.clone(), self.genesis()).unwrap();

        let me = self.verifying_key(0);
        let (event_publisher, event_subscriber) = mpsc::channel();
        let node = Node::new(
            Configuration::builder().me(self.keys[0].clone()).build(),
            kv_store,
            self.networks[0].clone(),
            Box::new(move |inst_id| ScriptedReplica::new(inst_id, me)),
            NodePluginRegistry::new(),
            Some(event_publisher),
        )
        .unwrap();

        (node, event_subscriber)
    }

    /// Have the validators at `peers` report a ledger identical to the node's.
    pub(crate) fn confirm_ledger(
        &self,
        node: &mut TestNode,
        ledger_id: LedgerId,
        peers: &[usize],
        last_3pc: Option<ThreePhaseKey>,
        now: Instant,
    ) {
        let info = node.ledgers().get(ledger_id).info();
        for peer in peers {
            node.on_message(
                self.verifying_key(*peer),
                LedgerStatus {
                    ledger_id,
                    size: info.size,
                    last_3pc,
                    root_hash: info.root_hash,
                }
                .into(),
                now,
            );
        }
    }

    /// Start the node and complete its first catch-up round with ledgers that are already up to date.
    pub(crate) fn bring_to_participating(&self, node: &mut TestNode, now: Instant) {
        node.start(now);
        self.confirm_ledger(node, LedgerId::Pool, &[1, 2], None, now);
        self.confirm_ledger(node, LedgerId::Domain, &[1, 2], None, now);
    }

    /// Discard everything the node sent to the other validators so far.
    pub(crate) fn clear_inboxes(&mut self) {
        for network in self.networks.iter_mut().skip(1) {
            network.drain();
        }
    }
}

pub(crate) fn drain_events(events: &Receiver<Event>) -> Vec<Event> {
    events.try_iter().collect()
}
