/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Methods to build, run, and initialize the storage of a node.
//!
//! The key components of this module are:
//! - The builder-pattern interface to construct a [description of the node](NodeSpec) with:
//!   1. `NodeSpec::builder` to construct a `NodeSpecBuilder`,
//!   2. The setters of the `NodeSpecBuilder`, and
//!   3. The `NodeSpecBuilder::build` method to construct a [NodeSpec],
//! - The function to [start](NodeSpec::start) a node from its description,
//! - The function to [initialize](RunningNode::initialize) the node's ledgers,
//! - [The type](RunningNode) which keeps the node alive.
//!
//! ## Starting a node
//!
//! ```ignore
//! let node =
//!     NodeSpec::builder()
//!     .configuration(configuration)
//!     .kv_store(kv_store)
//!     .network(network)
//!     .replica_factory(Box::new(|inst_id| MyReplica::new(inst_id)))
//!     .on_execute_batch(execute_handler)
//!     .build()
//!     .start()?;
//! ```
//!
//! ### Required setters
//! - `.configuration(...)`
//! - `.kv_store(...)`
//! - `.network(...)`
//! - `.replica_factory(...)`
//!
//! ### Optional setters
//! - `.plugins(...)`
//! - `.on_change_mode(...)`
//! - `.on_change_status(...)`
//! - `.on_start_catchup(...)`
//! - `.on_end_catchup(...)`
//! - `.on_execute_batch(...)`
//! - `.on_send_reply(...)`
//! - `.on_send_instance_change(...)`
//! - `.on_receive_instance_change(...)`
//! - `.on_start_view_change(...)`
//! - `.on_complete_view_change(...)`
//! - `.on_select_primary(...)`
//! - `.on_adjust_replicas(...)`
//! - `.on_suspicion(...)`
//! - `.on_blacklist_client(...)`

use std::sync::mpsc::{self, Receiver, Sender, TryRecvError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use typed_builder::TypedBuilder;

use crate::{
    config::Configuration,
    errors::FatalError,
    event_bus::*,
    events::*,
    execution::Appliers,
    ledger::{
        pluggables::{KVStore, WriteBatch},
        registry::LedgerRegistry,
        LedgerError,
    },
    networking::network::Network,
    node::Node,
    plugins::NodePluginRegistry,
    replicas::{replica::Replica, replica_set::ReplicaFactory},
    types::{
        data_types::{LedgerId, SeqNo},
        request::{Operation, Transaction},
    },
};

/// Stores all necessary parameters and trait implementations required to run a [Node].
#[derive(TypedBuilder)]
#[builder(builder_method(doc = "
    Create a builder for building a [NodeSpec]. On the builder call the following methods to construct a valid [NodeSpec].

    Required:
    - `.configuration(...)`
    - `.kv_store(...)`
    - `.network(...)`
    - `.replica_factory(...)`

    Optional:
    - `.plugins(...)`
    - `.on_change_mode(...)`
    - `.on_change_status(...)`
    - `.on_start_catchup(...)`
    - `.on_end_catchup(...)`
    - `.on_execute_batch(...)`
    - `.on_send_reply(...)`
    - `.on_send_instance_change(...)`
    - `.on_receive_instance_change(...)`
    - `.on_start_view_change(...)`
    - `.on_complete_view_change(...)`
    - `.on_select_primary(...)`
    - `.on_adjust_replicas(...)`
    - `.on_suspicion(...)`
    - `.on_blacklist_client(...)`
"))]
pub struct NodeSpec<K: KVStore, N: Network + 'static, R: Replica + 'static> {
    // Required parameters
    #[builder(setter(doc = "Set the [configuration](Configuration), which contains the necessary parameters to run a node. Required."))]
    configuration: Configuration,
    #[builder(setter(doc = "Set the implementation of the node's Key-Value store. The argument must implement the [KVStore](crate::ledger::pluggables::KVStore) trait. Required."))]
    kv_store: K,
    #[builder(setter(doc = "Set the implementation of networking. The argument must implement the [Network](crate::networking::network::Network) trait. Required."))]
    network: N,
    #[builder(setter(doc = "Set the closure that creates the replica of a protocol instance. Required."))]
    replica_factory: ReplicaFactory<R>,
    // Optional parameters
    #[builder(default = NodePluginRegistry::new(), setter(doc = "Set the verifiers that client requests must pass. Optional."))]
    plugins: NodePluginRegistry,
    #[builder(default, setter(transform = |handler: impl Fn(&ChangeModeEvent) + Send + 'static| Some(Box::new(handler) as HandlerPtr<ChangeModeEvent>),
    doc = "Register a handler closure to be invoked after the node changes mode. Optional."))]
    on_change_mode: Option<HandlerPtr<ChangeModeEvent>>,
    #[builder(default, setter(transform = |handler: impl Fn(&ChangeStatusEvent) + Send + 'static| Some(Box::new(handler) as HandlerPtr<ChangeStatusEvent>),
    doc = "Register a handler closure to be invoked after the node's connection status changes. Optional."))]
    on_change_status: Option<HandlerPtr<ChangeStatusEvent>>,
    #[builder(default, setter(transform = |handler: impl Fn(&StartCatchupEvent) + Send + 'static| Some(Box::new(handler) as HandlerPtr<StartCatchupEvent>),
    doc = "Register a handler closure to be invoked after the node starts catching up a ledger. Optional."))]
    on_start_catchup: Option<HandlerPtr<StartCatchupEvent>>,
    #[builder(default, setter(transform = |handler: impl Fn(&EndCatchupEvent) + Send + 'static| Some(Box::new(handler) as HandlerPtr<EndCatchupEvent>),
    doc = "Register a handler closure to be invoked after a ledger is caught up. Optional."))]
    on_end_catchup: Option<HandlerPtr<EndCatchupEvent>>,
    #[builder(default, setter(transform = |handler: impl Fn(&ExecuteBatchEvent) + Send + 'static| Some(Box::new(handler) as HandlerPtr<ExecuteBatchEvent>),
    doc = "Register a handler closure to be invoked after a batch ordered by the master instance is executed. Optional."))]
    on_execute_batch: Option<HandlerPtr<ExecuteBatchEvent>>,
    #[builder(default, setter(transform = |handler: impl Fn(&SendReplyEvent) + Send + 'static| Some(Box::new(handler) as HandlerPtr<SendReplyEvent>),
    doc = "Register a handler closure to be invoked after a reply is sent to a client. Optional."))]
    on_send_reply: Option<HandlerPtr<SendReplyEvent>>,
    #[builder(default, setter(transform = |handler: impl Fn(&SendInstanceChangeEvent) + Send + 'static| Some(Box::new(handler) as HandlerPtr<SendInstanceChangeEvent>),
    doc = "Register a handler closure to be invoked after the node votes for an instance change. Optional."))]
    on_send_instance_change: Option<HandlerPtr<SendInstanceChangeEvent>>,
    #[builder(default, setter(transform = |handler: impl Fn(&ReceiveInstanceChangeEvent) + Send + 'static| Some(Box::new(handler) as HandlerPtr<ReceiveInstanceChangeEvent>),
    doc = "Register a handler closure to be invoked after the node receives an instance change vote. Optional."))]
    on_receive_instance_change: Option<HandlerPtr<ReceiveInstanceChangeEvent>>,
    #[builder(default, setter(transform = |handler: impl Fn(&StartViewChangeEvent) + Send + 'static| Some(Box::new(handler) as HandlerPtr<StartViewChangeEvent>),
    doc = "Register a handler closure to be invoked after the node starts a view change. Optional."))]
    on_start_view_change: Option<HandlerPtr<StartViewChangeEvent>>,
    #[builder(default, setter(transform = |handler: impl Fn(&CompleteViewChangeEvent) + Send + 'static| Some(Box::new(handler) as HandlerPtr<CompleteViewChangeEvent>),
    doc = "Register a handler closure to be invoked after a view change completes. Optional."))]
    on_complete_view_change: Option<HandlerPtr<CompleteViewChangeEvent>>,
    #[builder(default, setter(transform = |handler: impl Fn(&SelectPrimaryEvent) + Send + 'static| Some(Box::new(handler) as HandlerPtr<SelectPrimaryEvent>),
    doc = "Register a handler closure to be invoked after the primary of an instance is set. Optional."))]
    on_select_primary: Option<HandlerPtr<SelectPrimaryEvent>>,
    #[builder(default, setter(transform = |handler: impl Fn(&AdjustReplicasEvent) + Send + 'static| Some(Box::new(handler) as HandlerPtr<AdjustReplicasEvent>),
    doc = "Register a handler closure to be invoked after instances are added or removed. Optional."))]
    on_adjust_replicas: Option<HandlerPtr<AdjustReplicasEvent>>,
    #[builder(default, setter(transform = |handler: impl Fn(&SuspicionEvent) + Send + 'static| Some(Box::new(handler) as HandlerPtr<SuspicionEvent>),
    doc = "Register a handler closure to be invoked after the node suspects a peer. Optional."))]
    on_suspicion: Option<HandlerPtr<SuspicionEvent>>,
    #[builder(default, setter(transform = |handler: impl Fn(&BlacklistClientEvent) + Send + 'static| Some(Box::new(handler) as HandlerPtr<BlacklistClientEvent>),
    doc = "Register a handler closure to be invoked after a client is blacklisted. Optional."))]
    on_blacklist_client: Option<HandlerPtr<BlacklistClientEvent>>,
}

impl<K: KVStore, N: Network + 'static, R: Replica + 'static> NodeSpec<K, N, R> {
    /// Builds the [Node], starts it and the event bus on threads of their own, and returns the handles
    /// to them in a [RunningNode].
    pub fn start(self) -> Result<RunningNode<K>, FatalError> {
        let event_handlers = EventHandlers::new(
            self.configuration.log_events,
            self.on_change_mode,
            self.on_change_status,
            self.on_start_catchup,
            self.on_end_catchup,
            self.on_execute_batch,
            self.on_send_reply,
            self.on_send_instance_change,
            self.on_receive_instance_change,
            self.on_start_view_change,
            self.on_complete_view_change,
            self.on_select_primary,
            self.on_adjust_replicas,
            self.on_suspicion,
            self.on_blacklist_client,
        );

        let (event_publisher, event_subscriber) = if !event_handlers.is_empty() {
            Some(mpsc::channel()).unzip()
        } else {
            (None, None)
        };

        let node = Node::new(
            self.configuration,
            self.kv_store.clone(),
            self.network,
            self.replica_factory,
            self.plugins,
            event_publisher,
        )?;

        let (node_shutdown, node_shutdown_receiver) = mpsc::channel();
        let node_thread = start_node(node, node_shutdown_receiver);

        let (event_bus_shutdown, event_bus) = match event_subscriber {
            Some(event_subscriber) => {
                let (shutdown, shutdown_receiver) = mpsc::channel();
                (
                    Some(shutdown),
                    Some(start_event_bus(event_handlers, event_subscriber, shutdown_receiver)),
                )
            }
            None => (None, None),
        };

        Ok(RunningNode {
            kv_store: self.kv_store,
            node: Some(node_thread),
            node_shutdown,
            event_bus,
            event_bus_shutdown,
        })
    }
}

fn start_node<K: KVStore, N: Network + 'static, R: Replica + 'static>(
    mut node: Node<K, N, R>,
    shutdown_signal: Receiver<()>,
) -> JoinHandle<()> {
    thread::spawn(move || {
        node.start(Instant::now());
        loop {
            match shutdown_signal.try_recv() {
                Ok(()) => return,
                Err(TryRecvError::Empty) => (),
                Err(TryRecvError::Disconnected) => panic!("Node thread disconnected from main thread"),
            }

            node.tick(Instant::now());
            thread::sleep(Duration::from_millis(1));
        }
    })
}

/// A handle to the background threads of a node. When this value is dropped, all background threads
/// are gracefully shut down.
pub struct RunningNode<K: KVStore> {
    kv_store: K,
    node: Option<JoinHandle<()>>,
    node_shutdown: Sender<()>,
    event_bus: Option<JoinHandle<()>>,
    event_bus_shutdown: Option<Sender<()>>,
}

impl<K: KVStore> RunningNode<K> {
    /// Writes the genesis transactions into the ledgers in `kv_store`, unless they already hold
    /// transactions.
    ///
    /// Genesis transactions are not validated: they are the trust anchor that later transactions are
    /// validated against.
    pub fn initialize(kv_store: K, genesis: Vec<Operation>) -> Result<(), LedgerError> {
        let mut kv_store = kv_store;
        let mut ledgers = LedgerRegistry::open(kv_store.clone())?;
        if LedgerId::all()
            .iter()
            .any(|ledger_id| ledgers.get(*ledger_id).size() > 0)
        {
            return Ok(());
        }

        // Every genesis transaction and the state it produces are persisted in one write.
        let mut wb = K::WriteBatch::new();
        let appliers = Appliers::default();
        for operation in genesis {
            let ledger_id = operation.ledger_id();
            let mut txn = Transaction::genesis(operation);
            txn.seq_no = SeqNo::new(ledgers.get(ledger_id).size() + 1);
            ledgers
                .get_mut(ledger_id)
                .ledger
                .stage_append(&mut wb, txn.clone())?;
            appliers.get::<K>(ledger_id).update_state(&mut ledgers, &txn);
        }
        for ledger_id in LedgerId::all() {
            ledgers.get_mut(ledger_id).state.stage_commit(&mut wb, None)?;
        }
        kv_store.write(wb);

        Ok(())
    }

    /// The store that the node's ledgers and indexes are persisted in.
    pub fn kv_store(&self) -> &K {
        &self.kv_store
    }
}

impl<K: KVStore> Drop for RunningNode<K> {
    fn drop(&mut self) {
        // The event bus keeps waiting after the node thread exits, so it can be shut down first.
        self.event_bus_shutdown
            .iter()
            .for_each(|shutdown| shutdown.send(()).unwrap());
        if let Some(event_bus) = self.event_bus.take() {
            event_bus.join().unwrap();
        }

        self.node_shutdown.send(()).unwrap();
        self.node.take().unwrap().join().unwrap();
    }
}
