/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! The node: owner of every component, and the single driver of its lifecycle.
//!
//! A [`Node`] owns its ledgers, its replica instances, its primary selector, its view change
//! controller, its catch-up coordinator, and the indexes over executed batches. None of these
//! components refer back to the node or to each other. Each returns what it decided, and the node
//! carries out the consequences.
//!
//! ## Modes
//!
//! ```text
//! Starting --(pool ledger caught up)--> Discovered --(every ledger caught up)--> Participating
//!     \                                     \                                        |
//!      `------------------------------------ Syncing <-------(catch-up needed)------'
//! ```
//!
//! Every catch-up round puts the node in [`NodeMode::Syncing`]. Ordered batches that arrive while the
//! node is not participating are stashed and executed after the round.
//!
//! ## Driving the node
//!
//! The node does not spawn threads. [`Node::tick`] performs one bounded step: it drains at most a
//! configured number of messages from each inbox, services the replicas and the elector, and runs
//! the delayed actions that are due. [`NodeSpec::start`](crate::runner::NodeSpec::start) calls `tick`
//! in a loop on a thread of its own.

mod catchup;

mod dispatch;

mod execution;

mod view_change;

use std::collections::{HashSet, VecDeque};
use std::sync::mpsc::Sender;
use std::time::{Instant, SystemTime};

use ed25519_dalek::VerifyingKey;

use crate::{
    authenticator::ClientAuthenticator,
    catchup::CatchupCoordinator,
    config::Configuration,
    election::PrimarySelector,
    errors::FatalError,
    events::*,
    execution::{pool, Appliers, TxnEffect},
    ledger::{
        pluggables::KVStore, provenance::ThreePhaseProvenanceIndex, registry::LedgerRegistry,
        seq_no_index::TxnSeqNoIndex, LedgerError,
    },
    monitor::Monitor,
    networking::{network::Network, sending::SenderHandle},
    plugins::NodePluginRegistry,
    replicas::{
        replica::{Ordered, Replica},
        replica_set::{ReplicaFactory, ReplicaSet},
    },
    requests::RequestStore,
    scheduler::{DelayedAction, DelayedActions},
    types::{
        data_types::{
            Identifier, InstanceId, LedgerId, NodeMode, NodeStatus, SeqNo, ThreePhaseKey, ViewNumber,
        },
        quorums::Quorums,
    },
    view_change::{throttler::InstanceChangeThrottler, ViewChangeController},
};

pub struct Node<K: KVStore, N: Network, R: Replica> {
    config: Configuration,
    me: VerifyingKey,
    kv_store: K,
    network: N,
    sender: SenderHandle<N>,
    event_publisher: Option<Sender<Event>>,

    mode: NodeMode,
    status: NodeStatus,
    started: bool,
    connected: HashSet<VerifyingKey>,

    ledgers: LedgerRegistry<K>,
    appliers: Appliers,
    seq_no_index: TxnSeqNoIndex<K>,
    provenance: ThreePhaseProvenanceIndex,
    last_executed: Option<ThreePhaseKey>,
    stashed_ordered: VecDeque<Ordered>,

    authenticator: ClientAuthenticator,
    plugins: NodePluginRegistry,
    requests: RequestStore,
    client_blacklist: HashSet<Identifier>,
    node_blacklist: HashSet<VerifyingKey>,

    replicas: ReplicaSet<R>,
    selector: PrimarySelector,
    view_changer: ViewChangeController,
    monitor: Monitor,
    actions: DelayedActions,

    catchup: CatchupCoordinator<N>,
    catchup_round: u64,
    catchup_txns_this_round: u64,
    catchup_last_3pc: Option<ThreePhaseKey>,
    last_round_txns: Option<u64>,
    rounds_without_progress: u32,
}

impl<K: KVStore, N: Network, R: Replica> Node<K, N, R> {
    /// Open the node's persisted ledgers in `kv_store` and build every component. The node does nothing
    /// until [`start`](Node::start) is called.
    pub fn new(
        config: Configuration,
        kv_store: K,
        network: N,
        replica_factory: ReplicaFactory<R>,
        plugins: NodePluginRegistry,
        event_publisher: Option<Sender<Event>>,
    ) -> Result<Node<K, N, R>, FatalError> {
        let me = config.me.verifying_key();
        let ledgers =
            LedgerRegistry::open(kv_store.clone()).map_err(FatalError::LedgerRecoveryFailed)?;
        let last_executed =
            execution::read_last_executed(&kv_store).map_err(FatalError::LedgerRecoveryFailed)?;

        let view_changer = ViewChangeController::new(
            me,
            ViewNumber::new(0),
            config.instance_change_timeout,
            InstanceChangeThrottler::new(
                config.instance_change_throttle_base,
                config.instance_change_throttle_max,
            ),
        );
        let catchup = CatchupCoordinator::new(
            me,
            network.clone(),
            Quorums::new(0),
            config.catchup_batch_size,
        );
        let monitor = Monitor::new(config.perf_delta, config.perf_min_ordered, 0);

        let mut node = Node {
            me,
            sender: SenderHandle::new(network.clone()),
            kv_store: kv_store.clone(),
            network,
            event_publisher,
            mode: NodeMode::Starting,
            status: NodeStatus::Starting,
            started: false,
            connected: HashSet::new(),
            ledgers,
            appliers: Appliers::default(),
            seq_no_index: TxnSeqNoIndex::new(kv_store),
            provenance: ThreePhaseProvenanceIndex::new(config.processed_batch_maps_to_keep),
            last_executed,
            stashed_ordered: VecDeque::new(),
            authenticator: ClientAuthenticator::new(),
            plugins,
            requests: RequestStore::new(),
            client_blacklist: HashSet::new(),
            node_blacklist: HashSet::new(),
            replicas: ReplicaSet::new(replica_factory, ViewNumber::new(0)),
            selector: PrimarySelector::new(me),
            view_changer,
            monitor,
            actions: DelayedActions::new(),
            catchup,
            catchup_round: 0,
            catchup_txns_this_round: 0,
            catchup_last_3pc: None,
            last_round_txns: None,
            rounds_without_progress: 0,
            config,
        };
        node.load_identities()
            .map_err(FatalError::LedgerRecoveryFailed)?;
        node.refresh_pool_membership();

        Ok(node)
    }

    /// Start the node: catch up the pool ledger first if the node keeps one, otherwise the domain
    /// ledger. Does nothing if the node was already started.
    pub fn start(&mut self, now: Instant) {
        if self.started {
            return;
        }
        self.started = true;
        log::info!("Starting node with {} validators in the pool", self.selector.nodes().len());

        self.actions
            .schedule_after(now, self.config.perf_check_freq, DelayedAction::CheckPerformance);
        if self.config.has_pool_ledger {
            self.set_mode(NodeMode::Starting);
            self.start_catchup(now);
        } else {
            self.set_mode(NodeMode::Discovered);
            self.start_domain_ledger_sync(now);
        }
    }

    /// Perform one bounded step of work.
    pub fn tick(&mut self, now: Instant) {
        // 1. Notice connections and disconnections.
        let connected = self.network.connected_peers();
        if connected != self.connected {
            let joined: Vec<VerifyingKey> = connected.difference(&self.connected).copied().collect();
            let left: Vec<VerifyingKey> = self.connected.difference(&connected).copied().collect();
            self.on_conns_changed(&joined, &left, now);
        }

        // 2. Peer messages.
        for _ in 0..self.config.max_node_msgs_per_tick {
            match self.network.recv() {
                Some((origin, msg)) => self.on_message(origin, msg, now),
                None => break,
            }
        }

        // 3. Client requests.
        for _ in 0..self.config.max_client_msgs_per_tick {
            match self.network.recv_from_client() {
                Some((client, request)) => self.on_client_request(client, request, now),
                None => break,
            }
        }

        // 4. Replica outboxes.
        let outputs = self
            .replicas
            .service_replicas(self.config.max_replica_msgs_per_tick);
        for (inst_id, output) in outputs {
            self.on_replica_output(inst_id, output, now);
        }

        // 5. Elector inbox.
        let election_msgs = self
            .replicas
            .service_elector_inbox(self.config.max_elector_msgs_per_tick);
        for (msg, origin) in election_msgs {
            self.on_election_message(msg, origin, now);
        }

        // 6. Delayed actions.
        for action in self.actions.due(now) {
            self.perform(action, now);
        }
    }

    fn perform(&mut self, action: DelayedAction, now: Instant) {
        match action {
            DelayedAction::CheckViewChangeCompleted(view_no) => {
                self.check_view_change_completed(view_no, now)
            }
            DelayedAction::LostMasterPrimary => self.lost_master_primary(now),
            DelayedAction::CatchupTimeout(ledger_id) => self.on_catchup_timeout(ledger_id, now),
            DelayedAction::CheckPerformance => {
                self.check_performance(now);
                self.actions.schedule_after(
                    now,
                    self.config.perf_check_freq,
                    DelayedAction::CheckPerformance,
                );
            }
        }
    }

    pub fn me(&self) -> VerifyingKey {
        self.me
    }

    pub fn mode(&self) -> NodeMode {
        self.mode
    }

    pub fn status(&self) -> NodeStatus {
        self.status
    }

    pub fn view_no(&self) -> ViewNumber {
        self.view_changer.view_no()
    }

    pub fn is_view_change_in_progress(&self) -> bool {
        self.view_changer.is_in_progress()
    }

    pub fn ledgers(&self) -> &LedgerRegistry<K> {
        &self.ledgers
    }

    pub fn provenance(&self) -> &ThreePhaseProvenanceIndex {
        &self.provenance
    }

    pub fn replicas(&self) -> &ReplicaSet<R> {
        &self.replicas
    }

    pub fn replicas_mut(&mut self) -> &mut ReplicaSet<R> {
        &mut self.replicas
    }

    pub fn authenticator(&self) -> &ClientAuthenticator {
        &self.authenticator
    }

    pub fn quorums(&self) -> Quorums {
        self.selector.quorums()
    }

    /// The last master batch executed on this node, persisted across restarts.
    pub fn last_executed(&self) -> Option<ThreePhaseKey> {
        self.last_executed
    }

    /// The primary of `inst_id` as known to its replica.
    pub fn primary_of(&self, inst_id: InstanceId) -> Option<VerifyingKey> {
        self.replicas.get(inst_id).and_then(|replica| replica.primary_name())
    }

    pub fn is_blacklisted_client(&self, identifier: &Identifier) -> bool {
        self.client_blacklist.contains(identifier)
    }

    pub fn is_blacklisted_node(&self, node: &VerifyingKey) -> bool {
        self.node_blacklist.contains(node)
    }

    fn set_mode(&mut self, mode: NodeMode) {
        if self.mode == mode {
            return;
        }
        log::info!("Changing mode from {} to {}", self.mode, mode);
        self.mode = mode;
        Event::publish(
            &self.event_publisher,
            Event::ChangeMode(ChangeModeEvent {
                timestamp: SystemTime::now(),
                mode,
            }),
        );
    }

    fn is_member(&self, node: &VerifyingKey) -> bool {
        self.selector.nodes().contains(node)
    }

    fn master_primary(&self) -> Option<VerifyingKey> {
        self.primary_of(InstanceId::MASTER)
    }

    // Re-read the validator set from the committed pool state, and resize everything that depends on
    // the pool's size.
    fn refresh_pool_membership(&mut self) {
        let mut nodes: Vec<VerifyingKey> =
            pool::validators(&self.ledgers.get(LedgerId::Pool).state, true)
                .iter()
                .filter_map(|bytes| VerifyingKey::from_bytes(bytes).ok())
                .collect();
        nodes.sort_by_key(|node| node.to_bytes());
        nodes.dedup();
        if nodes.as_slice() == self.selector.nodes() {
            return;
        }

        self.selector.set_nodes(nodes);
        let nodes = self.selector.nodes().to_vec();
        log::info!("Pool membership is now {} validators", nodes.len());
        self.network.update_node_set(nodes.clone());
        self.catchup.set_quorums(self.selector.quorums());

        let delta = self.replicas.adjust_replicas(nodes.len());
        self.monitor.set_instance_count(self.replicas.len());
        if delta != 0 {
            Event::publish(
                &self.event_publisher,
                Event::AdjustReplicas(AdjustReplicasEvent {
                    timestamp: SystemTime::now(),
                    delta,
                    count: self.replicas.len(),
                }),
            );
        }
        if self.selector.decided_view().is_some() {
            self.assign_primaries(self.view_no());
        }
    }

    // Register the identities of every committed transaction with the authenticator.
    fn load_identities(&mut self) -> Result<(), LedgerError> {
        for ledger_id in LedgerId::all() {
            let ledger = &self.ledgers.get(ledger_id).ledger;
            let txns = ledger.get_range(SeqNo::new(1), SeqNo::new(ledger.size()))?;
            for txn in txns {
                if let Some(TxnEffect::IdentityRegistered {
                    identifier,
                    verkey,
                    role,
                }) = self.appliers.get::<K>(ledger_id).effect(&txn)
                {
                    self.authenticator.add_idr(identifier, verkey, role);
                }
            }
        }
        Ok(())
    }

    fn apply_txn_effect(&mut self, effect: TxnEffect) {
        match effect {
            TxnEffect::PoolMembershipChanged => self.refresh_pool_membership(),
            TxnEffect::IdentityRegistered {
                identifier,
                verkey,
                role,
            } => self.authenticator.add_idr(identifier, verkey, role),
        }
    }
}
