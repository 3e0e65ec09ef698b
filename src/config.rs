/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! User-defined parameters of a node.
//!
//! The [`Configuration`] is built with the builder pattern, for example:
//!
//! ```ignore
//! let configuration =
//!     Configuration::builder()
//!     .me(signing_key)
//!     .instance_change_timeout(Duration::from_secs(60))
//!     .catchup_timeout(Duration::from_secs(5))
//!     .log_events(true)
//!     .build();
//! ```
//!
//! Only `.me(...)` is required. Every other parameter has a default suitable for a small pool.

use std::time::Duration;

use ed25519_dalek::SigningKey;
use typed_builder::TypedBuilder;

/// Stores the user-defined parameters required to run a node.
///
/// ## Instance change throttling
///
/// Repeated instance change votes for the same view are rate limited. The first vote for a view is
/// always sent. Each further vote for the same view must wait for a delay that starts at
/// `instance_change_throttle_base` and doubles after every vote, up to `instance_change_throttle_max`.
/// Proposing a higher view resets the delay.
///
/// ## Catch-up rounds
///
/// A catch-up round ends when every ledger is caught up. If the node still has no quorum-backed
/// certificate for the current view, it starts another round, unless the last round applied no
/// transactions and the master replica has ordered everything it had prepared. After
/// `max_catchup_rounds_without_progress` consecutive rounds that applied no transactions the node
/// stops looping and resumes participation.
#[derive(TypedBuilder)]
#[builder(builder_method(doc = "
    Create a builder for building a [Configuration]. On the builder call the following methods to construct a valid [Configuration].

    Required:
    - `.me(...)`

    Optional:
    - `.has_pool_ledger(...)`
    - `.processed_batch_maps_to_keep(...)`
    - `.instance_change_timeout(...)`
    - `.instance_change_throttle_base(...)`
    - `.instance_change_throttle_max(...)`
    - `.tolerate_primary_disconnection(...)`
    - `.perf_check_freq(...)`
    - `.perf_delta(...)`
    - `.perf_min_ordered(...)`
    - `.catchup_timeout(...)`
    - `.catchup_batch_size(...)`
    - `.max_catchup_rounds_without_progress(...)`
    - `.max_node_msgs_per_tick(...)`
    - `.max_client_msgs_per_tick(...)`
    - `.max_replica_msgs_per_tick(...)`
    - `.max_elector_msgs_per_tick(...)`
    - `.log_events(...)`
"))]
pub struct Configuration {
    #[builder(setter(doc = "Set the node's signing key, which also identifies it in the pool. Required."))]
    pub me: SigningKey,
    #[builder(
        default = true,
        setter(doc = "Whether the node must catch up the pool ledger before the domain ledger. Defaults to true.")
    )]
    pub has_pool_ledger: bool,
    #[builder(
        default = 1000,
        setter(doc = "Set how many batches per ledger the provenance index remembers. Defaults to 1000.")
    )]
    pub processed_batch_maps_to_keep: usize,
    #[builder(
        default = Duration::from_secs(60),
        setter(doc = "Set how long a started view change may take before the next view is proposed. Defaults to 60s.")
    )]
    pub instance_change_timeout: Duration,
    #[builder(
        default = Duration::from_secs(1),
        setter(doc = "Set the initial delay between repeated instance change votes for the same view. Defaults to 1s.")
    )]
    pub instance_change_throttle_base: Duration,
    #[builder(
        default = Duration::from_secs(64),
        setter(doc = "Set the maximum delay between repeated instance change votes for the same view. Defaults to 64s.")
    )]
    pub instance_change_throttle_max: Duration,
    #[builder(
        default = Duration::from_secs(2),
        setter(doc = "Set how long the master primary may stay disconnected before an instance change is sent. Defaults to 2s.")
    )]
    pub tolerate_primary_disconnection: Duration,
    #[builder(
        default = Duration::from_secs(10),
        setter(doc = "Set how often the master's performance is compared with the backups'. Defaults to 10s.")
    )]
    pub perf_check_freq: Duration,
    #[builder(
        default = 0.4,
        setter(doc = "Set the minimum ratio of master to average backup throughput. Defaults to 0.4.")
    )]
    pub perf_delta: f64,
    #[builder(
        default = 20,
        setter(doc = "Set how many requests the backups must have ordered before the master can be judged degraded. Defaults to 20.")
    )]
    pub perf_min_ordered: u64,
    #[builder(
        default = Duration::from_secs(5),
        setter(doc = "Set how long a catch-up round may go without progress before ledger statuses are re-broadcast. Defaults to 5s.")
    )]
    pub catchup_timeout: Duration,
    #[builder(
        default = 100,
        setter(doc = "Set the maximum number of transactions asked for in a single catch-up request. Defaults to 100.")
    )]
    pub catchup_batch_size: u64,
    #[builder(
        default = 3,
        setter(doc = "Set how many consecutive catch-up rounds may apply no transactions before the node stops retrying. Defaults to 3.")
    )]
    pub max_catchup_rounds_without_progress: u32,
    #[builder(default = 100, setter(doc = "Set how many peer messages are handled per tick. Defaults to 100."))]
    pub max_node_msgs_per_tick: usize,
    #[builder(default = 100, setter(doc = "Set how many client requests are handled per tick. Defaults to 100."))]
    pub max_client_msgs_per_tick: usize,
    #[builder(default = 100, setter(doc = "Set how many messages each replica handles per tick. Defaults to 100."))]
    pub max_replica_msgs_per_tick: usize,
    #[builder(default = 100, setter(doc = "Set how many election messages are handled per tick. Defaults to 100."))]
    pub max_elector_msgs_per_tick: usize,
    #[builder(default = false, setter(doc = "Enable logging of events? Defaults to false."))]
    pub log_events: bool,
}
