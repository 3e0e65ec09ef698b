/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Requests that are known to the node but not yet replied to.
//!
//! A request is *finalised* once `f + 1` distinct nodes (the node itself included) have propagated
//! the same request, identified by its digest. Only finalised requests are forwarded to the replica
//! instances and executed. Propagations of a request that differ from the first one seen under the
//! same [`RequestKey`] are not counted.

use std::collections::{hash_map::Entry, HashMap, HashSet};

use ed25519_dalek::VerifyingKey;

use crate::types::{
    data_types::{ClientAddress, CryptoHash, RequestKey},
    request::Request,
};

/// Where a request came from, and so where replies about it go.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RequestSender {
    Client(ClientAddress),
    Node(VerifyingKey),
}

struct RequestState {
    request: Request,
    digest: CryptoHash,
    propagates: HashSet<VerifyingKey>,
    finalised: bool,
    senders: Vec<RequestSender>,
}

#[derive(Default)]
pub struct RequestStore {
    requests: HashMap<RequestKey, RequestState>,
}

impl RequestStore {
    pub fn new() -> RequestStore {
        RequestStore::default()
    }

    /// Record that `sender` sent `request`. Returns true if the request was not known before.
    pub fn add(&mut self, request: &Request, sender: RequestSender) -> bool {
        match self.requests.entry(request.key()) {
            Entry::Occupied(mut entry) => {
                let state = entry.get_mut();
                if !state.senders.contains(&sender) {
                    state.senders.push(sender);
                }
                false
            }
            Entry::Vacant(entry) => {
                entry.insert(RequestState {
                    request: request.clone(),
                    digest: request.digest(),
                    propagates: HashSet::new(),
                    finalised: false,
                    senders: vec![sender],
                });
                true
            }
        }
    }

    /// Count a propagation of `request` by `node`. Returns false if the request is unknown or differs
    /// from the one first recorded under its key.
    pub fn add_propagate(&mut self, request: &Request, node: VerifyingKey) -> bool {
        match self.requests.get_mut(&request.key()) {
            Some(state) if state.digest == request.digest() => {
                state.propagates.insert(node);
                true
            }
            Some(_) => {
                log::warn!(
                    "Propagate of {} from {:?} does not match the request first seen",
                    request.key(),
                    node
                );
                false
            }
            None => false,
        }
    }

    pub fn has_propagated(&self, key: &RequestKey, node: &VerifyingKey) -> bool {
        self.requests
            .get(key)
            .map_or(false, |state| state.propagates.contains(node))
    }

    pub fn votes(&self, key: &RequestKey) -> usize {
        self.requests.get(key).map_or(0, |state| state.propagates.len())
    }

    /// Finalise the request under `key` if it has at least `quorum` propagations and was not finalised
    /// before. Returns the request the first time it is finalised.
    pub fn try_finalise(&mut self, key: &RequestKey, quorum: usize) -> Option<Request> {
        let state = self.requests.get_mut(key)?;
        if state.finalised || state.propagates.len() < quorum {
            return None;
        }
        state.finalised = true;
        Some(state.request.clone())
    }

    pub fn is_finalised(&self, key: &RequestKey) -> bool {
        self.requests.get(key).map_or(false, |state| state.finalised)
    }

    pub fn get_finalised(&self, key: &RequestKey) -> Option<&Request> {
        self.requests
            .get(key)
            .filter(|state| state.finalised)
            .map(|state| &state.request)
    }

    pub fn senders(&self, key: &RequestKey) -> Vec<RequestSender> {
        self.requests
            .get(key)
            .map(|state| state.senders.clone())
            .unwrap_or_default()
    }

    pub fn contains(&self, key: &RequestKey) -> bool {
        self.requests.contains_key(key)
    }

    /// Forget the request under `key`, after it has been replied to.
    pub fn remove(&mut self, key: &RequestKey) -> Option<Request> {
        self.requests.remove(key).map(|state| state.request)
    }

    pub fn len(&self) -> usize {
        self.requests.len()
    }

    pub fn is_empty(&self) -> bool {
        self.requests.is_empty()
    }
}
