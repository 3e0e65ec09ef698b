/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Routing of peer messages, client requests, and replica outputs.
//!
//! Errors returned by the handlers stop at this boundary: they are logged, and turned into a NACK,
//! a blacklisting, or an instance change where the error calls for one.

use std::time::{Instant, SystemTime};

use ed25519_dalek::VerifyingKey;

use crate::{
    errors::NodeError,
    events::*,
    ledger::pluggables::KVStore,
    networking::{
        messages::{ClientMessage, ElectionMessage, Message, Propagate, Reply, RequestAck, RequestNack},
        network::Network,
    },
    replicas::{
        replica::{Replica, ReplicaOutput},
        replica_set::Routing,
    },
    requests::RequestSender,
    types::{
        data_types::{ClientAddress, InstanceId, RequestKey},
        request::Request,
        suspicion::SuspicionCode,
    },
};

use super::Node;

// Sent to clients whose request failed authentication, in place of the underlying error.
const AUTHENTICATION_FAILED: &str = "request signature verification failed";

impl<K: KVStore, N: Network, R: Replica> Node<K, N, R> {
    /// Handle a message from a peer.
    pub fn on_message(&mut self, origin: VerifyingKey, msg: Message, now: Instant) {
        if self.node_blacklist.contains(&origin) {
            log::debug!("Dropping message from blacklisted node");
            return;
        }
        // Nodes that are not (yet) in the pool may still catch up from us.
        if !self.is_member(&origin) && !matches!(msg, Message::Catchup(_)) {
            log::debug!("Dropping message from a node outside the pool");
            return;
        }

        let result = match msg {
            Message::Propagate(msg) => self.process_propagate(&msg, origin),
            Message::InstanceChange(msg) => self.process_instance_change(&msg, origin, now),
            Message::ThreePhase(msg) => {
                if self.replicas.send_to_replica(msg, origin) == Routing::Discarded {
                    log::debug!("Discarded stale three-phase message");
                }
                Ok(())
            }
            Message::Catchup(msg) => self.process_catchup_message(msg, origin, now),
            Message::Election(msg) => {
                if self.replicas.send_to_elector(msg, origin) == Routing::Discarded {
                    log::debug!("Discarded stale election message");
                }
                Ok(())
            }
            Message::Batch(batch) => match batch.unpack() {
                Ok(msgs) => {
                    for msg in msgs {
                        self.on_message(origin, msg, now);
                    }
                    Ok(())
                }
                Err(err) => Err(NodeError::Malformed {
                    reason: format!("batch could not be unpacked: {}", err),
                }),
            },
        };

        if let Err(err) = result {
            self.handle_error(err, now);
        }
    }

    /// Handle a request from a client, answering it with a NACK if it is refused.
    pub fn on_client_request(&mut self, client: ClientAddress, request: Request, now: Instant) {
        let key = request.key();
        if let Err(err) = self.process_request(&request, client) {
            let reason = match err {
                NodeError::InvalidClientRequest { reason, .. } | NodeError::RequestNack { reason, .. } => {
                    reason
                }
                NodeError::SuspiciousClient { .. } => String::from(AUTHENTICATION_FAILED),
                err => {
                    self.handle_error(err, now);
                    return;
                }
            };
            log::debug!("Refusing request {}: {}", key, reason);
            self.nack(client, key, reason);
        }
    }

    /// Accept a client request: answer it from the ledger if it was already committed, otherwise
    /// record it, acknowledge it, and propagate it to every peer.
    pub fn process_request(
        &mut self,
        request: &Request,
        client: ClientAddress,
    ) -> Result<(), NodeError> {
        let key = request.key();
        if self.client_blacklist.contains(&request.identifier) {
            return Err(NodeError::SuspiciousClient {
                identifier: request.identifier,
                reason: String::from("client is blacklisted"),
            });
        }
        request
            .validate_schema()
            .map_err(|reason| NodeError::InvalidClientRequest { key, reason })?;
        if self.authenticator.authenticate(request).is_err() {
            self.blacklist_client(request);
            return Err(NodeError::SuspiciousClient {
                identifier: request.identifier,
                reason: String::from("invalid signature"),
            });
        }
        self.plugins
            .verify(request)
            .map_err(|reason| NodeError::RequestNack { key, reason })?;

        if self.reply_if_committed(&key, client)? {
            return Ok(());
        }

        let first_seen = self.requests.add(request, RequestSender::Client(client));
        self.sender.send_to_client(
            client,
            ClientMessage::RequestAck(RequestAck {
                identifier: key.identifier,
                req_id: key.req_id,
            }),
        );
        if first_seen {
            self.propagate(request);
        }
        Ok(())
    }

    /// Count a peer's propagation of a request, relaying the request if we had not seen it, and
    /// finalising it once enough peers propagated it.
    pub fn process_propagate(&mut self, msg: &Propagate, origin: VerifyingKey) -> Result<(), NodeError> {
        let request = &msg.request;
        request.validate_schema().map_err(|reason| NodeError::Malformed {
            reason: format!("propagated request is malformed: {}", reason),
        })?;
        if self.authenticator.authenticate(request).is_err() {
            return Err(NodeError::Suspicious {
                node: origin,
                reason: format!("propagated request {} has an invalid signature", request.key()),
                code: SuspicionCode::InvalidPropagate,
            });
        }
        if self.seq_no_index.get(&request.key())?.is_some() {
            log::debug!("Ignoring propagate of committed request {}", request.key());
            return Ok(());
        }

        if self.requests.add(request, RequestSender::Node(origin)) {
            self.propagate(request);
        }
        if self.requests.add_propagate(request, origin) {
            self.try_finalise(&request.key());
        }
        Ok(())
    }

    // Broadcast `request` and count our own propagation.
    fn propagate(&mut self, request: &Request) {
        self.sender.broadcast(Propagate {
            request: request.clone(),
        });
        if self.requests.add_propagate(request, self.me) {
            self.try_finalise(&request.key());
        }
    }

    fn try_finalise(&mut self, key: &RequestKey) {
        let quorum = self.quorums().propagate();
        if let Some(request) = self.requests.try_finalise(key, quorum) {
            log::debug!("Request {} finalised", key);
            self.replicas.on_request_finalised(&request);
        }
    }

    // If the request under `key` was already committed, send the client the original reply.
    fn reply_if_committed(
        &mut self,
        key: &RequestKey,
        client: ClientAddress,
    ) -> Result<bool, NodeError> {
        let (ledger_id, seq_no) = match self.seq_no_index.get(key)? {
            Some(location) => location,
            None => return Ok(false),
        };
        let ledger = &self.ledgers.get(ledger_id).ledger;
        let txn = match ledger.get_by_seq_no(seq_no)? {
            Some(txn) => txn,
            None => return Ok(false),
        };
        let root_hash = ledger
            .root_hash_at(seq_no.int())?
            .unwrap_or(ledger.root_hash());
        log::debug!("Request {} was already committed, replying again", key);
        self.sender.send_to_client(
            client,
            ClientMessage::Reply(Reply {
                txn,
                ledger_id,
                root_hash,
            }),
        );
        Ok(true)
    }

    pub(super) fn nack(&mut self, client: ClientAddress, key: RequestKey, reason: String) {
        self.sender.send_to_client(
            client,
            ClientMessage::RequestNack(RequestNack {
                identifier: key.identifier,
                req_id: key.req_id,
                reason,
            }),
        );
    }

    fn blacklist_client(&mut self, request: &Request) {
        if self.client_blacklist.insert(request.identifier) {
            log::warn!("Blacklisting client after a request failed authentication");
            Event::publish(
                &self.event_publisher,
                Event::BlacklistClient(BlacklistClientEvent {
                    timestamp: SystemTime::now(),
                    identifier: request.identifier,
                }),
            );
        }
    }

    pub(super) fn on_replica_output(&mut self, inst_id: InstanceId, output: ReplicaOutput, now: Instant) {
        match output {
            ReplicaOutput::Broadcast(msg) => self.sender.broadcast(msg),
            ReplicaOutput::Suspicion { node, code } => self.report_suspicion(
                node,
                code,
                format!("reported by replica instance {}", inst_id),
                now,
            ),
            ReplicaOutput::Ordered(ordered) => {
                if let Err(err) = self.process_ordered(ordered, now) {
                    self.handle_error(err, now);
                }
            }
        }
    }

    pub(super) fn on_election_message(&mut self, msg: ElectionMessage, origin: VerifyingKey, now: Instant) {
        match msg {
            ElectionMessage::ViewChangeDone(msg) => {
                match self.selector.process_view_change_done(&msg, origin) {
                    Ok(Some(decision)) => self.on_primaries_decided(decision, now),
                    Ok(None) => (),
                    Err(err) => self.handle_error(err, now),
                }
            }
            ElectionMessage::Nomination(_)
            | ElectionMessage::Primary(_)
            | ElectionMessage::Reelection(_) => {
                log::debug!("Ignoring election message: primaries are selected by round robin")
            }
        }
    }

    pub(super) fn handle_error(&mut self, err: NodeError, now: Instant) {
        match err {
            NodeError::Suspicious { node, reason, code } => {
                self.report_suspicion(node, code, reason, now)
            }
            NodeError::Malformed { .. } | NodeError::Stale { .. } => log::debug!("{}", err),
            NodeError::Ledger(_) | NodeError::Fatal(_) => log::error!("{}", err),
            NodeError::SuspiciousClient { .. }
            | NodeError::InvalidClientRequest { .. }
            | NodeError::RequestNack { .. } => log::warn!("{}", err),
        }
    }

    /// Record that `node` misbehaved. Nodes that send invalid signatures are blacklisted. Wrong
    /// pre-prepares from the master primary lead to an instance change.
    pub(super) fn report_suspicion(
        &mut self,
        node: VerifyingKey,
        code: SuspicionCode,
        reason: String,
        now: Instant,
    ) {
        log::warn!("Suspicion {}: {}", code, reason);
        Event::publish(
            &self.event_publisher,
            Event::Suspicion(SuspicionEvent {
                timestamp: SystemTime::now(),
                node,
                code,
            }),
        );

        if code == SuspicionCode::InvalidSignature && self.node_blacklist.insert(node) {
            log::warn!("Blacklisting node after an invalid signature");
        }
        if code.triggers_instance_change() && self.master_primary() == Some(node) {
            self.send_instance_change(self.view_no() + 1, code, now);
        }
    }
}
