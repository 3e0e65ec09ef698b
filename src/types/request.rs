/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Client requests, the operations they carry, and the ledger transactions they become once ordered.

use borsh::{BorshDeserialize, BorshSerialize};

use super::{
    crypto_primitives::{hash_parts, sign, SigningKey},
    data_types::{
        CryptoHash, Identifier, LedgerId, ReqId, RequestKey, SeqNo, SignatureBytes,
        VerifyingKeyBytes,
    },
};

/// Roles that an identity registered on the domain ledger can hold.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, BorshSerialize, BorshDeserialize)]
pub enum Role {
    Trustee,
    Steward,
}

/// Services a node can provide to the pool.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, BorshSerialize, BorshDeserialize)]
pub enum NodeService {
    /// Takes part in ordering and counts towards the pool's quorums.
    Validator,
    /// Keeps its ledgers up to date through catch-up without ordering.
    Observer,
}

/// Adds or updates a node in the pool. A node without the `Validator` service is not part of the
/// validator set.
#[derive(Clone, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct NodeOperation {
    pub dest: VerifyingKeyBytes,
    pub alias: String,
    pub services: Vec<NodeService>,
}

/// Registers an identity, optionally with a role.
#[derive(Clone, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct NymOperation {
    pub dest: Identifier,
    pub verkey: VerifyingKeyBytes,
    pub role: Option<Role>,
}

/// Writes an application key-value pair into the domain state.
#[derive(Clone, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct WriteOperation {
    pub key: Vec<u8>,
    pub value: Vec<u8>,
}

#[derive(Clone, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub enum Operation {
    Node(NodeOperation),
    Nym(NymOperation),
    Write(WriteOperation),
}

impl Operation {
    /// The ledger that transactions carrying this operation are written to.
    pub fn ledger_id(&self) -> LedgerId {
        match self {
            Operation::Node(_) => LedgerId::Pool,
            Operation::Nym(_) | Operation::Write(_) => LedgerId::Domain,
        }
    }
}

/// A request submitted by a client.
#[derive(Clone, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct Request {
    pub identifier: Identifier,
    pub req_id: ReqId,
    pub operation: Operation,
    pub signature: Option<SignatureBytes>,
}

impl Request {
    /// Create a request signed by `signing_key`, using the signing key's verifying key as a cryptonym
    /// identifier.
    pub fn signed(signing_key: &SigningKey, req_id: ReqId, operation: Operation) -> Request {
        let identifier = Identifier::new(signing_key.verifying_key().to_bytes());
        Request::signed_as(signing_key, identifier, req_id, operation)
    }

    /// Create a request for `identifier` signed by `signing_key`.
    pub fn signed_as(
        signing_key: &SigningKey,
        identifier: Identifier,
        req_id: ReqId,
        operation: Operation,
    ) -> Request {
        let mut request = Request {
            identifier,
            req_id,
            operation,
            signature: None,
        };
        request.signature = Some(sign(signing_key, &request.signing_bytes()));
        request
    }

    pub fn key(&self) -> RequestKey {
        RequestKey::new(self.identifier, self.req_id)
    }

    /// The bytes that the request's signature is over.
    pub fn signing_bytes(&self) -> Vec<u8> {
        let mut bytes = self.identifier.try_to_vec().unwrap();
        bytes.extend(self.req_id.try_to_vec().unwrap());
        bytes.extend(self.operation.try_to_vec().unwrap());
        bytes
    }

    /// Digest identifying this exact request, including its signature. Two propagations of the same
    /// request key only count towards the same finalisation quorum if their digests match.
    pub fn digest(&self) -> CryptoHash {
        hash_parts(&[&self.try_to_vec().unwrap()])
    }

    /// Check that fields that cannot be expressed by the type system are present and well formed.
    pub fn validate_schema(&self) -> Result<(), String> {
        if self.signature.is_none() {
            return Err(String::from("missing signature"));
        }
        match &self.operation {
            Operation::Node(node) => {
                if node.alias.is_empty() {
                    return Err(String::from("missing node alias"));
                }
            }
            Operation::Nym(_) => (),
            Operation::Write(write) => {
                if write.key.is_empty() {
                    return Err(String::from("missing write key"));
                }
            }
        }
        Ok(())
    }
}

/// A request that has been written to a ledger.
#[derive(Clone, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct Transaction {
    pub seq_no: SeqNo,
    pub pp_time: u64,
    pub identifier: Identifier,
    pub req_id: ReqId,
    pub operation: Operation,
}

impl Transaction {
    /// Build the (not yet sequenced) transaction for `request`, ordered at `pp_time`.
    pub fn from_request(request: &Request, pp_time: u64) -> Transaction {
        Transaction {
            seq_no: SeqNo::new(0),
            pp_time,
            identifier: request.identifier,
            req_id: request.req_id,
            operation: request.operation.clone(),
        }
    }

    /// Build a genesis transaction. Genesis transactions have no author.
    pub fn genesis(operation: Operation) -> Transaction {
        Transaction {
            seq_no: SeqNo::new(0),
            pp_time: 0,
            identifier: Identifier::new([0; 32]),
            req_id: ReqId::new(0),
            operation,
        }
    }

    pub fn ledger_id(&self) -> LedgerId {
        self.operation.ledger_id()
    }

    pub fn request_key(&self) -> RequestKey {
        RequestKey::new(self.identifier, self.req_id)
    }

    pub fn is_genesis(&self) -> bool {
        self.identifier == Identifier::new([0; 32])
    }
}
