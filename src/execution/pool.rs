/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! The pool ledger: the nodes that make up the pool.
//!
//! |State key|Value|
//! |---|---|
//! |`node:` + verifying key|[`NodeRecord`]|
//! |`validators`|`Vec<VerifyingKeyBytes>`, in the order the validators were added|

use borsh::{BorshDeserialize, BorshSerialize};

use crate::{
    ledger::{pluggables::KVStore, registry::LedgerRegistry, state::State, variables::concat},
    types::{
        data_types::{Identifier, LedgerId, VerifyingKeyBytes},
        request::{NodeService, Operation, Request, Role, Transaction},
    },
};

use super::{domain::role_of, LedgerTransactionApplier, TxnEffect};

const NODE_PREFIX: &[u8] = b"node:";
const VALIDATORS_KEY: &[u8] = b"validators";

#[derive(Clone, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct NodeRecord {
    pub alias: String,
    pub services: Vec<NodeService>,
    /// The identity that added the node.
    pub steward: Identifier,
}

#[derive(Clone, Copy, Debug, Default)]
pub struct PoolLedgerApplier;

impl<K: KVStore> LedgerTransactionApplier<K> for PoolLedgerApplier {
    fn ledger_id(&self) -> LedgerId {
        LedgerId::Pool
    }

    fn validate(&self, ledgers: &LedgerRegistry<K>, request: &Request) -> Result<(), String> {
        let node = match &request.operation {
            Operation::Node(node) => node,
            _ => return Err(String::from("not a pool operation")),
        };
        if ledgers.get(LedgerId::Pool).ledger.uncommitted_size() == 0 {
            return Ok(());
        }

        let role = role_of(ledgers, &request.identifier);
        if !matches!(role, Some(Role::Steward) | Some(Role::Trustee)) {
            return Err(String::from("only a steward or a trustee can add or update a node"));
        }
        match get_node(&ledgers.get(LedgerId::Pool).state, &node.dest, false) {
            Some(existing) if existing.steward != request.identifier && role != Some(Role::Trustee) => {
                Err(String::from("only the node's steward can update it"))
            }
            _ => Ok(()),
        }
    }

    fn update_state(&self, ledgers: &mut LedgerRegistry<K>, txn: &Transaction) {
        let node = match &txn.operation {
            Operation::Node(node) => node,
            _ => {
                log::warn!("Ignoring non-node transaction {} on the pool ledger", txn.seq_no);
                return;
            }
        };
        let state = &mut ledgers.get_mut(LedgerId::Pool).state;
        let record = NodeRecord {
            alias: node.alias.clone(),
            services: node.services.clone(),
            steward: txn.identifier,
        };
        state.set(&node_key(&node.dest), &record.try_to_vec().unwrap());

        let mut validators = validators(state, false);
        let is_validator = node.services.contains(&NodeService::Validator);
        let position = validators.iter().position(|validator| *validator == node.dest);
        match (is_validator, position) {
            (true, None) => validators.push(node.dest),
            (false, Some(position)) => {
                validators.remove(position);
            }
            _ => return,
        }
        state.set(VALIDATORS_KEY, &validators.try_to_vec().unwrap());
    }

    fn effect(&self, txn: &Transaction) -> Option<TxnEffect> {
        match &txn.operation {
            Operation::Node(_) => Some(TxnEffect::PoolMembershipChanged),
            _ => None,
        }
    }
}

fn node_key(dest: &VerifyingKeyBytes) -> Vec<u8> {
    concat(NODE_PREFIX, dest)
}

/// Get the record of the node identified by `dest`.
pub fn get_node<K: KVStore>(
    state: &State<K>,
    dest: &VerifyingKeyBytes,
    is_committed: bool,
) -> Option<NodeRecord> {
    let bytes = state.get(&node_key(dest), is_committed)?;
    NodeRecord::try_from_slice(&bytes).ok()
}

/// Get the verifying keys of the pool's validators.
pub fn validators<K: KVStore>(state: &State<K>, is_committed: bool) -> Vec<VerifyingKeyBytes> {
    state
        .get(VALIDATORS_KEY, is_committed)
        .and_then(|bytes| Vec::<VerifyingKeyBytes>::try_from_slice(&bytes).ok())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use ed25519_dalek::SigningKey;
    use rand_core::OsRng;

    use super::*;
    use crate::{
        execution::{domain::DomainLedgerApplier, LedgerTransactionApplier},
        ledger::mem_db::MemDB,
        types::{
            data_types::ReqId,
            request::{NodeOperation, NymOperation},
        },
    };

    fn node_op(node: &SigningKey, alias: &str, services: Vec<NodeService>) -> Operation {
        Operation::Node(NodeOperation {
            dest: node.verifying_key().to_bytes(),
            alias: String::from(alias),
            services,
        })
    }

    #[test]
    fn stewards_manage_validators_test() {
        let mut ledgers = LedgerRegistry::open(MemDB::new()).unwrap();
        let steward = SigningKey::generate(&mut OsRng);
        let stranger = SigningKey::generate(&mut OsRng);
        let node_1 = SigningKey::generate(&mut OsRng);
        let node_2 = SigningKey::generate(&mut OsRng);

        // 1. Register the steward on the domain ledger.
        let steward_nym = Request::signed(
            &steward,
            ReqId::new(1),
            Operation::Nym(NymOperation {
                dest: Identifier::new(steward.verifying_key().to_bytes()),
                verkey: steward.verifying_key().to_bytes(),
                role: Some(Role::Steward),
            }),
        );
        DomainLedgerApplier.apply_batch(&mut ledgers, &[steward_nym], 1);

        // 2. The first node bootstraps the pool.
        let first = Request::signed(&steward, ReqId::new(2), node_op(&node_1, "Alpha", vec![NodeService::Validator]));
        let applied = PoolLedgerApplier.apply_batch(&mut ledgers, &[first], 2);
        assert_eq!(applied.txns.len(), 1);

        // 3. A stranger cannot add a node, the steward can.
        let by_stranger = Request::signed(&stranger, ReqId::new(1), node_op(&node_2, "Beta", vec![NodeService::Validator]));
        let by_steward = Request::signed(&steward, ReqId::new(3), node_op(&node_2, "Beta", vec![NodeService::Validator]));
        let applied = PoolLedgerApplier.apply_batch(&mut ledgers, &[by_stranger, by_steward], 3);
        assert_eq!(applied.rejected.len(), 1);
        assert_eq!(applied.txns.len(), 1);

        let pool_state = &ledgers.get(LedgerId::Pool).state;
        assert_eq!(
            validators(pool_state, false),
            vec![node_1.verifying_key().to_bytes(), node_2.verifying_key().to_bytes()]
        );
        assert!(validators(pool_state, true).is_empty());

        // 4. Demoting a node to an observer removes it from the validators.
        let demote = Request::signed(&steward, ReqId::new(4), node_op(&node_1, "Alpha", vec![NodeService::Observer]));
        PoolLedgerApplier.apply_batch(&mut ledgers, &[demote], 4);
        assert_eq!(
            validators(&ledgers.get(LedgerId::Pool).state, false),
            vec![node_2.verifying_key().to_bytes()]
        );
        assert_eq!(
            get_node(&ledgers.get(LedgerId::Pool).state, &node_1.verifying_key().to_bytes(), false)
                .unwrap()
                .alias,
            "Alpha"
        );
    }
}
