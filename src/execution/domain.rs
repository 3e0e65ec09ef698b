/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! The domain ledger: identities and application data.
//!
//! |State key|Value|
//! |---|---|
//! |`nym:` + identifier|[`NymRecord`]|
//! |`attr:` + key|raw value|

use borsh::{BorshDeserialize, BorshSerialize};

use crate::{
    ledger::{pluggables::KVStore, registry::LedgerRegistry, state::State, variables::concat},
    types::{
        data_types::{Identifier, LedgerId, VerifyingKeyBytes},
        request::{Operation, Request, Role, Transaction},
    },
};

use super::{LedgerTransactionApplier, TxnEffect};

const NYM_PREFIX: &[u8] = b"nym:";
const ATTR_PREFIX: &[u8] = b"attr:";

/// A registered identity.
#[derive(Clone, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct NymRecord {
    pub verkey: VerifyingKeyBytes,
    pub role: Option<Role>,
}

#[derive(Clone, Copy, Debug, Default)]
pub struct DomainLedgerApplier;

impl<K: KVStore> LedgerTransactionApplier<K> for DomainLedgerApplier {
    fn ledger_id(&self) -> LedgerId {
        LedgerId::Domain
    }

    fn validate(&self, ledgers: &LedgerRegistry<K>, request: &Request) -> Result<(), String> {
        match &request.operation {
            Operation::Nym(nym) => {
                // The first identities of a pool are written before any trustee exists.
                if ledgers.get(LedgerId::Domain).ledger.uncommitted_size() == 0 {
                    return Ok(());
                }
                let author_is_trustee = role_of(ledgers, &request.identifier) == Some(Role::Trustee);
                let existing = get_nym(&ledgers.get(LedgerId::Domain).state, &nym.dest, false);
                match existing {
                    None if nym.role.is_some() && !author_is_trustee => {
                        Err(String::from("only a trustee can assign a role"))
                    }
                    Some(existing) if existing.role != nym.role && !author_is_trustee => {
                        Err(String::from("only a trustee can change a role"))
                    }
                    Some(_) if request.identifier != nym.dest && !author_is_trustee => Err(
                        String::from("only the owner or a trustee can update an identity"),
                    ),
                    _ => Ok(()),
                }
            }
            Operation::Write(_) => Ok(()),
            Operation::Node(_) => Err(String::from("not a domain operation")),
        }
    }

    fn update_state(&self, ledgers: &mut LedgerRegistry<K>, txn: &Transaction) {
        let state = &mut ledgers.get_mut(LedgerId::Domain).state;
        match &txn.operation {
            Operation::Nym(nym) => {
                let record = NymRecord {
                    verkey: nym.verkey,
                    role: nym.role,
                };
                state.set(&nym_key(&nym.dest), &record.try_to_vec().unwrap());
            }
            Operation::Write(write) => state.set(&concat(ATTR_PREFIX, &write.key), &write.value),
            Operation::Node(_) => {
                log::warn!("Ignoring node transaction {} on the domain ledger", txn.seq_no)
            }
        }
    }

    fn effect(&self, txn: &Transaction) -> Option<TxnEffect> {
        match &txn.operation {
            Operation::Nym(nym) => Some(TxnEffect::IdentityRegistered {
                identifier: nym.dest,
                verkey: nym.verkey,
                role: nym.role,
            }),
            _ => None,
        }
    }
}

fn nym_key(identifier: &Identifier) -> Vec<u8> {
    concat(NYM_PREFIX, &identifier.bytes())
}

/// Get the identity registered under `identifier`.
pub fn get_nym<K: KVStore>(
    state: &State<K>,
    identifier: &Identifier,
    is_committed: bool,
) -> Option<NymRecord> {
    let bytes = state.get(&nym_key(identifier), is_committed)?;
    NymRecord::try_from_slice(&bytes).ok()
}

/// Get the value written under application key `key`.
pub fn get_attr<K: KVStore>(state: &State<K>, key: &[u8], is_committed: bool) -> Option<Vec<u8>> {
    state.get(&concat(ATTR_PREFIX, key), is_committed)
}

/// The role of `identifier` in the uncommitted domain state.
pub fn role_of<K: KVStore>(ledgers: &LedgerRegistry<K>, identifier: &Identifier) -> Option<Role> {
    get_nym(&ledgers.get(LedgerId::Domain).state, identifier, false).and_then(|nym| nym.role)
}

#[cfg(test)]
mod tests {
    use ed25519_dalek::SigningKey;
    use rand_core::OsRng;

    use super::*;
    use crate::{
        ledger::mem_db::MemDB,
        types::{
            data_types::ReqId,
            request::{NymOperation, WriteOperation},
        },
    };

    fn nym(dest: &SigningKey, role: Option<Role>) -> Operation {
        Operation::Nym(NymOperation {
            dest: Identifier::new(dest.verifying_key().to_bytes()),
            verkey: dest.verifying_key().to_bytes(),
            role,
        })
    }

    #[test]
    fn only_trustees_assign_roles_test() {
        let mut ledgers = LedgerRegistry::open(MemDB::new()).unwrap();
        let trustee = SigningKey::generate(&mut OsRng);
        let client = SigningKey::generate(&mut OsRng);
        let other = SigningKey::generate(&mut OsRng);
        let applier = DomainLedgerApplier;

        // 1. The first identity can be bootstrapped by anyone.
        let bootstrap = Request::signed(&trustee, ReqId::new(1), nym(&trustee, Some(Role::Trustee)));
        let applied = applier.apply_batch(&mut ledgers, &[bootstrap], 1);
        assert_eq!(applied.txns.len(), 1);
        assert!(applied.rejected.is_empty());

        // 2. After that, a client cannot make someone a steward, but a trustee can.
        let by_client = Request::signed(&client, ReqId::new(1), nym(&other, Some(Role::Steward)));
        let by_trustee = Request::signed(&trustee, ReqId::new(2), nym(&other, Some(Role::Steward)));
        let applied = applier.apply_batch(&mut ledgers, &[by_client, by_trustee], 2);
        assert_eq!(applied.rejected.len(), 1);
        assert_eq!(applied.txns.len(), 1);
        assert_eq!(applied.txns[0].seq_no.int(), 2);
        assert_eq!(
            role_of(&ledgers, &Identifier::new(other.verifying_key().to_bytes())),
            Some(Role::Steward)
        );
    }

    #[test]
    fn writes_are_visible_after_commit_test() {
        let mut ledgers = LedgerRegistry::open(MemDB::new()).unwrap();
        let client = SigningKey::generate(&mut OsRng);
        let write = Request::signed(
            &client,
            ReqId::new(1),
            Operation::Write(WriteOperation {
                key: b"color".to_vec(),
                value: b"blue".to_vec(),
            }),
        );
        let applied = DomainLedgerApplier.apply_batch(&mut ledgers, &[write], 5);
        assert_eq!(
            <DomainLedgerApplier as LedgerTransactionApplier<MemDB>>::effect(
                &DomainLedgerApplier,
                &applied.txns[0]
            ),
            None
        );

        let domain = ledgers.get_mut(LedgerId::Domain);
        assert_eq!(get_attr(&domain.state, b"color", true), None);
        domain.ledger.commit_txns(1).unwrap();
        domain.state.commit(None).unwrap();
        assert_eq!(get_attr(&domain.state, b"color", true), Some(b"blue".to_vec()));
    }
}
