/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Byte-prefixes that specify where each persisted variable is stored in the user-provided key-value
//! store.
//!
//! |Variable|Key|Value|
//! |---|---|---|
//! |Transactions|`TRANSACTIONS` + ledger + seq no|[`Transaction`](crate::types::request::Transaction)|
//! |Ledger size|`LEDGER_SIZE` + ledger|`u64`|
//! |Root hash at size|`ROOT_HASH_AT` + ledger + size|[`CryptoHash`](crate::types::data_types::CryptoHash)|
//! |Committed state|`COMMITTED_STATE` + ledger + state key|`Vec<u8>`|
//! |Committed state head|`COMMITTED_STATE_HEAD` + ledger|[`CryptoHash`](crate::types::data_types::CryptoHash)|
//! |Request to seq no|`TXN_SEQ_NO_INDEX` + identifier + req id|`(LedgerId, SeqNo)`|
//! |Last executed 3PC key|`LAST_EXECUTED_3PC`|[`ThreePhaseKey`](crate::types::data_types::ThreePhaseKey)|
//!
//! Ledger ids are encoded with [`LedgerId::as_byte`](crate::types::data_types::LedgerId::as_byte) and
//! integers in little-endian. All values are Borsh-serialized.

pub const TRANSACTIONS: [u8; 1] = [0];
pub const LEDGER_SIZE: [u8; 1] = [1];
pub const ROOT_HASH_AT: [u8; 1] = [2];
pub const COMMITTED_STATE: [u8; 1] = [3];
pub const COMMITTED_STATE_HEAD: [u8; 1] = [4];
pub const TXN_SEQ_NO_INDEX: [u8; 1] = [5];
pub const LAST_EXECUTED_3PC: [u8; 1] = [6];

/// Concatenate two byteslices into one vector.
pub fn concat(a: &[u8], b: &[u8]) -> Vec<u8> {
    let mut res = Vec::with_capacity(a.len() + b.len());
    res.extend_from_slice(a);
    res.extend_from_slice(b);
    res
}
