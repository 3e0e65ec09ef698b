/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Persistent index from [`RequestKey`] to the ledger position of the transaction it produced.
//!
//! Used to answer duplicate requests with the original reply instead of ordering them again.

use borsh::BorshSerialize;

use crate::types::data_types::{LedgerId, RequestKey, SeqNo};

use super::{
    pluggables::{KVGet, KVStore, WriteBatch},
    variables::{self, concat},
    Key, LedgerError,
};

pub struct TxnSeqNoIndex<K: KVStore> {
    kv_store: K,
}

impl<K: KVStore> TxnSeqNoIndex<K> {
    pub fn new(kv_store: K) -> TxnSeqNoIndex<K> {
        TxnSeqNoIndex { kv_store }
    }

    /// Record that the request identified by `request` was committed at `seq_no` of `ledger_id`.
    pub fn add(&mut self, request: &RequestKey, ledger_id: LedgerId, seq_no: SeqNo) {
        let mut wb = K::WriteBatch::new();
        self.stage_add(&mut wb, request, ledger_id, seq_no);
        self.kv_store.write(wb);
    }

    /// Like [`add`](Self::add), but leaves writing `wb` to the caller.
    pub fn stage_add(
        &self,
        wb: &mut K::WriteBatch,
        request: &RequestKey,
        ledger_id: LedgerId,
        seq_no: SeqNo,
    ) {
        wb.set(&key(request), &(ledger_id, seq_no).try_to_vec().unwrap());
    }

    /// Get where the request identified by `request` was committed, if it was.
    pub fn get(&self, request: &RequestKey) -> Result<Option<(LedgerId, SeqNo)>, LedgerError> {
        self.kv_store
            .get_value(&key(request), Key::TxnSeqNo { request: *request })
    }
}

fn key(request: &RequestKey) -> Vec<u8> {
    concat(
        &concat(&variables::TXN_SEQ_NO_INDEX, &request.identifier.bytes()),
        &request.req_id.int().to_le_bytes(),
    )
}
