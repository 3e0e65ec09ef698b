/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Index from committed sequence number ranges to the three-phase key of the batch that produced them.
//!
//! Each ledger has its own interval map, keyed by the first sequence number of each range. Because
//! sequence numbers are assigned monotonically, ranges never overlap and are inserted in increasing
//! order of their start, so a point query is a single `range(..=seq_no).next_back()` lookup.
//!
//! Retention is bounded: once a ledger's map holds more than the configured number of ranges, the
//! range with the lowest start is evicted. The index lives in memory only. After a restart or an
//! eviction, lookups for old sequence numbers return `None`, which callers must treat as "cannot
//! answer" rather than as an error.

use std::{collections::BTreeMap, ops::Range};

use crate::types::data_types::{LedgerId, SeqNo, ThreePhaseKey};

/// A range of committed sequence numbers and the batch that produced them.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProvenanceEntry {
    /// Half-open: `first_seq..last_seq + 1`.
    pub seq_range: Range<u64>,
    pub ledger_id: LedgerId,
    pub key: ThreePhaseKey,
}

#[derive(Debug, PartialEq, Eq)]
pub enum ProvenanceError {
    /// `first_seq` is greater than `last_seq`.
    EmptyRange { first_seq: SeqNo, last_seq: SeqNo },

    /// The range starts before the end of the last recorded range.
    Overlap { ledger_id: LedgerId, first_seq: SeqNo, recorded_end: u64 },
}

pub struct ThreePhaseProvenanceIndex {
    retention: usize,
    // start -> (end exclusive, key)
    trees: BTreeMap<LedgerId, BTreeMap<u64, (u64, ThreePhaseKey)>>,
}

impl ThreePhaseProvenanceIndex {
    /// Create an index that keeps at most `retention` ranges per ledger.
    pub fn new(retention: usize) -> ThreePhaseProvenanceIndex {
        ThreePhaseProvenanceIndex {
            retention,
            trees: BTreeMap::new(),
        }
    }

    /// Record that `first_seq..=last_seq` of `ledger_id` was produced by the batch ordered at `key`.
    pub fn record(
        &mut self,
        ledger_id: LedgerId,
        first_seq: SeqNo,
        last_seq: SeqNo,
        key: ThreePhaseKey,
    ) -> Result<(), ProvenanceError> {
        if first_seq > last_seq {
            return Err(ProvenanceError::EmptyRange {
                first_seq,
                last_seq,
            });
        }

        let tree = self.trees.entry(ledger_id).or_default();
        if let Some((_, (recorded_end, _))) = tree.iter().next_back() {
            if first_seq.int() < *recorded_end {
                return Err(ProvenanceError::Overlap {
                    ledger_id,
                    first_seq,
                    recorded_end: *recorded_end,
                });
            }
        }

        tree.insert(first_seq.int(), (last_seq.int() + 1, key));
        while tree.len() > self.retention {
            if let Some(lowest) = tree.keys().next().copied() {
                tree.remove(&lowest);
            }
        }

        Ok(())
    }

    /// Find the range of `ledger_id` containing `seq_no`.
    pub fn lookup(&self, ledger_id: LedgerId, seq_no: SeqNo) -> Option<ProvenanceEntry> {
        let tree = self.trees.get(&ledger_id)?;
        let (start, (end, key)) = tree.range(..=seq_no.int()).next_back()?;
        if seq_no.int() < *end {
            Some(ProvenanceEntry {
                seq_range: *start..*end,
                ledger_id,
                key: *key,
            })
        } else {
            None
        }
    }

    /// Number of ranges currently retained for `ledger_id`.
    pub fn len(&self, ledger_id: LedgerId) -> usize {
        self.trees.get(&ledger_id).map_or(0, BTreeMap::len)
    }
}
