/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Reason codes attached to suspicions raised against peers.

use std::fmt::{self, Display, Formatter};

use borsh::{BorshDeserialize, BorshSerialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, BorshSerialize, BorshDeserialize)]
pub enum SuspicionCode {
    /// A PRE-PREPARE's digest does not match the requests it references.
    PprDigestWrong,
    /// A PRE-PREPARE rejects requests that should have been accepted.
    PprRejectWrong,
    /// A PRE-PREPARE's transaction root does not match the one computed locally.
    PprTxnWrong,
    /// A PRE-PREPARE's state root does not match the one computed locally.
    PprStateWrong,
    /// The master instance's throughput is too low relative to the backups.
    PrimaryDegraded,
    /// The master primary has been disconnected for longer than the grace period.
    PrimaryDisconnected,
    /// A started view change did not complete in time.
    InstanceChangeTimeout,
    /// A message carried a signature that does not verify.
    InvalidSignature,
    /// A PROPAGATE carried a request that failed authentication.
    InvalidPropagate,
    /// A `ViewChangeDone` names a primary other than the one the round robin selects.
    WrongPrimaryInViewChangeDone,
}

impl SuspicionCode {
    /// Numeric code for logs and wire compatibility.
    pub fn code(&self) -> u16 {
        match self {
            SuspicionCode::PprDigestWrong => 17,
            SuspicionCode::PprRejectWrong => 18,
            SuspicionCode::PprTxnWrong => 21,
            SuspicionCode::PprStateWrong => 23,
            SuspicionCode::PrimaryDegraded => 25,
            SuspicionCode::PrimaryDisconnected => 26,
            SuspicionCode::InstanceChangeTimeout => 28,
            SuspicionCode::InvalidSignature => 30,
            SuspicionCode::InvalidPropagate => 31,
            SuspicionCode::WrongPrimaryInViewChangeDone => 40,
        }
    }

    pub fn reason(&self) -> &'static str {
        match self {
            SuspicionCode::PprDigestWrong => "pre-prepare digest incorrect",
            SuspicionCode::PprRejectWrong => "pre-prepare reject incorrect",
            SuspicionCode::PprTxnWrong => "pre-prepare txn root incorrect",
            SuspicionCode::PprStateWrong => "pre-prepare state root incorrect",
            SuspicionCode::PrimaryDegraded => "master primary degraded",
            SuspicionCode::PrimaryDisconnected => "master primary disconnected",
            SuspicionCode::InstanceChangeTimeout => "view change did not complete in time",
            SuspicionCode::InvalidSignature => "invalid signature",
            SuspicionCode::InvalidPropagate => "propagate with invalid request",
            SuspicionCode::WrongPrimaryInViewChangeDone => "view change done names wrong primary",
        }
    }

    /// Whether a suspicion with this code against the master primary warrants an instance change.
    pub fn triggers_instance_change(&self) -> bool {
        matches!(
            self,
            SuspicionCode::PprDigestWrong
                | SuspicionCode::PprRejectWrong
                | SuspicionCode::PprTxnWrong
                | SuspicionCode::PprStateWrong
        )
    }
}

impl Display for SuspicionCode {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.reason(), self.code())
    }
}

#[cfg(test)]
mod tests {
    use super::SuspicionCode;

    #[test]
    fn instance_change_whitelist_test() {
        let triggering: Vec<SuspicionCode> = [
            SuspicionCode::PprDigestWrong,
            SuspicionCode::PprRejectWrong,
            SuspicionCode::PprTxnWrong,
            SuspicionCode::PprStateWrong,
            SuspicionCode::PrimaryDegraded,
            SuspicionCode::InvalidSignature,
            SuspicionCode::WrongPrimaryInViewChangeDone,
        ]
        .into_iter()
        .filter(SuspicionCode::triggers_instance_change)
        .collect();

        assert_eq!(triggering.len(), 4);
        assert!(!triggering.contains(&SuspicionCode::PrimaryDegraded));
    }
}
