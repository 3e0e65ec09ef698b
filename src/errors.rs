/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! The error type returned by the node's message handlers.
//!
//! Every variant except [`NodeError::Fatal`] is recoverable: it is matched at the message-handling
//! boundary where it is detected, logged, and possibly turned into a NACK, a REJECT, a blacklisting,
//! or an instance change. Only `Fatal` is allowed to abort initialization.

use std::{
    fmt::{self, Display, Formatter},
    path::PathBuf,
};

use ed25519_dalek::VerifyingKey;

use crate::{
    ledger::LedgerError,
    types::{
        data_types::{Identifier, RequestKey},
        suspicion::SuspicionCode,
    },
};

#[derive(Debug)]
pub enum NodeError {
    /// A peer violated the protocol in a way that suggests it is faulty.
    Suspicious {
        node: VerifyingKey,
        reason: String,
        code: SuspicionCode,
    },

    /// A client sent a request that failed authentication.
    SuspiciousClient { identifier: Identifier, reason: String },

    /// A client request is missing required fields.
    InvalidClientRequest { key: RequestKey, reason: String },

    /// A client request was well formed but failed validation.
    RequestNack { key: RequestKey, reason: String },

    /// A message could not be interpreted.
    Malformed { reason: String },

    /// A message refers to a view, instance, or batch that is no longer relevant.
    Stale { reason: String },

    /// Reading from or writing to a ledger failed.
    Ledger(LedgerError),

    /// The node cannot continue running.
    Fatal(FatalError),
}

impl NodeError {
    /// Whether the error should abort the node.
    pub fn is_fatal(&self) -> bool {
        matches!(self, NodeError::Fatal(_))
    }
}

impl From<LedgerError> for NodeError {
    fn from(value: LedgerError) -> Self {
        NodeError::Ledger(value)
    }
}

impl From<FatalError> for NodeError {
    fn from(value: FatalError) -> Self {
        NodeError::Fatal(value)
    }
}

impl Display for NodeError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            NodeError::Suspicious { reason, code, .. } => {
                write!(f, "suspicious node: {} ({})", reason, code.code())
            }
            NodeError::SuspiciousClient { reason, .. } => write!(f, "suspicious client: {}", reason),
            NodeError::InvalidClientRequest { reason, .. } => {
                write!(f, "invalid client request: {}", reason)
            }
            NodeError::RequestNack { reason, .. } => write!(f, "request rejected: {}", reason),
            NodeError::Malformed { reason } => write!(f, "malformed message: {}", reason),
            NodeError::Stale { reason } => write!(f, "stale message: {}", reason),
            NodeError::Ledger(err) => write!(f, "ledger error: {:?}", err),
            NodeError::Fatal(err) => write!(f, "fatal: {}", err),
        }
    }
}

/// Conditions under which the node cannot be initialized.
#[derive(Debug)]
pub enum FatalError {
    /// The node's signing key could not be loaded from `path`.
    KeysNotFound { path: PathBuf },

    /// The persisted ledgers could not be opened or recovered.
    LedgerRecoveryFailed(LedgerError),
}

impl Display for FatalError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            FatalError::KeysNotFound { path } => write!(f, "keys not found at {}", path.display()),
            FatalError::LedgerRecoveryFailed(err) => write!(f, "ledger recovery failed: {:?}", err),
        }
    }
}
