/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Verification of client request signatures.
//!
//! Identities registered on the domain ledger are verified with the verifying key they were registered
//! with. Any other identifier is treated as a cryptonym: its bytes are the verifying key.

use std::collections::HashMap;

use crate::types::{
    crypto_primitives::verify,
    data_types::{Identifier, VerifyingKeyBytes},
    request::{Request, Role},
};

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AuthenticationError {
    MissingSignature,
    InvalidSignature,
}

#[derive(Clone, Default)]
pub struct ClientAuthenticator {
    identities: HashMap<Identifier, (VerifyingKeyBytes, Option<Role>)>,
}

impl ClientAuthenticator {
    pub fn new() -> ClientAuthenticator {
        ClientAuthenticator::default()
    }

    /// Register or update the verifying key and role of `identifier`.
    pub fn add_idr(&mut self, identifier: Identifier, verkey: VerifyingKeyBytes, role: Option<Role>) {
        self.identities.insert(identifier, (verkey, role));
    }

    pub fn get_role(&self, identifier: &Identifier) -> Option<Role> {
        self.identities.get(identifier).and_then(|(_, role)| *role)
    }

    pub fn get_verkey(&self, identifier: &Identifier) -> VerifyingKeyBytes {
        self.identities
            .get(identifier)
            .map(|(verkey, _)| *verkey)
            .unwrap_or(identifier.bytes())
    }

    /// Check the signature of `request`, returning its author.
    pub fn authenticate(&self, request: &Request) -> Result<Identifier, AuthenticationError> {
        let signature = request
            .signature
            .as_ref()
            .ok_or(AuthenticationError::MissingSignature)?;
        verify(
            &self.get_verkey(&request.identifier),
            &request.signing_bytes(),
            signature,
        )
        .map_err(|_| AuthenticationError::InvalidSignature)?;
        Ok(request.identifier)
    }
}
