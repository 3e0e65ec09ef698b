/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Pluggable checks run on every client request before it is acknowledged.
//!
//! Verifiers are registered on a [`NodePluginRegistry`] which is handed to the node when it is built.
//! There is no process-wide registry.

use crate::types::request::Request;

pub trait RequestVerifier: Send {
    /// Name used in logs.
    fn name(&self) -> &str;

    /// Check `request`, returning a reason to reject it.
    fn verify(&self, request: &Request) -> Result<(), String>;
}

#[derive(Default)]
pub struct NodePluginRegistry {
    verifiers: Vec<Box<dyn RequestVerifier>>,
}

impl NodePluginRegistry {
    pub fn new() -> NodePluginRegistry {
        NodePluginRegistry::default()
    }

    pub fn register(&mut self, verifier: Box<dyn RequestVerifier>) {
        log::debug!("Registered request verifier {}", verifier.name());
        self.verifiers.push(verifier);
    }

    /// Run every verifier on `request`, stopping at the first that rejects it.
    pub fn verify(&self, request: &Request) -> Result<(), String> {
        for verifier in &self.verifiers {
            verifier.verify(request).map_err(|reason| {
                log::debug!("Request {} rejected by {}: {}", request.key(), verifier.name(), reason);
                reason
            })?;
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.verifiers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.verifiers.is_empty()
    }
}
