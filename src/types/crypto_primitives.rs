/*
    Copyright © 2024, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Cryptographic primitives.
//!
//! The definitions and re-exports in this module provide two categories of cryptographic primitives:
//! 1. **Cryptographic Hashes**: provided by the [`sha2`] crate.
//! 2. **Digital Signatures**: provided by the [`ed25519_dalek`] crate.

use super::data_types::{CryptoHash, SignatureBytes, VerifyingKeyBytes};

// re-exports below.
pub use sha2::Digest;
pub use sha2::Sha256 as CryptoHasher;

pub use ed25519_dalek::{Signature, SignatureError, Signer, SigningKey, Verifier, VerifyingKey};

/// Hash the concatenation of `parts`.
pub fn hash_parts(parts: &[&[u8]]) -> CryptoHash {
    let mut hasher = CryptoHasher::new();
    for part in parts {
        hasher.update(part);
    }
    CryptoHash::new(hasher.finalize().into())
}

/// Sign `message` with `signing_key`.
pub fn sign(signing_key: &SigningKey, message: &[u8]) -> SignatureBytes {
    SignatureBytes::new(signing_key.sign(message).to_bytes())
}

/// Check that `signature` over `message` was produced by the holder of `verifying_key`.
pub fn verify(
    verifying_key: &VerifyingKeyBytes,
    message: &[u8],
    signature: &SignatureBytes,
) -> Result<(), SignatureError> {
    let verifying_key = VerifyingKey::from_bytes(verifying_key)?;
    let signature = Signature::from_bytes(&signature.bytes());
    verifying_key.verify(message, &signature)
}
