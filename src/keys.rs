/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Loading and storing the node's signing key.
//!
//! Keys are stored on disk as the Base64 encoding of the 32-byte Ed25519 seed, optionally followed by
//! whitespace.

use std::{fs, io, path::Path};

use base64::{engine::general_purpose::STANDARD, Engine as _};
use ed25519_dalek::SigningKey;

use crate::errors::FatalError;

/// Read the signing key stored at `path`. A file that is missing, unreadable, or does not contain a
/// valid key is reported as [`FatalError::KeysNotFound`].
pub fn load_signing_key(path: &Path) -> Result<SigningKey, FatalError> {
    let not_found = || FatalError::KeysNotFound {
        path: path.to_path_buf(),
    };

    let encoded = fs::read_to_string(path).map_err(|err| {
        log::error!("Could not read signing key at {}: {}", path.display(), err);
        not_found()
    })?;
    let decoded = STANDARD.decode(encoded.trim()).map_err(|_| not_found())?;
    let seed: [u8; 32] = decoded.try_into().map_err(|_| not_found())?;

    Ok(SigningKey::from_bytes(&seed))
}

/// Write `signing_key` to `path` in the format read by [`load_signing_key`].
pub fn store_signing_key(path: &Path, signing_key: &SigningKey) -> io::Result<()> {
    fs::write(path, STANDARD.encode(signing_key.to_bytes()))
}
