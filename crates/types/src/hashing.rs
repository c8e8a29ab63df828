// Path: crates/types/src/hashing.rs
//! Argon2id helpers.
//!
//! All internal hashing goes through Argon2id with fixed cost parameters:
//! one pass, 64 MiB, four lanes. Output lengths differ per use and are part
//! of the cross-implementation contract: 32 bytes for store-name
//! fingerprints, 64 bytes for access-key derivation, 128 bytes for the deep
//! hash behind hash-flavored keys. Changing any of these breaks interop.

use argon2::{Algorithm, Argon2, Params, Version};
use base64::engine::general_purpose::URL_SAFE;
use base64::Engine;

use crate::error::CryptoError;

/// Output length for store-name / address fingerprints.
pub const FINGERPRINT_LEN: usize = 32;
/// Output length for access-key derivation.
pub const ACCESS_LEN: usize = 64;
/// Output length for the deep hash behind hash-flavored keys.
pub const DEEP_LEN: usize = 128;

const TIME_COST: u32 = 1;
const MEMORY_KIB: u32 = 64 * 1024;
const LANES: u32 = 4;

/// Derives `out_len` bytes of Argon2id output from `data` and `salt`.
pub fn argon2id(data: &[u8], salt: &[u8], out_len: usize) -> Result<Vec<u8>, CryptoError> {
    let params = Params::new(MEMORY_KIB, TIME_COST, LANES, Some(out_len))
        .map_err(|e| CryptoError::Derivation(e.to_string()))?;
    let argon = Argon2::new(Algorithm::Argon2id, Version::V0x13, params);

    let mut out = vec![0u8; out_len];
    argon
        .hash_password_into(data, salt, &mut out)
        .map_err(|e| CryptoError::Derivation(e.to_string()))?;
    Ok(out)
}

/// Derives Argon2id output and returns it URL-safe base64 encoded.
pub fn argon2id_b64(data: &[u8], salt: &[u8], out_len: usize) -> Result<String, CryptoError> {
    Ok(URL_SAFE.encode(argon2id(data, salt, out_len)?))
}

/// Builds the deep-hashed key of a hash-flavored store: the base key is
/// base64 encoded first, then hashed to [`DEEP_LEN`] bytes.
pub fn make_hash_key(base_hash: &str, salt: &[u8]) -> Result<String, CryptoError> {
    let encoded = URL_SAFE.encode(base_hash.as_bytes());
    argon2id_b64(encoded.as_bytes(), salt, DEEP_LEN)
}
