// Path: crates/types/src/crypto.rs
//! Signing identities for signature-flavored stores.
//!
//! Keys are ed25519 via `libp2p::identity`. The string form of a public key
//! is its peer id: ed25519 public keys are small enough that the multihash
//! inside the peer id is identity-coded, so the original key can always be
//! re-extracted from the string. This is what lets validators verify
//! signatures from nothing but the first segment of a composite key.

use std::str::FromStr;

use libp2p::identity::{Keypair, PublicKey};
use libp2p::PeerId;
use multihash::Multihash;

use crate::error::CryptoError;

/// The multihash code for identity hashing.
const IDENTITY_CODE: u64 = 0x00;

/// Generates a fresh ed25519 keypair.
pub fn generate_keypair() -> Keypair {
    Keypair::generate_ed25519()
}

/// Renders a public key as its base58 peer-id string.
pub fn pub_key_to_string(pub_key: &PublicKey) -> String {
    PeerId::from_public_key(pub_key).to_base58()
}

/// Recovers a public key from its peer-id string.
///
/// Fails if the string is not a peer id or if the embedded multihash is not
/// identity-coded (the key was too large to inline and cannot be recovered).
pub fn pub_key_from_string(s: &str) -> Result<PublicKey, CryptoError> {
    let pid = PeerId::from_str(s).map_err(|e| CryptoError::InvalidKey(e.to_string()))?;
    pub_key_from_peer_id(&pid)
}

/// Recovers a public key from a peer id with an identity-coded multihash.
pub fn pub_key_from_peer_id(pid: &PeerId) -> Result<PublicKey, CryptoError> {
    let mh: Multihash<64> = (*pid).into();
    if mh.code() != IDENTITY_CODE {
        return Err(CryptoError::InvalidKey(
            "peer id does not embed its public key".to_string(),
        ));
    }
    PublicKey::try_decode_protobuf(mh.digest())
        .map_err(|e| CryptoError::InvalidKey(e.to_string()))
}

/// Signs `data` with the private half of `keypair`.
pub fn sign(keypair: &Keypair, data: &[u8]) -> Result<Vec<u8>, CryptoError> {
    keypair
        .sign(data)
        .map_err(|e| CryptoError::Signing(e.to_string()))
}

/// Verifies `sig` over `data` against `pub_key`.
pub fn verify(pub_key: &PublicKey, data: &[u8], sig: &[u8]) -> bool {
    pub_key.verify(data, sig)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pub_key_string_roundtrip() {
        let kp = generate_keypair();
        let s = pub_key_to_string(&kp.public());
        let recovered = pub_key_from_string(&s).unwrap();
        assert_eq!(recovered, kp.public());
    }

    #[test]
    fn sign_and_verify() {
        let kp = generate_keypair();
        let sig = sign(&kp, b"meow").unwrap();
        assert!(verify(&kp.public(), b"meow", &sig));
        assert!(!verify(&kp.public(), b"woof", &sig));
    }

    #[test]
    fn verify_fails_for_other_key() {
        let a = generate_keypair();
        let b = generate_keypair();
        let sig = sign(&a, b"meow").unwrap();
        assert!(!verify(&b.public(), b"meow", &sig));
    }

    #[test]
    fn rejects_garbage_peer_id() {
        assert!(pub_key_from_string("not-a-peer-id").is_err());
    }
}
