// Path: crates/store/src/validator.rs
//! The validator set.
//!
//! A validator is a pure predicate over `(key, value)` used both when a
//! flavor admits a local write and when inbound gossip deltas are triaged.
//! Every flavored validator wraps the base check, so the time limit always
//! has veto. Validators observe the store's in-time flag through a shared
//! [`InTime`] handle instead of owning the store.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::Utc;
use verse_types::codec;
use verse_types::crypto;
use verse_types::hashing;
use verse_types::key::{split_segments, time_of_key, trim_key};
use verse_types::pb::{HashData, SignatureData};

/// The monotonic in-time flag shared by a store and its validator. Flips
/// true to false exactly once, never back.
#[derive(Clone)]
pub struct InTime(Arc<AtomicBool>);

impl InTime {
    pub fn new(initial: bool) -> Self {
        InTime(Arc::new(AtomicBool::new(initial)))
    }

    pub fn get(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }

    /// Turns the flag off. There is no way to turn it back on.
    pub fn expire(&self) {
        self.0.store(false, Ordering::Release);
    }
}

/// The admission predicate of one store flavor.
pub enum StoreValidator {
    Log(InTime),
    Hash(InTime),
    Signature(InTime),
    Updatable(InTime),
    UpdatableSignature(InTime),
}

impl StoreValidator {
    pub fn in_time(&self) -> &InTime {
        match self {
            StoreValidator::Log(t)
            | StoreValidator::Hash(t)
            | StoreValidator::Signature(t)
            | StoreValidator::Updatable(t)
            | StoreValidator::UpdatableSignature(t) => t,
        }
    }

    /// Decides whether `(key, value)` may be admitted. Deterministic apart
    /// from the in-time flag and the clock bound on updatable timestamps.
    pub fn validate(&self, key: &str, value: &[u8]) -> bool {
        if !self.in_time().get() {
            return false;
        }
        match self {
            StoreValidator::Log(_) => true,
            StoreValidator::Hash(_) => validate_hash(key, value),
            StoreValidator::Signature(_) => validate_signature(key, value),
            StoreValidator::Updatable(_) => validate_updatable(key),
            StoreValidator::UpdatableSignature(_) => {
                validate_updatable(key) && validate_signature(key, value)
            }
        }
    }
}

/// The key must equal the Argon2id digest of the wrapped preimage.
fn validate_hash(key: &str, value: &[u8]) -> bool {
    let Ok(data) = codec::from_bytes_canonical::<HashData>(value) else {
        return false;
    };
    let Ok(expected) = hashing::make_hash_key(&data.base_hash, &data.salt) else {
        return false;
    };
    trim_key(key) == expected
}

/// The first key segment names the signer; the signature must verify over
/// the wrapped value.
fn validate_signature(key: &str, value: &[u8]) -> bool {
    let segments = split_segments(key);
    let Some(id) = segments.first() else {
        return false;
    };
    let Ok(pub_key) = crypto::pub_key_from_string(id) else {
        return false;
    };
    let Ok(data) = codec::from_bytes_canonical::<SignatureData>(value) else {
        return false;
    };
    crypto::verify(&pub_key, &data.value, &data.sign)
}

/// The last key segment must decode to a UTC timestamp that is not in the
/// future. Clock skew is not reconciled.
fn validate_updatable(key: &str) -> bool {
    let Ok(t) = time_of_key(key) else {
        return false;
    };
    let is_utc = t.offset().local_minus_utc() == 0;
    is_utc && t.with_timezone(&Utc) < Utc::now()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use verse_types::key::make_time_key;

    fn hash_entry(base: &str, salt: &[u8], value: &[u8]) -> (String, Vec<u8>) {
        let key = hashing::make_hash_key(base, salt).unwrap();
        let data = HashData {
            base_hash: base.to_string(),
            salt: salt.to_vec(),
            value: value.to_vec(),
        };
        (key, codec::to_bytes_canonical(&data))
    }

    fn signed_entry(kp: &libp2p::identity::Keypair, user_key: &str, value: &[u8]) -> (String, Vec<u8>) {
        let sign = crypto::sign(kp, value).unwrap();
        let data = SignatureData {
            value: value.to_vec(),
            sign,
        };
        let pid = crypto::pub_key_to_string(&kp.public());
        (format!("{pid}/{user_key}"), codec::to_bytes_canonical(&data))
    }

    #[test]
    fn log_validator_is_the_in_time_flag() {
        let t = InTime::new(true);
        let v = StoreValidator::Log(t.clone());
        assert!(v.validate("/anything", b"x"));
        t.expire();
        assert!(!v.validate("/anything", b"x"));
    }

    #[test]
    fn hash_validator_checks_the_key_derivation() {
        let v = StoreValidator::Hash(InTime::new(true));
        let (key, value) = hash_entry("aaa", &[1u8; 8], b"meow");
        assert!(v.validate(&key, &value));
        assert!(v.validate(&format!("/{key}"), &value));
        assert!(!v.validate("wrong-key", &value));
        assert!(!v.validate(&key, b"not-protobuf-hashdata"));
    }

    #[test]
    fn signature_validator_verifies_against_the_key_segment() {
        let v = StoreValidator::Signature(InTime::new(true));
        let kp = crypto::generate_keypair();
        let (key, value) = signed_entry(&kp, "aaa", b"meow");
        assert!(v.validate(&key, &value));

        // Forged value under the same key fails.
        let other = crypto::generate_keypair();
        let (_, forged) = signed_entry(&other, "aaa", b"meow");
        assert!(!v.validate(&key, &forged));
    }

    #[test]
    fn updatable_validator_rejects_future_timestamps() {
        let v = StoreValidator::Updatable(InTime::new(true));
        let past = make_time_key(Utc::now() - Duration::seconds(1));
        let future = make_time_key(Utc::now() + Duration::seconds(60));
        assert!(v.validate(&format!("aaa/{past}"), b"x"));
        assert!(!v.validate(&format!("aaa/{future}"), b"x"));
        assert!(!v.validate("aaa/not-base64-time", b"x"));
    }

    #[test]
    fn updatable_signature_composes_both_checks() {
        let v = StoreValidator::UpdatableSignature(InTime::new(true));
        let kp = crypto::generate_keypair();
        let past = make_time_key(Utc::now() - Duration::seconds(1));
        let (key, value) = {
            let sign = crypto::sign(&kp, b"meow").unwrap();
            let data = SignatureData {
                value: b"meow".to_vec(),
                sign,
            };
            let pid = crypto::pub_key_to_string(&kp.public());
            (
                format!("{pid}/aaa/{past}"),
                codec::to_bytes_canonical(&data),
            )
        };
        assert!(v.validate(&key, &value));

        let future = make_time_key(Utc::now() + Duration::seconds(60));
        let pid = crypto::pub_key_to_string(&kp.public());
        assert!(!v.validate(&format!("{pid}/aaa/{future}"), &value));
    }

    #[test]
    fn expired_flag_vetoes_every_flavor() {
        let t = InTime::new(false);
        let kp = crypto::generate_keypair();
        let (key, value) = signed_entry(&kp, "aaa", b"meow");
        assert!(!StoreValidator::Signature(t.clone()).validate(&key, &value));
        let (hkey, hvalue) = hash_entry("aaa", &[1u8; 8], b"meow");
        assert!(!StoreValidator::Hash(t).validate(&hkey, &hvalue));
    }
}
