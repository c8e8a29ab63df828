// Path: crates/store/src/util.rs
//! Small randomness helpers used by store construction and seeding.

use rand::distributions::Alphanumeric;
use rand::{thread_rng, Rng, RngCore};

/// A random alphanumeric string of length `len`.
pub fn rand_string(len: usize) -> String {
    thread_rng()
        .sample_iter(&Alphanumeric)
        .take(len)
        .map(char::from)
        .collect()
}

/// `len` random bytes.
pub fn rand_bytes(len: usize) -> Vec<u8> {
    let mut out = vec![0u8; len];
    thread_rng().fill_bytes(&mut out);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rand_string_has_requested_length() {
        assert_eq!(rand_string(32).len(), 32);
    }

    #[test]
    fn rand_bytes_are_not_constant() {
        assert_ne!(rand_bytes(16), rand_bytes(16));
    }
}
