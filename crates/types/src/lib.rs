// Path: crates/types/src/lib.rs
#![cfg_attr(
    not(test),
    deny(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::panic,
        clippy::unimplemented,
        clippy::todo
    )
)]

//! Core data structures for the verse store layer: wire messages, the
//! canonical protobuf codec, address/key encoding, Argon2id helpers, the
//! keypair wrapper, and the error types shared by every other crate.

pub mod codec;
pub mod crypto;
pub mod error;
pub mod hashing;
pub mod instant;
pub mod key;
pub mod pb;

pub use error::{CryptoError, DatastoreError, ErrorCode, NetworkError, StoreError};
