// Path: crates/store/src/lib.rs
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

//! Flavored CRDT stores over a gossip-broadcast delta DAG.
//!
//! A [`Verse`] constructs stores: it spawns a peer host, opens the local
//! datastore, joins the store's gossip topic with a validator, attaches the
//! CRDT broadcaster, bootstraps the overlay and starts the sync loop. Five
//! flavors share the base store: log (opaque), hash (Argon2id-keyed),
//! signature (identity-keyed, signed values), updatable (timestamped
//! versions) and updatable-signature. An [`AccessController`] gates writes
//! and reads of any flavor through signed capabilities.

pub mod access;
pub mod base;
pub mod broadcast;
pub mod crdt;
pub mod dag;
pub mod hash;
pub mod log;
pub mod signature;
pub mod telemetry;
pub mod traits;
pub mod updatable;
pub mod updatable_signature;
pub mod util;
pub mod validator;
pub mod verse;

mod loopback;

#[cfg(test)]
mod tests;

pub use access::AccessController;
pub use hash::HashStore;
pub use log::LogStore;
pub use signature::SignatureStore;
pub use traits::KvStore;
pub use updatable::UpdatableStore;
pub use updatable_signature::UpdatableSignatureStore;
pub use verse::{sample_host_gen, HostGenerator, StoreKind, StoreOpts, Verse};

pub use verse_datastore::query::{
    Entry, KeyExistFilter, KeyMatchFilter, Query, ValueMatchFilter,
};
