// Path: crates/datastore/src/lib.rs
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

//! Local key-value storage for verse replicas.
//!
//! A [`Datastore`] is the flat namespace one CRDT replica lives in. Two
//! implementations are provided: [`MemDatastore`] for tests and ephemeral
//! verses, and [`RedbDatastore`] for on-disk persistence with a directory
//! lock. The query engine in [`query`] is shared by both.

pub mod mem;
pub mod query;
pub mod redb_store;

pub use mem::MemDatastore;
pub use query::{
    CategoryOrder, Entry, Filter, KeyExistFilter, KeyMatchFilter, Order, Query, QueryResults,
    UpdatableOrder, ValueMatchFilter,
};
pub use redb_store::RedbDatastore;
use verse_types::error::DatastoreError;

/// The storage interface a CRDT replica is built on.
///
/// Operations are short and synchronous; callers on async tasks treat a
/// datastore hit as non-blocking. `delete` exists for internal CRDT
/// bookkeeping (head markers) only; user-visible namespaces are
/// append-only.
pub trait Datastore: Send + Sync {
    fn put(&self, key: &str, value: &[u8]) -> Result<(), DatastoreError>;
    fn get(&self, key: &str) -> Result<Vec<u8>, DatastoreError>;
    fn has(&self, key: &str) -> Result<bool, DatastoreError>;
    fn get_size(&self, key: &str) -> Result<usize, DatastoreError>;
    fn delete(&self, key: &str) -> Result<(), DatastoreError>;
    fn query(&self, q: Query) -> Result<QueryResults, DatastoreError>;
    fn close(&self) -> Result<(), DatastoreError>;
}
