// Path: crates/store/src/traits.rs
//! The capability set every store flavor exposes.

use async_trait::async_trait;
use verse_datastore::query::{Entry, Query};
use verse_types::error::StoreError;

/// One CRDT store, of whatever flavor. Consumers hold it behind this
/// interface and must call [`KvStore::close`] exactly once.
#[async_trait]
pub trait KvStore: Send + Sync {
    /// The externally shareable identifier of this store.
    fn address(&self) -> String;

    /// False once the time limit has elapsed.
    fn is_in_time(&self) -> bool;

    /// Admits `(key, value)` locally and schedules its delta broadcast.
    /// Writing an already-present key is silently idempotent.
    async fn put(&self, key: &str, value: &[u8]) -> Result<(), StoreError>;

    /// Reads the value for `key`, unwrapped to the caller-supplied bytes.
    async fn get(&self, key: &str) -> Result<Vec<u8>, StoreError>;

    /// The length of the stored value after unwrapping.
    async fn get_size(&self, key: &str) -> Result<usize, StoreError>;

    /// Point existence check.
    async fn has(&self, key: &str) -> Result<bool, StoreError>;

    /// Scans the store; filters and orders run after the scan, flavor
    /// projection after those.
    async fn query(&self, q: Query) -> Result<Vec<Entry>, StoreError>;

    /// Forces reconciliation with peers now. No-op once out of time.
    async fn sync(&self) -> Result<(), StoreError>;

    /// Seeds the store with a validator-satisfying entry so peers observe
    /// non-empty state at load.
    async fn init_put(&self, seed: &str) -> Result<(), StoreError>;

    /// True once the local replica holds at least one entry, or when the
    /// store is out of time.
    async fn load_check(&self) -> bool;

    /// Cancels the sync loop and releases broadcaster, datastore, host and
    /// (for ephemeral verses) the on-disk directory.
    async fn close(&self);
}
