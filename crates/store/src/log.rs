// Path: crates/store/src/log.rs
//! The log flavor: opaque keys and values over the bare base store.

use async_trait::async_trait;
use verse_datastore::query::{Entry, Query};
use verse_types::error::StoreError;

use crate::base::{BaseStore, StoreParts};
use crate::traits::KvStore;

pub struct LogStore {
    base: BaseStore,
}

impl LogStore {
    pub(crate) fn start(parts: StoreParts) -> Result<Self, StoreError> {
        Ok(LogStore {
            base: BaseStore::start(parts)?,
        })
    }
}

#[async_trait]
impl KvStore for LogStore {
    fn address(&self) -> String {
        self.base.address()
    }

    fn is_in_time(&self) -> bool {
        self.base.is_in_time()
    }

    async fn put(&self, key: &str, value: &[u8]) -> Result<(), StoreError> {
        self.base.put(key, value).await
    }

    async fn get(&self, key: &str) -> Result<Vec<u8>, StoreError> {
        self.base.get(key).await
    }

    async fn get_size(&self, key: &str) -> Result<usize, StoreError> {
        self.base.get_size(key).await
    }

    async fn has(&self, key: &str) -> Result<bool, StoreError> {
        self.base.has(key).await
    }

    async fn query(&self, q: Query) -> Result<Vec<Entry>, StoreError> {
        self.base.query(q).await
    }

    async fn sync(&self) -> Result<(), StoreError> {
        self.base.sync().await
    }

    async fn init_put(&self, seed: &str) -> Result<(), StoreError> {
        self.base.init_put(seed).await
    }

    async fn load_check(&self) -> bool {
        self.base.load_check().await
    }

    async fn close(&self) {
        self.base.close().await
    }
}
