// Path: crates/store/src/updatable.rs
//! The updatable flavor.
//!
//! Every write appends a UTC-timestamp suffix, so one logical key keeps
//! all of its historical versions. Reads resolve to the newest version;
//! `query` de-duplicates per category, `query_all` exposes the history.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use verse_datastore::query::{CategoryOrder, Entry, Query, UpdatableOrder};
use verse_types::error::StoreError;
use verse_types::key::{category_of, make_time_key, split_segments, trim_key};

use crate::access::AccessController;
use crate::base::{BaseStore, StoreParts};
use crate::traits::KvStore;

/// Appends the category then newest-first orders unless the caller
/// supplied its own.
pub(crate) fn with_updatable_orders(mut q: Query) -> Query {
    if q.orders.is_empty() {
        q.orders = vec![Arc::new(CategoryOrder), Arc::new(UpdatableOrder)];
    }
    q
}

/// Keeps the newest entry per category. Assumes category-then-time order.
pub(crate) fn dedup_categories(entries: Vec<Entry>) -> Vec<Entry> {
    let mut out: Vec<Entry> = Vec::new();
    let mut current: Option<String> = None;
    for entry in entries {
        let Some(category) = category_of(&entry.key) else {
            continue;
        };
        if current.as_deref() != Some(category.as_str()) {
            current = Some(category);
            out.push(entry);
        }
    }
    out
}

pub struct UpdatableStore {
    base: BaseStore,
    ac: Option<Arc<AccessController>>,
}

impl UpdatableStore {
    pub(crate) fn start(
        parts: StoreParts,
        ac: Option<Arc<AccessController>>,
    ) -> Result<Self, StoreError> {
        Ok(UpdatableStore {
            base: BaseStore::start(parts)?,
            ac,
        })
    }

    async fn verify_access(&self, key: &str) -> Result<(), StoreError> {
        let Some(ac) = &self.ac else {
            return Ok(());
        };
        let segments = split_segments(key);
        let id = segments.first().copied().unwrap_or_default();
        if id.is_empty() {
            return Err(StoreError::InvalidKey("empty access id".to_string()));
        }
        if ac.verify(id).await? {
            return Ok(());
        }
        Err(StoreError::PermissionDenied(key.to_string()))
    }

    /// Newest entry under `key`, raw.
    async fn head_entry(&self, key: &str, keys_only: bool) -> Result<Option<Entry>, StoreError> {
        let entries = self
            .base
            .query(Query {
                prefix: key.to_string(),
                orders: vec![Arc::new(UpdatableOrder)],
                limit: 1,
                keys_only,
                returns_sizes: true,
                ..Query::default()
            })
            .await?;
        Ok(entries.into_iter().next())
    }

    async fn ac_retain(&self, entries: Vec<Entry>) -> Result<Vec<Entry>, StoreError> {
        let Some(ac) = &self.ac else {
            return Ok(entries);
        };
        let mut kept = Vec::with_capacity(entries.len());
        for entry in entries {
            let segments = split_segments(&entry.key);
            let id = segments.first().copied().unwrap_or_default();
            if ac.verify(id).await? {
                kept.push(entry);
            }
        }
        Ok(kept)
    }

    /// Every historical version, newest first within each category.
    pub async fn query_all(&self, q: Query) -> Result<Vec<Entry>, StoreError> {
        let entries = self.base.query(with_updatable_orders(q)).await?;
        self.ac_retain(entries).await
    }
}

#[async_trait]
impl KvStore for UpdatableStore {
    fn address(&self) -> String {
        match &self.ac {
            Some(ac) => format!("{}/{}", self.base.address(), ac.address()),
            None => self.base.address(),
        }
    }

    fn is_in_time(&self) -> bool {
        self.base.is_in_time()
    }

    async fn put(&self, key: &str, value: &[u8]) -> Result<(), StoreError> {
        self.verify_access(key).await?;
        let full = format!("{}/{}", trim_key(key), make_time_key(Utc::now()));
        self.base.put(&full, value).await
    }

    async fn get(&self, key: &str) -> Result<Vec<u8>, StoreError> {
        self.verify_access(key).await?;
        match self.head_entry(key, false).await? {
            Some(entry) => Ok(entry.value),
            None => Err(StoreError::NotFound),
        }
    }

    async fn get_size(&self, key: &str) -> Result<usize, StoreError> {
        self.verify_access(key).await?;
        match self.head_entry(key, true).await? {
            Some(entry) => Ok(entry.size),
            None => Err(StoreError::NotFound),
        }
    }

    async fn has(&self, key: &str) -> Result<bool, StoreError> {
        self.verify_access(key).await?;
        Ok(self.head_entry(key, true).await?.is_some())
    }

    async fn query(&self, q: Query) -> Result<Vec<Entry>, StoreError> {
        let entries = self.base.query(with_updatable_orders(q)).await?;
        let entries = self.ac_retain(entries).await?;
        Ok(dedup_categories(entries))
    }

    async fn sync(&self) -> Result<(), StoreError> {
        self.base.sync().await
    }

    async fn init_put(&self, seed: &str) -> Result<(), StoreError> {
        self.put(seed, &crate::util::rand_bytes(8)).await
    }

    async fn load_check(&self) -> bool {
        self.base.load_check().await
    }

    async fn close(&self) {
        self.base.close().await
    }
}
