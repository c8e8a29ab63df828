// Path: crates/datastore/src/mem.rs
//! An in-memory datastore backed by a `BTreeMap`.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::RwLock;

use verse_types::error::DatastoreError;

use crate::query::{apply_options, Entry, Query, QueryResults};
use crate::Datastore;

/// Ephemeral storage for tests and memory-only verses.
#[derive(Default)]
pub struct MemDatastore {
    entries: RwLock<BTreeMap<String, Vec<u8>>>,
    closed: AtomicBool,
}

impl MemDatastore {
    pub fn new() -> Self {
        MemDatastore::default()
    }

    fn check_open(&self) -> Result<(), DatastoreError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(DatastoreError::Closed);
        }
        Ok(())
    }

    fn read(
        &self,
    ) -> Result<std::sync::RwLockReadGuard<'_, BTreeMap<String, Vec<u8>>>, DatastoreError> {
        self.entries
            .read()
            .map_err(|e| DatastoreError::Backend(e.to_string()))
    }
}

impl Datastore for MemDatastore {
    fn put(&self, key: &str, value: &[u8]) -> Result<(), DatastoreError> {
        self.check_open()?;
        let mut entries = self
            .entries
            .write()
            .map_err(|e| DatastoreError::Backend(e.to_string()))?;
        entries.insert(key.to_string(), value.to_vec());
        Ok(())
    }

    fn get(&self, key: &str) -> Result<Vec<u8>, DatastoreError> {
        self.check_open()?;
        self.read()?.get(key).cloned().ok_or(DatastoreError::NotFound)
    }

    fn has(&self, key: &str) -> Result<bool, DatastoreError> {
        self.check_open()?;
        Ok(self.read()?.contains_key(key))
    }

    fn get_size(&self, key: &str) -> Result<usize, DatastoreError> {
        self.check_open()?;
        self.read()?
            .get(key)
            .map(Vec::len)
            .ok_or(DatastoreError::NotFound)
    }

    fn delete(&self, key: &str) -> Result<(), DatastoreError> {
        self.check_open()?;
        let mut entries = self
            .entries
            .write()
            .map_err(|e| DatastoreError::Backend(e.to_string()))?;
        entries.remove(key);
        Ok(())
    }

    fn query(&self, q: Query) -> Result<QueryResults, DatastoreError> {
        self.check_open()?;
        let scanned: Vec<Entry> = self
            .read()?
            .range(q.prefix.clone()..)
            .take_while(|(k, _)| k.starts_with(&q.prefix))
            .map(|(k, v)| Entry::new(k.clone(), v.clone()))
            .collect();
        Ok(QueryResults::new(apply_options(scanned, &q)))
    }

    fn close(&self) -> Result<(), DatastoreError> {
        self.closed.store(true, Ordering::Release);
        Ok(())
    }
}
