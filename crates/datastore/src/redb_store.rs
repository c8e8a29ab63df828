// Path: crates/datastore/src/redb_store.rs
//! Persistent storage: one redb database per store directory.
//!
//! The directory carries an exclusive lock file so exactly one replica
//! instance owns it; a second open surfaces [`DatastoreError::Locked`],
//! which the load path treats as retryable.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

use redb::{Database, ReadableTable, TableDefinition};
use verse_types::error::DatastoreError;

use crate::query::{apply_options, Entry, Query, QueryResults};
use crate::Datastore;

const ENTRIES: TableDefinition<&str, &[u8]> = TableDefinition::new("ENTRIES");
const LOCK_FILE: &str = "LOCK";
const DB_FILE: &str = "store.redb";

fn backend(e: impl ToString) -> DatastoreError {
    DatastoreError::Backend(e.to_string())
}

/// On-disk datastore with an exclusive directory lock.
pub struct RedbDatastore {
    db: Database,
    dir: PathBuf,
    closed: AtomicBool,
}

impl RedbDatastore {
    /// Opens (or creates) the datastore under `dir`, taking the directory
    /// lock. Fails with [`DatastoreError::Locked`] when another instance
    /// holds it.
    pub fn open(dir: &Path) -> Result<Self, DatastoreError> {
        fs::create_dir_all(dir).map_err(backend)?;

        let lock_path = dir.join(LOCK_FILE);
        match fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&lock_path)
        {
            Ok(_) => {}
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                return Err(DatastoreError::Locked(dir.display().to_string()));
            }
            Err(e) => return Err(backend(e)),
        }

        let db = Database::create(dir.join(DB_FILE)).map_err(|e| {
            let _ = fs::remove_file(&lock_path);
            backend(e)
        })?;

        // Ensure the table exists so reads never race its creation.
        let txn = db.begin_write().map_err(backend)?;
        txn.open_table(ENTRIES).map_err(backend)?;
        txn.commit().map_err(backend)?;

        Ok(RedbDatastore {
            db,
            dir: dir.to_path_buf(),
            closed: AtomicBool::new(false),
        })
    }

    /// The directory this datastore owns.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn check_open(&self) -> Result<(), DatastoreError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(DatastoreError::Closed);
        }
        Ok(())
    }

    fn read_entry(&self, key: &str) -> Result<Option<Vec<u8>>, DatastoreError> {
        let txn = self.db.begin_read().map_err(backend)?;
        let table = txn.open_table(ENTRIES).map_err(backend)?;
        let value = table.get(key).map_err(backend)?.map(|v| v.value().to_vec());
        Ok(value)
    }
}

impl Datastore for RedbDatastore {
    fn put(&self, key: &str, value: &[u8]) -> Result<(), DatastoreError> {
        self.check_open()?;
        let txn = self.db.begin_write().map_err(backend)?;
        {
            let mut table = txn.open_table(ENTRIES).map_err(backend)?;
            table.insert(key, value).map_err(backend)?;
        }
        txn.commit().map_err(backend)?;
        Ok(())
    }

    fn get(&self, key: &str) -> Result<Vec<u8>, DatastoreError> {
        self.check_open()?;
        self.read_entry(key)?.ok_or(DatastoreError::NotFound)
    }

    fn has(&self, key: &str) -> Result<bool, DatastoreError> {
        self.check_open()?;
        Ok(self.read_entry(key)?.is_some())
    }

    fn get_size(&self, key: &str) -> Result<usize, DatastoreError> {
        self.check_open()?;
        self.read_entry(key)?
            .map(|v| v.len())
            .ok_or(DatastoreError::NotFound)
    }

    fn delete(&self, key: &str) -> Result<(), DatastoreError> {
        self.check_open()?;
        let txn = self.db.begin_write().map_err(backend)?;
        {
            let mut table = txn.open_table(ENTRIES).map_err(backend)?;
            table.remove(key).map_err(backend)?;
        }
        txn.commit().map_err(backend)?;
        Ok(())
    }

    fn query(&self, q: Query) -> Result<QueryResults, DatastoreError> {
        self.check_open()?;
        let txn = self.db.begin_read().map_err(backend)?;
        let table = txn.open_table(ENTRIES).map_err(backend)?;

        let mut scanned = Vec::new();
        for item in table.range(q.prefix.as_str()..).map_err(backend)? {
            let (key, value) = item.map_err(backend)?;
            let key = key.value();
            if !key.starts_with(&q.prefix) {
                break;
            }
            scanned.push(Entry::new(key, value.value().to_vec()));
        }
        Ok(QueryResults::new(apply_options(scanned, &q)))
    }

    fn close(&self) -> Result<(), DatastoreError> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        let _ = fs::remove_file(self.dir.join(LOCK_FILE));
        Ok(())
    }
}

impl Drop for RedbDatastore {
    fn drop(&mut self) {
        if !self.closed.load(Ordering::Acquire) {
            let _ = fs::remove_file(self.dir.join(LOCK_FILE));
        }
    }
}
