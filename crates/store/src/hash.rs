// Path: crates/store/src/hash.rs
//! The hash flavor.
//!
//! Writes derive the stored key from the user key with Argon2id and wrap
//! the value together with its preimage material. Reads accept either the
//! already-hashed key or the plaintext key: the direct key is tried first,
//! then the reader re-hashes and retries.

use std::sync::Arc;

use async_trait::async_trait;
use verse_datastore::query::{Entry, Query};
use verse_types::codec;
use verse_types::error::StoreError;
use verse_types::hashing::make_hash_key;
use verse_types::key::trim_key;
use verse_types::pb::HashData;

use crate::access::AccessController;
use crate::base::{BaseStore, StoreParts};
use crate::traits::KvStore;
use crate::util::rand_bytes;

pub struct HashStore {
    base: BaseStore,
    salt: Vec<u8>,
    ac: Option<Arc<AccessController>>,
}

impl HashStore {
    pub(crate) fn start(
        parts: StoreParts,
        salt: Vec<u8>,
        ac: Option<Arc<AccessController>>,
    ) -> Result<Self, StoreError> {
        Ok(HashStore {
            base: BaseStore::start(parts)?,
            salt,
            ac,
        })
    }

    pub fn salt(&self) -> &[u8] {
        &self.salt
    }

    /// Checks the read key and, failing that, the put-key derivation.
    /// Both are attempted before denial.
    async fn verify_access(&self, key: &str) -> Result<(), StoreError> {
        let Some(ac) = &self.ac else {
            return Ok(());
        };
        if ac.verify(trim_key(key)).await? {
            return Ok(());
        }
        let derived = make_hash_key(trim_key(key), &self.salt)?;
        if ac.verify(&derived).await? {
            return Ok(());
        }
        Err(StoreError::PermissionDenied(key.to_string()))
    }

    /// Fetches the wrapped entry by direct key, then by re-hashing.
    async fn resolve(&self, key: &str) -> Result<Vec<u8>, StoreError> {
        match self.base.get(key).await {
            Ok(raw) => Ok(raw),
            Err(StoreError::NotFound) => {
                let hashed = make_hash_key(trim_key(key), &self.salt)?;
                self.base.get(&hashed).await
            }
            Err(e) => Err(e),
        }
    }

    async fn ac_retain(&self, entries: Vec<Entry>) -> Result<Vec<Entry>, StoreError> {
        let Some(ac) = &self.ac else {
            return Ok(entries);
        };
        let mut kept = Vec::with_capacity(entries.len());
        for entry in entries {
            if ac.verify(trim_key(&entry.key)).await? {
                kept.push(entry);
            }
        }
        Ok(kept)
    }
}

#[async_trait]
impl KvStore for HashStore {
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
        let hashed = make_hash_key(trim_key(key), &self.salt)?;
        // The put key IS the derivation; check it once, no read fallback.
        if let Some(ac) = &self.ac {
            if !ac.verify(&hashed).await? {
                return Err(StoreError::PermissionDenied(key.to_string()));
            }
        }

        let data = HashData {
            base_hash: trim_key(key).to_string(),
            salt: self.salt.clone(),
            value: value.to_vec(),
        };
        self.base
            .put(&hashed, &codec::to_bytes_canonical(&data))
            .await
    }

    async fn get(&self, key: &str) -> Result<Vec<u8>, StoreError> {
        self.verify_access(key).await?;
        let raw = self.resolve(key).await?;
        let data: HashData = codec::from_bytes_canonical(&raw).map_err(StoreError::Decode)?;
        Ok(data.value)
    }

    async fn get_size(&self, key: &str) -> Result<usize, StoreError> {
        Ok(self.get(key).await?.len())
    }

    async fn has(&self, key: &str) -> Result<bool, StoreError> {
        self.verify_access(key).await?;
        if self.base.has(key).await? {
            return Ok(true);
        }
        let hashed = make_hash_key(trim_key(key), &self.salt)?;
        self.base.has(&hashed).await
    }

    async fn query(&self, q: Query) -> Result<Vec<Entry>, StoreError> {
        let keys_only = q.keys_only;
        let entries = self.base.query(q).await?;
        let mut entries = self.ac_retain(entries).await?;
        if !keys_only {
            // Project wrapped values back to the caller's bytes.
            for entry in &mut entries {
                let data: HashData =
                    codec::from_bytes_canonical(&entry.value).map_err(StoreError::Decode)?;
                entry.size = data.value.len();
                entry.value = data.value;
            }
        }
        Ok(entries)
    }

    async fn sync(&self) -> Result<(), StoreError> {
        self.base.sync().await
    }

    async fn init_put(&self, seed: &str) -> Result<(), StoreError> {
        self.put(seed, &rand_bytes(8)).await
    }

    async fn load_check(&self) -> bool {
        self.base.load_check().await
    }

    async fn close(&self) {
        // The access controller is a shared dependency, closed by its
        // owner, not here.
        self.base.close().await
    }
}
