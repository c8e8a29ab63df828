// Path: crates/store/src/updatable_signature.rs
//! The updatable-signature flavor: the signature envelope inside the
//! updatable key shape, `<pub>/<user>/<ts>` storing `SignatureData`.

use std::sync::Arc;
use std::sync::RwLock;

use async_trait::async_trait;
use chrono::Utc;
use libp2p::identity::{Keypair, PublicKey};
use verse_datastore::query::{Entry, Query, UpdatableOrder};
use verse_types::error::StoreError;
use verse_types::key::{make_time_key, split_segments, trim_key};

use crate::access::AccessController;
use crate::base::{BaseStore, StoreParts};
use crate::signature::{unwrap_signed, wrap_signed, KeyState};
use crate::traits::KvStore;
use crate::updatable::{dedup_categories, with_updatable_orders};

pub struct UpdatableSignatureStore {
    base: BaseStore,
    keys: RwLock<KeyState>,
    ac: Option<Arc<AccessController>>,
}

impl UpdatableSignatureStore {
    pub(crate) fn start(
        parts: StoreParts,
        keys: KeyState,
        ac: Option<Arc<AccessController>>,
    ) -> Result<Self, StoreError> {
        Ok(UpdatableSignatureStore {
            base: BaseStore::start(parts)?,
            keys: RwLock::new(keys),
            ac,
        })
    }

    pub fn public_key(&self) -> Option<PublicKey> {
        self.keys.read().ok().and_then(|s| s.public.clone())
    }

    pub fn reset_key_pair(&self, keypair: Option<Keypair>, public: Option<PublicKey>) {
        if let Ok(mut state) = self.keys.write() {
            *state = KeyState::from_options(keypair, public);
        }
    }

    /// Drops the private half, freezing this peer's write capability.
    pub fn clear_private_key(&self) {
        if let Ok(mut state) = self.keys.write() {
            state.keypair = None;
        }
    }

    async fn verify_access(&self, id: &str) -> Result<(), StoreError> {
        let Some(ac) = &self.ac else {
            return Ok(());
        };
        if id.is_empty() {
            return Err(StoreError::InvalidKey("empty access id".to_string()));
        }
        if ac.verify(id).await? {
            return Ok(());
        }
        Err(StoreError::PermissionDenied(id.to_string()))
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

    fn project(entries: Vec<Entry>, keys_only: bool) -> Result<Vec<Entry>, StoreError> {
        if keys_only {
            return Ok(entries);
        }
        let mut out = entries;
        for entry in &mut out {
            entry.value = unwrap_signed(&entry.value)?;
            entry.size = entry.value.len();
        }
        Ok(out)
    }

    /// Raw underlying scan without projection or dedup. The access
    /// controller verifies capability entries through this path.
    pub(crate) async fn query_raw(&self, q: Query) -> Result<Vec<Entry>, StoreError> {
        self.base.query(q).await
    }

    /// Every historical version per identity and key, newest first,
    /// unwrapped.
    pub async fn query_all(&self, q: Query) -> Result<Vec<Entry>, StoreError> {
        let keys_only = q.keys_only;
        let entries = self.base.query(with_updatable_orders(q)).await?;
        let entries = self.ac_retain(entries).await?;
        Self::project(entries, keys_only)
    }
}

#[async_trait]
impl KvStore for UpdatableSignatureStore {
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
        let (pid, signed_key, wrapped) = wrap_signed(&self.keys, key, value)?;
        self.verify_access(&pid).await?;
        let full = format!("{}/{}", trim_key(&signed_key), make_time_key(Utc::now()));
        self.base.put(&full, &wrapped).await
    }

    async fn get(&self, key: &str) -> Result<Vec<u8>, StoreError> {
        let segments = split_segments(key);
        self.verify_access(segments.first().copied().unwrap_or_default())
            .await?;
        let entries = self
            .base
            .query(Query {
                prefix: key.to_string(),
                orders: vec![Arc::new(UpdatableOrder)],
                limit: 1,
                ..Query::default()
            })
            .await?;
        match entries.into_iter().next() {
            Some(entry) => unwrap_signed(&entry.value),
            None => Err(StoreError::NotFound),
        }
    }

    async fn get_size(&self, key: &str) -> Result<usize, StoreError> {
        Ok(self.get(key).await?.len())
    }

    async fn has(&self, key: &str) -> Result<bool, StoreError> {
        let segments = split_segments(key);
        self.verify_access(segments.first().copied().unwrap_or_default())
            .await?;
        let entries = self
            .base
            .query(Query {
                prefix: key.to_string(),
                orders: vec![Arc::new(UpdatableOrder)],
                keys_only: true,
                limit: 1,
                ..Query::default()
            })
            .await?;
        Ok(!entries.is_empty())
    }

    async fn query(&self, q: Query) -> Result<Vec<Entry>, StoreError> {
        let keys_only = q.keys_only;
        let entries = self.base.query(with_updatable_orders(q)).await?;
        let entries = self.ac_retain(entries).await?;
        let entries = dedup_categories(entries);
        Self::project(entries, keys_only)
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
