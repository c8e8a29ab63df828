// Path: crates/store/src/signature.rs
//! The signature flavor.
//!
//! Writes require a private key: the stored key is prefixed with the
//! signer's public-key fingerprint and the value travels inside a
//! [`SignatureData`] envelope. Swapping the identity mid-life is allowed;
//! historical entries under the old fingerprint remain visible.

use std::sync::Arc;
use std::sync::RwLock;

use async_trait::async_trait;
use libp2p::identity::{Keypair, PublicKey};
use verse_datastore::query::{Entry, Query};
use verse_types::codec;
use verse_types::crypto;
use verse_types::error::StoreError;
use verse_types::key::{split_segments, trim_key};
use verse_types::pb::SignatureData;

use crate::access::AccessController;
use crate::base::{BaseStore, StoreParts};
use crate::traits::KvStore;
use crate::util::rand_bytes;

/// The signing identity of a store. The private half may be absent (the
/// store is then read-only for this peer) or dropped after setup.
pub struct KeyState {
    pub keypair: Option<Keypair>,
    pub public: Option<PublicKey>,
}

impl KeyState {
    pub fn from_options(keypair: Option<Keypair>, public: Option<PublicKey>) -> Self {
        match (keypair, public) {
            (Some(kp), _) => {
                let public = kp.public();
                KeyState {
                    keypair: Some(kp),
                    public: Some(public),
                }
            }
            (None, public) => KeyState {
                keypair: None,
                public,
            },
        }
    }
}

/// Signs `value` and wraps it for storage; the full key gains the signer's
/// fingerprint prefix.
pub(crate) fn wrap_signed(
    keys: &RwLock<KeyState>,
    user_key: &str,
    value: &[u8],
) -> Result<(String, String, Vec<u8>), StoreError> {
    let state = keys.read().map_err(|e| StoreError::Decode(e.to_string()))?;
    let Some(keypair) = &state.keypair else {
        return Err(StoreError::NoPrivateKey);
    };
    let sign = crypto::sign(keypair, value)?;
    let data = SignatureData {
        value: value.to_vec(),
        sign,
    };
    let pid = crypto::pub_key_to_string(&keypair.public());
    let full = format!("{pid}/{}", trim_key(user_key));
    Ok((pid, full, codec::to_bytes_canonical(&data)))
}

pub(crate) fn unwrap_signed(raw: &[u8]) -> Result<Vec<u8>, StoreError> {
    let data: SignatureData = codec::from_bytes_canonical(raw).map_err(StoreError::Decode)?;
    Ok(data.value)
}

pub struct SignatureStore {
    base: BaseStore,
    keys: RwLock<KeyState>,
    ac: Option<Arc<AccessController>>,
}

impl SignatureStore {
    pub(crate) fn start(
        parts: StoreParts,
        keys: KeyState,
        ac: Option<Arc<AccessController>>,
    ) -> Result<Self, StoreError> {
        Ok(SignatureStore {
            base: BaseStore::start(parts)?,
            keys: RwLock::new(keys),
            ac,
        })
    }

    /// The current public identity, if any.
    pub fn public_key(&self) -> Option<PublicKey> {
        self.keys.read().ok().and_then(|s| s.public.clone())
    }

    /// Swaps the signing identity. Subsequent writes use the new key;
    /// entries under the old fingerprint stay visible.
    pub fn reset_key_pair(&self, keypair: Option<Keypair>, public: Option<PublicKey>) {
        if let Ok(mut state) = self.keys.write() {
            *state = KeyState::from_options(keypair, public);
        }
    }

    /// Drops the private half, leaving the store read-only for this peer.
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
}

#[async_trait]
impl KvStore for SignatureStore {
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
        let (pid, full, wrapped) = wrap_signed(&self.keys, key, value)?;
        self.verify_access(&pid).await?;
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
                keys_only: true,
                limit: 1,
                ..Query::default()
            })
            .await?;
        Ok(!entries.is_empty())
    }

    async fn query(&self, q: Query) -> Result<Vec<Entry>, StoreError> {
        let keys_only = q.keys_only;
        let entries = self.base.query(q).await?;
        let mut entries = self.ac_retain(entries).await?;
        if !keys_only {
            for entry in &mut entries {
                entry.value = unwrap_signed(&entry.value)?;
                entry.size = entry.value.len();
            }
        }
        Ok(entries)
    }

    async fn sync(&self) -> Result<(), StoreError> {
        self.base.sync().await
    }

    /// Writes one self-signed record so peers see `load_check` true after
    /// their first sync.
    async fn init_put(&self, seed: &str) -> Result<(), StoreError> {
        self.put(seed, &rand_bytes(8)).await
    }

    async fn load_check(&self) -> bool {
        self.base.load_check().await
    }

    async fn close(&self) {
        self.base.close().await
    }
}
