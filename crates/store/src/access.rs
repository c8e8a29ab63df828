// Path: crates/store/src/access.rs
//! The access controller.
//!
//! A derived store whose entries sign authorizations against logical
//! access identifiers. Granting writes 32 random bytes under the encoded
//! [`AccessKey`] into an updatable-signature store; the underlying flavor
//! wraps and signs them with the master key. Verification re-extracts the
//! master public key from the stored capability and checks its signature,
//! so a forged grant never passes even if it somehow entered the store.
//! Capabilities are permanent: the store is append-only and no revocation
//! exists.

use std::sync::Arc;

use base64::engine::general_purpose::URL_SAFE;
use base64::Engine;
use libp2p::identity::PublicKey;
use verse_datastore::query::{Entry, Filter, KeyExistFilter, Query};
use verse_types::codec;
use verse_types::crypto;
use verse_types::error::StoreError;
use verse_types::hashing::{argon2id_b64, ACCESS_LEN};
use verse_types::key::{make_access_address, split_segments};
use verse_types::pb::{AccessKey, SignatureData};

use crate::traits::KvStore;
use crate::updatable_signature::UpdatableSignatureStore;
use crate::util::rand_bytes;

/// The wildcard access granted when no explicit list is supplied.
pub const WILDCARD_ACCESS: &str = "*";

/// Verifies a stored capability entry: the master public key is
/// re-extracted from the `AccessKey` inside the composite key and the
/// signature is checked against it.
pub(crate) struct AccessSignatureFilter;

impl Filter for AccessSignatureFilter {
    fn filter(&self, entry: &Entry) -> bool {
        let segments = split_segments(&entry.key);
        let Some(encoded) = segments.get(1) else {
            return false;
        };
        let Ok(raw) = URL_SAFE.decode(encoded) else {
            return false;
        };
        let Ok(access_key) = codec::from_bytes_canonical::<AccessKey>(&raw) else {
            return false;
        };
        let Ok(master) = crypto::pub_key_from_string(&access_key.master_key) else {
            return false;
        };
        let Ok(data) = codec::from_bytes_canonical::<SignatureData>(&entry.value) else {
            return false;
        };
        crypto::verify(&master, &data.value, &data.sign)
    }
}

/// Grants and verifies signed capabilities over an updatable-signature
/// store it exclusively owns. Attached stores hold it as a shared
/// reference; the owner closes it.
pub struct AccessController {
    store: UpdatableSignatureStore,
    name: String,
    salt: Vec<u8>,
    master: PublicKey,
}

impl AccessController {
    /// Wraps a freshly constructed store, grants the initial accesses
    /// (the wildcard when the list is empty) and drops the master private
    /// key, freezing the capability set.
    pub(crate) async fn create(
        store: UpdatableSignatureStore,
        name: &str,
        salt: Vec<u8>,
        accesses: &[String],
    ) -> Result<Arc<Self>, StoreError> {
        let Some(master) = store.public_key() else {
            store.close().await;
            return Err(StoreError::NoPrivateKey);
        };
        let ac = AccessController {
            store,
            name: name.to_string(),
            salt,
            master,
        };

        let grant_result = async {
            if accesses.is_empty() {
                ac.grant(WILDCARD_ACCESS).await?;
            } else {
                for access in accesses {
                    ac.grant(access).await?;
                }
            }
            Ok::<(), StoreError>(())
        }
        .await;
        if let Err(e) = grant_result {
            ac.store.close().await;
            return Err(e);
        }

        ac.store.clear_private_key();
        Ok(Arc::new(ac))
    }

    /// Wraps a loaded store; the master key comes from the parsed address.
    pub(crate) fn attach(
        store: UpdatableSignatureStore,
        name: &str,
        salt: Vec<u8>,
        master: PublicKey,
    ) -> Arc<Self> {
        Arc::new(AccessController {
            store,
            name: name.to_string(),
            salt,
            master,
        })
    }

    pub fn master_key(&self) -> &PublicKey {
        &self.master
    }

    /// The encoded address other peers load this controller from.
    pub fn address(&self) -> String {
        make_access_address(&crypto::pub_key_to_string(&self.master), &self.name, &self.salt)
    }

    /// The capability key name for one logical access.
    fn capability_key(&self, access: &str) -> Result<String, StoreError> {
        let hashed = argon2id_b64(access.as_bytes(), &self.salt, ACCESS_LEN)?;
        let key = AccessKey {
            master_key: crypto::pub_key_to_string(&self.master),
            access: hashed,
        };
        Ok(URL_SAFE.encode(codec::to_bytes_canonical(&key)))
    }

    /// Writes one signed authorization for `access`. Requires the master
    /// private key, so only the creating peer can grant.
    pub async fn grant(&self, access: &str) -> Result<(), StoreError> {
        let key = self.capability_key(access)?;
        self.store.put(&key, &rand_bytes(32)).await
    }

    /// True iff a signature-valid capability exists for `access` or for
    /// the wildcard.
    pub async fn verify(&self, access: &str) -> Result<bool, StoreError> {
        if self.has_capability(WILDCARD_ACCESS).await? {
            return Ok(true);
        }
        self.has_capability(access).await
    }

    async fn has_capability(&self, access: &str) -> Result<bool, StoreError> {
        let key = self.capability_key(access)?;
        let entries = self
            .store
            .query_raw(Query {
                filters: vec![
                    Arc::new(KeyExistFilter { key }),
                    Arc::new(AccessSignatureFilter),
                ],
                limit: 1,
                ..Query::default()
            })
            .await?;
        Ok(!entries.is_empty())
    }

    pub async fn sync(&self) -> Result<(), StoreError> {
        self.store.sync().await
    }

    pub async fn load_check(&self) -> bool {
        self.store.load_check().await
    }

    /// Closes the underlying store. Called by the owner, never by a store
    /// this controller is attached to.
    pub async fn close(&self) {
        self.store.close().await
    }
}
