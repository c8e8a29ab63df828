// Path: crates/store/src/dag.rs
//! The content-addressed node store behind the delta DAG.
//!
//! Nodes are addressed by the SHA-256 of their bytes. Blocks live in the
//! replica's own datastore under the store namespace, so the DAG shares
//! the directory lock and lifecycle of the store that owns it.

use std::sync::Arc;

use base64::engine::general_purpose::URL_SAFE;
use base64::Engine;
use sha2::{Digest, Sha256};
use verse_datastore::Datastore;
use verse_types::error::StoreError;

/// A content id: the SHA-256 digest of a node's bytes.
pub type Cid = [u8; 32];

/// Computes the content id of `data`.
pub fn cid_of(data: &[u8]) -> Cid {
    let digest = Sha256::digest(data);
    digest.into()
}

/// Renders a cid for use inside datastore keys.
pub fn cid_to_key(cid: &Cid) -> String {
    URL_SAFE.encode(cid)
}

/// Resolves and stores DAG nodes by content id.
pub trait DagService: Send + Sync {
    /// Stores `data` and returns its content id.
    fn put_node(&self, data: &[u8]) -> Result<Cid, StoreError>;
    /// Fetches a node by content id, if this replica holds it.
    fn get_node(&self, cid: &Cid) -> Result<Option<Vec<u8>>, StoreError>;
}

/// A [`DagService`] keeping blocks in the store's datastore.
pub struct BlockDag {
    ns: String,
    store: Arc<dyn Datastore>,
}

impl BlockDag {
    pub fn new(ns: &str, store: Arc<dyn Datastore>) -> Self {
        BlockDag {
            ns: ns.to_string(),
            store,
        }
    }

    fn block_key(&self, cid: &Cid) -> String {
        format!("/{}/blk/{}", self.ns, cid_to_key(cid))
    }

    /// The datastore prefix all blocks of this DAG live under.
    pub fn block_prefix(&self) -> String {
        format!("/{}/blk/", self.ns)
    }
}

impl DagService for BlockDag {
    fn put_node(&self, data: &[u8]) -> Result<Cid, StoreError> {
        let cid = cid_of(data);
        self.store.put(&self.block_key(&cid), data)?;
        Ok(cid)
    }

    fn get_node(&self, cid: &Cid) -> Result<Option<Vec<u8>>, StoreError> {
        match self.store.get(&self.block_key(cid)) {
            Ok(data) => Ok(Some(data)),
            Err(verse_types::error::DatastoreError::NotFound) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use verse_datastore::MemDatastore;

    #[test]
    fn node_roundtrip_by_content_id() {
        let dag = BlockDag::new("ns", Arc::new(MemDatastore::new()));
        let cid = dag.put_node(b"meow").unwrap();
        assert_eq!(cid, cid_of(b"meow"));
        assert_eq!(dag.get_node(&cid).unwrap().unwrap(), b"meow");
        assert_eq!(dag.get_node(&cid_of(b"other")).unwrap(), None);
    }
}
