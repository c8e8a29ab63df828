// Path: crates/store/src/crdt.rs
//! The add-wins CRDT map one store replica maintains.
//!
//! State lives in the replica's datastore under the store namespace:
//! values at `/<ns>/k/<key>/v`, per-key priorities at `/<ns>/k/<key>/p`,
//! DAG blocks at `/<ns>/blk/<cid>`, processed markers at `/<ns>/s/<cid>`,
//! the current head set at `/<ns>/h/<cid>` and the priority counter at
//! `/<ns>/hc`. Every local write becomes a delta node broadcast to peers;
//! the periodic sync rebroadcasts all known nodes so replicas that missed
//! a delta converge within one interval.
//!
//! Conflicts resolve add-wins: the greater delta priority keeps the key,
//! and equal priorities keep the lexicographically greater value so every
//! replica picks the same winner.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex as StdMutex};

use base64::engine::general_purpose::URL_SAFE;
use base64::Engine;
use verse_datastore::query::{apply_options, Entry, Query};
use verse_datastore::Datastore;
use verse_types::codec;
use verse_types::error::{DatastoreError, StoreError};
use verse_types::key::trim_key;
use verse_types::pb::{CrdtBroadcast, Delta, Element, Head, Node};

use crate::broadcast::Broadcaster;
use crate::dag::{cid_of, cid_to_key, BlockDag, Cid, DagService};
use crate::validator::StoreValidator;

fn normalize(key: &str) -> String {
    format!("/{}", trim_key(key))
}

fn k_value(ns: &str, user_key: &str) -> String {
    format!("/{ns}/k{user_key}/v")
}

fn k_prio(ns: &str, user_key: &str) -> String {
    format!("/{ns}/k{user_key}/p")
}

fn k_seen(ns: &str, cid: &Cid) -> String {
    format!("/{ns}/s/{}", cid_to_key(cid))
}

fn k_head(ns: &str, cid: &Cid) -> String {
    format!("/{ns}/h/{}", cid_to_key(cid))
}

fn k_height(ns: &str) -> String {
    format!("/{ns}/hc")
}

/// One replica's CRDT state plus its broadcast channel.
pub struct CrdtStore {
    ns: String,
    store: Arc<dyn Datastore>,
    dag: BlockDag,
    bcast: Arc<dyn Broadcaster>,
    height: AtomicU64,
    // Serializes delta application between the ingest task and local puts.
    apply_lock: StdMutex<()>,
}

impl CrdtStore {
    pub fn new(
        ns: &str,
        store: Arc<dyn Datastore>,
        bcast: Arc<dyn Broadcaster>,
    ) -> Result<Self, StoreError> {
        let height = match store.get(&k_height(ns)) {
            Ok(raw) if raw.len() == 8 => {
                let mut b = [0u8; 8];
                b.copy_from_slice(&raw);
                u64::from_be_bytes(b)
            }
            Ok(_) | Err(DatastoreError::NotFound) => 0,
            Err(e) => return Err(e.into()),
        };

        Ok(CrdtStore {
            ns: ns.to_string(),
            dag: BlockDag::new(ns, Arc::clone(&store)),
            store,
            bcast,
            height: AtomicU64::new(height),
            apply_lock: StdMutex::new(()),
        })
    }

    pub fn namespace(&self) -> &str {
        &self.ns
    }

    /// Admits a local write and broadcasts its delta.
    pub async fn put(&self, key: &str, value: &[u8]) -> Result<(), StoreError> {
        let user_key = normalize(key);
        let priority = self.height.fetch_add(1, Ordering::SeqCst) + 1;

        let delta = Delta {
            elements: vec![Element {
                key: user_key,
                value: value.to_vec(),
            }],
            tombstones: Vec::new(),
            priority,
        };
        let parents = self.current_heads()?;
        let node = Node {
            delta: Some(delta),
            parents: parents.iter().map(|c| c.to_vec()).collect(),
        };
        let bytes = codec::to_bytes_canonical(&node);
        let cid = self.dag.put_node(&bytes)?;
        self.apply_node(&cid, &bytes)?;

        let bcast = CrdtBroadcast {
            heads: vec![Head {
                cid: cid.to_vec(),
                node: bytes,
            }],
        };
        self.bcast
            .broadcast(codec::to_bytes_canonical(&bcast))
            .await
    }

    pub fn get(&self, key: &str) -> Result<Vec<u8>, StoreError> {
        match self.store.get(&k_value(&self.ns, &normalize(key))) {
            Ok(v) => Ok(v),
            Err(DatastoreError::NotFound) => Err(StoreError::NotFound),
            Err(e) => Err(e.into()),
        }
    }

    pub fn has(&self, key: &str) -> Result<bool, StoreError> {
        Ok(self.store.has(&k_value(&self.ns, &normalize(key)))?)
    }

    pub fn get_size(&self, key: &str) -> Result<usize, StoreError> {
        match self.store.get_size(&k_value(&self.ns, &normalize(key))) {
            Ok(n) => Ok(n),
            Err(DatastoreError::NotFound) => Err(StoreError::NotFound),
            Err(e) => Err(e.into()),
        }
    }

    /// Scans the replica and applies the query options over user-visible
    /// keys. The query prefix uses path semantics: `/aaa` matches `/aaa`
    /// and `/aaa/...`, never `/aaab`.
    pub fn query(&self, q: &Query) -> Result<Vec<Entry>, StoreError> {
        let wrapper = format!("/{}/k", self.ns);
        let scanned = self
            .store
            .query(Query::with_prefix(wrapper.clone()))?
            .rest();

        let mut entries = Vec::new();
        for entry in scanned {
            let Some(stripped) = entry.key.strip_prefix(wrapper.as_str()) else {
                continue;
            };
            let Some(user_key) = stripped.strip_suffix("/v") else {
                continue;
            };
            entries.push(Entry::new(user_key, entry.value));
        }

        if !q.prefix.is_empty() {
            let p = normalize(&q.prefix);
            let child = format!("{p}/");
            entries.retain(|e| e.key == p || e.key.starts_with(&child));
        }

        let mut options = q.clone();
        options.prefix = String::new();
        Ok(apply_options(entries, &options))
    }

    /// Rebroadcasts every known DAG node. Peers that already hold a node
    /// reject the duplicate; peers that missed one admit it here.
    pub async fn sync(&self) -> Result<(), StoreError> {
        let blocks = self
            .store
            .query(Query::with_prefix(self.dag.block_prefix()))?
            .rest();
        for block in blocks {
            let bcast = CrdtBroadcast {
                heads: vec![Head {
                    cid: cid_of(&block.value).to_vec(),
                    node: block.value,
                }],
            };
            self.bcast
                .broadcast(codec::to_bytes_canonical(&bcast))
                .await?;
        }
        Ok(())
    }

    /// Applies an inbound broadcast. Heads whose payload does not match
    /// their cid are dropped; already processed heads are skipped.
    pub fn process_broadcast(&self, data: &[u8]) -> Result<(), StoreError> {
        let bcast: CrdtBroadcast = codec::from_bytes_canonical(data).map_err(StoreError::Decode)?;
        for head in bcast.heads {
            let Ok(cid) = Cid::try_from(head.cid.as_slice()) else {
                tracing::debug!(target: "gossip", event = "bad_cid", store = %self.ns);
                continue;
            };
            if cid != cid_of(&head.node) {
                tracing::debug!(target: "gossip", event = "cid_mismatch", store = %self.ns);
                continue;
            }
            self.dag.put_node(&head.node)?;
            self.apply_node(&cid, &head.node)?;
        }
        Ok(())
    }

    fn apply_node(&self, cid: &Cid, bytes: &[u8]) -> Result<(), StoreError> {
        let _guard = self
            .apply_lock
            .lock()
            .map_err(|e| StoreError::Decode(e.to_string()))?;

        if self.store.has(&k_seen(&self.ns, cid))? {
            return Ok(());
        }
        let node: Node = codec::from_bytes_canonical(bytes).map_err(StoreError::Decode)?;
        let Some(delta) = node.delta else {
            return Err(StoreError::Decode("node without delta".to_string()));
        };

        for element in &delta.elements {
            self.apply_element(element, delta.priority)?;
        }

        // Track the head lineage: this node supersedes its parents.
        for parent in &node.parents {
            if let Ok(parent_cid) = Cid::try_from(parent.as_slice()) {
                self.store.delete(&k_head(&self.ns, &parent_cid))?;
            }
        }
        self.store.put(&k_head(&self.ns, cid), &[])?;
        self.store.put(&k_seen(&self.ns, cid), &[])?;

        let height = self
            .height
            .fetch_max(delta.priority, Ordering::SeqCst)
            .max(delta.priority);
        self.store.put(&k_height(&self.ns), &height.to_be_bytes())?;
        Ok(())
    }

    fn apply_element(&self, element: &Element, priority: u64) -> Result<(), StoreError> {
        let user_key = normalize(&element.key);
        let value_key = k_value(&self.ns, &user_key);
        let prio_key = k_prio(&self.ns, &user_key);

        let existing = match self.store.get(&prio_key) {
            Ok(raw) if raw.len() == 8 => {
                let mut b = [0u8; 8];
                b.copy_from_slice(&raw);
                Some(u64::from_be_bytes(b))
            }
            Ok(_) => Some(0),
            Err(DatastoreError::NotFound) => None,
            Err(e) => return Err(e.into()),
        };

        let wins = match existing {
            None => true,
            Some(current) if priority > current => true,
            Some(current) if priority < current => false,
            Some(_) => {
                // Equal priority: keep the lexicographically greater value.
                match self.store.get(&value_key) {
                    Ok(current_value) => element.value > current_value,
                    Err(DatastoreError::NotFound) => true,
                    Err(e) => return Err(e.into()),
                }
            }
        };

        if wins {
            self.store.put(&value_key, &element.value)?;
            self.store.put(&prio_key, &priority.to_be_bytes())?;
        }
        Ok(())
    }

    fn current_heads(&self) -> Result<Vec<Cid>, StoreError> {
        let prefix = format!("/{}/h/", self.ns);
        let entries = self
            .store
            .query(Query {
                prefix: prefix.clone(),
                keys_only: true,
                ..Query::default()
            })?
            .rest();
        let mut heads = Vec::with_capacity(entries.len());
        for entry in entries {
            let Some(encoded) = entry.key.strip_prefix(prefix.as_str()) else {
                continue;
            };
            if let Ok(raw) = URL_SAFE.decode(encoded) {
                if let Ok(cid) = Cid::try_from(raw.as_slice()) {
                    heads.push(cid);
                }
            }
        }
        Ok(heads)
    }
}

/// The topic-validation predicate for inbound broadcasts: resolve each
/// head, decode its delta, reject tombstones (the log is append-only),
/// reject already-held keys (dedup against re-admission storms) and walk
/// every element through the flavor validator.
pub fn validate_broadcast(
    ns: &str,
    store: &Arc<dyn Datastore>,
    validator: &StoreValidator,
    data: &[u8],
) -> bool {
    let Ok(bcast) = codec::from_bytes_canonical::<CrdtBroadcast>(data) else {
        return false;
    };
    if bcast.heads.is_empty() {
        return false;
    }
    for head in &bcast.heads {
        let Ok(cid) = Cid::try_from(head.cid.as_slice()) else {
            return false;
        };
        if cid != cid_of(&head.node) {
            return false;
        }
        let Ok(node) = codec::from_bytes_canonical::<Node>(&head.node) else {
            return false;
        };
        let Some(delta) = node.delta else {
            return false;
        };
        if !delta.tombstones.is_empty() {
            return false;
        }
        for element in &delta.elements {
            let user_key = normalize(&element.key);
            if store.has(&k_value(ns, &user_key)).unwrap_or(false) {
                return false;
            }
            if !validator.validate(&element.key, &element.value) {
                return false;
            }
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loopback::LoopbackHub;
    use crate::validator::InTime;
    use verse_datastore::MemDatastore;

    fn new_crdt(hub: &Arc<LoopbackHub>) -> (CrdtStore, Arc<dyn Datastore>) {
        let store: Arc<dyn Datastore> = Arc::new(MemDatastore::new());
        let bcast: Arc<dyn Broadcaster> = Arc::new(hub.join());
        let crdt = CrdtStore::new("ns", Arc::clone(&store), bcast).unwrap();
        (crdt, store)
    }

    #[tokio::test]
    async fn put_is_readable_and_broadcast() {
        let hub = LoopbackHub::new();
        let (a, _) = new_crdt(&hub);
        let (b, _) = new_crdt(&hub);

        a.put("aaa", b"meow").await.unwrap();
        assert_eq!(a.get("aaa").unwrap(), b"meow");
        assert!(a.has("/aaa").unwrap());

        // Drive b's ingest by hand: the base store owns the task in
        // production.
        let msg = b.bcast.next().await.unwrap();
        assert!(!msg.local);
        b.process_broadcast(&msg.data).unwrap();
        assert_eq!(b.get("aaa").unwrap(), b"meow");
    }

    #[tokio::test]
    async fn reapplying_a_seen_node_is_idempotent() {
        let hub = LoopbackHub::new();
        let (a, _) = new_crdt(&hub);
        a.put("aaa", b"meow").await.unwrap();
        let msg = a.bcast.next().await.unwrap();
        a.process_broadcast(&msg.data).unwrap();
        a.process_broadcast(&msg.data).unwrap();
        assert_eq!(a.get("aaa").unwrap(), b"meow");
    }

    #[tokio::test]
    async fn higher_priority_wins_and_equal_breaks_on_value() {
        let hub = LoopbackHub::new();
        let (a, _) = new_crdt(&hub);

        let elem = |v: &[u8]| Element {
            key: "/k".to_string(),
            value: v.to_vec(),
        };
        a.apply_element(&elem(b"low"), 1).unwrap();
        a.apply_element(&elem(b"high"), 5).unwrap();
        assert_eq!(a.get("k").unwrap(), b"high");
        a.apply_element(&elem(b"stale"), 2).unwrap();
        assert_eq!(a.get("k").unwrap(), b"high");

        // Equal priority: the lexicographically greater value sticks on
        // every replica.
        a.apply_element(&elem(b"hugh"), 5).unwrap();
        assert_eq!(a.get("k").unwrap(), b"hugh");
        a.apply_element(&elem(b"habc"), 5).unwrap();
        assert_eq!(a.get("k").unwrap(), b"hugh");
    }

    #[tokio::test]
    async fn query_uses_path_prefix_semantics() {
        let hub = LoopbackHub::new();
        let (a, _) = new_crdt(&hub);
        a.put("aaa", b"1").await.unwrap();
        a.put("aaab", b"2").await.unwrap();
        a.put("aaa/x", b"3").await.unwrap();

        let results = a.query(&Query::with_prefix("aaa")).unwrap();
        let keys: Vec<&str> = results.iter().map(|e| e.key.as_str()).collect();
        assert_eq!(keys.len(), 2);
        assert!(keys.contains(&"/aaa"));
        assert!(keys.contains(&"/aaa/x"));
    }

    #[tokio::test]
    async fn validate_broadcast_rejects_tombstones_and_duplicates() {
        let hub = LoopbackHub::new();
        let (a, store) = new_crdt(&hub);
        let validator = StoreValidator::Log(InTime::new(true));

        a.put("aaa", b"meow").await.unwrap();
        let msg = a.bcast.next().await.unwrap();

        // The replica that produced the delta already holds the key.
        assert!(!validate_broadcast("ns", &store, &validator, &msg.data));

        // A fresh replica admits it.
        let (_, fresh_store) = new_crdt(&hub);
        assert!(validate_broadcast("ns", &fresh_store, &validator, &msg.data));

        // Tombstones violate the append-only invariant.
        let node = Node {
            delta: Some(Delta {
                elements: Vec::new(),
                tombstones: vec![Element {
                    key: "/aaa".to_string(),
                    value: Vec::new(),
                }],
                priority: 9,
            }),
            parents: Vec::new(),
        };
        let bytes = codec::to_bytes_canonical(&node);
        let bcast = CrdtBroadcast {
            heads: vec![Head {
                cid: cid_of(&bytes).to_vec(),
                node: bytes,
            }],
        };
        let data = codec::to_bytes_canonical(&bcast);
        assert!(!validate_broadcast("ns", &fresh_store, &validator, &data));
    }

    #[tokio::test]
    async fn sync_rebroadcasts_all_nodes() {
        let hub = LoopbackHub::new();
        let (a, _) = new_crdt(&hub);
        a.put("aaa", b"1").await.unwrap();
        a.put("bbb", b"2").await.unwrap();

        // A replica joining after the writes converges from sync alone.
        let (late, _) = new_crdt(&hub);
        a.sync().await.unwrap();
        for _ in 0..2 {
            let msg = late.bcast.next().await.unwrap();
            late.process_broadcast(&msg.data).unwrap();
        }
        assert_eq!(late.get("aaa").unwrap(), b"1");
        assert_eq!(late.get("bbb").unwrap(), b"2");
    }
}
