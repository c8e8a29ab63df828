// Path: crates/store/src/base.rs
//! The base store: lifecycle of one CRDT replica.
//!
//! Owns the datastore, the DAG, the broadcaster, the background ingest and
//! sync tasks, and the time limit. Flavors wrap this and add key
//! composition, value envelopes and query projection.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{interval, sleep, Duration, MissedTickBehavior};
use verse_datastore::query::{Entry, Query};
use verse_datastore::Datastore;
use verse_network::Host;
use verse_types::error::StoreError;
use verse_types::key::make_address;

use crate::broadcast::Broadcaster;
use crate::crdt::{validate_broadcast, CrdtStore};
use crate::util::rand_bytes;
use crate::validator::{InTime, StoreValidator};

/// The sync-loop tick, aligned with the broadcaster rebroadcast interval.
pub const SYNC_INTERVAL: Duration = Duration::from_secs(5);

/// Everything a base store is assembled from. The verse factory builds
/// these from a live host; tests assemble them around an in-process hub.
pub struct StoreParts {
    pub name: String,
    pub time_limit: Option<DateTime<Utc>>,
    pub dir: Option<PathBuf>,
    pub save: bool,
    pub host: Option<Host>,
    pub datastore: Arc<dyn Datastore>,
    pub broadcaster: Arc<dyn Broadcaster>,
    pub validator: Arc<StoreValidator>,
}

pub struct BaseStore {
    name: String,
    time_limit: Option<DateTime<Utc>>,
    dir: Option<PathBuf>,
    save: bool,
    host: Option<Host>,
    datastore: Arc<dyn Datastore>,
    crdt: Arc<CrdtStore>,
    in_time: InTime,
    shutdown: watch::Sender<bool>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    closed: AtomicBool,
}

impl BaseStore {
    /// Assembles the replica and starts its background tasks.
    pub fn start(parts: StoreParts) -> Result<Self, StoreError> {
        let in_time = parts.validator.in_time().clone();
        if let Some(limit) = parts.time_limit {
            if limit <= Utc::now() {
                in_time.expire();
            }
        }

        let crdt = Arc::new(CrdtStore::new(
            &parts.name,
            Arc::clone(&parts.datastore),
            Arc::clone(&parts.broadcaster),
        )?);

        let (shutdown, _) = watch::channel(false);
        let mut tasks = Vec::new();

        tasks.push(tokio::spawn(run_ingest_loop(
            parts.name.clone(),
            Arc::clone(&parts.datastore),
            Arc::clone(&parts.broadcaster),
            Arc::clone(&parts.validator),
            Arc::clone(&crdt),
            shutdown.subscribe(),
        )));

        tasks.push(tokio::spawn(run_sync_loop(
            Arc::clone(&crdt),
            in_time.clone(),
            shutdown.subscribe(),
        )));

        if let Some(limit) = parts.time_limit {
            if limit > Utc::now() {
                tasks.push(tokio::spawn(run_time_limit(
                    limit,
                    Arc::clone(&crdt),
                    in_time.clone(),
                    shutdown.subscribe(),
                )));
            }
        }

        tracing::info!(target: "store", event = "started", name = %parts.name, in_time = in_time.get());

        Ok(BaseStore {
            name: parts.name,
            time_limit: parts.time_limit,
            dir: parts.dir,
            save: parts.save,
            host: parts.host,
            datastore: parts.datastore,
            crdt,
            in_time,
            shutdown,
            tasks: Mutex::new(tasks),
            closed: AtomicBool::new(false),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn address(&self) -> String {
        make_address(&self.name, self.time_limit)
    }

    pub fn is_in_time(&self) -> bool {
        self.in_time.get()
    }

    pub async fn put(&self, key: &str, value: &[u8]) -> Result<(), StoreError> {
        if !self.in_time.get() {
            tracing::debug!(target: "store", event = "put_after_limit", name = %self.name);
            return Ok(());
        }
        if self.crdt.has(key)? {
            return Ok(());
        }
        self.crdt.put(key, value).await
    }

    pub async fn get(&self, key: &str) -> Result<Vec<u8>, StoreError> {
        if !self.in_time.get() {
            return Err(StoreError::NotFound);
        }
        self.crdt.get(key)
    }

    pub async fn get_size(&self, key: &str) -> Result<usize, StoreError> {
        if !self.in_time.get() {
            return Err(StoreError::NotFound);
        }
        self.crdt.get_size(key)
    }

    pub async fn has(&self, key: &str) -> Result<bool, StoreError> {
        if !self.in_time.get() {
            return Ok(false);
        }
        self.crdt.has(key)
    }

    pub async fn query(&self, q: Query) -> Result<Vec<Entry>, StoreError> {
        if !self.in_time.get() {
            return Ok(Vec::new());
        }
        self.crdt.query(&q)
    }

    pub async fn sync(&self) -> Result<(), StoreError> {
        if !self.in_time.get() {
            return Ok(());
        }
        self.crdt.sync().await
    }

    pub async fn init_put(&self, seed: &str) -> Result<(), StoreError> {
        self.put(seed, &rand_bytes(8)).await
    }

    pub async fn load_check(&self) -> bool {
        if !self.in_time.get() {
            return true;
        }
        let q = Query {
            keys_only: true,
            limit: 1,
            ..Query::default()
        };
        match self.crdt.query(&q) {
            Ok(entries) => !entries.is_empty(),
            Err(_) => false,
        }
    }

    /// Stops the background tasks, then unwinds broadcaster, datastore and
    /// host, and removes the directory for ephemeral verses. Safe to call
    /// once; later calls are no-ops.
    pub async fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        self.shutdown.send(true).ok();
        for task in self.tasks.lock().await.drain(..) {
            task.abort();
            let _ = task.await;
        }
        if let Err(e) = self.datastore.close() {
            tracing::warn!(target: "store", event = "datastore_close_failed", name = %self.name, error = %e);
        }
        if let Some(host) = &self.host {
            host.close().await;
        }
        if !self.save {
            if let Some(dir) = &self.dir {
                if let Err(e) = std::fs::remove_dir_all(dir) {
                    tracing::debug!(target: "store", event = "dir_remove_failed", error = %e);
                }
            }
        }
        tracing::info!(target: "store", event = "closed", name = %self.name);
    }
}

async fn run_ingest_loop(
    name: String,
    datastore: Arc<dyn Datastore>,
    broadcaster: Arc<dyn Broadcaster>,
    validator: Arc<StoreValidator>,
    crdt: Arc<CrdtStore>,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    break;
                }
            }
            msg = broadcaster.next() => match msg {
                None => break,
                Some(msg) => {
                    if !msg.local
                        && !broadcaster.pre_validated()
                        && !validate_broadcast(&name, &datastore, &validator, &msg.data)
                    {
                        tracing::debug!(target: "gossip", event = "delta_rejected", store = %name);
                        continue;
                    }
                    if let Err(e) = crdt.process_broadcast(&msg.data) {
                        tracing::warn!(target: "gossip", event = "apply_failed", store = %name, error = %e);
                    }
                }
            }
        }
    }
}

async fn run_sync_loop(crdt: Arc<CrdtStore>, in_time: InTime, mut shutdown: watch::Receiver<bool>) {
    let mut ticker = interval(SYNC_INTERVAL);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    loop {
        tokio::select! {
            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    break;
                }
            }
            _ = ticker.tick() => {
                if !in_time.get() {
                    break;
                }
                if let Err(e) = crdt.sync().await {
                    tracing::warn!(target: "store", event = "sync_failed", store = %crdt.namespace(), error = %e);
                }
            }
        }
    }
}

async fn run_time_limit(
    limit: DateTime<Utc>,
    crdt: Arc<CrdtStore>,
    in_time: InTime,
    mut shutdown: watch::Receiver<bool>,
) {
    let wait = (limit - Utc::now()).to_std().unwrap_or(Duration::ZERO);
    tokio::select! {
        _ = shutdown.changed() => return,
        _ = sleep(wait) => {}
    }
    // One last reconciliation before the store turns off.
    if let Err(e) = crdt.sync().await {
        tracing::debug!(target: "store", event = "final_sync_failed", error = %e);
    }
    in_time.expire();
    tracing::info!(target: "store", event = "time_limit_reached", store = %crdt.namespace());
}
