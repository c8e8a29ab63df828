// Path: crates/store/src/verse.rs
//! The verse factory.
//!
//! Holds the shared configuration (host generator, directory, persistence
//! flag, bootstrap endpoints) and assembles stores: spawn a host, open the
//! local datastore, join the gossip topic with the flavor's validator,
//! attach the broadcaster, bootstrap the overlay advertising the store
//! keyword, and start the sync loop. Loading polls `load_check` and
//! retries directory-lock and sync-timeout failures with a fresh random
//! directory and a back-off.

use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use libp2p::identity::{Keypair, PublicKey};
use tokio::time::{interval, sleep, timeout, Duration};
use verse_datastore::{Datastore, RedbDatastore};
use verse_network::{Host, MessageValidator, PeerEndpoint};
use verse_types::error::{DatastoreError, NetworkError, StoreError};
use verse_types::hashing::{argon2id_b64, FINGERPRINT_LEN};
use verse_types::key::{parse_access_address, parse_address};
use verse_types::{crypto, pb};

use crate::access::AccessController;
use crate::base::StoreParts;
use crate::broadcast::GossipBroadcaster;
use crate::crdt::validate_broadcast;
use crate::hash::HashStore;
use crate::log::LogStore;
use crate::signature::{KeyState, SignatureStore};
use crate::traits::KvStore;
use crate::updatable::UpdatableStore;
use crate::updatable_signature::UpdatableSignatureStore;
use crate::util::{rand_bytes, rand_string};
use crate::validator::{InTime, StoreValidator};

/// How long a load waits for `load_check` before giving up on an attempt.
const LOAD_TIMEOUT: Duration = Duration::from_secs(30);
/// The sync-poll cadence during a load.
const LOAD_TICK: Duration = Duration::from_secs(3);
/// Lifecycle retries for locked directories and sync timeouts.
const LOAD_ATTEMPTS: u32 = 3;
const RETRY_BACKOFF: Duration = Duration::from_millis(500);

/// Spawns one peer host per store.
pub type HostGenerator = Arc<dyn Fn() -> Result<Host, NetworkError> + Send + Sync>;

/// The default host generator: a fresh ed25519 identity on an OS port.
pub fn sample_host_gen() -> HostGenerator {
    Arc::new(Host::new)
}

/// The store flavors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreKind {
    Log,
    Hash,
    Signature,
    Updatable,
    UpdatableSignature,
}

impl StoreKind {
    fn validator(&self, in_time: InTime) -> StoreValidator {
        match self {
            StoreKind::Log => StoreValidator::Log(in_time),
            StoreKind::Hash => StoreValidator::Hash(in_time),
            StoreKind::Signature => StoreValidator::Signature(in_time),
            StoreKind::Updatable => StoreValidator::Updatable(in_time),
            StoreKind::UpdatableSignature => StoreValidator::UpdatableSignature(in_time),
        }
    }
}

/// Options recognized by the store factory. Generated material (salt,
/// keypair) is written back so the caller learns the identities it ended
/// up with.
#[derive(Default)]
pub struct StoreOpts {
    /// Argon2id salt for hash-flavored stores; random 8 bytes if absent.
    pub salt: Option<Vec<u8>>,
    /// Signing identity for signature flavors; generated fresh if absent.
    pub keypair: Option<Keypair>,
    /// Public-only identity (read-only replica of a signature store).
    pub public: Option<PublicKey>,
    /// Attached access controller, shared with its owner.
    pub ac: Option<Arc<AccessController>>,
    /// Wall-clock instant after which the store turns off.
    pub time_limit: Option<DateTime<Utc>>,
}

/// Shared configuration for constructing and loading stores.
pub struct Verse {
    host_gen: HostGenerator,
    dir: PathBuf,
    save: bool,
    bootstraps: Vec<PeerEndpoint>,
}

impl Verse {
    pub fn new(
        host_gen: HostGenerator,
        dir: impl Into<PathBuf>,
        save: bool,
        bootstraps: Vec<PeerEndpoint>,
    ) -> Self {
        Verse {
            host_gen,
            dir: dir.into(),
            save,
            bootstraps,
        }
    }

    /// Creates a store. The user-chosen name is fingerprinted with a
    /// random salt, so two stores created under the same name are
    /// distinct; peers join through the address only.
    pub async fn new_store(
        &self,
        name: &str,
        kind: StoreKind,
        opts: &mut StoreOpts,
    ) -> Result<Box<dyn KvStore>, StoreError> {
        let seed = rand_string(32);
        let fingerprint =
            argon2id_b64(name.as_bytes(), seed.as_bytes(), FINGERPRINT_LEN)?;

        prepare_opts(kind, opts)?;
        let store = self.assemble(&fingerprint, &fingerprint, kind, opts).await?;
        if let Err(e) = store.init_put(&seed).await {
            store.close().await;
            return Err(e);
        }
        Ok(store)
    }

    /// Loads a store by address, waiting until the replica observes at
    /// least one entry (or the address is out of time).
    pub async fn load_store(
        &self,
        addr: &str,
        kind: StoreKind,
        opts: &mut StoreOpts,
    ) -> Result<Box<dyn KvStore>, StoreError> {
        let parsed = parse_address(addr)?;
        opts.time_limit = parsed.time_limit;
        if opts.ac.is_none() {
            if let Some(ac_addr) = &parsed.access {
                opts.ac = Some(self.load_access_controller(ac_addr).await?);
            }
        }
        prepare_opts(kind, opts)?;

        let mut last_err = StoreError::SyncTimeout;
        for attempt in 0..LOAD_ATTEMPTS {
            let dir_name = if attempt == 0 {
                parsed.name.clone()
            } else {
                // A contended directory stays contended; move to a fresh
                // random one for the retry.
                format!("{}.{}", parsed.name, rand_string(8))
            };

            match self.assemble(&parsed.name, &dir_name, kind, opts).await {
                Err(StoreError::DirectoryLocked(d)) => {
                    tracing::warn!(target: "store", event = "dir_locked", dir = %d, attempt);
                    last_err = StoreError::DirectoryLocked(d);
                    sleep(RETRY_BACKOFF * (attempt + 1)).await;
                    continue;
                }
                Err(e) => return Err(e),
                Ok(store) => match wait_loaded(store.as_ref()).await {
                    Ok(()) => return Ok(store),
                    Err(StoreError::SyncTimeout) => {
                        tracing::warn!(target: "store", event = "load_timeout", name = %parsed.name, attempt);
                        store.close().await;
                        last_err = StoreError::SyncTimeout;
                        sleep(RETRY_BACKOFF * (attempt + 1)).await;
                    }
                    Err(e) => {
                        store.close().await;
                        return Err(e);
                    }
                },
            }
        }
        Err(last_err)
    }

    /// Creates an access controller granting `accesses` (the wildcard when
    /// empty), then drops its master private key.
    pub async fn new_access_controller(
        &self,
        name: &str,
        accesses: Vec<String>,
        opts: &mut StoreOpts,
    ) -> Result<Arc<AccessController>, StoreError> {
        let salt = match &opts.salt {
            Some(s) => s.clone(),
            None => {
                let s = rand_bytes(8);
                opts.salt = Some(s.clone());
                s
            }
        };
        prepare_opts(StoreKind::UpdatableSignature, opts)?;

        let parts = self
            .assemble_parts(name, name, StoreKind::UpdatableSignature, None)
            .await?;
        let store = UpdatableSignatureStore::start(
            parts,
            KeyState::from_options(opts.keypair.clone(), opts.public.clone()),
            None,
        )?;
        AccessController::create(store, name, salt, &accesses).await
    }

    /// Loads an access controller from its encoded address and syncs it
    /// once so capability lookups have data to verify.
    pub async fn load_access_controller(
        &self,
        ac_addr: &str,
    ) -> Result<Arc<AccessController>, StoreError> {
        let params: pb::AccessParams = parse_access_address(ac_addr)?;
        let master = crypto::pub_key_from_string(&params.pid)?;

        let parts = self
            .assemble_parts(&params.name, &params.name, StoreKind::UpdatableSignature, None)
            .await?;
        let store = UpdatableSignatureStore::start(
            parts,
            KeyState {
                keypair: None,
                public: Some(master.clone()),
            },
            None,
        )?;
        let ac = AccessController::attach(store, &params.name, params.salt, master);
        if let Err(e) = ac.sync().await {
            ac.close().await;
            return Err(e);
        }
        Ok(ac)
    }

    /// Builds the base-store parts: host, datastore, topic, validator,
    /// broadcaster, overlay bootstrap.
    async fn assemble_parts(
        &self,
        ns: &str,
        dir_name: &str,
        kind: StoreKind,
        time_limit: Option<DateTime<Utc>>,
    ) -> Result<StoreParts, StoreError> {
        let host = (self.host_gen)()?;

        let dir = self.dir.join(dir_name);
        let datastore: Arc<dyn Datastore> = match RedbDatastore::open(&dir) {
            Ok(ds) => Arc::new(ds),
            Err(DatastoreError::Locked(d)) => {
                host.close().await;
                return Err(StoreError::DirectoryLocked(d));
            }
            Err(e) => {
                host.close().await;
                return Err(e.into());
            }
        };

        let in_time = InTime::new(true);
        let validator = Arc::new(kind.validator(in_time));

        let topic_validator: MessageValidator = {
            let ns = ns.to_string();
            let datastore = Arc::clone(&datastore);
            let validator = Arc::clone(&validator);
            Arc::new(move |_source, data| validate_broadcast(&ns, &datastore, &validator, data))
        };

        let handle = match host.subscribe(ns, topic_validator).await {
            Ok(h) => h,
            Err(e) => {
                datastore.close().ok();
                host.close().await;
                return Err(e.into());
            }
        };
        let broadcaster = Arc::new(GossipBroadcaster::new(handle));

        if let Err(e) = host.bootstrap(ns, self.bootstraps.clone()).await {
            datastore.close().ok();
            host.close().await;
            return Err(e.into());
        }

        Ok(StoreParts {
            name: ns.to_string(),
            time_limit,
            dir: Some(dir),
            save: self.save,
            host: Some(host),
            datastore,
            broadcaster,
            validator,
        })
    }

    async fn assemble(
        &self,
        ns: &str,
        dir_name: &str,
        kind: StoreKind,
        opts: &StoreOpts,
    ) -> Result<Box<dyn KvStore>, StoreError> {
        let parts = self
            .assemble_parts(ns, dir_name, kind, opts.time_limit)
            .await?;
        let keys = KeyState::from_options(opts.keypair.clone(), opts.public.clone());

        let store: Box<dyn KvStore> = match kind {
            StoreKind::Log => Box::new(LogStore::start(parts)?),
            StoreKind::Hash => Box::new(HashStore::start(
                parts,
                opts.salt.clone().unwrap_or_default(),
                opts.ac.clone(),
            )?),
            StoreKind::Signature => {
                Box::new(SignatureStore::start(parts, keys, opts.ac.clone())?)
            }
            StoreKind::Updatable => Box::new(UpdatableStore::start(parts, opts.ac.clone())?),
            StoreKind::UpdatableSignature => Box::new(UpdatableSignatureStore::start(
                parts,
                keys,
                opts.ac.clone(),
            )?),
        };
        Ok(store)
    }
}

/// Fills in generated material per flavor: a random salt for hash stores,
/// a fresh keypair for signature flavors with no identity.
fn prepare_opts(kind: StoreKind, opts: &mut StoreOpts) -> Result<(), StoreError> {
    match kind {
        StoreKind::Hash => {
            if opts.salt.is_none() {
                opts.salt = Some(rand_bytes(8));
            }
        }
        StoreKind::Signature | StoreKind::UpdatableSignature => {
            if opts.keypair.is_none() && opts.public.is_none() {
                let kp = crypto::generate_keypair();
                opts.public = Some(kp.public());
                opts.keypair = Some(kp);
            } else if let Some(kp) = &opts.keypair {
                opts.public = Some(kp.public());
            }
        }
        StoreKind::Log | StoreKind::Updatable => {}
    }
    Ok(())
}

/// Polls sync + `load_check` until the replica is usable.
async fn wait_loaded(store: &dyn KvStore) -> Result<(), StoreError> {
    let poll = async {
        let mut ticker = interval(LOAD_TICK);
        loop {
            ticker.tick().await;
            store.sync().await?;
            if store.load_check().await {
                return Ok(());
            }
        }
    };
    match timeout(LOAD_TIMEOUT, poll).await {
        Ok(result) => result,
        Err(_) => Err(StoreError::SyncTimeout),
    }
}
