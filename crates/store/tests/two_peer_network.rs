// Path: crates/store/tests/two_peer_network.rs
//! Two real peers over loopback TCP: the full factory path with gossipsub
//! and kad discovery. Slow and socket-dependent, so ignored by default;
//! run with `cargo test -- --ignored`.

use std::time::Duration;

use tokio::time::sleep;
use verse_network::{Host, PeerEndpoint};
use verse_store::{sample_host_gen, KvStore, StoreKind, StoreOpts, Verse};

/// Spins up a standalone bootstrap host both peers dial.
async fn bootstrap_endpoint() -> (Host, PeerEndpoint) {
    let host = Host::new().unwrap();
    // Give the transport a beat to report its listen addresses.
    for _ in 0..50 {
        if !host.endpoint().addrs.is_empty() {
            break;
        }
        sleep(Duration::from_millis(100)).await;
    }
    let endpoint = host.endpoint();
    assert!(!endpoint.addrs.is_empty(), "bootstrap host never listened");
    (host, endpoint)
}

#[tokio::test(flavor = "multi_thread")]
#[ignore = "requires localhost networking and tens of seconds of gossip"]
async fn hash_store_replicates_across_real_peers() {
    let _ = verse_store::telemetry::init_tracing();
    let tmp = tempfile::tempdir().unwrap();
    let (bootstrap, endpoint) = bootstrap_endpoint().await;

    let salt = vec![3u8; 8];
    let verse_a = Verse::new(
        sample_host_gen(),
        tmp.path().join("a"),
        false,
        vec![endpoint.clone()],
    );
    let mut opts_a = StoreOpts {
        salt: Some(salt.clone()),
        ..StoreOpts::default()
    };
    let db_a = verse_a
        .new_store("testDB", StoreKind::Hash, &mut opts_a)
        .await
        .unwrap();

    let verse_b = Verse::new(
        sample_host_gen(),
        tmp.path().join("b"),
        false,
        vec![endpoint],
    );
    let mut opts_b = StoreOpts {
        salt: Some(salt),
        ..StoreOpts::default()
    };
    let db_b = verse_b
        .load_store(&db_a.address(), StoreKind::Hash, &mut opts_b)
        .await
        .unwrap();

    db_a.put("aaa", b"meow").await.unwrap();

    let mut found = false;
    for _ in 0..30 {
        db_b.sync().await.unwrap();
        if db_b.has("aaa").await.unwrap_or(false) {
            found = true;
            break;
        }
        sleep(Duration::from_secs(2)).await;
    }
    assert!(found, "peer B never observed the write");
    assert_eq!(db_b.get("aaa").await.unwrap(), b"meow");

    db_a.close().await;
    db_b.close().await;
    bootstrap.close().await;
}
