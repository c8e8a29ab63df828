// Path: crates/store/src/tests/time_tests.rs
use chrono::{Duration as ChronoDuration, Utc};
use tokio::time::{sleep, Duration};
use verse_datastore::query::Query;
use verse_types::crypto;
use verse_types::key::parse_address;
use verse_types::StoreError;

use super::harness::{eventually, TestNet};
use crate::traits::KvStore;

#[tokio::test]
async fn writes_before_the_limit_land_and_after_it_vanish() {
    let net = TestNet::new();
    let kp = crypto::generate_keypair();
    let pid = crypto::pub_key_to_string(&kp.public());
    let limit = Utc::now() + ChronoDuration::milliseconds(500);

    let db = net.updatable_signature_store("tl", Some(kp), None, Some(limit));
    assert!(db.is_in_time());

    db.put("aaa", b"meow").await.unwrap();
    assert_eq!(db.get(&format!("{pid}/aaa")).await.unwrap(), b"meow");

    eventually("time limit fires", || async { !db.is_in_time() }).await;

    // Writes silently no-op, reads behave as empty.
    db.put("bbb", b"late").await.unwrap();
    assert!(matches!(
        db.get(&format!("{pid}/aaa")).await.unwrap_err(),
        StoreError::NotFound
    ));
    assert!(!db.has(&format!("{pid}/bbb")).await.unwrap());
    assert!(db.query(Query::default()).await.unwrap().is_empty());

    // An expired replica reports ready so loads do not hang on it.
    assert!(db.load_check().await);

    db.close().await;
}

#[tokio::test]
async fn past_dated_limit_disables_the_store_at_construction() {
    let net = TestNet::new();
    let limit = Utc::now() - ChronoDuration::seconds(10);
    let db = net.log_store("tl", Some(limit));

    assert!(!db.is_in_time());
    db.put("aaa", b"meow").await.unwrap();
    assert!(!db.has("aaa").await.unwrap());
    assert!(db.load_check().await);

    db.close().await;
}

#[tokio::test]
async fn in_time_never_flips_back() {
    let net = TestNet::new();
    let limit = Utc::now() + ChronoDuration::milliseconds(200);
    let db = net.log_store("tl", Some(limit));

    db.put("aaa", b"meow").await.unwrap();
    eventually("time limit fires", || async { !db.is_in_time() }).await;

    // Sync is a no-op out of time and the flag stays down.
    db.sync().await.unwrap();
    sleep(Duration::from_millis(100)).await;
    assert!(!db.is_in_time());

    db.close().await;
}

#[tokio::test]
async fn address_preserves_the_time_limit() {
    let net = TestNet::new();
    let limit = Utc::now() + ChronoDuration::hours(1);
    let db = net.log_store("tl", Some(limit));

    let parsed = parse_address(&db.address()).unwrap();
    // The binary instant codec keeps whole nanoseconds.
    assert_eq!(parsed.time_limit.unwrap(), limit);

    db.close().await;
}
