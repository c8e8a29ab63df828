// Path: crates/datastore/src/query.rs
//! The query engine: options, entries, filters and orders.
//!
//! A query is a prefix scan followed by pure per-entry filters, stable
//! composed orders, an offset/limit window, and an optional keys-only
//! projection. Filters and orders run after the store scan; they never
//! touch the backend.

use std::cmp::Ordering;
use std::sync::Arc;

use verse_types::key::{parse_time_key, split_segments};

/// One query result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    pub key: String,
    pub value: Vec<u8>,
    pub size: usize,
}

impl Entry {
    pub fn new(key: impl Into<String>, value: Vec<u8>) -> Self {
        let size = value.len();
        Entry {
            key: key.into(),
            value,
            size,
        }
    }
}

/// A pure per-entry predicate.
pub trait Filter: Send + Sync {
    fn filter(&self, entry: &Entry) -> bool;
}

/// A total order over entries. Orders compose: earlier orders dominate,
/// later ones break ties.
pub trait Order: Send + Sync {
    fn compare(&self, a: &Entry, b: &Entry) -> Ordering;
}

/// Query options. The default query scans everything and returns raw
/// entries in backend order.
#[derive(Clone, Default)]
pub struct Query {
    /// Scan only keys starting with this prefix.
    pub prefix: String,
    /// Predicates applied after the scan, all must pass.
    pub filters: Vec<Arc<dyn Filter>>,
    /// Composed orders applied after filtering.
    pub orders: Vec<Arc<dyn Order>>,
    /// Maximum number of results; zero means unlimited.
    pub limit: usize,
    /// Number of leading results to skip after ordering.
    pub offset: usize,
    /// Return keys without values.
    pub keys_only: bool,
    /// Populate entry sizes even for keys-only results.
    pub returns_sizes: bool,
}

impl Query {
    pub fn with_prefix(prefix: impl Into<String>) -> Self {
        Query {
            prefix: prefix.into(),
            ..Query::default()
        }
    }
}

/// Applies filters, orders, offset/limit and the keys-only projection to a
/// scanned entry set. Backends call this after their prefix scan so every
/// store behaves identically.
pub fn apply_options(mut entries: Vec<Entry>, q: &Query) -> Vec<Entry> {
    if !q.filters.is_empty() {
        entries.retain(|e| q.filters.iter().all(|f| f.filter(e)));
    }
    if !q.orders.is_empty() {
        entries.sort_by(|a, b| {
            for order in &q.orders {
                match order.compare(a, b) {
                    Ordering::Equal => continue,
                    other => return other,
                }
            }
            Ordering::Equal
        });
    }
    if q.offset > 0 {
        entries = entries.split_off(q.offset.min(entries.len()));
    }
    if q.limit > 0 {
        entries.truncate(q.limit);
    }
    if q.keys_only {
        for e in &mut entries {
            if !q.returns_sizes {
                e.size = 0;
            }
            e.value.clear();
        }
    }
    entries
}

/// A lazily consumable result sequence.
pub struct QueryResults {
    entries: std::vec::IntoIter<Entry>,
}

impl QueryResults {
    pub fn new(entries: Vec<Entry>) -> Self {
        QueryResults {
            entries: entries.into_iter(),
        }
    }

    /// Drains all remaining results.
    pub fn rest(self) -> Vec<Entry> {
        self.entries.collect()
    }
}

impl Iterator for QueryResults {
    type Item = Entry;

    fn next(&mut self) -> Option<Entry> {
        self.entries.next()
    }
}

/// Matches `/`-separated key segments against a pattern where `*` matches
/// any single segment; the pattern may be a prefix of the key.
pub struct KeyMatchFilter {
    pub pattern: String,
}

impl Filter for KeyMatchFilter {
    fn filter(&self, entry: &Entry) -> bool {
        let segs = split_segments(&entry.key);
        let pat = split_segments(&self.pattern);
        if segs.len() < pat.len() {
            return false;
        }
        pat.iter()
            .zip(segs.iter())
            .all(|(p, s)| *p == "*" || p == s)
    }
}

/// True if any segment of the entry key equals the filter key.
pub struct KeyExistFilter {
    pub key: String,
}

impl Filter for KeyExistFilter {
    fn filter(&self, entry: &Entry) -> bool {
        split_segments(&entry.key).iter().any(|s| *s == self.key)
    }
}

/// Byte-for-byte equality on the entry value.
pub struct ValueMatchFilter {
    pub value: Vec<u8>,
}

impl Filter for ValueMatchFilter {
    fn filter(&self, entry: &Entry) -> bool {
        entry.value == self.value
    }
}

/// Lexicographic order on the key minus its timestamp suffix. Entries
/// without a category sort last.
pub struct CategoryOrder;

impl Order for CategoryOrder {
    fn compare(&self, a: &Entry, b: &Entry) -> Ordering {
        let cat = |e: &Entry| -> Option<String> { verse_types::key::category_of(&e.key) };
        match (cat(a), cat(b)) {
            (Some(ca), Some(cb)) => ca.cmp(&cb),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        }
    }
}

/// Newest-first order on the timestamp suffix, compared in UTC. Entries
/// whose suffix fails to decode sort last. Equal timestamps tie-break by
/// the full key so every replica orders identically.
pub struct UpdatableOrder;

impl Order for UpdatableOrder {
    fn compare(&self, a: &Entry, b: &Entry) -> Ordering {
        let time = |e: &Entry| {
            split_segments(&e.key)
                .last()
                .and_then(|s| parse_time_key(s).ok())
        };
        match (time(a), time(b)) {
            (Some(ta), Some(tb)) => tb.cmp(&ta).then_with(|| a.key.cmp(&b.key)),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use verse_types::key::make_time_key;

    fn e(key: &str, value: &[u8]) -> Entry {
        Entry::new(key, value.to_vec())
    }

    #[test]
    fn key_match_filter_supports_wildcards_and_prefixes() {
        let f = KeyMatchFilter {
            pattern: "aaa".into(),
        };
        assert!(f.filter(&e("/aaa/ts", b"")));
        assert!(f.filter(&e("/aaa", b"")));
        assert!(!f.filter(&e("/bbb/ts", b"")));

        let f = KeyMatchFilter {
            pattern: "*/aaa".into(),
        };
        assert!(f.filter(&e("/pid/aaa/ts", b"")));
        assert!(!f.filter(&e("/pid/bbb/ts", b"")));
        assert!(!f.filter(&e("/pid", b"")));
    }

    #[test]
    fn key_exist_filter_checks_every_segment() {
        let f = KeyExistFilter { key: "aaa".into() };
        assert!(f.filter(&e("/pid/aaa/ts", b"")));
        assert!(f.filter(&e("/aaa", b"")));
        assert!(!f.filter(&e("/pid/aab/ts", b"")));
    }

    #[test]
    fn value_match_filter_is_exact() {
        let f = ValueMatchFilter {
            value: b"meow".to_vec(),
        };
        assert!(f.filter(&e("/k", b"meow")));
        assert!(!f.filter(&e("/k", b"meow ")));
    }

    #[test]
    fn updatable_order_is_newest_first() {
        let t0 = Utc::now();
        let t1 = t0 + Duration::seconds(5);
        let old = e(&format!("/aaa/{}", make_time_key(t0)), b"v1");
        let new = e(&format!("/aaa/{}", make_time_key(t1)), b"v2");

        let sorted = apply_options(
            vec![old.clone(), new.clone()],
            &Query {
                orders: vec![Arc::new(UpdatableOrder)],
                ..Query::default()
            },
        );
        assert_eq!(sorted[0].value, b"v2");
        assert_eq!(sorted[1].value, b"v1");
    }

    #[test]
    fn category_then_updatable_groups_versions() {
        let t0 = Utc::now();
        let t1 = t0 + Duration::seconds(1);
        let entries = vec![
            e(&format!("/bbb/{}", make_time_key(t0)), b"b0"),
            e(&format!("/aaa/{}", make_time_key(t0)), b"a0"),
            e(&format!("/aaa/{}", make_time_key(t1)), b"a1"),
        ];
        let sorted = apply_options(
            entries,
            &Query {
                orders: vec![Arc::new(CategoryOrder), Arc::new(UpdatableOrder)],
                ..Query::default()
            },
        );
        let keys: Vec<&[u8]> = sorted.iter().map(|e| e.value.as_slice()).collect();
        assert_eq!(keys, vec![b"a1".as_slice(), b"a0".as_slice(), b"b0".as_slice()]);
    }

    #[test]
    fn offset_limit_and_keys_only() {
        let entries = vec![e("/a", b"1"), e("/b", b"2"), e("/c", b"3")];
        let out = apply_options(
            entries,
            &Query {
                offset: 1,
                limit: 1,
                keys_only: true,
                ..Query::default()
            },
        );
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].key, "/b");
        assert!(out[0].value.is_empty());
    }
}
