// Path: crates/types/src/key.rs
//! Composite-key fragments and the store address codec.
//!
//! Keys are `/`-separated: `[<id>][/<category>]/<suffix>`. The id is a
//! peer-id fingerprint (signature flavors), the category a user label
//! (updatable flavors), and the suffix either a base64 timestamp
//! (updatable) or an Argon2id digest (hash). Addresses are URL-safe base64
//! of a [`pb::BaseAddress`], optionally followed by `/` and the base64
//! [`pb::AccessParams`] of an attached access controller.

use base64::engine::general_purpose::URL_SAFE;
use base64::Engine;
use chrono::{DateTime, FixedOffset, SecondsFormat, Utc};

use crate::codec;
use crate::error::StoreError;
use crate::instant;
use crate::pb;

/// Splits a key into its `/`-separated segments, ignoring a leading slash.
pub fn split_segments(key: &str) -> Vec<&str> {
    key.trim_start_matches('/').split('/').collect()
}

/// Returns the key without its leading slash.
pub fn trim_key(key: &str) -> &str {
    key.trim_start_matches('/')
}

/// The key minus its final (timestamp) segment, or `None` for single-segment
/// keys.
pub fn category_of(key: &str) -> Option<String> {
    let segs = split_segments(key);
    if segs.len() < 2 {
        return None;
    }
    Some(segs[..segs.len() - 1].join("/"))
}

/// Encodes a UTC instant as an updatable-key suffix: URL-safe base64 of the
/// RFC 3339 nanosecond form.
pub fn make_time_key(t: DateTime<Utc>) -> String {
    URL_SAFE.encode(t.to_rfc3339_opts(SecondsFormat::Nanos, true))
}

/// Decodes an updatable-key suffix. The offset is preserved so validators
/// can reject non-UTC zones.
pub fn parse_time_key(suffix: &str) -> Result<DateTime<FixedOffset>, StoreError> {
    let raw = URL_SAFE
        .decode(suffix)
        .map_err(|e| StoreError::InvalidKey(e.to_string()))?;
    let s = std::str::from_utf8(&raw).map_err(|e| StoreError::InvalidKey(e.to_string()))?;
    DateTime::parse_from_rfc3339(s).map_err(|e| StoreError::InvalidKey(e.to_string()))
}

/// Extracts and decodes the timestamp suffix of a key.
pub fn time_of_key(key: &str) -> Result<DateTime<FixedOffset>, StoreError> {
    let segs = split_segments(key);
    match segs.last() {
        Some(last) => parse_time_key(last),
        None => Err(StoreError::InvalidKey("empty key".to_string())),
    }
}

/// A parsed store address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Address {
    /// The fingerprinted store name; doubles as the gossip topic.
    pub name: String,
    /// The wall-clock instant after which the store turns off.
    pub time_limit: Option<DateTime<Utc>>,
    /// The encoded address of an attached access controller.
    pub access: Option<String>,
}

/// Encodes a store name and optional time limit into an address string.
pub fn make_address(name: &str, time_limit: Option<DateTime<Utc>>) -> String {
    let base = pb::BaseAddress {
        name: name.to_string(),
        time: time_limit.map(|t| instant::encode(t).to_vec()).unwrap_or_default(),
    };
    URL_SAFE.encode(codec::to_bytes_canonical(&base))
}

/// Parses an address string back into its components.
pub fn parse_address(addr: &str) -> Result<Address, StoreError> {
    let trimmed = trim_key(addr);
    let (base_part, access) = match trimmed.split_once('/') {
        Some((base, rest)) if !rest.is_empty() => (base, Some(rest.to_string())),
        Some((base, _)) => (base, None),
        None => (trimmed, None),
    };

    let raw = URL_SAFE
        .decode(base_part)
        .map_err(|e| StoreError::InvalidAddress(e.to_string()))?;
    let base: pb::BaseAddress =
        codec::from_bytes_canonical(&raw).map_err(StoreError::InvalidAddress)?;
    if base.name.is_empty() {
        return Err(StoreError::InvalidAddress("empty store name".to_string()));
    }

    let time_limit = if base.time.is_empty() {
        None
    } else {
        Some(instant::decode(&base.time)?)
    };

    Ok(Address {
        name: base.name,
        time_limit,
        access,
    })
}

/// Encodes access-controller parameters into their address string.
pub fn make_access_address(pid: &str, name: &str, salt: &[u8]) -> String {
    let params = pb::AccessParams {
        pid: pid.to_string(),
        name: name.to_string(),
        salt: salt.to_vec(),
    };
    URL_SAFE.encode(codec::to_bytes_canonical(&params))
}

/// Parses an access-controller address string.
pub fn parse_access_address(addr: &str) -> Result<pb::AccessParams, StoreError> {
    let raw = URL_SAFE
        .decode(addr)
        .map_err(|e| StoreError::InvalidAddress(e.to_string()))?;
    codec::from_bytes_canonical(&raw).map_err(StoreError::InvalidAddress)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Timelike;

    #[test]
    fn address_roundtrip_without_limit() {
        let addr = make_address("store-name", None);
        let parsed = parse_address(&addr).unwrap();
        assert_eq!(parsed.name, "store-name");
        assert_eq!(parsed.time_limit, None);
        assert_eq!(parsed.access, None);
    }

    #[test]
    fn address_roundtrip_with_limit_and_access() {
        let t = Utc::now().with_nanosecond(42).unwrap();
        let ac = make_access_address("pid", "acname", &[9u8; 8]);
        let addr = format!("{}/{}", make_address("n", Some(t)), ac);

        let parsed = parse_address(&addr).unwrap();
        assert_eq!(parsed.name, "n");
        assert_eq!(parsed.time_limit, Some(t));
        let params = parse_access_address(parsed.access.as_deref().unwrap()).unwrap();
        assert_eq!(params.pid, "pid");
        assert_eq!(params.name, "acname");
        assert_eq!(params.salt, vec![9u8; 8]);
    }

    #[test]
    fn rejects_malformed_address() {
        assert!(parse_address("!!!not-base64!!!").is_err());
        assert!(parse_address(&URL_SAFE.encode(b"junk bytes")).is_err());
    }

    #[test]
    fn time_key_roundtrip_is_utc() {
        let t = Utc::now().with_nanosecond(987_654_321).unwrap();
        let suffix = make_time_key(t);
        let parsed = parse_time_key(&suffix).unwrap();
        assert_eq!(parsed.offset().local_minus_utc(), 0);
        assert_eq!(parsed.with_timezone(&Utc), t);
    }

    #[test]
    fn category_strips_the_suffix() {
        assert_eq!(category_of("/pid/aaa/ts").unwrap(), "pid/aaa");
        assert_eq!(category_of("aaa/ts").unwrap(), "aaa");
        assert_eq!(category_of("aaa"), None);
    }
}
