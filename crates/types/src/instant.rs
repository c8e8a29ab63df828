// Path: crates/types/src/instant.rs
//! The 15-byte binary instant codec used inside addresses.
//!
//! Layout: `[version=1][seconds be i64][nanoseconds be i32][offset be i16]`
//! where seconds count from January 1 of year 1 UTC and the offset is the
//! zone offset in minutes, with `-1` marking UTC. Only UTC instants are
//! ever produced; any other offset is rejected on decode.

use chrono::{DateTime, TimeZone, Utc};

use crate::error::StoreError;

const VERSION: u8 = 1;
/// Seconds between year 1 and the Unix epoch.
const UNIX_TO_INTERNAL: i64 = 62_135_596_800;
/// The zone-offset marker for UTC.
const UTC_OFFSET: i16 = -1;
/// Encoded length in bytes.
pub const ENCODED_LEN: usize = 15;

/// Encodes a UTC instant into its 15-byte binary representation.
pub fn encode(t: DateTime<Utc>) -> [u8; ENCODED_LEN] {
    let sec = t.timestamp() + UNIX_TO_INTERNAL;
    let nsec = t.timestamp_subsec_nanos() as i32;

    let mut out = [0u8; ENCODED_LEN];
    out[0] = VERSION;
    out[1..9].copy_from_slice(&sec.to_be_bytes());
    out[9..13].copy_from_slice(&nsec.to_be_bytes());
    out[13..15].copy_from_slice(&UTC_OFFSET.to_be_bytes());
    out
}

/// Decodes a 15-byte binary instant back into a UTC timestamp.
pub fn decode(b: &[u8]) -> Result<DateTime<Utc>, StoreError> {
    if b.len() != ENCODED_LEN {
        return Err(StoreError::InvalidAddress(format!(
            "binary instant must be {} bytes, got {}",
            ENCODED_LEN,
            b.len()
        )));
    }
    if b[0] != VERSION {
        return Err(StoreError::InvalidAddress(format!(
            "unsupported binary instant version {}",
            b[0]
        )));
    }

    let mut sec_bytes = [0u8; 8];
    sec_bytes.copy_from_slice(&b[1..9]);
    let mut nsec_bytes = [0u8; 4];
    nsec_bytes.copy_from_slice(&b[9..13]);
    let mut off_bytes = [0u8; 2];
    off_bytes.copy_from_slice(&b[13..15]);

    let offset = i16::from_be_bytes(off_bytes);
    if offset != UTC_OFFSET {
        return Err(StoreError::InvalidAddress(
            "binary instant is not UTC".to_string(),
        ));
    }

    let sec = i64::from_be_bytes(sec_bytes) - UNIX_TO_INTERNAL;
    let nsec = i32::from_be_bytes(nsec_bytes);
    if !(0..1_000_000_000).contains(&nsec) {
        return Err(StoreError::InvalidAddress(
            "binary instant nanoseconds out of range".to_string(),
        ));
    }

    Utc.timestamp_opt(sec, nsec as u32)
        .single()
        .ok_or_else(|| StoreError::InvalidAddress("binary instant out of range".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Timelike;

    #[test]
    fn roundtrip() {
        let t = Utc::now().with_nanosecond(123_456_789).unwrap();
        let b = encode(t);
        assert_eq!(b.len(), ENCODED_LEN);
        assert_eq!(decode(&b).unwrap(), t);
    }

    #[test]
    fn epoch_encodes_known_seconds() {
        let t = Utc.timestamp_opt(0, 0).unwrap();
        let b = encode(t);
        assert_eq!(b[0], 1);
        let mut sec = [0u8; 8];
        sec.copy_from_slice(&b[1..9]);
        assert_eq!(i64::from_be_bytes(sec), UNIX_TO_INTERNAL);
    }

    #[test]
    fn rejects_wrong_length_and_version() {
        assert!(decode(&[0u8; 3]).is_err());
        let mut b = encode(Utc::now());
        b[0] = 9;
        assert!(decode(&b).is_err());
    }

    #[test]
    fn rejects_non_utc_offset() {
        let mut b = encode(Utc::now());
        b[13..15].copy_from_slice(&540i16.to_be_bytes());
        assert!(decode(&b).is_err());
    }
}
