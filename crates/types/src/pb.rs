// Path: crates/types/src/pb.rs
//! Protobuf wire messages.
//!
//! Every externally visible structure (addresses, value envelopes, peer
//! endpoints) and the CRDT broadcast format is a protobuf message encoded
//! with [`crate::codec`] and, where it travels inside a key or an address,
//! wrapped in URL-safe base64. Field numbers are part of the wire contract
//! and must never be reassigned.

use prost::Message;

/// A value plus the signature over it, stored by signature-flavored stores.
#[derive(Clone, PartialEq, Message)]
pub struct SignatureData {
    #[prost(bytes = "vec", tag = "1")]
    pub value: Vec<u8>,
    #[prost(bytes = "vec", tag = "2")]
    pub sign: Vec<u8>,
}

/// A value plus the preimage material of its hash-derived key.
#[derive(Clone, PartialEq, Message)]
pub struct HashData {
    #[prost(string, tag = "1")]
    pub base_hash: String,
    #[prost(bytes = "vec", tag = "2")]
    pub salt: Vec<u8>,
    #[prost(bytes = "vec", tag = "3")]
    pub value: Vec<u8>,
}

/// The key name under which an access controller stores one capability.
/// This names a logical access, it does not wrap a value.
#[derive(Clone, PartialEq, Message)]
pub struct AccessKey {
    #[prost(string, tag = "1")]
    pub master_key: String,
    #[prost(string, tag = "2")]
    pub access: String,
}

/// The name component of a store address plus its binary-encoded time limit.
/// `time` is empty when the store has no time limit.
#[derive(Clone, PartialEq, Message)]
pub struct BaseAddress {
    #[prost(string, tag = "1")]
    pub name: String,
    #[prost(bytes = "vec", tag = "2")]
    pub time: Vec<u8>,
}

/// The address payload of an access controller.
#[derive(Clone, PartialEq, Message)]
pub struct AccessParams {
    #[prost(string, tag = "1")]
    pub pid: String,
    #[prost(string, tag = "2")]
    pub name: String,
    #[prost(bytes = "vec", tag = "3")]
    pub salt: Vec<u8>,
}

/// One peer endpoint: a peer id and its multiaddresses.
#[derive(Clone, PartialEq, Message)]
pub struct PeerInfo {
    #[prost(string, tag = "1")]
    pub id: String,
    #[prost(bytes = "vec", repeated, tag = "2")]
    pub addrs: Vec<Vec<u8>>,
}

/// A set of peer endpoints.
#[derive(Clone, PartialEq, Message)]
pub struct PeerInfos {
    #[prost(message, repeated, tag = "1")]
    pub infos: Vec<PeerInfo>,
}

/// One key-value pair inside a CRDT delta.
#[derive(Clone, PartialEq, Message)]
pub struct Element {
    #[prost(string, tag = "1")]
    pub key: String,
    #[prost(bytes = "vec", tag = "2")]
    pub value: Vec<u8>,
}

/// A CRDT state delta. Tombstones are carried for wire compatibility but
/// are always rejected at ingest: the log is append-only.
#[derive(Clone, PartialEq, Message)]
pub struct Delta {
    #[prost(message, repeated, tag = "1")]
    pub elements: Vec<Element>,
    #[prost(message, repeated, tag = "2")]
    pub tombstones: Vec<Element>,
    #[prost(uint64, tag = "3")]
    pub priority: u64,
}

/// One head of the delta DAG. The node payload is carried inline so a
/// replica can validate and apply a delta without a block-exchange round
/// trip; `cid` must equal the SHA-256 of `node`.
#[derive(Clone, PartialEq, Message)]
pub struct Head {
    #[prost(bytes = "vec", tag = "1")]
    pub cid: Vec<u8>,
    #[prost(bytes = "vec", tag = "2")]
    pub node: Vec<u8>,
}

/// The broadcast published on a store's gossip topic.
#[derive(Clone, PartialEq, Message)]
pub struct CrdtBroadcast {
    #[prost(message, repeated, tag = "1")]
    pub heads: Vec<Head>,
}

/// A DAG node: a delta plus the cids of the heads it supersedes.
#[derive(Clone, PartialEq, Message)]
pub struct Node {
    #[prost(message, optional, tag = "1")]
    pub delta: Option<Delta>,
    #[prost(bytes = "vec", repeated, tag = "2")]
    pub parents: Vec<Vec<u8>>,
}
