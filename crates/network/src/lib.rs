// Path: crates/network/src/lib.rs
#![cfg_attr(
    not(test),
    deny(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::panic,
        clippy::unimplemented,
        clippy::todo
    )
)]

//! The peer host.
//!
//! One [`Host`] owns one libp2p swarm (tcp + noise + yamux transport,
//! gossipsub with explicit message validation, kademlia for overlay
//! discovery) driven by a single background task. Stores talk to it
//! through a command channel: join a topic with a validator closure,
//! publish, bootstrap the overlay and advertise a keyword.

pub mod endpoint;
pub mod host;

pub use endpoint::{endpoints_from_string, endpoints_to_string, PeerEndpoint};
pub use host::{
    GossipMessage, Host, MessageValidator, TopicHandle, TopicPublisher, TopicSubscription,
};
