// Path: crates/network/src/endpoint.rs
//! Peer-endpoint wire format.
//!
//! Bootstrap peers travel as URL-safe base64 of a `PeerInfos` protobuf so
//! an endpoint list can be pasted between processes as one opaque string.

use std::str::FromStr;

use base64::engine::general_purpose::URL_SAFE;
use base64::Engine;
use libp2p::{Multiaddr, PeerId};
use verse_types::codec;
use verse_types::error::NetworkError;
use verse_types::pb;

/// One reachable peer: its id and multiaddresses.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerEndpoint {
    pub id: PeerId,
    pub addrs: Vec<Multiaddr>,
}

/// Encodes endpoints as a single address string.
pub fn endpoints_to_string(endpoints: &[PeerEndpoint]) -> String {
    let infos = pb::PeerInfos {
        infos: endpoints
            .iter()
            .map(|e| pb::PeerInfo {
                id: e.id.to_base58(),
                addrs: e.addrs.iter().map(|a| a.to_vec()).collect(),
            })
            .collect(),
    };
    URL_SAFE.encode(codec::to_bytes_canonical(&infos))
}

/// Decodes an endpoint address string. Endpoints with an unparsable id are
/// dropped rather than failing the whole list.
pub fn endpoints_from_string(s: &str) -> Result<Vec<PeerEndpoint>, NetworkError> {
    let raw = URL_SAFE
        .decode(s)
        .map_err(|e| NetworkError::Transport(e.to_string()))?;
    let infos: pb::PeerInfos =
        codec::from_bytes_canonical(&raw).map_err(NetworkError::Transport)?;

    let mut endpoints = Vec::with_capacity(infos.infos.len());
    for info in infos.infos {
        let Ok(id) = PeerId::from_str(&info.id) else {
            tracing::warn!(target: "network", event = "bad_endpoint", id = %info.id);
            continue;
        };
        let addrs = info
            .addrs
            .iter()
            .filter_map(|b| Multiaddr::try_from(b.clone()).ok())
            .collect();
        endpoints.push(PeerEndpoint { id, addrs });
    }
    Ok(endpoints)
}

#[cfg(test)]
mod tests {
    use super::*;
    use libp2p::identity;

    #[test]
    fn endpoint_roundtrip() {
        let kp = identity::Keypair::generate_ed25519();
        let endpoint = PeerEndpoint {
            id: kp.public().to_peer_id(),
            addrs: vec!["/ip4/127.0.0.1/tcp/4001".parse().unwrap()],
        };

        let s = endpoints_to_string(std::slice::from_ref(&endpoint));
        let decoded = endpoints_from_string(&s).unwrap();
        assert_eq!(decoded, vec![endpoint]);
    }

    #[test]
    fn rejects_garbage() {
        assert!(endpoints_from_string("***").is_err());
    }
}
