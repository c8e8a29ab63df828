// Path: crates/store/src/broadcast.rs
//! The CRDT broadcaster interface and its gossip implementation.

use async_trait::async_trait;
use tokio::sync::Mutex;
use verse_network::{TopicHandle, TopicPublisher, TopicSubscription};
use verse_types::error::StoreError;

/// One message received from the broadcast channel.
#[derive(Debug, Clone)]
pub struct BroadcastMessage {
    pub data: Vec<u8>,
    /// The trusted echo of this replica's own publish.
    pub local: bool,
}

/// Carries CRDT broadcasts between replicas of one store.
#[async_trait]
pub trait Broadcaster: Send + Sync {
    /// Publishes `data` to every replica, including the local echo.
    async fn broadcast(&self, data: Vec<u8>) -> Result<(), StoreError>;

    /// Waits for the next message; `None` once the channel is closed.
    async fn next(&self) -> Option<BroadcastMessage>;

    /// Whether inbound messages were already validated upstream (a topic
    /// validator ran before delivery). When false the ingest loop
    /// validates itself.
    fn pre_validated(&self) -> bool;
}

/// A [`Broadcaster`] over one gossipsub topic. Messages arriving here have
/// already passed the topic validator registered at subscription.
pub struct GossipBroadcaster {
    publisher: TopicPublisher,
    subscription: Mutex<TopicSubscription>,
}

impl GossipBroadcaster {
    pub fn new(handle: TopicHandle) -> Self {
        let (publisher, subscription) = handle.split();
        GossipBroadcaster {
            publisher,
            subscription: Mutex::new(subscription),
        }
    }
}

#[async_trait]
impl Broadcaster for GossipBroadcaster {
    async fn broadcast(&self, data: Vec<u8>) -> Result<(), StoreError> {
        self.publisher.publish(data).await.map_err(StoreError::from)
    }

    async fn next(&self) -> Option<BroadcastMessage> {
        let msg = self.subscription.lock().await.next().await?;
        Some(BroadcastMessage {
            data: msg.data,
            local: msg.local,
        })
    }

    fn pre_validated(&self) -> bool {
        true
    }
}
