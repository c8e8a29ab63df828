// Path: crates/store/src/loopback.rs
//! An in-process broadcast hub.
//!
//! Connects replicas inside one process without sockets; used by the test
//! suite to exercise the full delta path (validators included)
//! deterministically. Messages are delivered to every joined broadcaster,
//! with the sender receiving a trusted local echo.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex as StdMutex};

use async_trait::async_trait;
use tokio::sync::{mpsc, Mutex};
use verse_types::error::StoreError;

use crate::broadcast::{BroadcastMessage, Broadcaster};

#[derive(Default)]
pub struct LoopbackHub {
    members: StdMutex<Vec<(usize, mpsc::UnboundedSender<BroadcastMessage>)>>,
    next_id: AtomicUsize,
}

impl LoopbackHub {
    pub fn new() -> Arc<Self> {
        Arc::new(LoopbackHub::default())
    }

    /// Joins the hub, returning a broadcaster wired to every other member.
    pub fn join(self: &Arc<Self>) -> LoopbackBroadcaster {
        let (tx, rx) = mpsc::unbounded_channel();
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        if let Ok(mut members) = self.members.lock() {
            members.push((id, tx));
        }
        LoopbackBroadcaster {
            id,
            hub: Arc::clone(self),
            receiver: Mutex::new(rx),
        }
    }
}

pub struct LoopbackBroadcaster {
    id: usize,
    hub: Arc<LoopbackHub>,
    receiver: Mutex<mpsc::UnboundedReceiver<BroadcastMessage>>,
}

#[async_trait]
impl Broadcaster for LoopbackBroadcaster {
    async fn broadcast(&self, data: Vec<u8>) -> Result<(), StoreError> {
        let members = self
            .hub
            .members
            .lock()
            .map_err(|e| StoreError::Decode(e.to_string()))?;
        for (id, tx) in members.iter() {
            let msg = BroadcastMessage {
                data: data.clone(),
                local: *id == self.id,
            };
            tx.send(msg).ok();
        }
        Ok(())
    }

    async fn next(&self) -> Option<BroadcastMessage> {
        self.receiver.lock().await.recv().await
    }

    fn pre_validated(&self) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn delivers_to_all_members_with_local_echo() {
        let hub = LoopbackHub::new();
        let a = hub.join();
        let b = hub.join();

        a.broadcast(b"meow".to_vec()).await.unwrap();

        let at_a = a.next().await.unwrap();
        assert!(at_a.local);
        let at_b = b.next().await.unwrap();
        assert!(!at_b.local);
        assert_eq!(at_b.data, b"meow");
    }
}
