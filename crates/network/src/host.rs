// Path: crates/network/src/host.rs
//! The libp2p host implementation.

use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex};

use futures::StreamExt;
use libp2p::gossipsub::{self, MessageAcceptance, TopicHash};
use libp2p::kad::{self, store::MemoryStore};
use libp2p::swarm::dial_opts::DialOpts;
use libp2p::swarm::{NetworkBehaviour, SwarmEvent};
use libp2p::{identity, noise, tcp, yamux, Multiaddr, PeerId, Swarm, SwarmBuilder};
use tokio::sync::{mpsc, oneshot, watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::Duration;
use verse_types::error::NetworkError;

use crate::endpoint::PeerEndpoint;

/// Decides whether an inbound gossip message is admitted and propagated.
/// Must be cheap-first: reject duplicates before verifying anything
/// expensive.
pub type MessageValidator = Arc<dyn Fn(Option<PeerId>, &[u8]) -> bool + Send + Sync>;

/// One message delivered on a subscribed topic. `local` marks the trusted
/// echo of this host's own publishes, which skips validation.
#[derive(Debug, Clone)]
pub struct GossipMessage {
    pub source: Option<PeerId>,
    pub data: Vec<u8>,
    pub local: bool,
}

#[derive(NetworkBehaviour)]
struct VerseBehaviour {
    gossipsub: gossipsub::Behaviour,
    kad: kad::Behaviour<MemoryStore>,
}

struct TopicState {
    name: String,
    validator: MessageValidator,
    sender: mpsc::Sender<GossipMessage>,
}

enum HostCommand {
    Subscribe {
        topic: String,
        validator: MessageValidator,
        sender: mpsc::Sender<GossipMessage>,
        reply: oneshot::Sender<Result<(), NetworkError>>,
    },
    Publish {
        topic: String,
        data: Vec<u8>,
        reply: oneshot::Sender<Result<(), NetworkError>>,
    },
    Bootstrap {
        keyword: String,
        peers: Vec<PeerEndpoint>,
    },
}

/// A joined gossip topic: publish plus the inbound message stream.
pub struct TopicHandle {
    topic: String,
    receiver: mpsc::Receiver<GossipMessage>,
    cmd: mpsc::Sender<HostCommand>,
}

impl TopicHandle {
    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Publishes `data` on this topic. The local replica receives a trusted
    /// echo regardless of mesh connectivity.
    pub async fn publish(&self, data: Vec<u8>) -> Result<(), NetworkError> {
        let (reply, rx) = oneshot::channel();
        self.cmd
            .send(HostCommand::Publish {
                topic: self.topic.clone(),
                data,
                reply,
            })
            .await
            .map_err(|_| NetworkError::ChannelClosed)?;
        rx.await.map_err(|_| NetworkError::ChannelClosed)?
    }

    /// Waits for the next admitted message. Returns `None` once the host
    /// shuts down.
    pub async fn next(&mut self) -> Option<GossipMessage> {
        self.receiver.recv().await
    }

    /// Splits the handle into an independently usable publisher and
    /// subscription, so one task can publish while another drains messages.
    pub fn split(self) -> (TopicPublisher, TopicSubscription) {
        (
            TopicPublisher {
                topic: self.topic,
                cmd: self.cmd,
            },
            TopicSubscription {
                receiver: self.receiver,
            },
        )
    }
}

/// The publish half of a [`TopicHandle`].
#[derive(Clone)]
pub struct TopicPublisher {
    topic: String,
    cmd: mpsc::Sender<HostCommand>,
}

impl TopicPublisher {
    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub async fn publish(&self, data: Vec<u8>) -> Result<(), NetworkError> {
        let (reply, rx) = oneshot::channel();
        self.cmd
            .send(HostCommand::Publish {
                topic: self.topic.clone(),
                data,
                reply,
            })
            .await
            .map_err(|_| NetworkError::ChannelClosed)?;
        rx.await.map_err(|_| NetworkError::ChannelClosed)?
    }
}

/// The receive half of a [`TopicHandle`].
pub struct TopicSubscription {
    receiver: mpsc::Receiver<GossipMessage>,
}

impl TopicSubscription {
    pub async fn next(&mut self) -> Option<GossipMessage> {
        self.receiver.recv().await
    }
}

/// A peer host owning one swarm task.
pub struct Host {
    local_peer_id: PeerId,
    keypair: identity::Keypair,
    cmd: mpsc::Sender<HostCommand>,
    shutdown: watch::Sender<bool>,
    task: Mutex<Option<JoinHandle<()>>>,
    listen_addrs: Arc<StdMutex<Vec<Multiaddr>>>,
}

impl Host {
    /// Spawns a host with a fresh ed25519 identity, listening on an
    /// OS-assigned TCP port.
    pub fn new() -> Result<Self, NetworkError> {
        Self::with_keypair(identity::Keypair::generate_ed25519())
    }

    /// Spawns a host with the given identity.
    pub fn with_keypair(keypair: identity::Keypair) -> Result<Self, NetworkError> {
        let local_peer_id = keypair.public().to_peer_id();
        let mut swarm = build_swarm(keypair.clone())?;
        swarm
            .listen_on(
                "/ip4/0.0.0.0/tcp/0"
                    .parse()
                    .map_err(|e: libp2p::multiaddr::Error| NetworkError::Transport(e.to_string()))?,
            )
            .map_err(|e| NetworkError::Transport(e.to_string()))?;

        let (cmd_tx, cmd_rx) = mpsc::channel(64);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let listen_addrs = Arc::new(StdMutex::new(Vec::new()));

        let task = tokio::spawn(run_swarm_loop(
            swarm,
            cmd_rx,
            shutdown_rx,
            Arc::clone(&listen_addrs),
        ));

        Ok(Host {
            local_peer_id,
            keypair,
            cmd: cmd_tx,
            shutdown: shutdown_tx,
            task: Mutex::new(Some(task)),
            listen_addrs,
        })
    }

    pub fn local_peer_id(&self) -> PeerId {
        self.local_peer_id
    }

    pub fn keypair(&self) -> &identity::Keypair {
        &self.keypair
    }

    /// The endpoint other peers can use to reach this host. Addresses fill
    /// in once the transport reports its listeners.
    pub fn endpoint(&self) -> PeerEndpoint {
        let addrs = self
            .listen_addrs
            .lock()
            .map(|a| a.clone())
            .unwrap_or_default();
        PeerEndpoint {
            id: self.local_peer_id,
            addrs,
        }
    }

    /// Joins `topic`, registering `validator` for inbound messages.
    pub async fn subscribe(
        &self,
        topic: &str,
        validator: MessageValidator,
    ) -> Result<TopicHandle, NetworkError> {
        let (sender, receiver) = mpsc::channel(256);
        let (reply, rx) = oneshot::channel();
        self.cmd
            .send(HostCommand::Subscribe {
                topic: topic.to_string(),
                validator,
                sender,
                reply,
            })
            .await
            .map_err(|_| NetworkError::ChannelClosed)?;
        rx.await.map_err(|_| NetworkError::ChannelClosed)??;

        Ok(TopicHandle {
            topic: topic.to_string(),
            receiver,
            cmd: self.cmd.clone(),
        })
    }

    /// Connects the bootstrap peers, bootstraps the overlay and advertises
    /// `keyword` so replicas of the same store find each other.
    pub async fn bootstrap(
        &self,
        keyword: &str,
        peers: Vec<PeerEndpoint>,
    ) -> Result<(), NetworkError> {
        self.cmd
            .send(HostCommand::Bootstrap {
                keyword: keyword.to_string(),
                peers,
            })
            .await
            .map_err(|_| NetworkError::ChannelClosed)
    }

    /// Stops the swarm task. Idempotent.
    pub async fn close(&self) {
        self.shutdown.send(true).ok();
        if let Some(task) = self.task.lock().await.take() {
            if let Err(e) = task.await {
                tracing::warn!(target: "network", event = "task_join_failed", error = %e);
            }
        }
    }
}

fn build_swarm(keypair: identity::Keypair) -> Result<Swarm<VerseBehaviour>, NetworkError> {
    let swarm = SwarmBuilder::with_existing_identity(keypair)
        .with_tokio()
        .with_tcp(
            tcp::Config::default(),
            noise::Config::new,
            yamux::Config::default,
        )
        .map_err(|e| NetworkError::Transport(e.to_string()))?
        .with_behaviour(|key| {
            let gossipsub_config = gossipsub::ConfigBuilder::default()
                .validation_mode(gossipsub::ValidationMode::Strict)
                .validate_messages()
                .build()?;
            let gossipsub = gossipsub::Behaviour::new(
                gossipsub::MessageAuthenticity::Signed(key.clone()),
                gossipsub_config,
            )?;

            let peer_id = key.public().to_peer_id();
            let mut kad = kad::Behaviour::new(peer_id, MemoryStore::new(peer_id));
            kad.set_mode(Some(kad::Mode::Server));

            Ok(VerseBehaviour { gossipsub, kad })
        })
        .map_err(|e| NetworkError::Transport(e.to_string()))?
        .with_swarm_config(|c| c.with_idle_connection_timeout(Duration::from_secs(60)))
        .build();
    Ok(swarm)
}

async fn run_swarm_loop(
    mut swarm: Swarm<VerseBehaviour>,
    mut commands: mpsc::Receiver<HostCommand>,
    mut shutdown: watch::Receiver<bool>,
    listen_addrs: Arc<StdMutex<Vec<Multiaddr>>>,
) {
    let mut topics: HashMap<TopicHash, TopicState> = HashMap::new();
    let local_peer_id = *swarm.local_peer_id();

    loop {
        tokio::select! {
            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    break;
                }
            }
            command = commands.recv() => match command {
                Some(cmd) => handle_command(&mut swarm, &mut topics, local_peer_id, cmd).await,
                None => break,
            },
            event = swarm.select_next_some() => match event {
                SwarmEvent::NewListenAddr { address, .. } => {
                    tracing::info!(target: "network", event = "listening", %address);
                    if let Ok(mut addrs) = listen_addrs.lock() {
                        addrs.push(address);
                    }
                }
                SwarmEvent::ConnectionEstablished { peer_id, .. } => {
                    tracing::debug!(target: "network", event = "connected", %peer_id);
                }
                SwarmEvent::ConnectionClosed { peer_id, .. } => {
                    tracing::debug!(target: "network", event = "disconnected", %peer_id);
                }
                SwarmEvent::Behaviour(VerseBehaviourEvent::Gossipsub(gossipsub::Event::Message {
                    propagation_source,
                    message_id,
                    message,
                })) => {
                    let Some(state) = topics.get(&message.topic) else {
                        continue;
                    };
                    let admitted = (state.validator)(message.source, &message.data);
                    let acceptance = if admitted {
                        MessageAcceptance::Accept
                    } else {
                        MessageAcceptance::Reject
                    };
                    swarm
                        .behaviour_mut()
                        .gossipsub
                        .report_message_validation_result(&message_id, &propagation_source, acceptance)
                        .ok();

                    if admitted {
                        let msg = GossipMessage {
                            source: message.source,
                            data: message.data,
                            local: false,
                        };
                        if state.sender.try_send(msg).is_err() {
                            tracing::warn!(target: "gossip", event = "subscriber_lagging", topic = %state.name);
                        }
                    } else {
                        tracing::debug!(target: "gossip", event = "rejected", topic = %state.name, source = ?message.source);
                    }
                }
                SwarmEvent::Behaviour(VerseBehaviourEvent::Kad(kad::Event::OutboundQueryProgressed {
                    result: kad::QueryResult::GetProviders(Ok(kad::GetProvidersOk::FoundProviders { providers, .. })),
                    ..
                })) => {
                    for provider in providers {
                        if provider == local_peer_id {
                            continue;
                        }
                        if let Err(e) = swarm.dial(DialOpts::peer_id(provider).build()) {
                            tracing::debug!(target: "network", event = "dial_failed", peer = %provider, error = %e);
                        }
                    }
                }
                _ => {}
            }
        }
    }
    tracing::info!(target: "network", event = "shutdown", component = "swarm");
}

async fn handle_command(
    swarm: &mut Swarm<VerseBehaviour>,
    topics: &mut HashMap<TopicHash, TopicState>,
    local_peer_id: PeerId,
    cmd: HostCommand,
) {
    match cmd {
        HostCommand::Subscribe {
            topic,
            validator,
            sender,
            reply,
        } => {
            let ident = gossipsub::IdentTopic::new(&topic);
            let result = swarm
                .behaviour_mut()
                .gossipsub
                .subscribe(&ident)
                .map(|_| ())
                .map_err(|e| NetworkError::Subscribe(e.to_string()));
            if result.is_ok() {
                topics.insert(
                    ident.hash(),
                    TopicState {
                        name: topic,
                        validator,
                        sender,
                    },
                );
            }
            reply.send(result).ok();
        }
        HostCommand::Publish { topic, data, reply } => {
            let ident = gossipsub::IdentTopic::new(&topic);
            let result = match swarm
                .behaviour_mut()
                .gossipsub
                .publish(ident.hash(), data.clone())
            {
                Ok(_) => Ok(()),
                Err(gossipsub::PublishError::InsufficientPeers) => {
                    // Normal before the mesh forms; the periodic sync
                    // rebroadcast covers the gap.
                    tracing::debug!(target: "gossip", event = "no_peers", topic = %topic);
                    Ok(())
                }
                Err(gossipsub::PublishError::Duplicate) => Ok(()),
                Err(e) => Err(NetworkError::Publish(e.to_string())),
            };

            if result.is_ok() {
                if let Some(state) = topics.get(&ident.hash()) {
                    let echo = GossipMessage {
                        source: Some(local_peer_id),
                        data,
                        local: true,
                    };
                    state.sender.try_send(echo).ok();
                }
            }
            reply.send(result).ok();
        }
        HostCommand::Bootstrap { keyword, peers } => {
            for peer in peers {
                if peer.id == local_peer_id {
                    continue;
                }
                for addr in &peer.addrs {
                    swarm
                        .behaviour_mut()
                        .kad
                        .add_address(&peer.id, addr.clone());
                }
                if let Err(e) = swarm.dial(DialOpts::peer_id(peer.id).build()) {
                    tracing::debug!(target: "network", event = "bootstrap_dial_failed", peer = %peer.id, error = %e);
                }
            }
            swarm.behaviour_mut().kad.bootstrap().ok();

            let key = kad::RecordKey::new(&keyword.as_bytes());
            if let Err(e) = swarm.behaviour_mut().kad.start_providing(key.clone()) {
                tracing::warn!(target: "network", event = "advertise_failed", error = %e);
            }
            swarm.behaviour_mut().kad.get_providers(key);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn accept_all() -> MessageValidator {
        Arc::new(|_, _| true)
    }

    #[tokio::test]
    async fn publish_delivers_local_echo() {
        let host = Host::new().unwrap();
        let mut topic = host.subscribe("t", accept_all()).await.unwrap();

        topic.publish(b"meow".to_vec()).await.unwrap();
        let msg = topic.next().await.unwrap();
        assert!(msg.local);
        assert_eq!(msg.data, b"meow");
        assert_eq!(msg.source, Some(host.local_peer_id()));

        host.close().await;
    }

    #[tokio::test]
    async fn close_is_idempotent_and_ends_stream() {
        let host = Host::new().unwrap();
        let mut topic = host.subscribe("t", accept_all()).await.unwrap();
        host.close().await;
        host.close().await;
        assert!(topic.next().await.is_none());
    }
}
