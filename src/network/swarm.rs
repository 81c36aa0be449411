// Swarm Network - libp2p gossipsub transport with mDNS peer discovery
//
// A single event-loop task owns the swarm. Callers talk to it through
// `SwarmNetwork`, which sends commands over an mpsc channel and awaits the
// reply on a oneshot.

use crate::network::pubsub::{NetworkError, PubSub, Subscribers, Subscription, TopicHandle};
use async_trait::async_trait;
use libp2p::futures::StreamExt;
use libp2p::swarm::behaviour::toggle::Toggle;
use libp2p::swarm::{NetworkBehaviour, SwarmEvent};
use libp2p::{gossipsub, identity::Keypair, mdns, noise, tcp, yamux, Multiaddr, PeerId, Swarm, SwarmBuilder};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

/// How often subscriptions whose receivers were dropped are cleaned up
const PRUNE_INTERVAL: Duration = Duration::from_secs(30);

/// Room left in `max_message_bytes` for the gossipsub frame around a payload
const FRAME_ALLOWANCE_BYTES: usize = 1024;

// ============================================================================
// NETWORK CONFIG
// ============================================================================

/// Configuration for the libp2p network
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkConfig {
    /// Multiaddrs to listen on
    pub listen_addrs: Vec<String>,
    /// Discover peers on the local network with mDNS
    pub enable_mdns: bool,
    /// Gossipsub heartbeat interval in milliseconds
    pub heartbeat_interval_ms: u64,
    /// Largest gossip message accepted or sent, in bytes
    pub max_message_bytes: usize,
    /// Messages buffered per subscription before new ones are dropped
    pub subscription_buffer: usize,
    /// Commands buffered towards the swarm task
    pub command_buffer: usize,
    /// Idle connection timeout in seconds
    pub idle_connection_timeout_secs: u64,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            listen_addrs: vec!["/ip4/0.0.0.0/tcp/0".to_string()],
            enable_mdns: true,
            heartbeat_interval_ms: 1000,
            max_message_bytes: 4 * 1024 * 1024,
            subscription_buffer: 1024,
            command_buffer: 256,
            idle_connection_timeout_secs: 60,
        }
    }
}

impl NetworkConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_listen_addr(mut self, addr: &str) -> Self {
        self.listen_addrs = vec![addr.to_string()];
        self
    }

    pub fn with_mdns(mut self, enabled: bool) -> Self {
        self.enable_mdns = enabled;
        self
    }

    pub fn with_heartbeat_interval_ms(mut self, ms: u64) -> Self {
        self.heartbeat_interval_ms = ms;
        self
    }

    pub fn with_max_message_bytes(mut self, bytes: usize) -> Self {
        self.max_message_bytes = bytes;
        self
    }

    pub fn with_subscription_buffer(mut self, size: usize) -> Self {
        self.subscription_buffer = size;
        self
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), NetworkError> {
        if self.listen_addrs.is_empty() {
            return Err(NetworkError::ListenFailed("no listen address configured".to_string()));
        }
        for addr in &self.listen_addrs {
            addr.parse::<Multiaddr>()
                .map_err(|e| NetworkError::ListenFailed(format!("{}: {}", addr, e)))?;
        }
        if self.heartbeat_interval_ms == 0 {
            return Err(NetworkError::SwarmBuildFailed(
                "heartbeat_interval_ms cannot be 0".to_string(),
            ));
        }
        if self.max_message_bytes == 0 || self.subscription_buffer == 0 || self.command_buffer == 0 {
            return Err(NetworkError::SwarmBuildFailed(
                "message size and buffer sizes must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

// ============================================================================
// BEHAVIOUR
// ============================================================================

#[derive(NetworkBehaviour)]
struct MeshBehaviour {
    gossipsub: gossipsub::Behaviour,
    mdns: Toggle<mdns::tokio::Behaviour>,
}

impl MeshBehaviour {
    fn build(
        keypair: &Keypair,
        config: &NetworkConfig,
    ) -> Result<Self, Box<dyn std::error::Error + Send + Sync>> {
        let gossipsub_config = gossipsub::ConfigBuilder::default()
            .heartbeat_interval(Duration::from_millis(config.heartbeat_interval_ms))
            .validation_mode(gossipsub::ValidationMode::Strict)
            .max_transmit_size(config.max_message_bytes)
            .build()
            .map_err(|e| format!("gossipsub config: {}", e))?;
        let gossipsub = gossipsub::Behaviour::new(
            gossipsub::MessageAuthenticity::Signed(keypair.clone()),
            gossipsub_config,
        )
        .map_err(|e| format!("gossipsub behaviour: {}", e))?;

        let mdns = if config.enable_mdns {
            Toggle::from(Some(mdns::tokio::Behaviour::new(
                mdns::Config::default(),
                keypair.public().to_peer_id(),
            )?))
        } else {
            Toggle::from(None)
        };

        Ok(Self { gossipsub, mdns })
    }
}

// ============================================================================
// COMMANDS
// ============================================================================

enum Command {
    Subscribe {
        topic: TopicHandle,
        reply: oneshot::Sender<Result<Subscription, NetworkError>>,
    },
    Unsubscribe {
        subscription: Subscription,
    },
    Publish {
        topic: TopicHandle,
        data: Vec<u8>,
        reply: oneshot::Sender<Result<(), NetworkError>>,
    },
}

// ============================================================================
// SWARM NETWORK
// ============================================================================

/// Handle to a running libp2p gossip network
#[derive(Clone)]
pub struct SwarmNetwork {
    commands: mpsc::Sender<Command>,
    local_peer_id: PeerId,
    max_payload_bytes: usize,
}

impl SwarmNetwork {
    /// Build the swarm, start listening and spawn its event loop
    ///
    /// The event loop stops when `cancel` fires or every handle is dropped.
    pub fn start(
        keypair: Keypair,
        config: NetworkConfig,
        cancel: CancellationToken,
    ) -> Result<Self, NetworkError> {
        config.validate()?;

        let local_peer_id = keypair.public().to_peer_id();
        info!(%local_peer_id, "starting gossip network");

        let behaviour_config = config.clone();
        let mut swarm = SwarmBuilder::with_existing_identity(keypair)
            .with_tokio()
            .with_tcp(
                tcp::Config::default().nodelay(true),
                noise::Config::new,
                yamux::Config::default,
            )
            .map_err(|e| NetworkError::SwarmBuildFailed(e.to_string()))?
            .with_behaviour(|key| MeshBehaviour::build(key, &behaviour_config))
            .map_err(|e| NetworkError::SwarmBuildFailed(format!("{:?}", e)))?
            .with_swarm_config(|c| {
                c.with_idle_connection_timeout(Duration::from_secs(
                    config.idle_connection_timeout_secs,
                ))
            })
            .build();

        for addr in &config.listen_addrs {
            let multiaddr: Multiaddr = addr
                .parse()
                .map_err(|e| NetworkError::ListenFailed(format!("{}: {}", addr, e)))?;
            swarm
                .listen_on(multiaddr)
                .map_err(|e| NetworkError::ListenFailed(e.to_string()))?;
        }

        let (commands_tx, commands_rx) = mpsc::channel(config.command_buffer);
        let event_loop = EventLoop {
            swarm,
            commands: commands_rx,
            subscribers: Subscribers::new(config.subscription_buffer),
        };
        tokio::spawn(event_loop.run(cancel));

        Ok(Self {
            commands: commands_tx,
            local_peer_id,
            max_payload_bytes: config.max_message_bytes.saturating_sub(FRAME_ALLOWANCE_BYTES),
        })
    }

    pub fn local_peer_id(&self) -> &PeerId {
        &self.local_peer_id
    }

    async fn send(&self, command: Command) -> Result<(), NetworkError> {
        self.commands
            .send(command)
            .await
            .map_err(|_| NetworkError::Closed)
    }
}

#[async_trait]
impl PubSub for SwarmNetwork {
    async fn join(&self, name: &str) -> Result<TopicHandle, NetworkError> {
        // Gossipsub topics need no setup before publishing; fanout covers
        // topics we are not subscribed to.
        TopicHandle::new(name)
    }

    async fn publish(&self, topic: &TopicHandle, data: Vec<u8>) -> Result<(), NetworkError> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::Publish {
            topic: topic.clone(),
            data,
            reply,
        })
        .await?;
        rx.await.map_err(|_| NetworkError::Closed)?
    }

    async fn subscribe(&self, topic: &TopicHandle) -> Result<Subscription, NetworkError> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::Subscribe {
            topic: topic.clone(),
            reply,
        })
        .await?;
        rx.await.map_err(|_| NetworkError::Closed)?
    }

    async fn unsubscribe(&self, subscription: Subscription) -> Result<(), NetworkError> {
        self.send(Command::Unsubscribe { subscription }).await
    }

    fn max_message_bytes(&self) -> Option<usize> {
        Some(self.max_payload_bytes)
    }
}

// ============================================================================
// EVENT LOOP
// ============================================================================

struct EventLoop {
    swarm: Swarm<MeshBehaviour>,
    commands: mpsc::Receiver<Command>,
    subscribers: Subscribers,
}

impl EventLoop {
    async fn run(mut self, cancel: CancellationToken) {
        let mut prune = tokio::time::interval(PRUNE_INTERVAL);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                command = self.commands.recv() => match command {
                    Some(command) => self.handle_command(command),
                    None => break,
                },
                event = self.swarm.select_next_some() => self.handle_event(event),
                _ = prune.tick() => self.prune_subscriptions(),
            }
        }

        info!("gossip network stopped");
    }

    fn handle_command(&mut self, command: Command) {
        match command {
            Command::Subscribe { topic, reply } => {
                let result = self.subscribe(&topic);
                let _ = reply.send(result);
            }
            Command::Unsubscribe { subscription } => {
                let topic = subscription.topic().name().to_string();
                if self.subscribers.remove(&topic, subscription.id()) {
                    self.leave_topic(&topic);
                }
            }
            Command::Publish { topic, data, reply } => {
                let _ = reply.send(self.publish(&topic, data));
            }
        }
    }

    fn subscribe(&mut self, topic: &TopicHandle) -> Result<Subscription, NetworkError> {
        if !self.subscribers.has_topic(topic.name()) {
            let ident = gossipsub::IdentTopic::new(topic.name());
            self.swarm
                .behaviour_mut()
                .gossipsub
                .subscribe(&ident)
                .map_err(|e| NetworkError::SubscribeFailed(e.to_string()))?;
            debug!(topic = topic.name(), "subscribed to gossip topic");
        }
        Ok(self.subscribers.add(topic))
    }

    fn publish(&mut self, topic: &TopicHandle, data: Vec<u8>) -> Result<(), NetworkError> {
        let ident = gossipsub::IdentTopic::new(topic.name());
        match self.swarm.behaviour_mut().gossipsub.publish(ident, data) {
            Ok(_) => Ok(()),
            Err(gossipsub::PublishError::Duplicate) => {
                trace!(topic = topic.name(), "duplicate publish ignored");
                Ok(())
            }
            Err(gossipsub::PublishError::NoPeersSubscribedToTopic) => {
                // At-most-once delivery to nobody
                debug!(topic = topic.name(), "no peers subscribed, message not delivered");
                Ok(())
            }
            Err(e) => Err(NetworkError::PublishFailed(e.to_string())),
        }
    }

    fn leave_topic(&mut self, topic: &str) {
        let ident = gossipsub::IdentTopic::new(topic);
        let _ = self.swarm.behaviour_mut().gossipsub.unsubscribe(&ident);
        debug!(topic, "left gossip topic");
    }

    fn prune_subscriptions(&mut self) {
        for topic in self.subscribers.drain_closed() {
            self.leave_topic(&topic);
        }
    }

    fn handle_event(&mut self, event: SwarmEvent<MeshBehaviourEvent>) {
        match event {
            SwarmEvent::NewListenAddr { address, .. } => {
                info!(%address, "listening");
            }
            SwarmEvent::ConnectionEstablished { peer_id, .. } => {
                debug!(%peer_id, "connection established");
            }
            SwarmEvent::ConnectionClosed { peer_id, cause, .. } => {
                debug!(%peer_id, ?cause, "connection closed");
            }
            SwarmEvent::Behaviour(MeshBehaviourEvent::Mdns(mdns::Event::Discovered(peers))) => {
                for (peer_id, addr) in peers {
                    debug!(%peer_id, %addr, "discovered peer");
                    self.swarm
                        .behaviour_mut()
                        .gossipsub
                        .add_explicit_peer(&peer_id);
                }
            }
            SwarmEvent::Behaviour(MeshBehaviourEvent::Mdns(mdns::Event::Expired(peers))) => {
                for (peer_id, _) in peers {
                    debug!(%peer_id, "peer expired");
                    self.swarm
                        .behaviour_mut()
                        .gossipsub
                        .remove_explicit_peer(&peer_id);
                }
            }
            SwarmEvent::Behaviour(MeshBehaviourEvent::Gossipsub(gossipsub::Event::Message {
                propagation_source,
                message,
                ..
            })) => {
                let topic = message.topic.as_str();
                let delivered = self.subscribers.deliver(topic, &message.data);
                trace!(topic, %propagation_source, delivered, "gossip message received");
            }
            SwarmEvent::OutgoingConnectionError { peer_id, error, .. } => {
                warn!(?peer_id, %error, "outgoing connection failed");
            }
            _ => {}
        }
    }
}
