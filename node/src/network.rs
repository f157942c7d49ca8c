//! UDP transport: one unicast socket for everything a node sends and most
//! of what it receives, plus a listener joined to the multicast group for
//! discovery traffic.
//!
//! The listener is built with `socket2` so that it can share the group port
//! with other nodes running on the same host.
//!
//! Each socket is drained by its own receiver task that decodes datagrams
//! and forwards them to the session over an unbounded channel.

use crate::context::Outgoing;
use crate::error::NodeError;
use log::{debug, error, info, warn};
use shared::{decode, encode, CodecError, GameMessage, ANNOUNCE_PERIOD, ANNOUNCE_TTL, MULTICAST_GROUP, RECV_BUFFER_SIZE};
use socket2::{Domain, Protocol, SockAddr, Socket, Type};
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Where the node listens and how discovery is paced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NetworkSettings {
    /// Unicast socket address; port 0 picks a free one.
    pub bind_addr: SocketAddr,
    pub multicast_group: SocketAddrV4,
    pub announce_period: Duration,
    /// Games not re-announced within this window are dropped from the list.
    pub announce_ttl: Duration,
}

impl Default for NetworkSettings {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from((Ipv4Addr::UNSPECIFIED, 0)),
            multicast_group: MULTICAST_GROUP,
            announce_period: ANNOUNCE_PERIOD,
            announce_ttl: ANNOUNCE_TTL,
        }
    }
}

/// Messages sent from receiver tasks to the session loop
#[derive(Debug)]
pub enum Inbound {
    Message { from: SocketAddr, message: GameMessage },
    /// A peer speaks a protocol we cannot represent.
    Fatal { from: SocketAddr, error: CodecError },
}

pub struct Transport {
    socket: Arc<UdpSocket>,
    group: SocketAddrV4,
    receivers: Vec<JoinHandle<()>>,
}

impl Transport {
    pub async fn bind(settings: &NetworkSettings) -> Result<(Transport, mpsc::UnboundedReceiver<Inbound>), NodeError> {
        let socket = Arc::new(UdpSocket::bind(settings.bind_addr).await?);
        info!("Node listening on {}", socket.local_addr()?);
        if let Err(e) = socket.set_multicast_loop_v4(true) {
            debug!("Could not enable multicast loopback: {}", e);
        }

        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        let mut receivers = vec![spawn_receiver(Arc::clone(&socket), inbound_tx.clone(), "unicast")];

        match join_group(settings.multicast_group) {
            Ok(listener) => {
                info!("Joined multicast group {}", settings.multicast_group);
                receivers.push(spawn_receiver(Arc::new(listener), inbound_tx, "multicast"));
            }
            Err(e) => warn!(
                "Multicast group {} unavailable, other games will not be discovered: {}",
                settings.multicast_group, e
            ),
        }

        Ok((
            Transport {
                socket,
                group: settings.multicast_group,
                receivers,
            },
            inbound_rx,
        ))
    }

    pub fn local_addr(&self) -> Result<SocketAddr, NodeError> {
        Ok(self.socket.local_addr()?)
    }

    /// Sends one datagram. Multicast leaves through the unicast socket so
    /// receivers see the same source address as for our unicast traffic.
    pub async fn send(&self, outgoing: &Outgoing) -> Result<(), NodeError> {
        let (message, to) = match outgoing {
            Outgoing::Unicast { message, to } => (message, *to),
            Outgoing::Multicast { message } => (message, SocketAddr::V4(self.group)),
        };
        let data = encode(message)?;
        self.socket.send_to(&data, to).await?;
        Ok(())
    }
}

impl Drop for Transport {
    fn drop(&mut self) {
        for receiver in &self.receivers {
            receiver.abort();
        }
    }
}

/// Binds the group port with address reuse enabled and joins the group.
/// Every node on the host gets its own copy of each multicast datagram.
fn join_group(group: SocketAddrV4) -> std::io::Result<UdpSocket> {
    let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))?;
    socket.set_reuse_address(true)?;
    #[cfg(unix)]
    socket.set_reuse_port(true)?;
    socket.bind(&SockAddr::from(SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, group.port())))?;
    socket.join_multicast_v4(group.ip(), &Ipv4Addr::UNSPECIFIED)?;
    socket.set_nonblocking(true)?;
    UdpSocket::from_std(socket.into())
}

/// Spawns task that continuously listens for incoming datagrams
fn spawn_receiver(socket: Arc<UdpSocket>, inbound_tx: mpsc::UnboundedSender<Inbound>, label: &'static str) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut buffer = vec![0u8; RECV_BUFFER_SIZE];

        loop {
            match socket.recv_from(&mut buffer).await {
                Ok((len, from)) => {
                    let inbound = match decode(&buffer[..len]) {
                        Ok(message) => Inbound::Message { from, message },
                        Err(error @ CodecError::UnknownVariant(_)) => Inbound::Fatal { from, error },
                        Err(e) => {
                            warn!("Dropping undecodable {} datagram from {}: {}", label, from, e);
                            continue;
                        }
                    };
                    if inbound_tx.send(inbound).is_err() {
                        debug!("Session gone, stopping {} receiver", label);
                        break;
                    }
                }
                Err(e) => {
                    error!("Error receiving on {} socket: {}", label, e);
                    tokio::time::sleep(Duration::from_millis(10)).await;
                }
            }
        }
    })
}
