//! Best-effort beacon transport over UDP.
//!
//! Beacons are JSON datagrams, unacknowledged and unordered. The link sends
//! to a fixed target set: either a unicast peer list or a multicast group
//! the socket has joined. Malformed inbound datagrams are logged and
//! dropped, never fatal.

use imc_core::messages::Beacon;
use imc_core::neighbors::NeighborTracker;
use std::io;
use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;
use tokio::net::UdpSocket;
use tokio::task::JoinHandle;

const MAX_BEACON_BYTES: usize = 2048;

pub struct BeaconLink {
    socket: UdpSocket,
    targets: Vec<SocketAddr>,
}

impl BeaconLink {
    /// Bind a socket and send beacons to a fixed list of peers.
    pub async fn open(bind: SocketAddr, targets: Vec<SocketAddr>) -> io::Result<Self> {
        let socket = UdpSocket::bind(bind).await?;
        Ok(Self { socket, targets })
    }

    /// Bind a socket joined to a multicast group; beacons go to the group.
    pub async fn open_multicast(
        bind: SocketAddr,
        group: Ipv4Addr,
        group_port: u16,
    ) -> io::Result<Self> {
        let socket = UdpSocket::bind(bind).await?;
        socket.join_multicast_v4(group, Ipv4Addr::UNSPECIFIED)?;
        socket.set_multicast_loop_v4(true)?;
        Ok(Self {
            socket,
            targets: vec![SocketAddr::from((group, group_port))],
        })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    /// Send one beacon to every target. Best effort: per-target failures
    /// are reported but there is no retry.
    pub async fn send(&self, beacon: &Beacon) -> io::Result<()> {
        let payload = serde_json::to_vec(beacon).map_err(io::Error::other)?;
        for target in &self.targets {
            if let Err(err) = self.socket.send_to(&payload, target).await {
                tracing::debug!("beacon send to {target} failed: {err}");
            }
        }
        Ok(())
    }

    /// Spawn the receive task: decode datagrams and feed the tracker.
    pub fn spawn_receiver(
        link: Arc<BeaconLink>,
        tracker: Arc<NeighborTracker>,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut buf = vec![0u8; MAX_BEACON_BYTES];
            loop {
                let (len, from) = match link.socket.recv_from(&mut buf).await {
                    Ok(received) => received,
                    Err(err) => {
                        tracing::warn!("beacon receive failed: {err}");
                        continue;
                    }
                };
                match serde_json::from_slice::<Beacon>(&buf[..len]) {
                    Ok(beacon) => {
                        if tracker.update(&beacon) {
                            tracing::trace!(
                                "beacon from {}: {:?} {} -> {}",
                                beacon.sender,
                                beacon.status,
                                beacon.entry,
                                beacon.exit
                            );
                        }
                    }
                    Err(err) => {
                        tracing::warn!("discarding malformed beacon from {from}: {err}");
                    }
                }
            }
        })
    }
}
