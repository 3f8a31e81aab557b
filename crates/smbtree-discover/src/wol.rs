//! Wake-on-LAN magic packets.

use std::net::{Ipv4Addr, SocketAddr};

use pnet::util::MacAddr;
use tokio::net::UdpSocket;

use crate::error::Result;

const WOL_PORT: u16 = 9;

/// 6 × `0xFF` followed by the MAC repeated 16 times.
pub fn magic_packet(mac: MacAddr) -> [u8; 102] {
    let octets = [mac.0, mac.1, mac.2, mac.3, mac.4, mac.5];
    let mut packet = [0xFF; 102];
    for chunk in packet[6..].chunks_exact_mut(6) {
        chunk.copy_from_slice(&octets);
    }
    packet
}

/// Broadcast a magic packet to every parseable MAC. Returns how many went out.
pub async fn wake_hosts(macs: &[String]) -> Result<usize> {
    let socket = UdpSocket::bind(SocketAddr::from((Ipv4Addr::UNSPECIFIED, 0))).await?;
    socket.set_broadcast(true)?;
    let target = SocketAddr::from((Ipv4Addr::BROADCAST, WOL_PORT));

    let mut sent = 0;
    for raw in macs {
        let mac: MacAddr = match raw.trim().parse() {
            Ok(mac) => mac,
            Err(e) => {
                tracing::warn!(mac = %raw, error = ?e, "Skipping unparseable MAC address");
                continue;
            }
        };
        socket.send_to(&magic_packet(mac), target).await?;
        tracing::debug!(mac = %mac, "Magic packet sent");
        sent += 1;
    }

    tracing::info!(sent, "Wake-on-LAN packets broadcast");
    Ok(sent)
}
