//! Outbound IP address lookup.

use std::net::{IpAddr, SocketAddr};

use tokio::net::UdpSocket;

use super::IdentitySource;
use crate::error::NotifyError;

/// Reports the local address the host uses to reach the internet.
///
/// Connecting a UDP socket sends nothing; it only makes the kernel pick a
/// route and a source address.
#[derive(Debug, Clone)]
pub struct OutboundIp {
    target: SocketAddr,
}

impl OutboundIp {
    pub fn new() -> Self {
        Self {
            target: SocketAddr::from(([8, 8, 8, 8], 80)),
        }
    }

    /// Resolve the route towards another address.
    pub fn with_target(target: SocketAddr) -> Self {
        Self { target }
    }
}

impl Default for OutboundIp {
    fn default() -> Self {
        Self::new()
    }
}

impl IdentitySource for OutboundIp {
    type Value = IpAddr;

    async fn current(&self) -> Result<IpAddr, NotifyError> {
        let bind: SocketAddr = if self.target.is_ipv4() {
            SocketAddr::from(([0, 0, 0, 0], 0))
        } else {
            SocketAddr::from(([0u16; 8], 0))
        };

        let socket = UdpSocket::bind(bind).await?;
        socket.connect(self.target).await?;
        Ok(socket.local_addr()?.ip())
    }
}
