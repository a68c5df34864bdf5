use std::net::{Ipv4Addr, SocketAddr};

/// Errors that can occur on the conference socket.
///
/// All three structured variants are fatal at startup: the transport
/// cannot proceed without its socket.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// Failed to bind the UDP socket to the conference port.
    #[error("failed to bind to {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        source: std::io::Error,
    },

    /// Failed to join the multicast group.
    #[error("failed to join multicast group {group}: {source}")]
    Join {
        group: Ipv4Addr,
        source: std::io::Error,
    },

    /// An I/O error occurred on the socket.
    #[error("socket I/O error: {0}")]
    Socket(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, TransportError>;
