//! The transport adapter boundary (spec §6).
//!
//! In a real deployment this sits in front of a radio/Bluetooth library
//! that establishes streams between paired devices and enumerates them;
//! that library is an external collaborator and is not implemented here.
//! `TcpTransport` is a concrete stand-in over loopback TCP so the mesh
//! engine above the trait is exercisable and testable end-to-end.

use std::time::Duration;

use thiserror::Error;
use tokio::net::{TcpListener, TcpStream, ToSocketAddrs};

/// Identifies the chat service on whatever transport is in use. Real
/// radio transports match connecting peers against this id; TCP has no
/// such concept, so `TcpTransport` ignores it but carries it for parity
/// with the interface every node must agree on.
pub const SERVICE_ID: &str = "a1b2c3d4-e5f6-7890-abcd-ef1234567890";

const DIAL_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("failed to bind listener: {0}")]
    Bind(std::io::Error),
    #[error("accept failed: {0}")]
    Accept(std::io::Error),
    #[error("dial failed: {0}")]
    Dial(std::io::Error),
    #[error("dial timed out")]
    DialTimeout,
}

/// One accepted or dialed bidirectional stream, plus whatever the
/// transport can tell us about the remote end before any protocol bytes
/// are exchanged.
pub struct Accepted {
    pub stream: TcpStream,
    pub remote_address: String,
    pub remote_device_name: String,
}

/// A paired device the transport knows about but isn't necessarily
/// connected to.
#[derive(Debug, Clone)]
pub struct PairedDevice {
    pub device_name: String,
    pub device_address: String,
}

/// The narrow interface the mesh engine needs from whatever radio/stream
/// library is doing the actual device discovery and connection work.
#[async_trait::async_trait]
pub trait Transport: Send + Sync {
    /// Accepts the next inbound stream on the chat service.
    async fn accept(&self) -> Result<Accepted, TransportError>;

    /// Dials an outbound stream to a known peer address.
    async fn dial(&self, address: &str) -> Result<Accepted, TransportError>;

    /// Lists devices paired with this node, connected or not.
    fn enumerate_paired_devices(&self) -> Vec<PairedDevice>;

    /// This node's own radio name and address.
    fn local_identity(&self) -> (String, String);
}

/// Loopback-TCP transport: `address` is `host:port`, `device_name` is
/// derived from the port since there's no real device directory to ask.
pub struct TcpTransport {
    listener: TcpListener,
    local_address: String,
}

impl TcpTransport {
    pub async fn bind(addr: impl ToSocketAddrs) -> Result<Self, TransportError> {
        let listener = TcpListener::bind(addr).await.map_err(TransportError::Bind)?;
        let local_address = listener
            .local_addr()
            .map(|a| a.to_string())
            .unwrap_or_default();
        Ok(TcpTransport {
            listener,
            local_address,
        })
    }

    pub fn local_addr(&self) -> &str {
        &self.local_address
    }
}

#[async_trait::async_trait]
impl Transport for TcpTransport {
    async fn accept(&self) -> Result<Accepted, TransportError> {
        let (stream, peer) = self.listener.accept().await.map_err(TransportError::Accept)?;
        Ok(Accepted {
            stream,
            remote_address: peer.to_string(),
            remote_device_name: format!("peer-{}", peer.port()),
        })
    }

    async fn dial(&self, address: &str) -> Result<Accepted, TransportError> {
        let stream = tokio::time::timeout(DIAL_TIMEOUT, TcpStream::connect(address))
            .await
            .map_err(|_| TransportError::DialTimeout)?
            .map_err(TransportError::Dial)?;
        let peer = stream
            .peer_addr()
            .map(|a| a.to_string())
            .unwrap_or_else(|_| address.to_string());
        Ok(Accepted {
            stream,
            remote_address: peer.clone(),
            remote_device_name: format!("peer-{peer}"),
        })
    }

    fn enumerate_paired_devices(&self) -> Vec<PairedDevice> {
        // Real radio transports can list paired-but-disconnected devices;
        // TCP has no pairing concept, so there is nothing to enumerate
        // beyond whatever is already connected (tracked by the caller).
        Vec::new()
    }

    fn local_identity(&self) -> (String, String) {
        ("offgrid-node".to_string(), self.local_address.clone())
    }
}
