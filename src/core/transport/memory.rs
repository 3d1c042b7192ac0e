//! In-process transport. Each `open` hands a [`MemoryPeer`] to the paired
//! [`MemoryServer`], which drives the server side by hand: accept or refuse
//! the attempt, push text, read what the client wrote, drop the link.

use super::{LinkDriver, Transport, TransportEvent, TransportLink};
use crate::domain::config::TransportKind;
use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::debug;
use url::Url;

/// Client-facing half, plugged into the session manager
pub struct MemoryTransport {
    kind: TransportKind,
    accept_tx: mpsc::UnboundedSender<MemoryPeer>,
}

/// Server-facing half, receives one peer per connection attempt
pub struct MemoryServer {
    accept_rx: mpsc::UnboundedReceiver<MemoryPeer>,
}

/// Server side of one connection attempt
pub struct MemoryPeer {
    url: Url,
    driver: LinkDriver,
}

impl MemoryTransport {
    pub fn new() -> (Self, MemoryServer) {
        Self::with_kind(TransportKind::Websocket)
    }

    /// Report a specific kind, e.g. to stand in for a registry entry
    pub fn with_kind(kind: TransportKind) -> (Self, MemoryServer) {
        let (accept_tx, accept_rx) = mpsc::unbounded_channel();
        (Self { kind, accept_tx }, MemoryServer { accept_rx })
    }
}

#[async_trait]
impl Transport for MemoryTransport {
    fn kind(&self) -> TransportKind {
        self.kind
    }

    async fn open(&self, url: &Url) -> TransportLink {
        let (link, driver) = TransportLink::pair(self.kind);
        let peer = MemoryPeer {
            url: url.clone(),
            driver,
        };
        if let Err(mpsc::error::SendError(peer)) = self.accept_tx.send(peer) {
            debug!("Memory server gone, refusing {}", url);
            peer.refuse("server unavailable");
        }
        link
    }
}

impl MemoryServer {
    /// Wait for the next connection attempt
    pub async fn next_peer(&mut self) -> Option<MemoryPeer> {
        self.accept_rx.recv().await
    }

    /// Take a pending attempt without waiting
    pub fn try_next_peer(&mut self) -> Option<MemoryPeer> {
        self.accept_rx.try_recv().ok()
    }
}

impl MemoryPeer {
    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Complete the transport handshake
    pub fn accept(&self) {
        self.driver.emit(TransportEvent::Opened);
    }

    /// Fail the attempt before it opens
    pub fn refuse(&self, reason: &str) {
        self.driver.fail(reason);
    }

    /// Deliver one inbound text message to the client
    pub fn push(&self, text: impl Into<String>) -> bool {
        self.driver.emit(TransportEvent::Message(text.into()))
    }

    /// Simulate the server or network dropping the link
    pub fn drop_connection(self, reason: &str) {
        self.driver.emit(TransportEvent::Closed {
            code: Some(1006),
            reason: reason.to_string(),
        });
    }

    /// Next text written by the client; `None` once the client let go
    pub async fn next_outbound(&mut self) -> Option<String> {
        self.driver.next_outbound().await
    }

    /// Text the client already wrote, without waiting
    pub fn try_next_outbound(&mut self) -> Option<String> {
        self.driver.try_next_outbound()
    }

    /// Resolves when the client closes or drops its side
    pub async fn closed_by_client(&mut self) {
        self.driver.closed().await
    }

    pub fn is_closed_by_client(&self) -> bool {
        self.driver.is_close_requested()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_peer_round_trip() {
        let (transport, mut server) = MemoryTransport::new();
        let url = Url::parse("ws://localhost/ws").unwrap();
        let mut link = transport.open(&url).await;

        let mut peer = server.next_peer().await.unwrap();
        assert_eq!(peer.url().as_str(), "ws://localhost/ws");

        peer.accept();
        assert_eq!(link.next_event().await, Some(TransportEvent::Opened));

        assert!(link.send("CONNECT".to_string()));
        assert_eq!(peer.next_outbound().await.as_deref(), Some("CONNECT"));

        peer.push("hi");
        assert_eq!(link.next_event().await, Some(TransportEvent::Message("hi".to_string())));

        link.close();
        peer.closed_by_client().await;
        assert!(peer.is_closed_by_client());
    }

    #[tokio::test]
    async fn test_open_without_server_fails_via_events() {
        let (transport, server) = MemoryTransport::new();
        drop(server);

        let url = Url::parse("ws://localhost/ws").unwrap();
        let mut link = transport.open(&url).await;
        assert!(matches!(link.next_event().await, Some(TransportEvent::Error(_))));
        assert!(matches!(link.next_event().await, Some(TransportEvent::Closed { .. })));
    }
}
