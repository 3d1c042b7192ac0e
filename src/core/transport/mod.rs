//! Transport abstraction: a long-lived duplex text channel.
//!
//! `Transport::open` starts a connection attempt and hands back a
//! [`TransportLink`] immediately. Everything that happens afterwards
//! (open, inbound text, errors, close) arrives as [`TransportEvent`]s on
//! that link; nothing is reported by return value or shared globals.

pub mod memory;

use crate::domain::config::TransportKind;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use url::Url;

pub use memory::{MemoryPeer, MemoryServer, MemoryTransport};

/// Everything a transport can report
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    /// The channel is open and can carry frames
    Opened,
    /// One inbound text message
    Message(String),
    /// The attempt or connection failed; a `Closed` follows
    Error(String),
    /// The channel is gone. Always the last event.
    Closed { code: Option<u16>, reason: String },
}

/// Unified transport trait for the pub/sub link
#[async_trait]
pub trait Transport: Send + Sync {
    /// Get the transport kind
    fn kind(&self) -> TransportKind;

    /// Begin a connection attempt against `url`.
    ///
    /// Must not wait for the handshake; failures are delivered as
    /// `Error` + `Closed` events on the returned link.
    async fn open(&self, url: &Url) -> TransportLink;
}

/// Client side of an open (or opening) transport channel
pub struct TransportLink {
    kind: TransportKind,
    outbound: mpsc::UnboundedSender<String>,
    events: mpsc::UnboundedReceiver<TransportEvent>,
    shutdown: watch::Sender<bool>,
}

/// Transport side of a link, held by the task that moves bytes
pub struct LinkDriver {
    events: mpsc::UnboundedSender<TransportEvent>,
    outbound: mpsc::UnboundedReceiver<String>,
    shutdown: watch::Receiver<bool>,
}

impl TransportLink {
    /// Create a connected link/driver pair
    pub fn pair(kind: TransportKind) -> (TransportLink, LinkDriver) {
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        (
            TransportLink {
                kind,
                outbound: outbound_tx,
                events: events_rx,
                shutdown: shutdown_tx,
            },
            LinkDriver {
                events: events_tx,
                outbound: outbound_rx,
                shutdown: shutdown_rx,
            },
        )
    }

    pub fn kind(&self) -> TransportKind {
        self.kind
    }

    /// Queue a text message; false when the transport task is gone
    pub fn send(&self, text: String) -> bool {
        !self.is_closed() && self.outbound.send(text).is_ok()
    }

    /// Next event, `None` once the driver has gone away
    pub async fn next_event(&mut self) -> Option<TransportEvent> {
        self.events.recv().await
    }

    /// Next event if one is already queued
    pub fn try_next_event(&mut self) -> Option<TransportEvent> {
        self.events.try_recv().ok()
    }

    /// Request shutdown. Safe to call any number of times.
    pub fn close(&self) {
        self.shutdown.send_replace(true);
    }

    pub fn is_closed(&self) -> bool {
        *self.shutdown.borrow()
    }
}

impl Drop for TransportLink {
    fn drop(&mut self) {
        self.close();
    }
}

impl std::fmt::Debug for TransportLink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransportLink")
            .field("kind", &self.kind)
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl LinkDriver {
    /// Report an event to the client; false when nobody is listening
    pub fn emit(&self, event: TransportEvent) -> bool {
        self.events.send(event).is_ok()
    }

    /// Report a failure followed by the closing event
    pub fn fail(&self, message: impl Into<String>) {
        let message = message.into();
        self.emit(TransportEvent::Error(message.clone()));
        self.emit(TransportEvent::Closed {
            code: None,
            reason: message,
        });
    }

    /// Next text queued by the client
    pub async fn next_outbound(&mut self) -> Option<String> {
        self.outbound.recv().await
    }

    /// Non-blocking variant used to batch sends
    pub fn try_next_outbound(&mut self) -> Option<String> {
        self.outbound.try_recv().ok()
    }

    /// Resolves once the client asked for shutdown or dropped the link
    pub async fn closed(&mut self) {
        self.close_signal().wait().await
    }

    /// Detached close notification, usable while the driver is borrowed
    pub fn close_signal(&self) -> CloseSignal {
        CloseSignal(self.shutdown.clone())
    }

    pub fn is_close_requested(&self) -> bool {
        *self.shutdown.borrow()
    }
}

/// Close notification for one link
pub struct CloseSignal(watch::Receiver<bool>);

impl CloseSignal {
    /// Resolves once close was requested or the link was dropped
    pub async fn wait(&mut self) {
        while !*self.0.borrow_and_update() {
            if self.0.changed().await.is_err() {
                return;
            }
        }
    }
}

/// Registry of available transports keyed by kind
#[derive(Default)]
pub struct TransportRegistry {
    transports: HashMap<TransportKind, Arc<dyn Transport>>,
}

impl TransportRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a transport, replacing any previous one of the same kind
    pub fn register(&mut self, transport: Arc<dyn Transport>) {
        self.transports.insert(transport.kind(), transport);
    }

    pub fn get(&self, kind: TransportKind) -> Option<Arc<dyn Transport>> {
        self.transports.get(&kind).cloned()
    }

    pub fn has_transport(&self, kind: TransportKind) -> bool {
        self.transports.contains_key(&kind)
    }

    /// Registered kinds, sorted by name for stable output
    pub fn available(&self) -> Vec<TransportKind> {
        let mut kinds: Vec<TransportKind> = self.transports.keys().copied().collect();
        kinds.sort_by_key(|k| k.to_string());
        kinds
    }
}
