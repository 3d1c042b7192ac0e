// Transport module - Network transports for the push link
pub mod auto;
pub mod sockjs;
pub mod websocket;
pub mod xhr;

pub use auto::AutoTransport;
pub use websocket::WebSocketTransport;
pub use xhr::XhrPollingTransport;

use crate::core::transport::{Transport, TransportRegistry};
use crate::domain::config::TransportKind;
use std::sync::Arc;
use tracing::warn;

/// Registry with every network transport, `auto` included
pub fn default_registry() -> TransportRegistry {
    let websocket: Arc<dyn Transport> = Arc::new(WebSocketTransport::raw());
    let xhr: Arc<dyn Transport> = Arc::new(XhrPollingTransport::new());

    let mut registry = TransportRegistry::new();
    registry.register(Arc::clone(&websocket));
    registry.register(Arc::new(WebSocketTransport::sockjs()));
    registry.register(Arc::clone(&xhr));
    registry.register(Arc::new(AutoTransport::new(websocket, xhr)));
    registry
}

/// Network transport for `kind`
pub fn transport_for(kind: TransportKind) -> Arc<dyn Transport> {
    let registry = default_registry();
    registry.get(kind).unwrap_or_else(|| {
        warn!("No {} transport registered, using auto", kind);
        Arc::new(AutoTransport::new(
            Arc::new(WebSocketTransport::raw()),
            Arc::new(XhrPollingTransport::new()),
        ))
    })
}
