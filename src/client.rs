//! Entry point for embedders: build the endpoint and transport from a
//! [`LiveConfig`] and start the managed connection.

use crate::core::session::{ConnectionState, PipelineStats, SessionManager, SessionOptions, SubscriptionId};
use crate::core::transport::Transport;
use crate::domain::config::LiveConfig;
use crate::domain::error::LiveResult;
use crate::domain::event::LiveEvent;
use crate::infrastructure::endpoint::resolve_endpoint;
use crate::infrastructure::transport::transport_for;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use url::Url;

/// Handle to the live connection. Dropping it disconnects.
pub struct LiveClient {
    session: SessionManager,
    config: LiveConfig,
}

impl LiveClient {
    /// Connect over the transport named in `config.server.transport`
    pub fn connect(config: LiveConfig) -> LiveResult<Self> {
        let transport = transport_for(config.server.transport);
        Self::connect_with(config, transport)
    }

    /// Connect over a caller-supplied transport
    pub fn connect_with(config: LiveConfig, transport: Arc<dyn Transport>) -> LiveResult<Self> {
        let endpoint = resolve_endpoint(&config.server)?;
        let options = SessionOptions::from(&config.connection);
        let session = SessionManager::connect(endpoint, transport, options);
        Ok(Self { session, config })
    }

    pub fn subscribe<F>(&self, topic: &str, handler: F) -> SubscriptionId
    where
        F: Fn(&LiveEvent) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.session.subscribe(topic, handler)
    }

    pub fn subscribe_channel(&self, topic: &str) -> (SubscriptionId, mpsc::UnboundedReceiver<LiveEvent>) {
        self.session.subscribe_channel(topic)
    }

    /// Subscribe to every topic listed in the configuration
    pub fn subscribe_configured(&self) -> (Vec<SubscriptionId>, mpsc::UnboundedReceiver<LiveEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let ids = self
            .config
            .topic_names()
            .iter()
            .map(|topic| {
                let tx = tx.clone();
                self.session.subscribe(topic, move |event: &LiveEvent| {
                    tx.send(event.clone())
                        .map_err(|_| anyhow::anyhow!("event receiver dropped"))
                })
            })
            .collect();
        (ids, rx)
    }

    pub fn unsubscribe(&self, id: SubscriptionId) {
        self.session.unsubscribe(id)
    }

    pub fn publish(&self, destination: &str, body: impl Into<String>) {
        self.session.publish(destination, body)
    }

    pub fn disconnect(&self) {
        self.session.disconnect()
    }

    pub fn state(&self) -> ConnectionState {
        self.session.state()
    }

    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.session.watch_state()
    }

    pub fn stats(&self) -> PipelineStats {
        self.session.stats()
    }

    pub fn endpoint(&self) -> &Url {
        self.session.endpoint()
    }

    pub fn config(&self) -> &LiveConfig {
        &self.config
    }

    pub fn session(&self) -> &SessionManager {
        &self.session
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::transport::MemoryTransport;
    use crate::domain::error::LiveError;

    #[tokio::test]
    async fn test_endpoint_follows_config() {
        let mut config = LiveConfig::default();
        config.server.origin = "http://admin.example.com".to_string();
        config.server.page_secure = true;

        let (transport, _server) = MemoryTransport::new();
        let client = LiveClient::connect_with(config, Arc::new(transport)).unwrap();
        assert_eq!(client.endpoint().as_str(), "https://admin.example.com/ws");
        client.disconnect();
        client.session().closed().await;
        assert_eq!(client.state(), ConnectionState::Closed);
    }

    #[tokio::test]
    async fn test_bad_origin_is_rejected_up_front() {
        let mut config = LiveConfig::default();
        config.server.origin = String::new();

        let (transport, _server) = MemoryTransport::new();
        let result = LiveClient::connect_with(config, Arc::new(transport));
        assert!(matches!(result, Err(LiveError::Config { .. })));
    }
}
