use crate::core::transport::{LinkDriver, Transport, TransportEvent, TransportLink};
use crate::domain::config::TransportKind;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, warn};
use url::Url;

/// Tries `primary` on every open and switches to `fallback` when the
/// attempt fails before opening. Callers only ever see one link.
pub struct AutoTransport {
    primary: Arc<dyn Transport>,
    fallback: Arc<dyn Transport>,
}

impl AutoTransport {
    pub fn new(primary: Arc<dyn Transport>, fallback: Arc<dyn Transport>) -> Self {
        Self { primary, fallback }
    }
}

#[async_trait]
impl Transport for AutoTransport {
    fn kind(&self) -> TransportKind {
        TransportKind::Auto
    }

    async fn open(&self, url: &Url) -> TransportLink {
        let (link, driver) = TransportLink::pair(TransportKind::Auto);
        let first = self.primary.open(url).await;
        tokio::spawn(negotiate(
            first,
            Arc::clone(&self.fallback),
            url.clone(),
            driver,
        ));
        link
    }
}

async fn negotiate(mut first: TransportLink, fallback: Arc<dyn Transport>, url: Url, driver: LinkDriver) {
    let mut close = driver.close_signal();

    let event = tokio::select! {
        event = first.next_event() => event,
        _ = close.wait() => {
            first.close();
            return;
        }
    };

    let active = match event {
        Some(TransportEvent::Opened) => {
            debug!("{} transport opened", first.kind());
            driver.emit(TransportEvent::Opened);
            first
        }
        Some(TransportEvent::Message(text)) => {
            driver.emit(TransportEvent::Message(text));
            first
        }
        failed => {
            let reason = match failed {
                Some(TransportEvent::Error(reason)) => reason,
                Some(TransportEvent::Closed { reason, .. }) => reason,
                _ => "no response".to_string(),
            };
            warn!(
                "{} transport failed ({}), falling back to {}",
                first.kind(),
                reason,
                fallback.kind()
            );
            first.close();
            fallback.open(&url).await
        }
    };

    relay(active, driver).await;
}

/// Pump outbound text into `active` and its events back out
async fn relay(mut active: TransportLink, mut driver: LinkDriver) {
    let mut close = driver.close_signal();

    loop {
        tokio::select! {
            biased;
            outbound = driver.next_outbound() => match outbound {
                Some(text) => {
                    active.send(text);
                }
                None => break,
            },
            _ = close.wait() => {
                while let Some(text) = driver.try_next_outbound() {
                    active.send(text);
                }
                break;
            }
            event = active.next_event() => match event {
                Some(event) => {
                    let last = matches!(event, TransportEvent::Closed { .. });
                    if !driver.emit(event) || last {
                        break;
                    }
                }
                None => {
                    driver.emit(TransportEvent::Closed {
                        code: None,
                        reason: "transport ended".to_string(),
                    });
                    break;
                }
            },
        }
    }

    active.close();
}
