use super::sockjs::{self, SockJsFrame};
use crate::core::transport::{LinkDriver, Transport, TransportEvent, TransportLink};
use crate::domain::config::TransportKind;
use crate::infrastructure::endpoint::websocket_url;
use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, warn};
use url::Url;

/// How text is wrapped on the socket
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Framing {
    Raw,
    SockJs,
}

/// WebSocket transport, either raw or speaking the SockJS WebSocket framing
pub struct WebSocketTransport {
    framing: Framing,
}

impl WebSocketTransport {
    pub fn raw() -> Self {
        Self { framing: Framing::Raw }
    }

    pub fn sockjs() -> Self {
        Self { framing: Framing::SockJs }
    }

    fn target(&self, endpoint: &Url) -> Result<Url, String> {
        let ws = websocket_url(endpoint).map_err(|e| e.to_string())?;
        match self.framing {
            Framing::Raw => Ok(ws),
            Framing::SockJs => {
                let (server, session) = sockjs::session_ids();
                sockjs::session_url(&ws, &server, &session, "websocket")
            }
        }
    }
}

#[async_trait]
impl Transport for WebSocketTransport {
    fn kind(&self) -> TransportKind {
        match self.framing {
            Framing::Raw => TransportKind::Websocket,
            Framing::SockJs => TransportKind::Sockjs,
        }
    }

    async fn open(&self, url: &Url) -> TransportLink {
        let (link, driver) = TransportLink::pair(self.kind());
        match self.target(url) {
            Ok(target) => {
                tokio::spawn(run_socket(target, self.framing, driver));
            }
            Err(e) => driver.fail(e),
        }
        link
    }
}

async fn run_socket(url: Url, framing: Framing, mut driver: LinkDriver) {
    let mut close = driver.close_signal();

    debug!("Connecting WebSocket to {}", url);
    let connected = tokio::select! {
        result = connect_async(url.as_str()) => result,
        _ = close.wait() => {
            debug!("Close requested before {} opened", url);
            return;
        }
    };

    let socket = match connected {
        Ok((socket, _response)) => socket,
        Err(e) => {
            driver.fail(format!("WebSocket connect to {} failed: {}", url, e));
            return;
        }
    };

    if framing == Framing::Raw {
        driver.emit(TransportEvent::Opened);
    }

    let (mut sink, mut stream) = socket.split();

    loop {
        tokio::select! {
            biased;
            outbound = driver.next_outbound() => {
                let Some(text) = outbound else {
                    let _ = sink.close().await;
                    return;
                };
                for message in wrap(framing, vec![text]) {
                    if let Err(e) = sink.send(Message::Text(message.into())).await {
                        driver.fail(format!("WebSocket send failed: {}", e));
                        return;
                    }
                }
            }
            _ = close.wait() => {
                let mut pending = Vec::new();
                while let Some(text) = driver.try_next_outbound() {
                    pending.push(text);
                }
                if !pending.is_empty() {
                    for message in wrap(framing, pending) {
                        let _ = sink.send(Message::Text(message.into())).await;
                    }
                }
                let _ = sink.send(Message::Close(None)).await;
                let _ = sink.close().await;
                debug!("WebSocket to {} closed by client", url);
                return;
            }
            incoming = stream.next() => match incoming {
                Some(Ok(Message::Text(text))) => {
                    if !deliver(framing, &driver, text.to_string()) {
                        return;
                    }
                }
                Some(Ok(Message::Binary(data))) => match String::from_utf8(data.to_vec()) {
                    Ok(text) => {
                        if !deliver(framing, &driver, text) {
                            return;
                        }
                    }
                    Err(_) => warn!("Ignoring non UTF-8 binary message"),
                },
                Some(Ok(Message::Close(frame))) => {
                    let (code, reason) = frame
                        .map(|f| (Some(u16::from(f.code)), f.reason.to_string()))
                        .unwrap_or((None, String::new()));
                    driver.emit(TransportEvent::Closed { code, reason });
                    return;
                }
                // Ping/pong are answered by tungstenite
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    driver.fail(format!("WebSocket error: {}", e));
                    return;
                }
                None => {
                    driver.emit(TransportEvent::Closed {
                        code: None,
                        reason: "stream ended".to_string(),
                    });
                    return;
                }
            },
        }
    }
}

/// Socket messages carrying `messages`; SockJS batches them into one
fn wrap(framing: Framing, messages: Vec<String>) -> Vec<String> {
    match framing {
        Framing::Raw => messages,
        Framing::SockJs => vec![sockjs::encode_messages(&messages)],
    }
}

/// Forward inbound text; false once the link is finished
fn deliver(framing: Framing, driver: &LinkDriver, text: String) -> bool {
    match framing {
        Framing::Raw => driver.emit(TransportEvent::Message(text)),
        Framing::SockJs => match sockjs::parse_frame(&text) {
            Ok(SockJsFrame::Open) => driver.emit(TransportEvent::Opened),
            Ok(SockJsFrame::Heartbeat) => true,
            Ok(SockJsFrame::Messages(messages)) => messages
                .into_iter()
                .all(|m| driver.emit(TransportEvent::Message(m))),
            Ok(SockJsFrame::Close { code, reason }) => {
                driver.emit(TransportEvent::Closed {
                    code: Some(code),
                    reason,
                });
                false
            }
            Err(e) => {
                warn!("Dropping SockJS frame: {}", e);
                true
            }
        },
    }
}
