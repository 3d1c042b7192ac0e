//! SockJS XHR long-polling: the fallback for networks that block WebSocket.
//!
//! A poller task keeps one `POST {session}/xhr` outstanding at all times
//! while the link task batches outbound text into `POST {session}/xhr_send`.

use super::sockjs::{self, SockJsFrame};
use crate::core::transport::{LinkDriver, Transport, TransportEvent, TransportLink};
use crate::domain::config::TransportKind;
use crate::infrastructure::endpoint::http_url;
use async_trait::async_trait;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, warn};
use url::Url;

/// Longest a single poll may stay open; the server answers with `h` well before
const POLL_TIMEOUT: Duration = Duration::from_secs(60);

pub struct XhrPollingTransport {
    client: reqwest::Client,
}

impl XhrPollingTransport {
    pub fn new() -> Self {
        Self::with_client(reqwest::Client::new())
    }

    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

impl Default for XhrPollingTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Transport for XhrPollingTransport {
    fn kind(&self) -> TransportKind {
        TransportKind::XhrPolling
    }

    async fn open(&self, url: &Url) -> TransportLink {
        let (link, driver) = TransportLink::pair(TransportKind::XhrPolling);

        let urls = http_url(url).map_err(|e| e.to_string()).and_then(|base| {
            let (server, session) = sockjs::session_ids();
            Ok((
                sockjs::session_url(&base, &server, &session, "xhr")?,
                sockjs::session_url(&base, &server, &session, "xhr_send")?,
            ))
        });

        match urls {
            Ok((poll_url, send_url)) => {
                tokio::spawn(run_session(self.client.clone(), poll_url, send_url, driver));
            }
            Err(e) => driver.fail(e),
        }
        link
    }
}

async fn run_session(client: reqwest::Client, poll_url: Url, send_url: Url, mut driver: LinkDriver) {
    let mut close = driver.close_signal();
    let (polled_tx, mut polled_rx) = mpsc::unbounded_channel();
    let poller = tokio::spawn(poll_loop(client.clone(), poll_url.clone(), polled_tx));

    debug!("XHR polling session at {}", poll_url);

    loop {
        tokio::select! {
            biased;
            outbound = driver.next_outbound() => {
                let Some(first) = outbound else { break };
                let mut batch = vec![first];
                while let Some(text) = driver.try_next_outbound() {
                    batch.push(text);
                }
                if let Err(e) = send_batch(&client, &send_url, &batch).await {
                    driver.fail(e);
                    break;
                }
            }
            _ = close.wait() => {
                let mut pending = Vec::new();
                while let Some(text) = driver.try_next_outbound() {
                    pending.push(text);
                }
                if !pending.is_empty() {
                    let _ = send_batch(&client, &send_url, &pending).await;
                }
                debug!("XHR session {} closed by client", poll_url);
                break;
            }
            polled = polled_rx.recv() => match polled {
                Some(Ok(body)) => {
                    if !deliver_body(&driver, &body) {
                        break;
                    }
                }
                Some(Err(e)) => {
                    driver.fail(e);
                    break;
                }
                None => {
                    driver.emit(TransportEvent::Closed {
                        code: None,
                        reason: "poller stopped".to_string(),
                    });
                    break;
                }
            },
        }
    }

    poller.abort();
}

async fn poll_loop(
    client: reqwest::Client,
    url: Url,
    tx: mpsc::UnboundedSender<Result<String, String>>,
) {
    loop {
        let body = match post(&client, &url, None).await {
            Ok(body) => body,
            Err(e) => {
                let _ = tx.send(Err(e));
                return;
            }
        };
        if tx.send(Ok(body)).is_err() {
            return;
        }
    }
}

async fn send_batch(client: &reqwest::Client, url: &Url, batch: &[String]) -> Result<(), String> {
    post(client, url, Some(sockjs::encode_messages(batch))).await.map(|_| ())
}

async fn post(client: &reqwest::Client, url: &Url, body: Option<String>) -> Result<String, String> {
    let mut request = client.post(url.clone()).timeout(POLL_TIMEOUT);
    if let Some(body) = body {
        request = request
            .header(reqwest::header::CONTENT_TYPE, "text/plain")
            .body(body);
    }

    let response = request
        .send()
        .await
        .and_then(|r| r.error_for_status())
        .map_err(|e| format!("XHR request to {} failed: {}", url, e))?;

    response
        .text()
        .await
        .map_err(|e| format!("XHR response from {} unreadable: {}", url, e))
}

/// One poll response may hold several newline-separated frames;
/// false once the session is closed
fn deliver_body(driver: &LinkDriver, body: &str) -> bool {
    for line in body.lines().filter(|l| !l.is_empty()) {
        match sockjs::parse_frame(line) {
            Ok(SockJsFrame::Open) => {
                driver.emit(TransportEvent::Opened);
            }
            Ok(SockJsFrame::Heartbeat) => {}
            Ok(SockJsFrame::Messages(messages)) => {
                for message in messages {
                    if !driver.emit(TransportEvent::Message(message)) {
                        return false;
                    }
                }
            }
            Ok(SockJsFrame::Close { code, reason }) => {
                driver.emit(TransportEvent::Closed {
                    code: Some(code),
                    reason,
                });
                return false;
            }
            Err(e) => warn!("Dropping SockJS frame: {}", e),
        }
    }
    true
}
