//! Session manager: owns the one logical connection to the push endpoint.
//!
//! [`SessionManager`] is a cheap handle; all connection state and the
//! subscription registry live inside a single background task that the
//! handle drives over an unbounded command channel. Every public method is
//! synchronous and non-blocking. Subscriptions are replayed each time the
//! connection reaches `Connected`, so callers never resubscribe by hand.

use crate::core::router;
use crate::core::session::state::{ConnectionState, PipelineStats};
use crate::core::session::subscription::{
    Handler, Registration, Removal, SubscriptionId, SubscriptionRegistry,
};
use crate::core::stomp::{Command, Frame, FrameDecoder, HeartBeat, Incoming, Negotiated};
use crate::core::transport::{Transport, TransportEvent, TransportLink};
use crate::domain::config::ConnectionConfig;
use crate::domain::error::{LiveError, LiveResult};
use crate::domain::event::LiveEvent;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant};
use tracing::{debug, error, info, trace, warn};
use url::Url;

/// Stand-in deadline for timers that are not armed
const FAR_FUTURE: Duration = Duration::from_secs(86_400 * 365);

/// Capacity of the state transition log channel
const TRANSITION_LOG_CAPACITY: usize = 64;

/// Connection lifecycle tuning
#[derive(Debug, Clone)]
pub struct SessionOptions {
    /// Fixed delay between reconnect attempts
    pub reconnect_delay: Duration,
    /// Consecutive failed attempts tolerated before giving up; unbounded if `None`
    pub max_reconnect_attempts: Option<u32>,
    /// Heart-beat offer sent in CONNECT
    pub heartbeat: HeartBeat,
    /// Multiple of the server's heart-beat interval tolerated as silence
    pub heartbeat_tolerance: f64,
    /// Time allowed from `open` to CONNECTED
    pub connect_timeout: Duration,
    /// `host` header for CONNECT; defaults to the endpoint host
    pub virtual_host: Option<String>,
    /// Frames larger than this are discarded as malformed
    pub max_frame_bytes: usize,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self::from(&ConnectionConfig::default())
    }
}

impl From<&ConnectionConfig> for SessionOptions {
    fn from(config: &ConnectionConfig) -> Self {
        Self {
            reconnect_delay: config.reconnect_delay(),
            max_reconnect_attempts: config.max_reconnect_attempts,
            heartbeat: HeartBeat::new(config.heartbeat_outgoing_ms, config.heartbeat_incoming_ms),
            heartbeat_tolerance: config.heartbeat_tolerance,
            connect_timeout: config.connect_timeout(),
            virtual_host: None,
            max_frame_bytes: config.max_frame_bytes,
        }
    }
}

/// Requests from the handle to the connection task
enum SessionCommand {
    Subscribe {
        id: SubscriptionId,
        topic: String,
        handler: Handler,
    },
    Unsubscribe {
        id: SubscriptionId,
    },
    Publish {
        destination: String,
        body: String,
    },
    Shutdown,
}

/// Handle to one managed connection
pub struct SessionManager {
    endpoint: Url,
    cmd_tx: mpsc::UnboundedSender<SessionCommand>,
    state_rx: watch::Receiver<ConnectionState>,
    transitions: broadcast::Sender<ConnectionState>,
    stats_rx: watch::Receiver<PipelineStats>,
    active: Arc<AtomicBool>,
    pending: Mutex<Option<ConnectionTask>>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl SessionManager {
    /// Create a manager in `Disconnected`; nothing happens until `activate`
    pub fn new(endpoint: Url, transport: Arc<dyn Transport>, options: SessionOptions) -> Self {
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let (state_tx, state_rx) = watch::channel(ConnectionState::Disconnected);
        let (stats_tx, stats_rx) = watch::channel(PipelineStats::default());
        let (transitions, _) = broadcast::channel(TRANSITION_LOG_CAPACITY);
        let active = Arc::new(AtomicBool::new(true));

        let decoder = FrameDecoder::with_max_frame_bytes(options.max_frame_bytes);
        let task = ConnectionTask {
            endpoint: endpoint.clone(),
            transport,
            options,
            registry: SubscriptionRegistry::new(),
            decoder,
            cmd_rx,
            state: ConnectionState::Disconnected,
            state_tx,
            transitions: transitions.clone(),
            stats: PipelineStats::default(),
            stats_tx,
            active: Arc::clone(&active),
        };

        Self {
            endpoint,
            cmd_tx,
            state_rx,
            transitions,
            stats_rx,
            active,
            pending: Mutex::new(Some(task)),
            task: Mutex::new(None),
        }
    }

    /// Create and immediately activate. Must be called inside a tokio runtime.
    pub fn connect(endpoint: Url, transport: Arc<dyn Transport>, options: SessionOptions) -> Self {
        let manager = Self::new(endpoint, transport, options);
        manager.activate();
        manager
    }

    /// Start the connection task. No-op if already started or closed.
    pub fn activate(&self) {
        let task = lock(&self.pending).take();
        if let Some(task) = task {
            info!("Activating live connection to {}", self.endpoint);
            let handle = tokio::spawn(task.run());
            *lock(&self.task) = Some(handle);
        }
    }

    /// Register `handler` for `topic`.
    ///
    /// Works in any state: before `Connected` the subscription is queued and
    /// applied on connect, and it is re-applied after every reconnect.
    pub fn subscribe<F>(&self, topic: &str, handler: F) -> SubscriptionId
    where
        F: Fn(&LiveEvent) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        let id = SubscriptionId::new();
        if !self.is_active() {
            debug!("Subscribe to {} after teardown ignored", topic);
            return id;
        }
        let _ = self.cmd_tx.send(SessionCommand::Subscribe {
            id,
            topic: topic.to_string(),
            handler: Arc::new(handler),
        });
        id
    }

    /// Subscribe and receive events on a channel instead of a callback
    pub fn subscribe_channel(&self, topic: &str) -> (SubscriptionId, mpsc::UnboundedReceiver<LiveEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let id = self.subscribe(topic, move |event: &LiveEvent| {
            tx.send(event.clone())
                .map_err(|_| anyhow::anyhow!("event receiver dropped"))
        });
        (id, rx)
    }

    /// Remove a handler. No-op if unknown, already removed, or torn down.
    pub fn unsubscribe(&self, id: SubscriptionId) {
        if self.is_active() {
            let _ = self.cmd_tx.send(SessionCommand::Unsubscribe { id });
        }
    }

    /// Send a JSON body to `destination`; dropped with a warning while not connected
    pub fn publish(&self, destination: &str, body: impl Into<String>) {
        if self.is_active() {
            let _ = self.cmd_tx.send(SessionCommand::Publish {
                destination: destination.to_string(),
                body: body.into(),
            });
        }
    }

    /// Tear down: stop dispatching at once, drop every subscription and
    /// move to `Closed`. Safe to call any number of times.
    pub fn disconnect(&self) {
        if !self.active.swap(false, Ordering::SeqCst) {
            return;
        }
        info!("Disconnecting live connection to {}", self.endpoint);

        let unstarted = lock(&self.pending).take();
        match unstarted {
            Some(mut task) => task.shutdown(),
            None => {
                let _ = self.cmd_tx.send(SessionCommand::Shutdown);
            }
        }
    }

    /// Wait until `target` is reached; `Err(Closed)` if the connection
    /// closes first
    pub async fn wait_for_state(&self, target: ConnectionState) -> LiveResult<()> {
        let mut rx = self.state_rx.clone();
        let reached = rx
            .wait_for(|state| *state == target || state.is_closed())
            .await
            .map(|state| *state)
            .unwrap_or(ConnectionState::Closed);

        if reached == target {
            Ok(())
        } else {
            Err(LiveError::Closed)
        }
    }

    /// Wait for the background task to finish after `disconnect`
    pub async fn closed(&self) {
        let _ = self.wait_for_state(ConnectionState::Closed).await;
        let handle = lock(&self.task).take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                warn!("Connection task ended abnormally: {}", e);
            }
        }
    }

    pub fn state(&self) -> ConnectionState {
        *self.state_rx.borrow()
    }

    /// Latest-state receiver for UI indicators
    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.state_rx.clone()
    }

    /// Every transition from now on, in order
    pub fn state_events(&self) -> broadcast::Receiver<ConnectionState> {
        self.transitions.subscribe()
    }

    pub fn stats(&self) -> PipelineStats {
        *self.stats_rx.borrow()
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }
}

impl Drop for SessionManager {
    fn drop(&mut self) {
        self.disconnect();
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

// ── Connection task ─────────────────────────────────────────────────────────

enum Exit {
    Shutdown,
    Dropped { was_connected: bool },
}

enum Step {
    Command(Option<SessionCommand>),
    Transport(Option<TransportEvent>),
    ConnectTimeout,
    HeartbeatTimeout,
    SendHeartbeat,
}

enum FrameAction {
    Continue,
    Established(HeartBeat),
    Drop,
}

struct ConnectionTask {
    endpoint: Url,
    transport: Arc<dyn Transport>,
    options: SessionOptions,
    registry: SubscriptionRegistry,
    decoder: FrameDecoder,
    cmd_rx: mpsc::UnboundedReceiver<SessionCommand>,
    state: ConnectionState,
    state_tx: watch::Sender<ConnectionState>,
    transitions: broadcast::Sender<ConnectionState>,
    stats: PipelineStats,
    stats_tx: watch::Sender<PipelineStats>,
    active: Arc<AtomicBool>,
}

impl ConnectionTask {
    async fn run(mut self) {
        let mut failed_attempts: u32 = 0;

        while self.active.load(Ordering::SeqCst) {
            self.transition(ConnectionState::Connecting);

            match self.run_connection().await {
                Exit::Shutdown => break,
                Exit::Dropped { was_connected } => {
                    failed_attempts = if was_connected { 0 } else { failed_attempts + 1 };
                    if let Some(max) = self.options.max_reconnect_attempts {
                        if failed_attempts >= max {
                            error!(
                                "Giving up on {} after {} failed connection attempts",
                                self.endpoint, failed_attempts
                            );
                            break;
                        }
                    }

                    self.transition(ConnectionState::Reconnecting);
                    self.stats.reconnect_attempts += 1;
                    self.publish_stats();
                    info!(
                        "Reconnecting to {} in {:?}",
                        self.endpoint, self.options.reconnect_delay
                    );

                    if !self.wait_reconnect_delay().await {
                        break;
                    }
                }
            }
        }

        self.shutdown();
    }

    /// One transport lifetime: open, handshake, serve until drop or shutdown
    async fn run_connection(&mut self) -> Exit {
        debug!("Opening {} transport to {}", self.transport.kind(), self.endpoint);
        let mut link = self.transport.open(&self.endpoint).await;
        self.decoder.reset();

        let connect_deadline = Instant::now() + self.options.connect_timeout;
        let mut connected = false;
        let mut agreed = Negotiated::default();
        let mut last_received = Instant::now();
        let mut next_heartbeat = Instant::now() + FAR_FUTURE;

        loop {
            let read_timeout = if connected {
                agreed.read_timeout(self.options.heartbeat_tolerance)
            } else {
                None
            };
            let read_deadline = read_timeout
                .map(|timeout| last_received + timeout)
                .unwrap_or_else(|| Instant::now() + FAR_FUTURE);
            let sending_heartbeats = connected && agreed.send_every.is_some();

            let step = tokio::select! {
                biased;
                cmd = self.cmd_rx.recv() => Step::Command(cmd),
                event = link.next_event() => Step::Transport(event),
                _ = sleep_until(connect_deadline), if !connected => Step::ConnectTimeout,
                _ = sleep_until(read_deadline), if read_timeout.is_some() => Step::HeartbeatTimeout,
                _ = sleep_until(next_heartbeat), if sending_heartbeats => Step::SendHeartbeat,
            };

            match step {
                Step::Command(None) => {
                    self.close_gracefully(&link, connected);
                    return Exit::Shutdown;
                }
                Step::Command(Some(cmd)) => {
                    let target = if connected { Some(&link) } else { None };
                    if !self.apply_command(cmd, target) {
                        self.close_gracefully(&link, connected);
                        return Exit::Shutdown;
                    }
                }
                Step::Transport(Some(TransportEvent::Opened)) => {
                    debug!("Transport open, sending CONNECT");
                    send_frame(&link, &self.connect_frame());
                }
                Step::Transport(Some(TransportEvent::Message(text))) => {
                    let items = match self.decoder.feed(&text) {
                        Ok(items) => items,
                        Err(e) => {
                            warn!("Discarding malformed STOMP data: {}", e);
                            self.stats.protocol_errors += 1;
                            self.publish_stats();
                            continue;
                        }
                    };
                    // Only decoded traffic counts as proof of life
                    if !items.is_empty() {
                        last_received = Instant::now();
                    }

                    for item in items {
                        let frame = match item {
                            Incoming::Heartbeat => {
                                trace!("Heart-beat received");
                                self.stats.heartbeats_received += 1;
                                continue;
                            }
                            Incoming::Frame(frame) => frame,
                        };

                        match self.handle_frame(frame, &link, connected) {
                            FrameAction::Continue => {}
                            FrameAction::Established(server) => {
                                connected = true;
                                agreed = self.options.heartbeat.negotiate(server);
                                debug!("Heart-beat agreed: {:?}", agreed);
                                if let Some(every) = agreed.send_every {
                                    next_heartbeat = Instant::now() + every;
                                }
                            }
                            FrameAction::Drop => {
                                self.publish_stats();
                                link.close();
                                return Exit::Dropped { was_connected: connected };
                            }
                        }
                    }
                    self.publish_stats();
                }
                Step::Transport(Some(TransportEvent::Error(message))) => {
                    warn!("Transport error on {}: {}", self.endpoint, message);
                }
                Step::Transport(Some(TransportEvent::Closed { code, reason })) => {
                    info!("Transport closed (code {:?}): {}", code, reason);
                    return Exit::Dropped { was_connected: connected };
                }
                Step::Transport(None) => {
                    info!("Transport ended without close event");
                    return Exit::Dropped { was_connected: connected };
                }
                Step::ConnectTimeout => {
                    warn!(
                        "No CONNECTED from {} within {:?}",
                        self.endpoint, self.options.connect_timeout
                    );
                    link.close();
                    return Exit::Dropped { was_connected: false };
                }
                Step::HeartbeatTimeout => {
                    warn!(
                        "Server silent for {:?}, treating connection as dropped",
                        read_timeout.unwrap_or_default()
                    );
                    link.close();
                    return Exit::Dropped { was_connected: true };
                }
                Step::SendHeartbeat => {
                    trace!("Sending heart-beat");
                    link.send("\n".to_string());
                    self.stats.heartbeats_sent += 1;
                    if let Some(every) = agreed.send_every {
                        next_heartbeat = Instant::now() + every;
                    }
                }
            }
        }
    }

    fn handle_frame(&mut self, frame: Frame, link: &TransportLink, connected: bool) -> FrameAction {
        match frame.command {
            Command::Connected if !connected => {
                info!(
                    "STOMP session established with {} (version {})",
                    self.endpoint,
                    frame.header("version").unwrap_or("1.0")
                );
                self.stats.connections_established += 1;
                self.transition(ConnectionState::Connected);
                self.resubscribe_all(link);
                FrameAction::Established(HeartBeat::parse(frame.header("heart-beat")))
            }
            Command::Message if connected => {
                if !self.active.load(Ordering::SeqCst) {
                    debug!("Discarding frame that arrived after teardown");
                    self.stats.dropped_after_teardown += 1;
                    return FrameAction::Continue;
                }
                router::route(&frame, &self.registry, &mut self.stats);
                FrameAction::Continue
            }
            Command::Receipt => {
                debug!("Receipt {}", frame.header("receipt-id").unwrap_or("?"));
                FrameAction::Continue
            }
            Command::Error => {
                warn!(
                    "Server sent ERROR: {} {}",
                    frame.header("message").unwrap_or(""),
                    frame.body.trim()
                );
                self.stats.protocol_errors += 1;
                FrameAction::Drop
            }
            other => {
                debug!("Ignoring {} frame (connected: {})", other, connected);
                FrameAction::Continue
            }
        }
    }

    /// Apply a handle command; false means shut down.
    /// `link` is `Some` only while connected.
    fn apply_command(&mut self, cmd: SessionCommand, link: Option<&TransportLink>) -> bool {
        match cmd {
            SessionCommand::Subscribe { id, topic, handler } => {
                match self.registry.add(id, &topic, handler) {
                    Registration::NewTopic { wire_id } => {
                        debug!("Subscription {} to {} as {}", id, topic, wire_id);
                        if let Some(link) = link {
                            send_frame(link, &subscribe_frame(&topic, &wire_id));
                        }
                    }
                    Registration::Joined => {
                        debug!("Subscription {} joined existing wire subscription to {}", id, topic);
                    }
                    Registration::Duplicate => {
                        debug!("Subscription {} already registered", id);
                    }
                }
                true
            }
            SessionCommand::Unsubscribe { id } => {
                match self.registry.remove(id) {
                    Removal::LastForTopic { topic, wire_id } => {
                        debug!("Last handler for {} removed, dropping {}", topic, wire_id);
                        if let Some(link) = link {
                            send_frame(link, &unsubscribe_frame(&wire_id));
                        }
                    }
                    Removal::Handler => debug!("Subscription {} removed", id),
                    Removal::NotFound => trace!("Unsubscribe of unknown id {}", id),
                }
                true
            }
            SessionCommand::Publish { destination, body } => {
                match link {
                    Some(link) => {
                        let frame = Frame::new(Command::Send)
                            .with_header("destination", destination)
                            .with_header("content-type", "application/json")
                            .with_body(body);
                        send_frame(link, &frame);
                    }
                    None => warn!("Not connected, dropping publish to {}", destination),
                }
                true
            }
            SessionCommand::Shutdown => false,
        }
    }

    /// Queue commands during the fixed reconnect delay; false means shut down
    async fn wait_reconnect_delay(&mut self) -> bool {
        let deadline = Instant::now() + self.options.reconnect_delay;
        loop {
            let cmd = tokio::select! {
                biased;
                cmd = self.cmd_rx.recv() => cmd,
                _ = sleep_until(deadline) => return true,
            };
            match cmd {
                Some(cmd) => {
                    if !self.apply_command(cmd, None) {
                        return false;
                    }
                }
                None => return false,
            }
        }
    }

    fn resubscribe_all(&self, link: &TransportLink) {
        let subscriptions = self.registry.wire_subscriptions();
        if !subscriptions.is_empty() {
            info!("Applying {} topic subscription(s)", subscriptions.len());
        }
        for (topic, wire_id) in subscriptions {
            send_frame(link, &subscribe_frame(&topic, &wire_id));
        }
    }

    fn close_gracefully(&mut self, link: &TransportLink, connected: bool) {
        if connected {
            for (_, wire_id) in self.registry.wire_subscriptions() {
                send_frame(link, &unsubscribe_frame(&wire_id));
            }
            send_frame(link, &Frame::new(Command::Disconnect));
        }
        link.close();
    }

    fn shutdown(&mut self) {
        self.active.store(false, Ordering::SeqCst);
        self.registry.clear();
        self.decoder.reset();
        self.transition(ConnectionState::Closed);
        self.publish_stats();
    }

    fn connect_frame(&self) -> Frame {
        let host = self
            .options
            .virtual_host
            .clone()
            .or_else(|| self.endpoint.host_str().map(str::to_string))
            .unwrap_or_else(|| "/".to_string());

        Frame::new(Command::Connect)
            .with_header("accept-version", "1.2,1.1,1.0")
            .with_header("host", host)
            .with_header("heart-beat", self.options.heartbeat.header_value())
    }

    fn transition(&mut self, next: ConnectionState) {
        if self.state == next {
            return;
        }
        if !self.state.can_transition_to(next) {
            warn!("Ignoring invalid transition {} -> {}", self.state, next);
            return;
        }
        info!("Connection {} -> {}", self.state, next);
        self.state = next;
        self.state_tx.send_replace(next);
        let _ = self.transitions.send(next);
    }

    fn publish_stats(&self) {
        self.stats_tx.send_replace(self.stats);
    }
}

fn subscribe_frame(topic: &str, wire_id: &str) -> Frame {
    Frame::new(Command::Subscribe)
        .with_header("id", wire_id)
        .with_header("destination", topic)
        .with_header("ack", "auto")
}

fn unsubscribe_frame(wire_id: &str) -> Frame {
    Frame::new(Command::Unsubscribe).with_header("id", wire_id)
}

fn send_frame(link: &TransportLink, frame: &Frame) {
    trace!("Sending {} frame", frame.command);
    if !link.send(frame.encode()) {
        debug!("Transport gone, {} frame not sent", frame.command);
    }
}
