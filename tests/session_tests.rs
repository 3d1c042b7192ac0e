use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tarot_live::core::stomp::{Command, Frame, FrameDecoder, Incoming};
use tarot_live::core::transport::{MemoryPeer, MemoryServer, MemoryTransport};
use tarot_live::domain::config::{ADMIN_NOTIFICATIONS_TOPIC, DASHBOARD_SESSIONS_TOPIC};
use tarot_live::{ConnectionState, DomainEvent, LiveEvent, SessionManager, SessionOptions};
use tokio::time::Instant;
use url::Url;

/// Session manager behaviour against a scripted in-memory server
#[cfg(test)]
mod session_tests {
    use super::*;

    fn endpoint() -> Url {
        Url::parse("ws://admin.example.com/ws").unwrap()
    }

    fn start(options: SessionOptions) -> (SessionManager, MemoryServer) {
        let (transport, server) = MemoryTransport::new();
        let manager = SessionManager::connect(endpoint(), Arc::new(transport), options);
        (manager, server)
    }

    /// Server side of one accepted connection
    struct ScriptedServer {
        peer: MemoryPeer,
        decoder: FrameDecoder,
        pending: VecDeque<Frame>,
        next_message_id: u64,
    }

    impl ScriptedServer {
        async fn accept(server: &mut MemoryServer) -> Self {
            let peer = server.next_peer().await.expect("connection attempt");
            peer.accept();
            Self {
                peer,
                decoder: FrameDecoder::new(),
                pending: VecDeque::new(),
                next_message_id: 0,
            }
        }

        /// Read CONNECTED back without heart-beats in either direction
        async fn handshake(&mut self) -> Frame {
            self.handshake_with("0,0").await
        }

        async fn handshake_with(&mut self, heart_beat: &str) -> Frame {
            let connect = self.next_frame().await;
            assert_eq!(connect.command, Command::Connect);
            self.send(
                Frame::new(Command::Connected)
                    .with_header("version", "1.2")
                    .with_header("heart-beat", heart_beat),
            );
            connect
        }

        /// Next frame written by the client, skipping heart-beats
        async fn next_frame(&mut self) -> Frame {
            loop {
                if let Some(frame) = self.pending.pop_front() {
                    return frame;
                }
                let text = self.peer.next_outbound().await.expect("client frame");
                self.absorb(&text);
            }
        }

        /// Frame already written by the client, if any
        fn try_next_frame(&mut self) -> Option<Frame> {
            while self.pending.is_empty() {
                let text = self.peer.try_next_outbound()?;
                self.absorb(&text);
            }
            self.pending.pop_front()
        }

        fn absorb(&mut self, text: &str) {
            for item in self.decoder.feed(text).expect("client wrote valid STOMP") {
                if let Incoming::Frame(frame) = item {
                    self.pending.push_back(frame);
                }
            }
        }

        async fn expect_subscribe(&mut self, topic: &str) -> String {
            let frame = self.next_frame().await;
            assert_eq!(frame.command, Command::Subscribe);
            assert_eq!(frame.destination(), Some(topic));
            frame.header("id").expect("subscription id").to_string()
        }

        fn send(&self, frame: Frame) {
            self.peer.push(frame.encode());
        }

        fn message_frame(&mut self, topic: &str, body: &str) -> Frame {
            self.next_message_id += 1;
            Frame::new(Command::Message)
                .with_header("destination", topic)
                .with_header("message-id", self.next_message_id.to_string())
                .with_header("content-type", "application/json")
                .with_body(body)
        }

        fn message(&mut self, topic: &str, body: &str) {
            let frame = self.message_frame(topic, body);
            self.send(frame);
        }

        fn drop_link(self, reason: &str) {
            self.peer.drop_connection(reason);
        }
    }

    fn notification_text(event: &LiveEvent) -> String {
        match &event.payload {
            DomainEvent::Notification(n) => n.message.clone(),
            other => panic!("expected a notification, got {:?}", other),
        }
    }

    fn notification(message: &str) -> String {
        serde_json::json!({ "message": message, "type": "APPLICATION" }).to_string()
    }

    #[tokio::test(start_paused = true)]
    async fn test_subscription_survives_reconnect() {
        let (manager, mut server) = start(SessionOptions::default());
        let mut transitions = manager.state_events();
        let (_id, mut events) = manager.subscribe_channel(ADMIN_NOTIFICATIONS_TOPIC);

        let mut side = ScriptedServer::accept(&mut server).await;
        side.handshake().await;
        side.expect_subscribe(ADMIN_NOTIFICATIONS_TOPIC).await;
        manager.wait_for_state(ConnectionState::Connected).await.unwrap();

        side.message(ADMIN_NOTIFICATIONS_TOPIC, &notification("before drop"));
        assert_eq!(notification_text(&events.recv().await.unwrap()), "before drop");

        let dropped_at = Instant::now();
        side.drop_link("network lost");

        let mut side = ScriptedServer::accept(&mut server).await;
        assert!(dropped_at.elapsed() >= Duration::from_millis(5000));
        side.handshake().await;
        side.expect_subscribe(ADMIN_NOTIFICATIONS_TOPIC).await;

        side.message(ADMIN_NOTIFICATIONS_TOPIC, &notification("after reconnect"));
        assert_eq!(notification_text(&events.recv().await.unwrap()), "after reconnect");
        assert!(events.try_recv().is_err(), "event delivered twice");

        let expected = [
            ConnectionState::Connecting,
            ConnectionState::Connected,
            ConnectionState::Reconnecting,
            ConnectionState::Connecting,
            ConnectionState::Connected,
        ];
        for state in expected {
            assert_eq!(transitions.recv().await.unwrap(), state);
        }

        let stats = manager.stats();
        assert_eq!(stats.connections_established, 2);
        assert_eq!(stats.reconnect_attempts, 1);

        manager.disconnect();
        manager.closed().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_subscribe_while_reconnecting_is_applied_on_connect() {
        let (manager, mut server) = start(SessionOptions::default());
        let (_first, _first_rx) = manager.subscribe_channel(ADMIN_NOTIFICATIONS_TOPIC);

        let mut side = ScriptedServer::accept(&mut server).await;
        side.handshake().await;
        side.expect_subscribe(ADMIN_NOTIFICATIONS_TOPIC).await;
        side.drop_link("server restart");

        manager.wait_for_state(ConnectionState::Reconnecting).await.unwrap();
        let (_second, mut sessions) = manager.subscribe_channel(DASHBOARD_SESSIONS_TOPIC);

        let mut side = ScriptedServer::accept(&mut server).await;
        side.handshake().await;
        let mut topics = vec![
            side.next_frame().await.destination().unwrap().to_string(),
            side.next_frame().await.destination().unwrap().to_string(),
        ];
        topics.sort();
        assert_eq!(topics, vec![ADMIN_NOTIFICATIONS_TOPIC, DASHBOARD_SESSIONS_TOPIC]);

        side.message(
            DASHBOARD_SESSIONS_TOPIC,
            r#"{"type": "NEW_SESSION", "sessionId": 42, "customerName": "Ada"}"#,
        );
        let event = sessions.recv().await.unwrap();
        assert!(matches!(event.payload, DomainEvent::NewSession(_)));

        manager.disconnect();
        manager.closed().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_frames_delivered_in_arrival_order() {
        let (manager, mut server) = start(SessionOptions::default());
        let (_id, mut events) = manager.subscribe_channel(ADMIN_NOTIFICATIONS_TOPIC);

        let mut side = ScriptedServer::accept(&mut server).await;
        side.handshake().await;
        side.expect_subscribe(ADMIN_NOTIFICATIONS_TOPIC).await;

        for i in 0..50 {
            side.message(ADMIN_NOTIFICATIONS_TOPIC, &notification(&format!("n{}", i)));
        }

        for i in 0..50 {
            let event = events.recv().await.unwrap();
            assert_eq!(notification_text(&event), format!("n{}", i));
        }

        manager.disconnect();
        manager.closed().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_failing_handlers_do_not_affect_others() {
        let (manager, mut server) = start(SessionOptions::default());
        manager.subscribe(ADMIN_NOTIFICATIONS_TOPIC, |_| Err(anyhow::anyhow!("handler rejected event")));
        manager.subscribe(ADMIN_NOTIFICATIONS_TOPIC, |_| panic!("handler blew up"));
        let (_id, mut events) = manager.subscribe_channel(ADMIN_NOTIFICATIONS_TOPIC);

        let mut side = ScriptedServer::accept(&mut server).await;
        side.handshake().await;
        side.expect_subscribe(ADMIN_NOTIFICATIONS_TOPIC).await;

        side.message(ADMIN_NOTIFICATIONS_TOPIC, &notification("first"));
        side.message(ADMIN_NOTIFICATIONS_TOPIC, &notification("second"));
        assert_eq!(notification_text(&events.recv().await.unwrap()), "first");
        assert_eq!(notification_text(&events.recv().await.unwrap()), "second");

        assert_eq!(manager.state(), ConnectionState::Connected);
        assert!(manager.stats().handler_failures >= 2);

        // Three handlers share one wire subscription
        assert!(side.try_next_frame().is_none());

        manager.disconnect();
        manager.closed().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_malformed_frames_are_dropped() {
        let (manager, mut server) = start(SessionOptions::default());
        let (_id, mut events) = manager.subscribe_channel(ADMIN_NOTIFICATIONS_TOPIC);

        let mut side = ScriptedServer::accept(&mut server).await;
        side.handshake().await;
        side.expect_subscribe(ADMIN_NOTIFICATIONS_TOPIC).await;

        side.peer.push("NOT-A-COMMAND\n\n\0");
        side.message(ADMIN_NOTIFICATIONS_TOPIC, "{ this is not json");
        side.message(ADMIN_NOTIFICATIONS_TOPIC, &notification("still alive"));

        assert_eq!(notification_text(&events.recv().await.unwrap()), "still alive");
        let stats = manager.stats();
        assert_eq!(stats.protocol_errors, 1);
        assert_eq!(stats.decode_failures, 1);
        assert_eq!(manager.state(), ConnectionState::Connected);

        manager.disconnect();
        manager.closed().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_oversized_frame_does_not_stall_stream() {
        let (manager, mut server) = start(SessionOptions::default());
        let (_id, mut events) = manager.subscribe_channel(ADMIN_NOTIFICATIONS_TOPIC);

        let mut side = ScriptedServer::accept(&mut server).await;
        side.handshake_with("4000,4000").await;
        side.expect_subscribe(ADMIN_NOTIFICATIONS_TOPIC).await;

        side.peer.push(format!(
            "MESSAGE\ndestination:{}\ncontent-length:999999999\n\n{{}}",
            ADMIN_NOTIFICATIONS_TOPIC
        ));
        side.peer.push("\n");
        side.message(ADMIN_NOTIFICATIONS_TOPIC, &notification("after the giant"));

        assert_eq!(notification_text(&events.recv().await.unwrap()), "after the giant");
        let stats = manager.stats();
        assert_eq!(stats.protocol_errors, 1);
        assert_eq!(stats.heartbeats_received, 1);
        assert_eq!(manager.state(), ConnectionState::Connected);

        manager.disconnect();
        manager.closed().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_partial_frames_do_not_count_as_traffic() {
        let (manager, mut server) = start(SessionOptions::default());

        let mut side = ScriptedServer::accept(&mut server).await;
        side.handshake_with("4000,4000").await;
        manager.wait_for_state(ConnectionState::Connected).await.unwrap();
        let connected_at = Instant::now();

        side.peer.push("MESSAGE\ndestination:/topic/slow\n\n");
        for _ in 0..2 {
            tokio::time::sleep(Duration::from_secs(3)).await;
            side.peer.push("x");
        }

        manager.wait_for_state(ConnectionState::Reconnecting).await.unwrap();
        let silent_for = connected_at.elapsed();
        assert!(silent_for >= Duration::from_millis(8000));
        assert!(silent_for < Duration::from_millis(9000), "dropped after {:?}", silent_for);

        manager.disconnect();
        manager.closed().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_unlistened_topic_is_dropped_silently() {
        let (manager, mut server) = start(SessionOptions::default());
        let (_id, mut events) = manager.subscribe_channel(ADMIN_NOTIFICATIONS_TOPIC);

        let mut side = ScriptedServer::accept(&mut server).await;
        side.handshake().await;
        side.expect_subscribe(ADMIN_NOTIFICATIONS_TOPIC).await;

        side.message("/topic/somewhere/else", r#"{"x": 1}"#);
        side.message(ADMIN_NOTIFICATIONS_TOPIC, &notification("mine"));

        assert_eq!(notification_text(&events.recv().await.unwrap()), "mine");
        assert_eq!(manager.stats().dropped_no_listener, 1);

        manager.disconnect();
        manager.closed().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_unsubscribe_is_idempotent() {
        let (manager, mut server) = start(SessionOptions::default());
        let (first, mut first_rx) = manager.subscribe_channel(ADMIN_NOTIFICATIONS_TOPIC);
        let (second, mut second_rx) = manager.subscribe_channel(ADMIN_NOTIFICATIONS_TOPIC);

        let mut side = ScriptedServer::accept(&mut server).await;
        side.handshake().await;
        let wire_id = side.expect_subscribe(ADMIN_NOTIFICATIONS_TOPIC).await;

        manager.unsubscribe(first);
        manager.unsubscribe(first);
        side.message(ADMIN_NOTIFICATIONS_TOPIC, &notification("only second"));

        assert_eq!(notification_text(&second_rx.recv().await.unwrap()), "only second");
        // Removing the handler dropped its sender
        assert!(first_rx.recv().await.is_none());
        // Another handler still listens, so no wire UNSUBSCRIBE yet
        assert!(side.try_next_frame().is_none());

        manager.unsubscribe(second);
        let frame = side.next_frame().await;
        assert_eq!(frame.command, Command::Unsubscribe);
        assert_eq!(frame.header("id"), Some(wire_id.as_str()));

        manager.unsubscribe(second);
        side.message(ADMIN_NOTIFICATIONS_TOPIC, &notification("nobody"));
        assert!(second_rx.recv().await.is_none());
        assert_eq!(manager.state(), ConnectionState::Connected);

        manager.disconnect();
        manager.closed().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_disconnect_is_graceful_and_idempotent() {
        let (manager, mut server) = start(SessionOptions::default());
        let (_id, mut events) = manager.subscribe_channel(ADMIN_NOTIFICATIONS_TOPIC);

        let mut side = ScriptedServer::accept(&mut server).await;
        side.handshake().await;
        let wire_id = side.expect_subscribe(ADMIN_NOTIFICATIONS_TOPIC).await;
        manager.wait_for_state(ConnectionState::Connected).await.unwrap();

        manager.disconnect();
        manager.disconnect();
        assert!(!manager.is_active());

        let unsubscribe = side.next_frame().await;
        assert_eq!(unsubscribe.command, Command::Unsubscribe);
        assert_eq!(unsubscribe.header("id"), Some(wire_id.as_str()));
        assert_eq!(side.next_frame().await.command, Command::Disconnect);
        side.peer.closed_by_client().await;

        manager.closed().await;
        assert_eq!(manager.state(), ConnectionState::Closed);
        assert!(events.recv().await.is_none());

        // Nothing reconnects after teardown
        tokio::time::sleep(Duration::from_secs(60)).await;
        assert!(server.try_next_peer().is_none());
        manager.disconnect();
        assert_eq!(manager.state(), ConnectionState::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_frames_after_teardown_are_discarded() {
        let (transport, mut server) = MemoryTransport::new();
        let manager = Arc::new(SessionManager::connect(
            endpoint(),
            Arc::new(transport),
            SessionOptions::default(),
        ));
        let delivered = Arc::new(AtomicUsize::new(0));

        let handle: Weak<SessionManager> = Arc::downgrade(&manager);
        let counter = Arc::clone(&delivered);
        manager.subscribe(ADMIN_NOTIFICATIONS_TOPIC, move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            if let Some(manager) = handle.upgrade() {
                manager.disconnect();
            }
            Ok(())
        });

        let mut side = ScriptedServer::accept(&mut server).await;
        side.handshake().await;
        side.expect_subscribe(ADMIN_NOTIFICATIONS_TOPIC).await;

        // Both frames arrive in one chunk; the first handler call tears down
        let mut chunk = side.message_frame(ADMIN_NOTIFICATIONS_TOPIC, &notification("one")).encode();
        chunk.push_str(&side.message_frame(ADMIN_NOTIFICATIONS_TOPIC, &notification("two")).encode());
        side.peer.push(chunk);

        manager.closed().await;
        assert_eq!(delivered.load(Ordering::SeqCst), 1);
        assert_eq!(manager.stats().dropped_after_teardown, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_heartbeat_silence_drops_connection() {
        let (manager, mut server) = start(SessionOptions::default());

        let mut side = ScriptedServer::accept(&mut server).await;
        side.handshake_with("4000,4000").await;
        manager.wait_for_state(ConnectionState::Connected).await.unwrap();
        let connected_at = Instant::now();

        manager.wait_for_state(ConnectionState::Reconnecting).await.unwrap();
        assert!(connected_at.elapsed() >= Duration::from_millis(8000));
        assert!(manager.stats().heartbeats_sent >= 1);

        manager.disconnect();
        manager.closed().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_server_heartbeats_keep_connection_alive() {
        let (manager, mut server) = start(SessionOptions::default());

        let mut side = ScriptedServer::accept(&mut server).await;
        side.handshake_with("4000,4000").await;
        manager.wait_for_state(ConnectionState::Connected).await.unwrap();

        for _ in 0..10 {
            tokio::time::sleep(Duration::from_secs(3)).await;
            side.peer.push("\n");
        }

        assert_eq!(manager.state(), ConnectionState::Connected);
        let heartbeat = side.peer.next_outbound().await.unwrap();
        assert_eq!(heartbeat, "\n");

        manager.disconnect();
        manager.closed().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_error_frame_drops_connection() {
        let (manager, mut server) = start(SessionOptions::default());

        let mut side = ScriptedServer::accept(&mut server).await;
        side.handshake().await;
        manager.wait_for_state(ConnectionState::Connected).await.unwrap();

        side.send(
            Frame::new(Command::Error)
                .with_header("message", "session expired")
                .with_body("Please log in again"),
        );

        manager.wait_for_state(ConnectionState::Reconnecting).await.unwrap();
        assert_eq!(manager.stats().protocol_errors, 1);

        manager.disconnect();
        manager.closed().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_publish_sends_json_frame_when_connected() {
        let (manager, mut server) = start(SessionOptions::default());

        // Not connected yet: dropped
        manager.publish("/app/admin/ping", r#"{"early": true}"#);

        let mut side = ScriptedServer::accept(&mut server).await;
        side.handshake().await;
        manager.wait_for_state(ConnectionState::Connected).await.unwrap();

        manager.publish("/app/admin/ping", r#"{"ping": 1}"#);
        let frame = side.next_frame().await;
        assert_eq!(frame.command, Command::Send);
        assert_eq!(frame.destination(), Some("/app/admin/ping"));
        assert_eq!(frame.header("content-type"), Some("application/json"));
        assert_eq!(frame.body, r#"{"ping": 1}"#);
        assert!(side.try_next_frame().is_none());

        manager.disconnect();
        manager.closed().await;
    }
}
