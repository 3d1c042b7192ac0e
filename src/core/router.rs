//! Topic router: decodes MESSAGE frames into typed events and fans them out
//! to every handler registered on the frame's destination.
//!
//! Frames are routed one at a time in arrival order. A malformed body, a
//! topic nobody listens to, or a failing handler never escapes this module.

use crate::core::session::state::PipelineStats;
use crate::core::session::subscription::SubscriptionRegistry;
use crate::core::stomp::Frame;
use crate::domain::config::{ADMIN_NOTIFICATIONS_TOPIC, DASHBOARD_SESSIONS_TOPIC};
use crate::domain::error::LiveResult;
use crate::domain::event::{DomainEvent, LiveEvent};
use serde_json::Value;
use std::panic::{catch_unwind, AssertUnwindSafe};
use tracing::{debug, error, trace, warn};

/// Shape family of a topic
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TopicKind {
    AdminNotifications,
    DashboardSessions,
    Other,
}

impl TopicKind {
    /// Per-tenant children (`/topic/admin/notifications/{tenant}`) share
    /// the parent's shape
    pub fn classify(topic: &str) -> Self {
        if is_or_under(topic, ADMIN_NOTIFICATIONS_TOPIC) {
            TopicKind::AdminNotifications
        } else if is_or_under(topic, DASHBOARD_SESSIONS_TOPIC) {
            TopicKind::DashboardSessions
        } else {
            TopicKind::Other
        }
    }
}

fn is_or_under(topic: &str, base: &str) -> bool {
    topic == base
        || topic
            .strip_prefix(base)
            .map_or(false, |rest| rest.starts_with('/'))
}

/// What happened to one frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteOutcome {
    /// No handler registered for the destination
    NoListeners,
    /// Body could not be decoded; dropped
    DecodeFailed,
    Delivered { handlers: usize, failures: usize },
}

/// Decode a frame body according to its topic
pub fn decode(topic: &str, body: &str) -> LiveResult<DomainEvent> {
    let value: Value = serde_json::from_str(body)?;

    match TopicKind::classify(topic) {
        TopicKind::AdminNotifications => {
            Ok(DomainEvent::Notification(serde_json::from_value(value)?))
        }
        TopicKind::DashboardSessions => {
            let kind = value
                .get("type")
                .and_then(Value::as_str)
                .map(|s| s.to_ascii_uppercase());
            match kind.as_deref() {
                None | Some("NEW_SESSION") => {
                    Ok(DomainEvent::NewSession(serde_json::from_value(value)?))
                }
                Some("SESSION_UPDATED") => {
                    Ok(DomainEvent::SessionUpdated(serde_json::from_value(value)?))
                }
                Some(other) => {
                    debug!("Untyped session event '{}' on {}", other, topic);
                    Ok(DomainEvent::Raw(value))
                }
            }
        }
        TopicKind::Other => {
            debug!("No typed shape for topic {}, delivering raw payload", topic);
            Ok(DomainEvent::Raw(value))
        }
    }
}

/// Route one MESSAGE frame to the handlers registered for its destination
pub fn route(frame: &Frame, registry: &SubscriptionRegistry, stats: &mut PipelineStats) -> RouteOutcome {
    stats.frames_received += 1;

    let topic = match frame.destination() {
        Some(destination) => destination.to_string(),
        None => match frame
            .header("subscription")
            .and_then(|wire_id| registry.topic_for_wire_id(wire_id))
        {
            Some(topic) => topic.to_string(),
            None => {
                debug!("MESSAGE without destination or known subscription, dropping");
                stats.dropped_no_listener += 1;
                return RouteOutcome::NoListeners;
            }
        },
    };

    let handlers = registry.handlers_for(&topic);
    if handlers.is_empty() {
        trace!("No listeners for {}, dropping frame", topic);
        stats.dropped_no_listener += 1;
        return RouteOutcome::NoListeners;
    }

    let payload = match decode(&topic, &frame.body) {
        Ok(payload) => payload,
        Err(e) => {
            warn!("Dropping undecodable frame on {}: {}", topic, e);
            stats.decode_failures += 1;
            return RouteOutcome::DecodeFailed;
        }
    };

    let event = LiveEvent::new(topic, payload);
    let mut failures = 0;

    for (id, handler) in &handlers {
        match catch_unwind(AssertUnwindSafe(|| handler(&event))) {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                failures += 1;
                error!("Handler {} on {} failed: {:#}", id, event.topic, e);
            }
            Err(panic) => {
                failures += 1;
                error!("Handler {} on {} panicked: {}", id, event.topic, panic_message(&*panic));
            }
        }
    }

    stats.frames_dispatched += 1;
    stats.handler_failures += failures as u64;

    RouteOutcome::Delivered {
        handlers: handlers.len(),
        failures,
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::session::subscription::{Handler, SubscriptionId};
    use crate::core::stomp::Command;
    use std::sync::{Arc, Mutex};

    fn message(topic: &str, body: &str) -> Frame {
        Frame::new(Command::Message)
            .with_header("destination", topic)
            .with_header("subscription", "sub-0")
            .with_body(body)
    }

    fn recording(log: &Arc<Mutex<Vec<LiveEvent>>>) -> Handler {
        let log = Arc::clone(log);
        Arc::new(move |event: &LiveEvent| {
            log.lock().unwrap().push(event.clone());
            Ok(())
        })
    }

    #[test]
    fn test_classify() {
        assert_eq!(TopicKind::classify("/topic/admin/notifications"), TopicKind::AdminNotifications);
        assert_eq!(TopicKind::classify("/topic/admin/notifications/tenant-9"), TopicKind::AdminNotifications);
        assert_eq!(TopicKind::classify("/topic/admin/notificationsX"), TopicKind::Other);
        assert_eq!(TopicKind::classify("/topic/dashboard/sessions"), TopicKind::DashboardSessions);
        assert_eq!(TopicKind::classify("/topic/revenue"), TopicKind::Other);
    }

    #[test]
    fn test_decode_session_variants() {
        let new = decode(DASHBOARD_SESSIONS_TOPIC, r#"{"sessionId": 1, "readerName": "Luna"}"#).unwrap();
        assert!(matches!(new, DomainEvent::NewSession(_)));

        let updated = decode(
            DASHBOARD_SESSIONS_TOPIC,
            r#"{"type": "SESSION_UPDATED", "sessionId": 1, "status": "ENDED"}"#,
        )
        .unwrap();
        assert!(matches!(updated, DomainEvent::SessionUpdated(ref e) if e.status == "ENDED"));

        let odd = decode(DASHBOARD_SESSIONS_TOPIC, r#"{"type": "PING"}"#).unwrap();
        assert!(matches!(odd, DomainEvent::Raw(_)));
    }

    #[test]
    fn test_decode_shape_mismatch_is_error() {
        assert!(decode(ADMIN_NOTIFICATIONS_TOPIC, r#"{"title": "no message"}"#).is_err());
        assert!(decode(ADMIN_NOTIFICATIONS_TOPIC, "not json").is_err());
    }

    #[test]
    fn test_route_without_listeners() {
        let registry = SubscriptionRegistry::new();
        let mut stats = PipelineStats::default();
        let outcome = route(&message("/topic/x", "{}"), &registry, &mut stats);
        assert_eq!(outcome, RouteOutcome::NoListeners);
        assert_eq!(stats.dropped_no_listener, 1);
    }

    #[test]
    fn test_route_decode_failure_is_contained() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut registry = SubscriptionRegistry::new();
        registry.add(SubscriptionId::new(), ADMIN_NOTIFICATIONS_TOPIC, recording(&log));
        let mut stats = PipelineStats::default();

        let outcome = route(&message(ADMIN_NOTIFICATIONS_TOPIC, "{oops"), &registry, &mut stats);
        assert_eq!(outcome, RouteOutcome::DecodeFailed);
        assert_eq!(stats.decode_failures, 1);
        assert!(log.lock().unwrap().is_empty());
    }

    #[test]
    fn test_failing_handlers_do_not_silence_others() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut registry = SubscriptionRegistry::new();
        let erroring: Handler = Arc::new(|_| Err(anyhow::anyhow!("bad handler")));
        let panicking: Handler = Arc::new(|_| panic!("handler blew up"));
        registry.add(SubscriptionId::new(), "/topic/x", erroring);
        registry.add(SubscriptionId::new(), "/topic/x", panicking);
        registry.add(SubscriptionId::new(), "/topic/x", recording(&log));
        let mut stats = PipelineStats::default();

        let outcome = route(&message("/topic/x", r#"{"n": 1}"#), &registry, &mut stats);
        assert_eq!(outcome, RouteOutcome::Delivered { handlers: 3, failures: 2 });
        assert_eq!(stats.handler_failures, 2);
        assert_eq!(log.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_route_by_subscription_header_when_destination_missing() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut registry = SubscriptionRegistry::new();
        registry.add(SubscriptionId::new(), "/topic/x", recording(&log));
        let mut stats = PipelineStats::default();

        let frame = Frame::new(Command::Message)
            .with_header("subscription", "sub-0")
            .with_body("{}");
        route(&frame, &registry, &mut stats);

        let log = log.lock().unwrap();
        assert_eq!(log.len(), 1);
        assert_eq!(log[0].topic, "/topic/x");
    }
}
