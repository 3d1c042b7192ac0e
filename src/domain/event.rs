//! Typed payloads pushed by the server and the envelope handed to handlers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier as it appears on the wire; the backend mixes numeric and
/// string ids depending on the resource.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EntityId {
    Number(i64),
    Text(String),
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntityId::Number(n) => write!(f, "{}", n),
            EntityId::Text(s) => write!(f, "{}", s),
        }
    }
}

/// A reading session was started by a customer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewSessionEvent {
    #[serde(alias = "id")]
    pub session_id: EntityId,
    #[serde(default)]
    pub customer_name: Option<String>,
    #[serde(default)]
    pub reader_name: Option<String>,
    /// CHAT, CALL or VIDEO
    #[serde(default)]
    pub channel: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub amount: Option<f64>,
    #[serde(default)]
    pub started_at: Option<String>,
}

/// An existing reading session changed status
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionUpdatedEvent {
    #[serde(alias = "id")]
    pub session_id: EntityId,
    pub status: String,
    #[serde(default)]
    pub customer_name: Option<String>,
    #[serde(default)]
    pub reader_name: Option<String>,
    #[serde(default)]
    pub amount: Option<f64>,
    #[serde(default)]
    pub updated_at: Option<String>,
}

/// Admin notification (new dispute, reader application, payout request...)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationEvent {
    #[serde(default)]
    pub id: Option<EntityId>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(alias = "content")]
    pub message: String,
    #[serde(default, rename = "type")]
    pub kind: Option<String>,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub read: bool,
}

/// Decoded frame body, one variant per known topic shape
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", content = "data", rename_all = "snake_case")]
pub enum DomainEvent {
    NewSession(NewSessionEvent),
    SessionUpdated(SessionUpdatedEvent),
    Notification(NotificationEvent),
    /// Body of a topic without a typed shape
    Raw(serde_json::Value),
}

impl DomainEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            DomainEvent::NewSession(_) => "new_session",
            DomainEvent::SessionUpdated(_) => "session_updated",
            DomainEvent::Notification(_) => "notification",
            DomainEvent::Raw(_) => "raw",
        }
    }
}

/// What every handler receives
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LiveEvent {
    pub topic: String,
    pub payload: DomainEvent,
    pub received_at: DateTime<Utc>,
}

impl LiveEvent {
    pub fn new(topic: impl Into<String>, payload: DomainEvent) -> Self {
        Self {
            topic: topic.into(),
            payload,
            received_at: Utc::now(),
        }
    }
}
