//! Typed rows for the dashboard lists, normalized from pushed events.

use crate::domain::event::{DomainEvent, EntityId, LiveEvent};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Something that can live in a [`LiveList`](super::LiveList)
pub trait LiveEntry: Clone {
    /// Identity used by keyed pushes to replace an older copy
    fn key(&self) -> String;

    /// Normalize an event; `None` if the event is not this kind of row
    fn from_event(event: &LiveEvent) -> Option<Self>
    where
        Self: Sized;

    /// Carry over fields from the copy being replaced
    fn absorb(&mut self, _previous: &Self) {}
}

/// One reading session on the live dashboard
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionEntry {
    pub session_id: EntityId,
    pub customer_name: Option<String>,
    pub reader_name: Option<String>,
    pub channel: Option<String>,
    pub status: String,
    pub amount: Option<f64>,
    pub last_event_at: DateTime<Utc>,
}

impl LiveEntry for SessionEntry {
    fn key(&self) -> String {
        self.session_id.to_string()
    }

    fn from_event(event: &LiveEvent) -> Option<Self> {
        match &event.payload {
            DomainEvent::NewSession(e) => Some(Self {
                session_id: e.session_id.clone(),
                customer_name: e.customer_name.clone(),
                reader_name: e.reader_name.clone(),
                channel: e.channel.clone(),
                status: e.status.clone().unwrap_or_else(|| "NEW".to_string()),
                amount: e.amount,
                last_event_at: event.received_at,
            }),
            DomainEvent::SessionUpdated(e) => Some(Self {
                session_id: e.session_id.clone(),
                customer_name: e.customer_name.clone(),
                reader_name: e.reader_name.clone(),
                channel: None,
                status: e.status.clone(),
                amount: e.amount,
                last_event_at: event.received_at,
            }),
            _ => None,
        }
    }

    fn absorb(&mut self, previous: &Self) {
        if self.customer_name.is_none() {
            self.customer_name = previous.customer_name.clone();
        }
        if self.reader_name.is_none() {
            self.reader_name = previous.reader_name.clone();
        }
        if self.channel.is_none() {
            self.channel = previous.channel.clone();
        }
        if self.amount.is_none() {
            self.amount = previous.amount;
        }
    }
}

/// One row of the admin notification bell
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationEntry {
    pub id: Option<EntityId>,
    pub title: Option<String>,
    pub message: String,
    pub kind: Option<String>,
    pub read: bool,
    pub topic: String,
    pub received_at: DateTime<Utc>,
}

impl LiveEntry for NotificationEntry {
    fn key(&self) -> String {
        // Id-less notifications are never merged
        match &self.id {
            Some(id) => id.to_string(),
            None => format!(
                "{}#{}",
                self.received_at.timestamp_nanos_opt().unwrap_or_default(),
                self.message
            ),
        }
    }

    fn from_event(event: &LiveEvent) -> Option<Self> {
        match &event.payload {
            DomainEvent::Notification(n) => Some(Self {
                id: n.id.clone(),
                title: n.title.clone(),
                message: n.message.clone(),
                kind: n.kind.clone(),
                read: n.read,
                topic: event.topic.clone(),
                received_at: event.received_at,
            }),
            _ => None,
        }
    }
}
