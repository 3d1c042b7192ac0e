use crate::domain::event::LiveEvent;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;
use uuid::Uuid;

/// Callback invoked with every decoded event on a topic
pub type Handler = Arc<dyn Fn(&LiveEvent) -> anyhow::Result<()> + Send + Sync>;

/// Opaque handle returned by `subscribe`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(Uuid);

impl SubscriptionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SubscriptionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Handlers registered on one topic, sharing a single wire subscription
struct TopicEntry {
    wire_id: String,
    handlers: Vec<(SubscriptionId, Handler)>,
}

/// Result of adding a handler
#[derive(Debug, PartialEq, Eq)]
pub enum Registration {
    /// First handler on the topic; a wire SUBSCRIBE with this id is needed
    NewTopic { wire_id: String },
    /// Topic already subscribed on the wire
    Joined,
    /// Same id registered twice; ignored
    Duplicate,
}

/// Result of removing a handler
#[derive(Debug, PartialEq, Eq)]
pub enum Removal {
    NotFound,
    /// Other handlers remain on the topic
    Handler,
    /// Last handler gone; the wire subscription should be dropped
    LastForTopic { topic: String, wire_id: String },
}

/// Topic -> handlers table. Lives inside the connection task only.
#[derive(Default)]
pub struct SubscriptionRegistry {
    by_topic: BTreeMap<String, TopicEntry>,
    topic_of: HashMap<SubscriptionId, String>,
    next_wire_id: u64,
}

impl SubscriptionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, id: SubscriptionId, topic: &str, handler: Handler) -> Registration {
        if self.topic_of.contains_key(&id) {
            return Registration::Duplicate;
        }
        self.topic_of.insert(id, topic.to_string());

        if let Some(entry) = self.by_topic.get_mut(topic) {
            entry.handlers.push((id, handler));
            return Registration::Joined;
        }

        let wire_id = format!("sub-{}", self.next_wire_id);
        self.next_wire_id += 1;
        self.by_topic.insert(
            topic.to_string(),
            TopicEntry {
                wire_id: wire_id.clone(),
                handlers: vec![(id, handler)],
            },
        );
        Registration::NewTopic { wire_id }
    }

    pub fn remove(&mut self, id: SubscriptionId) -> Removal {
        let Some(topic) = self.topic_of.remove(&id) else {
            return Removal::NotFound;
        };
        let Some(entry) = self.by_topic.get_mut(&topic) else {
            return Removal::NotFound;
        };

        entry.handlers.retain(|(sid, _)| *sid != id);
        if !entry.handlers.is_empty() {
            return Removal::Handler;
        }

        let wire_id = entry.wire_id.clone();
        self.by_topic.remove(&topic);
        Removal::LastForTopic { topic, wire_id }
    }

    /// Handlers for `topic`, in registration order
    pub fn handlers_for(&self, topic: &str) -> Vec<(SubscriptionId, Handler)> {
        self.by_topic
            .get(topic)
            .map(|entry| entry.handlers.clone())
            .unwrap_or_default()
    }

    /// Resolve a wire subscription id back to its topic
    pub fn topic_for_wire_id(&self, wire_id: &str) -> Option<&str> {
        self.by_topic
            .iter()
            .find(|(_, entry)| entry.wire_id == wire_id)
            .map(|(topic, _)| topic.as_str())
    }

    /// `(topic, wire_id)` for every subscribed topic
    pub fn wire_subscriptions(&self) -> Vec<(String, String)> {
        self.by_topic
            .iter()
            .map(|(topic, entry)| (topic.clone(), entry.wire_id.clone()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.topic_of.len()
    }

    pub fn is_empty(&self) -> bool {
        self.topic_of.is_empty()
    }

    pub fn topic_count(&self) -> usize {
        self.by_topic.len()
    }

    pub fn clear(&mut self) {
        self.by_topic.clear();
        self.topic_of.clear();
    }
}
