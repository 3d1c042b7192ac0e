//! tarot-live library
//!
//! Real-time delivery pipeline for the Tarot marketplace admin console:
//! one managed STOMP connection, topic routing into typed events, and
//! bounded newest-first lists fed by pushes and refreshes.

pub mod cli;
pub mod client;
pub mod core;
pub mod domain;
pub mod infrastructure;

pub use client::LiveClient;
pub use core::live::{LiveEntry, LiveList, LiveState, NotificationEntry, SessionEntry};
pub use core::session::{ConnectionState, PipelineStats, SessionManager, SessionOptions, SubscriptionId};
pub use core::transport::{MemoryTransport, Transport, TransportEvent, TransportLink};
pub use domain::config::LiveConfig;
pub use domain::error::{LiveError, LiveResult};
pub use domain::event::{DomainEvent, LiveEvent};
