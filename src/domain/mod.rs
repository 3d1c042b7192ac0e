// Domain module - Configuration, errors and event types
pub mod config;
pub mod error;
pub mod event;
