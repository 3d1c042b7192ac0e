// Core module - Protocol, connection and live state logic
pub mod live;
pub mod router;
pub mod session;
pub mod stomp;
pub mod transport;
