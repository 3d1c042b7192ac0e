// STOMP module - Frame codec and heart-beat negotiation
pub mod frame;
pub mod heartbeat;

pub use frame::{Command, Frame, FrameDecoder, FrameError, Incoming};
pub use heartbeat::{HeartBeat, Negotiated};
