// Session module - Connection lifecycle and subscriptions
pub mod manager;
pub mod state;
pub mod subscription;

pub use manager::{SessionManager, SessionOptions};
pub use state::{ConnectionState, PipelineStats};
pub use subscription::{Handler, SubscriptionId, SubscriptionRegistry};
