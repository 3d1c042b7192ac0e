// Live module - Bounded lists fed by pushes and refreshes
pub mod entry;
pub mod list;
pub mod state;

pub use entry::{LiveEntry, NotificationEntry, SessionEntry};
pub use list::{apply_push, apply_refresh, apply_upsert, LiveList};
pub use state::{FetchTicket, LiveState};
