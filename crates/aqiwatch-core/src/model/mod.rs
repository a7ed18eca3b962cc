// ── Domain model ──
//
// Plain value types shared by the ConnectionManager, the AlertEngine and
// their sinks. Nothing here performs I/O.

mod channel;
mod notification;
mod reading;

pub use channel::{Channel, ChannelState, ConnectionSnapshot, OverallStatus};
pub use notification::{AqiBand, Notification, NotificationCategory, Priority, SyntheticKind};
pub use reading::{Reading, Subject};
