// aqiwatch-core: connection health tracking and AQI alerting between
// aqiwatch-api and its consumers.

pub mod alert;
pub mod backend;
pub mod config;
pub mod connection;
pub mod error;
pub mod inbox;
pub mod model;
pub mod observer;

mod retry;

// ── Primary re-exports ──────────────────────────────────────────────
pub use alert::{AlertEngine, AlertRule, AlertState, ForecastTrend, HealthAdvice};
pub use backend::{HealthCheck, Realtime};
pub use config::{ManagerConfig, RetryPolicy};
pub use connection::ConnectionManager;
pub use error::CoreError;
pub use inbox::{DEFAULT_INBOX_CAPACITY, NotificationInbox};
pub use observer::{NotificationSink, Observers, StatusSink, SubscriptionId};

pub use aqiwatch_api::{AqiUpdate, RealtimeEvent};

// Re-export model types at the crate root for ergonomics.
pub use model::{
    // Connectivity
    Channel, ChannelState, ConnectionSnapshot, OverallStatus,
    // Readings
    Reading, Subject,
    // Notifications
    AqiBand, Notification, NotificationCategory, Priority, SyntheticKind,
};
