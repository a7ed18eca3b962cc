// aqiwatch-api: async clients for the two backend surfaces.
//
// `HealthClient` probes `GET {api}/health`. `RealtimeClient` holds the
// WebSocket stream of AQI readings and publishes its lifecycle as
// `RealtimeEvent`s. Neither tracks health over time or retries on its own.

pub mod error;
pub mod health;
pub mod realtime;
pub mod transport;

pub use error::Error;
pub use health::{HealthClient, HealthReport};
pub use realtime::{AqiUpdate, RealtimeClient, RealtimeEvent};
pub use transport::{TlsMode, TransportConfig};
