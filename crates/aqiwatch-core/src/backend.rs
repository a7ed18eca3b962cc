// ── Collaborator seams ──
//
// The ConnectionManager talks to its two backends only through these
// traits. Production wiring uses the aqiwatch-api clients; tests plug in
// scripted fakes.

use std::future::Future;

use tokio::sync::broadcast;

use aqiwatch_api::{HealthClient, RealtimeClient, RealtimeEvent};

use crate::error::CoreError;

/// One-shot health probe of the request/response API.
pub trait HealthCheck: Send + Sync + 'static {
    /// `Ok(())` when the backend is healthy. The error's reason string is
    /// recorded on the API channel.
    fn check_health(&self) -> impl Future<Output = Result<(), CoreError>> + Send;
}

/// Push-style realtime stream.
///
/// Lifecycle outcomes arrive as [`RealtimeEvent`]s on [`signals`](Self::signals)
/// rather than through assignable callbacks.
pub trait Realtime: Send + Sync + 'static {
    /// Begin a connection attempt. Returns without waiting for the outcome.
    ///
    /// A later `connect` supersedes any attempt still in flight.
    fn connect(&self);

    /// Abandon the current session or pending attempt. An abandoned
    /// attempt must not publish any further signal, so a handshake that
    /// outlives the manager's connect timeout cannot report `Connected`
    /// over the recorded timeout. `connect` keeps working afterwards.
    fn disconnect(&self);

    /// A fresh receiver of lifecycle signals.
    fn signals(&self) -> broadcast::Receiver<RealtimeEvent>;

    fn subscribe_to_location(&self, lat: f64, lon: f64) -> Result<(), CoreError>;

    fn subscribe_to_station(&self, station_id: &str) -> Result<(), CoreError>;

    fn unsubscribe_all(&self) -> Result<(), CoreError>;

    fn is_connected(&self) -> bool;

    /// Release every resource. Must be idempotent.
    fn dispose(&self);
}

impl HealthCheck for HealthClient {
    async fn check_health(&self) -> Result<(), CoreError> {
        let report = self.check().await?;
        tracing::trace!(status = %report.status, "health probe ok");
        Ok(())
    }
}

impl Realtime for RealtimeClient {
    fn connect(&self) {
        RealtimeClient::connect(self);
    }

    fn disconnect(&self) {
        RealtimeClient::disconnect(self);
    }

    fn signals(&self) -> broadcast::Receiver<RealtimeEvent> {
        self.events()
    }

    fn subscribe_to_location(&self, lat: f64, lon: f64) -> Result<(), CoreError> {
        Ok(RealtimeClient::subscribe_to_location(self, lat, lon)?)
    }

    fn subscribe_to_station(&self, station_id: &str) -> Result<(), CoreError> {
        Ok(RealtimeClient::subscribe_to_station(self, station_id)?)
    }

    fn unsubscribe_all(&self) -> Result<(), CoreError> {
        Ok(RealtimeClient::unsubscribe_all(self)?)
    }

    fn is_connected(&self) -> bool {
        RealtimeClient::is_connected(self)
    }

    fn dispose(&self) {
        RealtimeClient::dispose(self);
    }
}
