//! Command handlers and the shared setup they need.

pub mod config_cmd;
pub mod evaluate;
pub mod status;
pub mod watch;

use aqiwatch_api::{HealthClient, RealtimeClient};
use aqiwatch_config::Config;
use aqiwatch_core::ConnectionManager;

use crate::cli::GlobalOpts;
use crate::error::CliError;

pub type Manager = ConnectionManager<HealthClient, RealtimeClient>;

/// Load the config file (or `--config`) and apply command-line overrides.
pub fn resolve_config(global: &GlobalOpts) -> Result<Config, CliError> {
    let mut cfg = match global.config {
        Some(ref path) => aqiwatch_config::load_config_from(path)?,
        None => aqiwatch_config::load_config()?,
    };

    if let Some(ref url) = global.api_url {
        cfg.backend.api_url.clone_from(url);
    }
    if let Some(ref url) = global.realtime_url {
        cfg.backend.realtime_url.clone_from(url);
    }
    if global.insecure {
        cfg.backend.insecure = true;
    }

    Ok(cfg)
}

/// Build a connection manager plus a second handle on the realtime client
/// for reading updates. Nothing connects until the caller asks.
pub fn build_manager(cfg: &Config) -> Result<(Manager, RealtimeClient), CliError> {
    let api_url = aqiwatch_config::api_url(cfg)?;
    let realtime_url = aqiwatch_config::realtime_url(cfg)?;
    let manager_config = aqiwatch_config::manager_config(cfg)?;
    let transport = aqiwatch_config::transport_config(cfg);

    let health = HealthClient::new(&api_url, &transport)?;
    let realtime = RealtimeClient::new(realtime_url, &transport)?;

    tracing::debug!(
        api = %cfg.backend.api_url,
        realtime = %cfg.backend.realtime_url,
        "building connection manager"
    );

    let manager = ConnectionManager::new(health, realtime.clone(), manager_config);
    Ok((manager, realtime))
}
