// ── Channel state and connection snapshot ──

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::Display;

/// The two independently tracked connectivity paths.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, Serialize, Deserialize)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum Channel {
    /// Request/response health-check API.
    Api,
    /// Push-style realtime stream.
    Realtime,
}

impl Channel {
    pub fn other(self) -> Self {
        match self {
            Self::Api => Self::Realtime,
            Self::Realtime => Self::Api,
        }
    }
}

/// Per-channel connection state. There is no terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Display, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
    Error,
}

impl ChannelState {
    pub fn is_connected(self) -> bool {
        self == Self::Connected
    }
}

/// Derived classification of both channels together.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverallStatus {
    /// Both channels connected.
    AllConnected,
    /// Exactly one channel connected.
    Degraded,
    /// Neither channel connected.
    Offline,
}

impl OverallStatus {
    /// Pure function of the two channel states.
    pub fn from_states(api: ChannelState, realtime: ChannelState) -> Self {
        match (api.is_connected(), realtime.is_connected()) {
            (true, true) => Self::AllConnected,
            (false, false) => Self::Offline,
            _ => Self::Degraded,
        }
    }
}

/// Immutable view of both channels at one instant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionSnapshot {
    pub api_state: ChannelState,
    pub realtime_state: ChannelState,
    /// Reason of the most recent failure still relevant to the snapshot.
    pub last_error: Option<String>,
    /// Failure reason of the API channel, kept until it connects.
    #[serde(default)]
    pub api_error: Option<String>,
    /// Failure reason of the realtime channel, kept until it connects.
    #[serde(default)]
    pub realtime_error: Option<String>,
    pub last_checked_at: DateTime<Utc>,
}

impl ConnectionSnapshot {
    pub(crate) fn initial(now: DateTime<Utc>) -> Self {
        Self {
            api_state: ChannelState::Disconnected,
            realtime_state: ChannelState::Disconnected,
            last_error: None,
            api_error: None,
            realtime_error: None,
            last_checked_at: now,
        }
    }

    pub fn state(&self, channel: Channel) -> ChannelState {
        match channel {
            Channel::Api => self.api_state,
            Channel::Realtime => self.realtime_state,
        }
    }

    pub(crate) fn state_mut(&mut self, channel: Channel) -> &mut ChannelState {
        match channel {
            Channel::Api => &mut self.api_state,
            Channel::Realtime => &mut self.realtime_state,
        }
    }

    pub fn error(&self, channel: Channel) -> Option<&str> {
        match channel {
            Channel::Api => self.api_error.as_deref(),
            Channel::Realtime => self.realtime_error.as_deref(),
        }
    }

    pub(crate) fn error_mut(&mut self, channel: Channel) -> &mut Option<String> {
        match channel {
            Channel::Api => &mut self.api_error,
            Channel::Realtime => &mut self.realtime_error,
        }
    }

    /// Never stored; always derived from the two channel states.
    pub fn overall(&self) -> OverallStatus {
        OverallStatus::from_states(self.api_state, self.realtime_state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL: [ChannelState; 4] = [
        ChannelState::Disconnected,
        ChannelState::Connecting,
        ChannelState::Connected,
        ChannelState::Error,
    ];

    #[test]
    fn overall_covers_every_state_pair() {
        for api in ALL {
            for realtime in ALL {
                let expected = match (api, realtime) {
                    (ChannelState::Connected, ChannelState::Connected) => {
                        OverallStatus::AllConnected
                    }
                    (ChannelState::Connected, _) | (_, ChannelState::Connected) => {
                        OverallStatus::Degraded
                    }
                    _ => OverallStatus::Offline,
                };
                assert_eq!(OverallStatus::from_states(api, realtime), expected);
            }
        }
    }

    #[test]
    fn overall_ignores_error_and_timestamp() {
        let now = Utc::now();
        let mut a = ConnectionSnapshot::initial(now);
        a.api_state = ChannelState::Connected;
        let mut b = a.clone();
        b.last_error = Some("boom".into());
        b.last_checked_at = now + chrono::TimeDelta::hours(1);

        assert_eq!(a.overall(), OverallStatus::Degraded);
        assert_eq!(a.overall(), b.overall());
    }

    #[test]
    fn other_channel() {
        assert_eq!(Channel::Api.other(), Channel::Realtime);
        assert_eq!(Channel::Realtime.other(), Channel::Api);
    }

    #[test]
    fn display_names() {
        assert_eq!(Channel::Realtime.to_string(), "realtime");
        assert_eq!(ChannelState::Connecting.to_string(), "Connecting");
        assert_eq!(OverallStatus::AllConnected.to_string(), "AllConnected");
    }
}
