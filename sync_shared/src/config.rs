//! Configuration system.
//!
//! Loads client configuration from JSON strings (file IO left to the app).

use serde::{Deserialize, Serialize};

/// What happens to coalesced outbound samples while reconnecting.
///
/// This is an explicit configuration decision, not a silent default.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutboundPolicy {
    /// Queue samples and flush them once the channel re-establishes.
    Buffer,
    /// Drop samples; the first post-reconnect tick resynchronizes.
    Drop,
}

/// Reconnection behavior after an unexpected channel drop.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconnectPolicy {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_outbound_policy")]
    pub outbound: OutboundPolicy,
}

fn default_max_retries() -> u32 {
    3
}

fn default_outbound_policy() -> OutboundPolicy {
    OutboundPolicy::Drop
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            enabled: false,
            max_retries: default_max_retries(),
            outbound: default_outbound_policy(),
        }
    }
}

/// Root configuration for one multiplayer session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Server address, e.g. `127.0.0.1:40000`.
    pub server_addr: String,
    /// World/room to join.
    pub world_id: String,
    /// Room capacity advertised to the consumer.
    #[serde(default = "default_max_players")]
    pub max_players: u32,
    /// Outbound sample cadence and the expected inbound snapshot cadence.
    #[serde(default = "default_tick_hz")]
    pub tick_hz: u32,
    /// Disable to render raw store state instead of smoothed poses.
    #[serde(default = "default_interpolation")]
    pub interpolation: bool,
    /// Bound on the connection attempt, in milliseconds.
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
    #[serde(default)]
    pub reconnect: ReconnectPolicy,
}

fn default_max_players() -> u32 {
    50
}

fn default_tick_hz() -> u32 {
    20
}

fn default_interpolation() -> bool {
    true
}

fn default_connect_timeout_ms() -> u64 {
    5000
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server_addr: "127.0.0.1:40000".to_string(),
            world_id: "default".to_string(),
            max_players: default_max_players(),
            tick_hz: default_tick_hz(),
            interpolation: default_interpolation(),
            connect_timeout_ms: default_connect_timeout_ms(),
            reconnect: ReconnectPolicy::default(),
        }
    }
}

impl ClientConfig {
    /// Parses config from JSON.
    pub fn from_json_str(s: &str) -> serde_json::Result<Self> {
        serde_json::from_str(s)
    }

    /// Interval between outbound ticks, in milliseconds.
    pub fn tick_interval_ms(&self) -> f64 {
        1000.0 / f64::from(self.tick_hz.max(1))
    }
}
