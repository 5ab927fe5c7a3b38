//! Gateway configuration.

use std::time::Duration;

use serde::Deserialize;

/// Tunables for sessions, commands and discovery.
///
/// Durations are plain millisecond fields so the struct deserializes from
/// any config format the embedding application uses.
#[derive(Debug, Clone, Deserialize)]
pub struct GatewayConfig {
    /// Maximum gap between heartbeats before a session is reported stale.
    #[serde(default = "default_liveness_window_ms")]
    pub liveness_window_ms: u64,

    /// How long a command waits for its acknowledgment.
    #[serde(default = "default_command_timeout_ms")]
    pub command_timeout_ms: u64,

    /// Overall window for a full parameter list read.
    #[serde(default = "default_param_read_timeout_ms")]
    pub param_read_timeout_ms: u64,

    /// Window for the echo confirming a single parameter write.
    #[serde(default = "default_param_confirm_timeout_ms")]
    pub param_confirm_timeout_ms: u64,

    /// Heartbeat wait per discovery candidate before it is abandoned.
    #[serde(default = "default_discover_timeout_ms")]
    pub discover_timeout_ms: u64,

    /// Rate of the gateway's own heartbeat toward each vehicle; `None`
    /// disables it.
    #[serde(default = "default_heartbeat_send_hz")]
    pub heartbeat_send_hz: Option<f32>,

    /// Source system id the gateway stamps on outbound frames. 255 is the
    /// conventional ground-station id.
    #[serde(default = "default_system_id")]
    pub system_id: u8,

    /// Source component id for outbound frames.
    #[serde(default = "default_component_id")]
    pub component_id: u8,
}

fn default_liveness_window_ms() -> u64 {
    5_000
}

fn default_command_timeout_ms() -> u64 {
    3_000
}

fn default_param_read_timeout_ms() -> u64 {
    10_000
}

fn default_param_confirm_timeout_ms() -> u64 {
    2_000
}

fn default_discover_timeout_ms() -> u64 {
    3_000
}

fn default_heartbeat_send_hz() -> Option<f32> {
    Some(1.0)
}

fn default_system_id() -> u8 {
    255
}

fn default_component_id() -> u8 {
    190
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            liveness_window_ms: default_liveness_window_ms(),
            command_timeout_ms: default_command_timeout_ms(),
            param_read_timeout_ms: default_param_read_timeout_ms(),
            param_confirm_timeout_ms: default_param_confirm_timeout_ms(),
            discover_timeout_ms: default_discover_timeout_ms(),
            heartbeat_send_hz: default_heartbeat_send_hz(),
            system_id: default_system_id(),
            component_id: default_component_id(),
        }
    }
}

impl GatewayConfig {
    pub fn liveness_window(&self) -> Duration {
        Duration::from_millis(self.liveness_window_ms)
    }

    pub fn command_timeout(&self) -> Duration {
        Duration::from_millis(self.command_timeout_ms)
    }

    pub fn param_read_timeout(&self) -> Duration {
        Duration::from_millis(self.param_read_timeout_ms)
    }

    pub fn param_confirm_timeout(&self) -> Duration {
        Duration::from_millis(self.param_confirm_timeout_ms)
    }

    pub fn discover_timeout(&self) -> Duration {
        Duration::from_millis(self.discover_timeout_ms)
    }
}
