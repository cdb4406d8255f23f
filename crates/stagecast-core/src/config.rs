use std::time::Duration;

use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

pub const DEFAULT_PORT: u16 = 8787;
pub const DEFAULT_BIND: &str = "127.0.0.1";
pub const MAX_PAYLOAD_BYTES: usize = 64 * 1024; // inbound WS frame cap
pub const HEARTBEAT_INTERVAL_SECS: u64 = 30;

/// Raw env var recognised for the connection cap (no `STAGECAST_` prefix).
pub const MAX_CONNECTIONS_ENV: &str = "MAX_CONCURRENT_CONNECTIONS";

/// Top-level config (stagecast.toml + STAGECAST_* env overrides).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StagecastConfig {
    #[serde(default)]
    pub gateway: GatewayConfig,
    #[serde(default)]
    pub queue: QueueConfig,
    #[serde(default)]
    pub connections: ConnectionsConfig,
    #[serde(default)]
    pub monitor: MonitorConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_bind")]
    pub bind: String,
    /// Required in `?token=` to join the `admin` room. `None` leaves it open.
    #[serde(default)]
    pub admin_token: Option<String>,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            bind: DEFAULT_BIND.to_string(),
            admin_token: None,
        }
    }
}

/// Display pacing for the broadcast scheduler.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueConfig {
    #[serde(default = "default_message_hold_ms")]
    pub message_hold_ms: u64,
    #[serde(default = "default_poll_hold_ms")]
    pub poll_hold_ms: u64,
    #[serde(default)]
    pub screenshot_hold_ms: u64,
    #[serde(default)]
    pub session_update_hold_ms: u64,
    /// Pause after each event before the next one is dequeued.
    #[serde(default = "default_inter_event_gap_ms")]
    pub inter_event_gap_ms: u64,
    /// How long shutdown waits for the worker to drain.
    #[serde(default = "default_drain_timeout_secs")]
    pub drain_timeout_secs: u64,
}

impl QueueConfig {
    pub fn inter_event_gap(&self) -> Duration {
        Duration::from_millis(self.inter_event_gap_ms)
    }

    pub fn drain_timeout(&self) -> Duration {
        Duration::from_secs(self.drain_timeout_secs)
    }
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            message_hold_ms: default_message_hold_ms(),
            poll_hold_ms: default_poll_hold_ms(),
            screenshot_hold_ms: 0,
            session_update_hold_ms: 0,
            inter_event_gap_ms: default_inter_event_gap_ms(),
            drain_timeout_secs: default_drain_timeout_secs(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectionsConfig {
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,
    #[serde(default = "default_idle_threshold_secs")]
    pub idle_threshold_secs: u64,
    #[serde(default = "default_reap_interval_secs")]
    pub reap_interval_secs: u64,
}

impl ConnectionsConfig {
    pub fn idle_threshold(&self) -> Duration {
        Duration::from_secs(self.idle_threshold_secs)
    }

    pub fn reap_interval(&self) -> Duration {
        Duration::from_secs(self.reap_interval_secs.max(1))
    }
}

impl Default for ConnectionsConfig {
    fn default() -> Self {
        Self {
            max_connections: default_max_connections(),
            idle_threshold_secs: default_idle_threshold_secs(),
            reap_interval_secs: default_reap_interval_secs(),
        }
    }
}

/// Sampling cadence and alert thresholds for the health monitor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonitorConfig {
    #[serde(default = "default_sample_interval_secs")]
    pub sample_interval_secs: u64,
    #[serde(default = "default_alert_dedup_window_secs")]
    pub alert_dedup_window_secs: u64,
    #[serde(default = "default_cpu_high_percent")]
    pub cpu_high_percent: f64,
    #[serde(default = "default_memory_high_percent")]
    pub memory_high_percent: f64,
    #[serde(default = "default_error_rate_high_percent")]
    pub error_rate_high_percent: f64,
    #[serde(default = "default_response_time_high_ms")]
    pub response_time_high_ms: f64,
}

impl MonitorConfig {
    pub fn sample_interval(&self) -> Duration {
        Duration::from_secs(self.sample_interval_secs.max(1))
    }

    pub fn alert_dedup_window(&self) -> Duration {
        Duration::from_secs(self.alert_dedup_window_secs)
    }
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            sample_interval_secs: default_sample_interval_secs(),
            alert_dedup_window_secs: default_alert_dedup_window_secs(),
            cpu_high_percent: default_cpu_high_percent(),
            memory_high_percent: default_memory_high_percent(),
            error_rate_high_percent: default_error_rate_high_percent(),
            response_time_high_ms: default_response_time_high_ms(),
        }
    }
}

fn default_port() -> u16 {
    DEFAULT_PORT
}
fn default_bind() -> String {
    DEFAULT_BIND.to_string()
}
fn default_message_hold_ms() -> u64 {
    8_000
}
fn default_poll_hold_ms() -> u64 {
    30_000
}
fn default_inter_event_gap_ms() -> u64 {
    1_000
}
fn default_drain_timeout_secs() -> u64 {
    60
}
fn default_max_connections() -> usize {
    5_000
}
fn default_idle_threshold_secs() -> u64 {
    30 * 60
}
fn default_reap_interval_secs() -> u64 {
    5 * 60
}
fn default_sample_interval_secs() -> u64 {
    5
}
fn default_alert_dedup_window_secs() -> u64 {
    5 * 60
}
fn default_cpu_high_percent() -> f64 {
    80.0
}
fn default_memory_high_percent() -> f64 {
    85.0
}
fn default_error_rate_high_percent() -> f64 {
    5.0
}
fn default_response_time_high_ms() -> f64 {
    2_000.0
}

impl StagecastConfig {
    /// Load config from a TOML file with env overrides.
    ///
    /// Layers, later wins:
    ///   1. Explicit path argument, else ./stagecast.toml
    ///   2. STAGECAST_* env vars, `__` separating section and key
    ///      (STAGECAST_QUEUE__POLL_HOLD_MS=15000)
    ///   3. MAX_CONCURRENT_CONNECTIONS
    pub fn load(config_path: Option<&str>) -> crate::error::Result<Self> {
        let path = config_path.unwrap_or("stagecast.toml");
        Self::figment(path)
            .extract()
            .map_err(|e| crate::error::StagecastError::Config(e.to_string()))
    }

    fn figment(path: &str) -> Figment {
        Figment::new()
            .merge(Toml::file(path))
            .merge(Env::prefixed("STAGECAST_").split("__"))
            .merge(
                Env::raw()
                    .only(&[MAX_CONNECTIONS_ENV])
                    .map(|_| "connections.max_connections".into()),
            )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use figment::Jail;

    #[test]
    fn defaults_match_documented_values() {
        let config = StagecastConfig::default();
        assert_eq!(config.queue.message_hold_ms, 8_000);
        assert_eq!(config.queue.poll_hold_ms, 30_000);
        assert_eq!(config.queue.screenshot_hold_ms, 0);
        assert_eq!(config.connections.max_connections, 5_000);
        assert_eq!(config.connections.idle_threshold(), Duration::from_secs(1800));
        assert_eq!(config.monitor.sample_interval(), Duration::from_secs(5));
        assert_eq!(config.monitor.alert_dedup_window(), Duration::from_secs(300));
    }

    #[test]
    fn missing_file_yields_defaults() {
        Jail::expect_with(|_jail| {
            let config = StagecastConfig::load(Some("does-not-exist.toml")).unwrap();
            assert_eq!(config, StagecastConfig::default());
            Ok(())
        });
    }

    #[test]
    fn toml_sections_override_defaults() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "stagecast.toml",
                r#"
                [queue]
                message_hold_ms = 2000

                [monitor]
                cpu_high_percent = 90.0
                "#,
            )?;
            let config = StagecastConfig::load(None).unwrap();
            assert_eq!(config.queue.message_hold_ms, 2_000);
            assert_eq!(config.queue.poll_hold_ms, 30_000);
            assert!((config.monitor.cpu_high_percent - 90.0).abs() < f64::EPSILON);
            Ok(())
        });
    }

    #[test]
    fn env_overrides_file() {
        Jail::expect_with(|jail| {
            jail.create_file("stagecast.toml", "[queue]\npoll_hold_ms = 10000\n")?;
            jail.set_env("STAGECAST_QUEUE__POLL_HOLD_MS", "15000");
            jail.set_env("MAX_CONCURRENT_CONNECTIONS", "42");
            let config = StagecastConfig::load(None).unwrap();
            assert_eq!(config.queue.poll_hold_ms, 15_000);
            assert_eq!(config.connections.max_connections, 42);
            Ok(())
        });
    }

    #[test]
    fn malformed_value_is_a_config_error() {
        Jail::expect_with(|jail| {
            jail.create_file("stagecast.toml", "[queue]\npoll_hold_ms = \"soon\"\n")?;
            let err = StagecastConfig::load(None).unwrap_err();
            assert!(matches!(err, crate::error::StagecastError::Config(_)));
            assert_eq!(err.code(), "CONFIG_ERROR");
            Ok(())
        });
    }
}
