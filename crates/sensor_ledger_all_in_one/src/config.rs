use common::clickhouse::ClickHouseConfig;
use common::telemetry::{LogFormat, TelemetryConfig};
use config::{Config, ConfigError, Environment};
use ingestion_worker::mqtt::MqttSubscriberConfig;
use serde::{Deserialize, Serialize};
use settlement::SettlementConfig;
use std::fmt;
use std::time::Duration;

/// Where telemetry events are persisted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    ClickHouse,
    Memory,
}

#[derive(Deserialize, Serialize, Clone)]
pub struct ServiceConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Log output format (json, pretty)
    #[serde(default = "default_log_format")]
    pub log_format: String,

    // MQTT configuration
    #[serde(default = "default_mqtt_host")]
    pub mqtt_host: String,

    #[serde(default = "default_mqtt_port")]
    pub mqtt_port: u16,

    #[serde(default = "default_mqtt_client_id")]
    pub mqtt_client_id: String,

    /// Subscription filter; `sensors/#` receives every reading
    #[serde(default = "default_mqtt_topic_filter")]
    pub mqtt_topic_filter: String,

    #[serde(default = "default_mqtt_keep_alive_secs")]
    pub mqtt_keep_alive_secs: u64,

    #[serde(default = "default_mqtt_retry_delay_secs")]
    pub mqtt_retry_delay_secs: u64,

    /// Consecutive failed connections before giving up (0 = never)
    #[serde(default = "default_mqtt_max_retry_attempts")]
    pub mqtt_max_retry_attempts: u32,

    // Storage configuration
    /// `clickhouse` or `memory`
    #[serde(default = "default_store_backend")]
    pub store_backend: String,

    #[serde(default = "default_clickhouse_url")]
    pub clickhouse_url: String,

    #[serde(default = "default_clickhouse_database")]
    pub clickhouse_database: String,

    #[serde(default = "default_clickhouse_username")]
    pub clickhouse_username: String,

    #[serde(default = "default_clickhouse_password")]
    pub clickhouse_password: String,

    #[serde(default = "default_clickhouse_table")]
    pub clickhouse_table: String,

    // Ledger configuration; settlement runs only when all three are set
    #[serde(default)]
    pub ledger_rpc_url: Option<String>,

    #[serde(default)]
    pub ledger_owner_private_key: Option<String>,

    #[serde(default)]
    pub ledger_contract_address: Option<String>,

    /// Whole tokens rewarded per persisted event
    #[serde(default = "default_ledger_reward_per_message")]
    pub ledger_reward_per_message: u64,

    #[serde(default = "default_ledger_token_decimals")]
    pub ledger_token_decimals: u32,

    #[serde(default = "default_ledger_call_timeout_secs")]
    pub ledger_call_timeout_secs: u64,

    /// Comma separated `sensorId=address` pairs
    #[serde(default)]
    pub sensor_wallets: String,

    /// Seconds between dashboard/balance reports (0 disables the reporter)
    #[serde(default = "default_dashboard_report_interval_secs")]
    pub dashboard_report_interval_secs: u64,

    // OpenTelemetry configuration
    #[serde(default = "default_otel_enabled")]
    pub otel_enabled: bool,

    #[serde(default = "default_otel_endpoint")]
    pub otel_endpoint: String,

    #[serde(default = "default_otel_service_name")]
    pub otel_service_name: String,

    /// Upper bound for closers on shutdown
    #[serde(default = "default_shutdown_timeout_secs")]
    pub shutdown_timeout_secs: u64,
}

// Keeps the owner key and the ClickHouse password out of logs
impl fmt::Debug for ServiceConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceConfig")
            .field("log_level", &self.log_level)
            .field("log_format", &self.log_format)
            .field("mqtt_host", &self.mqtt_host)
            .field("mqtt_port", &self.mqtt_port)
            .field("mqtt_client_id", &self.mqtt_client_id)
            .field("mqtt_topic_filter", &self.mqtt_topic_filter)
            .field("store_backend", &self.store_backend)
            .field("clickhouse_url", &self.clickhouse_url)
            .field("clickhouse_database", &self.clickhouse_database)
            .field("clickhouse_table", &self.clickhouse_table)
            .field("ledger_rpc_url", &self.ledger_rpc_url)
            .field("ledger_contract_address", &self.ledger_contract_address)
            .field(
                "ledger_owner_private_key",
                &self.ledger_owner_private_key.as_ref().map(|_| "<redacted>"),
            )
            .field("ledger_reward_per_message", &self.ledger_reward_per_message)
            .field("ledger_token_decimals", &self.ledger_token_decimals)
            .field("sensor_wallets", &self.sensor_wallets)
            .field("otel_enabled", &self.otel_enabled)
            .finish_non_exhaustive()
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "json".to_string()
}

// MQTT defaults
fn default_mqtt_host() -> String {
    "localhost".to_string()
}

fn default_mqtt_port() -> u16 {
    1883
}

fn default_mqtt_client_id() -> String {
    "sensor-ledger-ingestion".to_string()
}

fn default_mqtt_topic_filter() -> String {
    "sensors/#".to_string()
}

fn default_mqtt_keep_alive_secs() -> u64 {
    30
}

fn default_mqtt_retry_delay_secs() -> u64 {
    5
}

fn default_mqtt_max_retry_attempts() -> u32 {
    10
}

// Storage defaults
fn default_store_backend() -> String {
    "clickhouse".to_string()
}

fn default_clickhouse_url() -> String {
    "http://localhost:8123".to_string()
}

fn default_clickhouse_database() -> String {
    "sensor_ledger".to_string()
}

fn default_clickhouse_username() -> String {
    "default".to_string()
}

fn default_clickhouse_password() -> String {
    String::new()
}

fn default_clickhouse_table() -> String {
    "telemetry_events".to_string()
}

// Ledger defaults
fn default_ledger_reward_per_message() -> u64 {
    1
}

fn default_ledger_token_decimals() -> u32 {
    18
}

fn default_ledger_call_timeout_secs() -> u64 {
    15
}

fn default_dashboard_report_interval_secs() -> u64 {
    60
}

// OpenTelemetry defaults
fn default_otel_enabled() -> bool {
    false
}

fn default_otel_endpoint() -> String {
    "http://localhost:4317".to_string()
}

fn default_otel_service_name() -> String {
    "sensor-ledger".to_string()
}

fn default_shutdown_timeout_secs() -> u64 {
    10
}

impl ServiceConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Config::builder()
            .add_source(Environment::with_prefix("SENSOR_LEDGER"))
            .build()?
            .try_deserialize()
    }

    pub fn store_backend(&self) -> Result<StoreBackend, ConfigError> {
        match self.store_backend.trim().to_ascii_lowercase().as_str() {
            "clickhouse" => Ok(StoreBackend::ClickHouse),
            "memory" | "in_memory" => Ok(StoreBackend::Memory),
            other => Err(ConfigError::Message(format!(
                "unknown store backend: {other}"
            ))),
        }
    }

    pub fn telemetry_config(&self) -> Result<TelemetryConfig, ConfigError> {
        Ok(TelemetryConfig {
            service_name: self.otel_service_name.clone(),
            otel_endpoint: self.otel_endpoint.clone(),
            otel_enabled: self.otel_enabled,
            log_level: self.log_level.clone(),
            log_format: self
                .log_format
                .parse::<LogFormat>()
                .map_err(ConfigError::Message)?,
        })
    }

    pub fn clickhouse_config(&self) -> ClickHouseConfig {
        ClickHouseConfig {
            url: self.clickhouse_url.clone(),
            database: self.clickhouse_database.clone(),
            username: self.clickhouse_username.clone(),
            password: self.clickhouse_password.clone(),
        }
    }

    pub fn mqtt_subscriber_config(&self) -> MqttSubscriberConfig {
        MqttSubscriberConfig {
            host: self.mqtt_host.clone(),
            port: self.mqtt_port,
            client_id: self.mqtt_client_id.clone(),
            topic_filter: self.mqtt_topic_filter.clone(),
            keep_alive: Duration::from_secs(self.mqtt_keep_alive_secs),
            retry_delay: Duration::from_secs(self.mqtt_retry_delay_secs),
            max_retry_attempts: self.mqtt_max_retry_attempts,
        }
    }

    pub fn settlement_config(&self) -> SettlementConfig {
        SettlementConfig {
            rpc_url: self.ledger_rpc_url.clone(),
            owner_private_key: self.ledger_owner_private_key.clone(),
            contract_address: self.ledger_contract_address.clone(),
            reward_per_message: self.ledger_reward_per_message,
            token_decimals: self.ledger_token_decimals,
            call_timeout_secs: self.ledger_call_timeout_secs,
        }
    }
}
