use std::net::SocketAddr;
use std::time::Duration;

use clap::parser::ValueSource;
use clap::{ArgMatches, CommandFactory, FromArgMatches, Parser, ValueEnum};
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::registry::{ReconnectPolicy, DEFAULT_KEY_PREFIX};

/// Where the session registry keeps its sets.
#[derive(ValueEnum, Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RegistryBackend {
    /// Shared Redis instance reachable by every server process
    Redis,
    /// Process-local map; only correct for a single server process
    Memory,
}

/// Realtime delivery server
#[derive(Parser, Serialize, Deserialize, Clone, Debug)]
#[command(name = "relay-server", version, about = "Realtime delivery server")]
pub struct Config {
    /// WebSocket port
    #[arg(long, env = "RELAY_WS_PORT", default_value = "4000")]
    pub ws_port: u16,

    /// Bind address for the WebSocket listener
    #[arg(long, env = "RELAY_BIND_ADDRESS", default_value = "0.0.0.0")]
    pub bind_address: String,

    /// Bind address for the gRPC delivery ingress
    #[arg(long, env = "RELAY_GRPC_BIND", default_value = "0.0.0.0:50051")]
    pub grpc_bind: String,

    /// URL of the authentication gRPC service
    #[arg(long, env = "RELAY_AUTH_GRPC_URL", default_value = "http://127.0.0.1:50052")]
    pub auth_grpc_url: String,

    /// Upper bound on one session validation call, in milliseconds
    #[arg(long, env = "RELAY_AUTH_TIMEOUT_MS", default_value = "5000")]
    pub auth_timeout_ms: u64,

    /// Registry backing store
    #[arg(long, env = "RELAY_REGISTRY_BACKEND", value_enum, default_value = "redis")]
    pub registry_backend: RegistryBackend,

    /// Prefix of every registry key (keys are `<prefix>_<identity>`)
    #[arg(long, env = "RELAY_REGISTRY_KEY_PREFIX", default_value = DEFAULT_KEY_PREFIX)]
    pub registry_key_prefix: String,

    #[arg(long, env = "RELAY_REDIS_HOST", default_value = "127.0.0.1")]
    pub redis_host: String,

    #[arg(long, env = "RELAY_REDIS_PORT", default_value = "6379")]
    pub redis_port: u16,

    #[arg(long, env = "RELAY_REDIS_PASSWORD")]
    pub redis_password: Option<String>,

    /// Upper bound on one backing-store call, in milliseconds
    #[arg(long, env = "RELAY_STORE_TIMEOUT_MS", default_value = "3000")]
    pub store_timeout_ms: u64,

    /// Connection attempts before losing the store becomes fatal
    #[arg(long, env = "RELAY_RECONNECT_MAX_ATTEMPTS", default_value = "10")]
    pub reconnect_max_attempts: u32,

    /// Delay between store connection attempts, in milliseconds
    #[arg(long, env = "RELAY_RECONNECT_DELAY_MS", default_value = "1000")]
    pub reconnect_delay_ms: u64,

    /// Interval between store health checks, in milliseconds
    #[arg(long, env = "RELAY_HEALTH_CHECK_INTERVAL_MS", default_value = "5000")]
    pub health_check_interval_ms: u64,

    /// Clear the registry namespace during a controlled shutdown
    #[arg(
        long,
        env = "RELAY_CLEAR_REGISTRY_ON_SHUTDOWN",
        default_value_t = true,
        action = clap::ArgAction::Set
    )]
    pub clear_registry_on_shutdown: bool,

    /// Path to TOML config file
    #[arg(long, default_value = "./relay.toml")]
    pub config: String,

    /// Enable structured JSON logging (for Docker/production)
    #[arg(long, env = "RELAY_JSON_LOGS")]
    pub json_logs: bool,

    /// Output a commented TOML config template and exit
    #[arg(long)]
    pub generate_config: bool,

    /// Delete every registry key, print how many were removed, and exit
    #[arg(long)]
    pub clear_registry: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            ws_port: 4000,
            bind_address: "0.0.0.0".to_string(),
            grpc_bind: "0.0.0.0:50051".to_string(),
            auth_grpc_url: "http://127.0.0.1:50052".to_string(),
            auth_timeout_ms: 5000,
            registry_backend: RegistryBackend::Redis,
            registry_key_prefix: DEFAULT_KEY_PREFIX.to_string(),
            redis_host: "127.0.0.1".to_string(),
            redis_port: 6379,
            redis_password: None,
            store_timeout_ms: 3000,
            reconnect_max_attempts: 10,
            reconnect_delay_ms: 1000,
            health_check_interval_ms: 5000,
            clear_registry_on_shutdown: true,
            config: "./relay.toml".to_string(),
            json_logs: false,
            generate_config: false,
            clear_registry: false,
        }
    }
}

impl Config {
    /// Load config with layered precedence:
    /// built-in defaults < TOML file < env vars (RELAY_*) < CLI args
    pub fn load() -> Result<Self, figment::Error> {
        Self::from_matches(&Self::command().get_matches())
    }

    fn from_matches(matches: &ArgMatches) -> Result<Self, figment::Error> {
        let cli = Self::from_arg_matches(matches).unwrap_or_else(|e| e.exit());
        let overrides = command_line_overrides(matches, &cli);
        Self::figment(&cli.config, overrides).extract()
    }

    fn figment(config_path: &str, overrides: Map<String, Value>) -> Figment {
        Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Toml::file(config_path))
            .merge(Env::prefixed("RELAY_"))
            .merge(Serialized::defaults(overrides))
    }

    pub fn ws_addr(&self) -> String {
        format!("{}:{}", self.bind_address, self.ws_port)
    }

    pub fn grpc_addr(&self) -> Result<SocketAddr, std::net::AddrParseError> {
        self.grpc_bind.parse()
    }

    pub fn auth_timeout(&self) -> Duration {
        Duration::from_millis(self.auth_timeout_ms)
    }

    pub fn store_timeout(&self) -> Duration {
        Duration::from_millis(self.store_timeout_ms)
    }

    pub fn reconnect_policy(&self) -> ReconnectPolicy {
        ReconnectPolicy {
            max_attempts: self.reconnect_max_attempts.max(1),
            delay: Duration::from_millis(self.reconnect_delay_ms),
            health_check_interval: Duration::from_millis(self.health_check_interval_ms),
        }
    }
}

/// Only flags typed on the command line. Clap fills every other field with its
/// default (or an env value), and those must not mask the TOML layer.
fn command_line_overrides(matches: &ArgMatches, cli: &Config) -> Map<String, Value> {
    let Ok(Value::Object(fields)) = serde_json::to_value(cli) else {
        return Map::new();
    };
    fields
        .into_iter()
        .filter(|(id, _)| matches.value_source(id) == Some(ValueSource::CommandLine))
        .collect()
}

/// Generate a commented TOML config template
pub fn generate_config_template() -> String {
    r#"# Realtime delivery server configuration
# Place this file at ./relay.toml or specify with --config <path>
# All settings can be overridden via environment variables (RELAY_WS_PORT, etc.)
# or CLI flags (--ws-port, etc.)

# WebSocket listener (clients connect to ws://<host>:<port>/ws)
# ws_port = 4000
# bind_address = "0.0.0.0"

# gRPC delivery ingress (DeliverNotification / DeliverMessage)
# grpc_bind = "0.0.0.0:50051"

# Authentication service consulted once per connection attempt
# auth_grpc_url = "http://127.0.0.1:50052"
# auth_timeout_ms = 5000

# ---- Session registry ----
# "redis" is required when more than one server process runs.
# "memory" keeps the registry inside this process.
# registry_backend = "redis"
# registry_key_prefix = "wsid"

# redis_host = "127.0.0.1"
# redis_port = 6379
# redis_password = ""

# Bound on every store call
# store_timeout_ms = 3000

# The server exits after this many failed reconnect attempts
# reconnect_max_attempts = 10
# reconnect_delay_ms = 1000
# health_check_interval_ms = 5000

# Delete every registry key on a controlled shutdown
# clear_registry_on_shutdown = true

# Enable structured JSON logging for Docker/production
# json_logs = false
"#
    .to_string()
}
