use clap::Parser;
use std::collections::HashSet;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq)]
pub enum BrokerBackend {
    Redis,
    Memory,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RedisConfig {
    pub host: String,
    pub port: u16,
    pub db: i64,
}

impl RedisConfig {
    pub fn url(&self) -> String {
        format!("redis://{}:{}/{}", self.host, self.port, self.db)
    }
}

pub struct Config {
    pub host: String,
    pub port: u16,
    pub broker: BrokerBackend,
    pub redis: RedisConfig,
    pub allowed_origins: HashSet<String>,
    /// `Some` switches delivery from push to poll-and-sleep.
    pub poll_interval: Option<Duration>,
}

impl Config {
    pub fn from_env() -> Self {
        let broker = match std::env::var("RELAY_BROKER")
            .unwrap_or_else(|_| "redis".to_string())
            .to_lowercase()
            .as_str()
        {
            "memory" => BrokerBackend::Memory,
            _ => BrokerBackend::Redis,
        };

        let redis = RedisConfig {
            host: std::env::var("REDIS_HOST").unwrap_or_else(|_| "localhost".to_string()),
            port: std::env::var("REDIS_PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(6379),
            db: std::env::var("REDIS_DB")
                .ok()
                .and_then(|d| d.parse().ok())
                .unwrap_or(0),
        };

        let mut allowed_origins: HashSet<String> = std::env::var("RELAY_ALLOWED_ORIGINS")
            .unwrap_or_default()
            .split(',')
            .map(str::trim)
            .filter(|host| !host.is_empty())
            .map(str::to_string)
            .collect();
        if allowed_origins.is_empty() {
            allowed_origins.insert("localhost".to_string());
        }

        let poll_interval = std::env::var("RELAY_POLL_INTERVAL_MS")
            .ok()
            .and_then(|ms| ms.parse::<u64>().ok())
            .filter(|ms| *ms > 0)
            .map(Duration::from_millis);

        Self {
            host: std::env::var("HOST").unwrap_or_else(|_| "127.0.0.1".to_string()),
            port: std::env::var("PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(8888),
            broker,
            redis,
            allowed_origins,
            poll_interval,
        }
    }

    /// Command-line flags win over the environment.
    pub fn apply_cli(mut self, cli: &Cli) -> Self {
        if let Some(host) = &cli.host {
            self.host = host.clone();
        }
        if let Some(port) = cli.port {
            self.port = port;
        }
        self
    }
}

#[derive(Debug, Parser)]
#[command(name = "fanrelay", version, about = "WebSocket fan-out relay over a pub/sub broker")]
pub struct Cli {
    /// Ip address to listen on
    #[arg(long)]
    pub host: Option<String>,
    /// Tcp port
    #[arg(long)]
    pub port: Option<u16>,
}
