use serde::Deserialize;
use std::env;
use std::fmt::Display;
use std::fs;
use std::path::Path;
use std::str::FromStr;

#[derive(Deserialize, Debug, Clone)]
pub struct ServerConfig {
    pub database_url: String,

    pub router_url: String,
    #[serde(default)]
    pub router_username: String,
    #[serde(default)]
    pub router_password: String,
    #[serde(default = "default_router_timeout_secs")]
    pub router_timeout_secs: u64,

    #[serde(default = "default_sync_interval_secs")]
    pub sync_interval_secs: u64,
    #[serde(default = "default_push_workers")]
    pub push_workers: usize,

    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,
    #[serde(default = "default_log_dir")]
    pub log_dir: String,

    #[serde(default = "default_gateway_url")]
    pub gateway_url: String,
    #[serde(default)]
    pub gateway_secret_key: String,
    #[serde(default = "default_currency")]
    pub currency: String,
}

// Partial config for layering
#[derive(Deserialize, Default, Debug)]
struct PartialServerConfig {
    database_url: Option<String>,
    router_url: Option<String>,
    router_username: Option<String>,
    router_password: Option<String>,
    router_timeout_secs: Option<u64>,
    sync_interval_secs: Option<u64>,
    push_workers: Option<usize>,
    listen_addr: Option<String>,
    log_dir: Option<String>,
    gateway_url: Option<String>,
    gateway_secret_key: Option<String>,
    currency: Option<String>,
}

fn env_var(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn env_parse<T>(key: &str) -> Result<Option<T>, String>
where
    T: FromStr,
    T::Err: Display,
{
    env_var(key)
        .map(|value| value.trim().parse::<T>().map_err(|e| format!("Invalid {key} '{value}': {e}")))
        .transpose()
}

impl PartialServerConfig {
    fn from_env() -> Result<Self, String> {
        Ok(Self {
            database_url: env_var("DATABASE_URL"),
            router_url: env_var("ROUTER_URL"),
            router_username: env_var("ROUTER_USERNAME"),
            router_password: env_var("ROUTER_PASSWORD"),
            router_timeout_secs: env_parse("ROUTER_TIMEOUT_SECS")?,
            sync_interval_secs: env_parse("SYNC_INTERVAL_SECS")?,
            push_workers: env_parse("PUSH_WORKERS")?,
            listen_addr: env_var("LISTEN_ADDR"),
            log_dir: env_var("LOG_DIR"),
            gateway_url: env_var("GATEWAY_URL"),
            gateway_secret_key: env_var("GATEWAY_SECRET_KEY"),
            currency: env_var("CURRENCY"),
        })
    }
}

fn default_router_timeout_secs() -> u64 {
    10
}

fn default_sync_interval_secs() -> u64 {
    30
}

fn default_push_workers() -> usize {
    4
}

fn default_listen_addr() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_log_dir() -> String {
    "logs".to_string()
}

fn default_gateway_url() -> String {
    "https://api.paystack.co".to_string()
}

fn default_currency() -> String {
    "GHS".to_string()
}

impl ServerConfig {
    pub fn load(config_path: Option<&str>) -> Result<Self, String> {
        dotenv::dotenv().ok();

        // 1. Load from file (optional)
        let file_config: PartialServerConfig = match config_path {
            Some(path_str) => {
                let path = Path::new(path_str);
                if path.exists() {
                    let contents = fs::read_to_string(path)
                        .map_err(|e| format!("Failed to read config file at {path:?}: {e}"))?;
                    toml::from_str(&contents)
                        .map_err(|e| format!("Failed to parse TOML from config file at {path:?}: {e}"))?
                } else {
                    PartialServerConfig::default()
                }
            }
            None => PartialServerConfig::default(),
        };

        // 2. Load from environment variables
        let env_config = PartialServerConfig::from_env()?;

        // 3. Merge: environment overrides file
        Self::merge(env_config, file_config)
    }

    fn merge(env: PartialServerConfig, file: PartialServerConfig) -> Result<Self, String> {
        let config = ServerConfig {
            database_url: env.database_url.or(file.database_url)
                .ok_or("DATABASE_URL is required")?,
            router_url: env.router_url.or(file.router_url)
                .ok_or("ROUTER_URL is required")?,
            router_username: env.router_username.or(file.router_username)
                .unwrap_or_default(),
            router_password: env.router_password.or(file.router_password)
                .unwrap_or_default(),
            router_timeout_secs: env.router_timeout_secs.or(file.router_timeout_secs)
                .unwrap_or_else(default_router_timeout_secs),
            sync_interval_secs: env.sync_interval_secs.or(file.sync_interval_secs)
                .unwrap_or_else(default_sync_interval_secs),
            push_workers: env.push_workers.or(file.push_workers)
                .unwrap_or_else(default_push_workers),
            listen_addr: env.listen_addr.or(file.listen_addr)
                .unwrap_or_else(default_listen_addr),
            log_dir: env.log_dir.or(file.log_dir)
                .unwrap_or_else(default_log_dir),
            gateway_url: env.gateway_url.or(file.gateway_url)
                .unwrap_or_else(default_gateway_url),
            gateway_secret_key: env.gateway_secret_key.or(file.gateway_secret_key)
                .unwrap_or_default(),
            currency: env.currency.or(file.currency)
                .unwrap_or_else(default_currency),
        };

        if config.sync_interval_secs == 0 {
            return Err("SYNC_INTERVAL_SECS must be greater than zero".to_string());
        }
        if config.router_timeout_secs == 0 {
            return Err("ROUTER_TIMEOUT_SECS must be greater than zero".to_string());
        }
        Ok(config)
    }
}
