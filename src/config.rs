use anyhow::{anyhow, Context, Result};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use crate::database::PoolConfig;
use crate::ledger::RetryPolicy;
use crate::payments::callback::AuthenticatorConfig;
use crate::payments::network::{AllowList, DEFAULT_GATEWAY_NETWORKS};
use crate::payments::providers::TBankConfig;
use crate::payments::types::PaymentStatus;

#[derive(Debug, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub gateway: GatewayConfig,
    pub ledger: LedgerConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub environment: String,
}

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub connect_timeout_secs: u64,
    pub run_migrations: bool,
}

#[derive(Clone)]
pub struct GatewayConfig {
    pub terminal_key: String,
    pub password: String,
    pub api_url: String,
    pub public_base_url: String,
    pub success_statuses: Vec<String>,
    pub allowed_networks: Vec<String>,
    pub trusted_proxies: Vec<String>,
    pub require_terminal_key: bool,
    pub require_token: bool,
    pub timeout_secs: u64,
}

#[derive(Debug, Clone)]
pub struct LedgerConfig {
    pub max_attempts: u32,
    pub retry_base_ms: u64,
    pub attempt_timeout_secs: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Clone)]
pub struct LoggingConfig {
    pub format: LogFormat,
}

impl fmt::Debug for GatewayConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GatewayConfig")
            .field("terminal_key", &self.terminal_key)
            .field("password", &"***")
            .field("api_url", &self.api_url)
            .field("public_base_url", &self.public_base_url)
            .field("success_statuses", &self.success_statuses)
            .field("allowed_networks", &self.allowed_networks)
            .field("trusted_proxies", &self.trusted_proxies)
            .field("require_terminal_key", &self.require_terminal_key)
            .field("require_token", &self.require_token)
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

fn parse_bool(name: &str, raw: &str) -> Result<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(anyhow!("{} must be a boolean, got {}", name, other)),
    }
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build the configuration from an arbitrary variable source
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |name: &str| lookup(name).with_context(|| format!("{} not set", name));
        let number = |name: &str, default: &str| -> Result<u64> {
            lookup(name)
                .unwrap_or_else(|| default.to_string())
                .trim()
                .parse()
                .with_context(|| format!("{} must be a valid number", name))
        };
        let flag = |name: &str| -> Result<bool> {
            lookup(name).map_or(Ok(false), |raw| parse_bool(name, &raw))
        };

        let server = ServerConfig {
            host: lookup("HOST").unwrap_or_else(|| "0.0.0.0".to_string()),
            port: parse_num("PORT", &lookup("PORT").unwrap_or_else(|| "8080".to_string()))?,
            environment: lookup("ENVIRONMENT").unwrap_or_else(|| "development".to_string()),
        };

        let database = DatabaseConfig {
            url: required("DATABASE_URL")?,
            max_connections: parse_num(
                "DATABASE_MAX_CONNECTIONS",
                &lookup("DATABASE_MAX_CONNECTIONS").unwrap_or_else(|| "10".to_string()),
            )?,
            connect_timeout_secs: number("DATABASE_CONNECT_TIMEOUT_SECS", "5")?,
            run_migrations: flag("DATABASE_RUN_MIGRATIONS")?,
        };

        let gateway = GatewayConfig {
            terminal_key: required("TBANK_TERMINAL_KEY")?,
            password: required("TBANK_PASSWORD")?,
            api_url: lookup("TBANK_API_URL")
                .unwrap_or_else(|| "https://securepay.tinkoff.ru/v2".to_string()),
            public_base_url: lookup("PUBLIC_BASE_URL")
                .or_else(|| lookup("SUCCESS_URL"))
                .context("PUBLIC_BASE_URL not set")?,
            success_statuses: split_list(
                &lookup("TBANK_SUCCESS_STATUSES").unwrap_or_else(|| "CONFIRMED".to_string()),
            ),
            allowed_networks: match lookup("GATEWAY_ALLOWED_NETWORKS") {
                Some(raw) => split_list(&raw),
                None => DEFAULT_GATEWAY_NETWORKS.iter().map(|s| s.to_string()).collect(),
            },
            trusted_proxies: split_list(&lookup("TRUSTED_PROXIES").unwrap_or_default()),
            require_terminal_key: flag("TBANK_REQUIRE_TERMINAL_KEY")?,
            require_token: flag("TBANK_REQUIRE_TOKEN")?,
            timeout_secs: number("TBANK_TIMEOUT_SECS", "30")?,
        };

        let ledger = LedgerConfig {
            max_attempts: parse_num(
                "LEDGER_MAX_ATTEMPTS",
                &lookup("LEDGER_MAX_ATTEMPTS").unwrap_or_else(|| "3".to_string()),
            )?,
            retry_base_ms: number("LEDGER_RETRY_BASE_MS", "1000")?,
            attempt_timeout_secs: number("LEDGER_ATTEMPT_TIMEOUT_SECS", "10")?,
        };

        let logging = LoggingConfig {
            format: match lookup("LOG_FORMAT").as_deref().map(str::trim) {
                Some("json") => LogFormat::Json,
                Some("text") | None => LogFormat::Text,
                Some(other) => return Err(anyhow!("LOG_FORMAT must be 'text' or 'json', got {}", other)),
            },
        };

        let config = Config {
            server,
            database,
            gateway,
            ledger,
            logging,
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        // Validate port range
        if self.server.port < 1024 {
            return Err(anyhow!(
                "Port must be at least 1024, got {}",
                self.server.port
            ));
        }

        let valid_environments = ["development", "staging", "production"];
        if !valid_environments.contains(&self.server.environment.as_str()) {
            return Err(anyhow!(
                "Environment must be one of: {:?}, got {}",
                valid_environments,
                self.server.environment
            ));
        }

        if self.database.url.trim().is_empty() {
            return Err(anyhow!("DATABASE_URL cannot be empty"));
        }

        if self.database.max_connections == 0 {
            return Err(anyhow!("DATABASE_MAX_CONNECTIONS must be greater than 0"));
        }

        if self.gateway.terminal_key.trim().is_empty() {
            return Err(anyhow!("TBANK_TERMINAL_KEY cannot be empty"));
        }

        if self.gateway.password.is_empty() {
            return Err(anyhow!("TBANK_PASSWORD cannot be empty"));
        }

        if !self.gateway.public_base_url.starts_with("http://")
            && !self.gateway.public_base_url.starts_with("https://")
        {
            return Err(anyhow!(
                "PUBLIC_BASE_URL must be an http(s) URL, got {}",
                self.gateway.public_base_url
            ));
        }

        if self.gateway.success_statuses.is_empty() {
            return Err(anyhow!("TBANK_SUCCESS_STATUSES must contain at least one status"));
        }

        if self.gateway.allowed_networks.is_empty() {
            return Err(anyhow!("GATEWAY_ALLOWED_NETWORKS must contain at least one range"));
        }
        AllowList::parse(self.gateway.allowed_networks.iter().map(String::as_str))
            .context("GATEWAY_ALLOWED_NETWORKS is invalid")?;
        AllowList::parse(self.gateway.trusted_proxies.iter().map(String::as_str))
            .context("TRUSTED_PROXIES is invalid")?;

        if self.ledger.max_attempts == 0 {
            return Err(anyhow!("LEDGER_MAX_ATTEMPTS must be greater than 0"));
        }

        if self.ledger.attempt_timeout_secs == 0 {
            return Err(anyhow!("LEDGER_ATTEMPT_TIMEOUT_SECS must be greater than 0"));
        }

        Ok(())
    }
}

fn parse_num<T>(name: &str, raw: &str) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    raw.trim()
        .parse()
        .with_context(|| format!("{} must be a valid number", name))
}

impl DatabaseConfig {
    pub fn pool_config(&self) -> PoolConfig {
        PoolConfig {
            max_connections: self.max_connections,
            min_connections: self.max_connections.min(1),
            connection_timeout: Duration::from_secs(self.connect_timeout_secs),
            ..PoolConfig::default()
        }
    }
}

impl GatewayConfig {
    pub fn tbank_config(&self) -> TBankConfig {
        TBankConfig {
            terminal_key: self.terminal_key.clone(),
            password: self.password.clone(),
            api_url: self.api_url.clone(),
            public_base_url: self.public_base_url.clone(),
            timeout_secs: self.timeout_secs,
        }
    }

    pub fn authenticator_config(&self) -> Result<AuthenticatorConfig> {
        let allowed_networks = AllowList::parse(self.allowed_networks.iter().map(String::as_str))
            .context("GATEWAY_ALLOWED_NETWORKS is invalid")?;
        let trusted_proxies = AllowList::parse(self.trusted_proxies.iter().map(String::as_str))
            .context("TRUSTED_PROXIES is invalid")?;

        Ok(AuthenticatorConfig {
            terminal_key: self.terminal_key.clone(),
            password: self.password.clone(),
            allowed_networks,
            trusted_proxies,
            success_statuses: self
                .success_statuses
                .iter()
                .map(|s| PaymentStatus::parse(s))
                .collect(),
            require_terminal_key: self.require_terminal_key,
            require_token: self.require_token,
        })
    }
}

impl LedgerConfig {
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.max_attempts, Duration::from_millis(self.retry_base_ms))
    }

    pub fn attempt_timeout(&self) -> Duration {
        Duration::from_secs(self.attempt_timeout_secs)
    }
}
