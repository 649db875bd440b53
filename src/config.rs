//! Environment-driven configuration.

use chrono::Duration;
use std::env;
use std::str::FromStr;
use thiserror::Error;

const DEFAULT_PORT: u16 = 8083;
const DEFAULT_MAX_CONNECTIONS: u32 = 10;
const DEFAULT_GUEST_CART_TTL_DAYS: i64 = 30;
const DEFAULT_CART_SWEEP_INTERVAL_SECS: u64 = 3600;

/// When a card order's cart is emptied.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, strum::EnumString, strum::Display)]
#[strum(serialize_all = "snake_case")]
pub enum CartClearPolicy {
    /// Every checkout clears the cart as part of the order transaction.
    #[default]
    Placement,
    /// Card orders keep the cart until the provider confirms payment.
    Payment,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

#[derive(Clone, Debug)]
pub struct Config {
    pub database_url: Option<String>,
    pub database_max_connections: u32,
    pub nats_url: Option<String>,
    pub port: u16,
    pub payment_webhook_secret: String,
    pub cart_clear_policy: CartClearPolicy,
    pub guest_cart_ttl: Duration,
    pub cart_sweep_interval_secs: u64,
    pub log_format: LogFormat,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable {0}")]
    Missing(&'static str),
    #[error("invalid value for {name}: {value:?}")]
    Invalid { name: &'static str, value: String },
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        let guest_cart_ttl_days: i64 = parsed("GUEST_CART_TTL_DAYS", DEFAULT_GUEST_CART_TTL_DAYS)?;
        if guest_cart_ttl_days <= 0 {
            return Err(ConfigError::Invalid { name: "GUEST_CART_TTL_DAYS", value: guest_cart_ttl_days.to_string() });
        }
        let payment_webhook_secret = optional("PAYMENT_WEBHOOK_SECRET").ok_or(ConfigError::Missing("PAYMENT_WEBHOOK_SECRET"))?;
        let log_format = match optional("LOG_FORMAT").as_deref() {
            None | Some("pretty") | Some("text") => LogFormat::Pretty,
            Some("json") => LogFormat::Json,
            Some(other) => return Err(ConfigError::Invalid { name: "LOG_FORMAT", value: other.to_string() }),
        };
        Ok(Self {
            database_url: optional("DATABASE_URL"),
            database_max_connections: parsed("DATABASE_MAX_CONNECTIONS", DEFAULT_MAX_CONNECTIONS)?,
            nats_url: optional("NATS_URL"),
            port: parsed("PORT", DEFAULT_PORT)?,
            payment_webhook_secret,
            cart_clear_policy: parsed("CART_CLEAR_POLICY", CartClearPolicy::default())?,
            guest_cart_ttl: Duration::days(guest_cart_ttl_days),
            cart_sweep_interval_secs: parsed("CART_SWEEP_INTERVAL_SECS", DEFAULT_CART_SWEEP_INTERVAL_SECS)?,
            log_format,
        })
    }
}

fn optional(name: &str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn parsed<T: FromStr>(name: &'static str, default: T) -> Result<T, ConfigError> {
    match optional(name) {
        None => Ok(default),
        Some(value) => value.trim().parse().map_err(|_| ConfigError::Invalid { name, value }),
    }
}
