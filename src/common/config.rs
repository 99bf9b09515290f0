//! Environment-driven configuration. Call after `bootstrap::init_env`.

use std::{env, str::FromStr};

use anyhow::{Context, Result, bail};
use rust_decimal::Decimal;

use crate::engine::PricingPolicy;

const DEV_JWT_SECRET: &str = "agriconnect-development-secret-do-not-use-in-production";
const MIN_JWT_SECRET_LEN: usize = 32;

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

#[derive(Debug, Clone)]
pub struct AuthConfig {
    pub jwt_secret: String,
    pub token_ttl_hours: i64,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub server: ServerConfig,
    /// `None` runs the service on the in-memory store.
    pub database: Option<DatabaseConfig>,
    pub auth: AuthConfig,
    pub pricing: PricingPolicy,
}

fn var(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_or<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match var(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|e| anyhow::anyhow!("Invalid {key} '{raw}': {e}")),
        None => Ok(default),
    }
}

fn jwt_secret() -> Result<String> {
    match var("JWT_SECRET") {
        Some(secret) if secret.len() >= MIN_JWT_SECRET_LEN => Ok(secret),
        Some(_) => bail!("JWT_SECRET must be at least {MIN_JWT_SECRET_LEN} characters"),
        None if cfg!(debug_assertions) => {
            tracing::warn!("JWT_SECRET is not set, using the development secret");
            Ok(DEV_JWT_SECRET.to_owned())
        }
        None => bail!("JWT_SECRET must be set"),
    }
}

pub fn load() -> Result<Config> {
    let defaults = PricingPolicy::default();

    let database = match var("DATABASE_URL") {
        Some(url) => Some(DatabaseConfig {
            url,
            max_connections: parse_or("DATABASE_MAX_CONNECTIONS", 10)?,
        }),
        None => None,
    };

    let tax_rate: Decimal = parse_or("ORDER_TAX_RATE", defaults.tax_rate)?;
    if tax_rate.is_sign_negative() || tax_rate >= Decimal::ONE {
        bail!("ORDER_TAX_RATE must be in [0, 1), got {tax_rate}");
    }
    let delivery_fee: Decimal = parse_or("ORDER_DELIVERY_FEE", defaults.delivery_fee)?;
    if delivery_fee.is_sign_negative() {
        bail!("ORDER_DELIVERY_FEE cannot be negative, got {delivery_fee}");
    }

    Ok(Config {
        server: ServerConfig {
            host: var("HOST").unwrap_or_else(|| "0.0.0.0".to_owned()),
            port: parse_or("PORT", 5000)?,
        },
        database,
        auth: AuthConfig {
            jwt_secret: jwt_secret().context("Invalid auth configuration")?,
            token_ttl_hours: parse_or("JWT_EXPIRE_HOURS", 168)?,
        },
        pricing: PricingPolicy {
            delivery_fee,
            tax_rate,
            currency: var("ORDER_CURRENCY").unwrap_or(defaults.currency),
        },
    })
}
