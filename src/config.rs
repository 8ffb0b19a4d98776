use std::{net::SocketAddr, str::FromStr, time::Duration};

use anyhow::{Context, Result};

const DEFAULT_BIND_ADDRESS: &str = "0.0.0.0:8800";
const DEFAULT_TOKEN_MINUTES: i64 = 90 * 24 * 60;
const DEFAULT_POOL_SIZE: u32 = 20;
const DEFAULT_POOL_RECYCLE_SECS: u64 = 1800;
const DEFAULT_CORS_ORIGINS: &str = "http://localhost:5173";

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub jwt_secret: String,
    pub token_lifetime: time::Duration,
    pub bind_address: SocketAddr,
    pub pool_size: u32,
    pub pool_recycle: Duration,
    pub cors_origins: Vec<String>,
}

impl Config {
    /// Reads settings from the process environment. Call `dotenvy::dotenv()`
    /// first if a `.env` file should be honoured.
    pub fn from_env() -> Result<Self> {
        let database_url = std::env::var("DATABASE_URL").context("DATABASE_URL must be set")?;
        let jwt_secret = std::env::var("JWT_SECRET").context("JWT_SECRET must be set")?;
        let token_minutes = parse_var("ACCESS_TOKEN_EXPIRE_MINUTES", DEFAULT_TOKEN_MINUTES)?;
        let bind_address = parse_var(
            "BIND_ADDRESS",
            SocketAddr::from_str(DEFAULT_BIND_ADDRESS).context("bad default bind address")?,
        )?;
        let pool_size = parse_var("DB_POOL_SIZE", DEFAULT_POOL_SIZE)?;
        let pool_recycle = parse_var("DB_POOL_RECYCLE_SECS", DEFAULT_POOL_RECYCLE_SECS)?;
        let cors_origins = std::env::var("CORS_ORIGINS")
            .unwrap_or_else(|_| DEFAULT_CORS_ORIGINS.to_owned());

        Ok(Config {
            database_url,
            jwt_secret,
            token_lifetime: time::Duration::minutes(token_minutes),
            bind_address,
            pool_size: pool_size.max(1),
            pool_recycle: Duration::from_secs(pool_recycle),
            cors_origins: split_origins(&cors_origins),
        })
    }
}

fn parse_var<T>(name: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match std::env::var(name) {
        Ok(value) => value
            .trim()
            .parse()
            .with_context(|| format!("{name} has an invalid value: {value:?}")),
        Err(_) => Ok(default),
    }
}

fn split_origins(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|origin| !origin.is_empty())
        .map(str::to_owned)
        .collect()
}
