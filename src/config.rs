use std::{env, fmt::Display, str::FromStr};

use anyhow::{bail, Context};
use tracing::info;

use crate::identity::SupabaseConfig;

const DEFAULT_PORT: &str = "8004";
const DEFAULT_CORS_ORIGINS: &str = "http://localhost:3000,http://localhost:3001";
const DEFAULT_MAX_CONNECTIONS: &str = "5";

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub cors_origins: Vec<String>,
    pub supabase: SupabaseConfig,
    pub database: Option<DatabaseConfig>,
}

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

impl Config {
    /// Server configuration. The database section is skipped for the
    /// in-memory store.
    pub fn load(with_database: bool) -> anyhow::Result<Self> {
        let database = if with_database {
            Some(DatabaseConfig::load()?)
        } else {
            None
        };

        Ok(Self {
            port: try_load("PORT", DEFAULT_PORT)?,
            cors_origins: parse_origins(&try_load::<String>("CORS_ORIGINS", DEFAULT_CORS_ORIGINS)?),
            supabase: SupabaseConfig {
                url: required("SUPABASE_URL")?,
                api_key: required("SUPABASE_KEY")?,
            },
            database,
        })
    }
}

impl DatabaseConfig {
    pub fn load() -> anyhow::Result<Self> {
        Ok(Self {
            url: required("DATABASE_URL")
                .context("DATABASE_URL must point at the project's Postgres instance")?,
            max_connections: try_load("DATABASE_MAX_CONNECTIONS", DEFAULT_MAX_CONNECTIONS)?,
        })
    }
}

fn required(key: &str) -> anyhow::Result<String> {
    match env::var(key) {
        Ok(value) if !value.trim().is_empty() => Ok(value.trim().to_string()),
        _ => bail!("{key} must be set"),
    }
}

fn try_load<T: FromStr>(key: &str, default: &str) -> anyhow::Result<T>
where
    T::Err: Display,
{
    let raw = env::var(key).unwrap_or_else(|_| {
        info!("{key} not set, using default: {default}");
        default.to_string()
    });

    raw.parse()
        .map_err(|e| anyhow::anyhow!("Invalid {key} value {raw:?}: {e}"))
}

fn parse_origins(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|origin| !origin.is_empty())
        .map(String::from)
        .collect()
}
