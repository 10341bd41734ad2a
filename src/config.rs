use std::str::FromStr;

use crate::dotenv;
use crate::error::Error;

pub const BIND_ADDR: &str = "BIND_ADDR";
pub const STORE: &str = "STORE";
pub const DATABASE_URL: &str = "DATABASE_URL";
pub const MAX_CONNECTIONS: &str = "MAX_CONNECTIONS";
pub const JWT_SECRET: &str = "JWT_SECRET";
pub const RUN_MIGRATIONS: &str = "RUN_MIGRATIONS";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreKind {
    Postgres,
    Memory,
}

impl FromStr for StoreKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "postgres" | "pg" => Ok(StoreKind::Postgres),
            "memory" => Ok(StoreKind::Memory),
            other => Err(Error::Config(format!("{} must be postgres or memory, got {}", STORE, other))),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub bind_addr: String,
    pub store: StoreKind,
    pub database_url: Option<String>,
    pub max_connections: u32,
    pub jwt_secret: Vec<u8>,
    pub run_migrations: bool,
}

impl Config {
    /// Reads the process environment, after loading `.env` if one exists.
    pub fn load() -> Result<Self, Error> {
        dotenv::dotenv().ok();
        Self::from_lookup(|key| dotenv::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, Error>
    where
        F: Fn(&str) -> Option<String>,
    {
        let store = lookup(STORE).map(|s| s.parse()).transpose()?.unwrap_or(StoreKind::Postgres);
        let database_url = lookup(DATABASE_URL);
        if store == StoreKind::Postgres && database_url.is_none() {
            return Err(Error::Config(format!("{} is required for the postgres store", DATABASE_URL)));
        }
        let jwt_secret = lookup(JWT_SECRET)
            .filter(|s| !s.is_empty())
            .ok_or_else(|| Error::Config(format!("{} is not set", JWT_SECRET)))?;
        Ok(Self {
            bind_addr: lookup(BIND_ADDR).unwrap_or_else(|| "0.0.0.0:8000".into()),
            store,
            database_url,
            max_connections: parse_or(&lookup, MAX_CONNECTIONS, 5)?,
            jwt_secret: jwt_secret.into_bytes(),
            run_migrations: parse_or(&lookup, RUN_MIGRATIONS, true)?,
        })
    }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> Result<T, Error>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        None => Ok(default),
        Some(v) => v.parse().map_err(|e| Error::Config(format!("invalid {}: {}", key, e))),
    }
}
