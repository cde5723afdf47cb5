use anyhow::Result;
use dotenvy::dotenv;
use secrecy::Secret;
use serde::Deserialize;
use std::env;

/// Service configuration. The HTTP port comes from the shared
/// `service_core` config (`APP__PORT`); everything database-side is read
/// from `SETTLEMENT_*` variables.
#[derive(Deserialize, Clone, Debug)]
pub struct Config {
    pub server: service_core::config::Config,
    pub database: DatabaseConfig,
    pub service_name: String,
}

#[derive(Deserialize, Clone, Debug)]
pub struct DatabaseConfig {
    pub url: Secret<String>,
    pub max_connections: u32,
    pub min_connections: u32,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenv().ok();

        let server = service_core::config::Config::load()?;

        let db_url =
            env::var("SETTLEMENT_DATABASE_URL").expect("SETTLEMENT_DATABASE_URL must be set");
        let max_connections = env::var("SETTLEMENT_DATABASE_MAX_CONNECTIONS")
            .unwrap_or_else(|_| "10".to_string())
            .parse()?;
        let min_connections = env::var("SETTLEMENT_DATABASE_MIN_CONNECTIONS")
            .unwrap_or_else(|_| "1".to_string())
            .parse()?;

        Ok(Self {
            server,
            database: DatabaseConfig {
                url: Secret::new(db_url),
                max_connections,
                min_connections,
            },
            service_name: "settlement-service".to_string(),
        })
    }
}
