use secrecy::Secret;
use serde::Deserialize;
use std::time::Duration;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub database_url: Secret<String>,
    pub database_max_connections: u32,
    pub host: String,
    pub port: u16,

    // Blob store holding subscription and cancellation documents
    pub document_store_url: String,
    pub document_store_token: Option<Secret<String>>,

    // Existence probes and uploads
    pub probe_timeout_ms: u64,
    pub probe_retries: u32,
}

impl Config {
    pub fn from_env() -> Result<Self, config::ConfigError> {
        // Load .env file if it exists (for local development)
        let _ = dotenvy::dotenv();

        let config = config::Config::builder()
            .add_source(config::Environment::default().separator("__"))
            .set_default("host", "127.0.0.1")?
            .set_default("database_max_connections", 20)?
            .set_default("probe_timeout_ms", 3000)?
            .set_default("probe_retries", 1)?
            .build()?;

        Ok(Self {
            database_url: Secret::new(config.get("database_url")?),
            database_max_connections: config.get("database_max_connections")?,
            host: config.get("host")?,
            port: config.get("port")?,

            document_store_url: config.get("document_store_url")?,
            document_store_token: config
                .get::<String>("document_store_token")
                .ok()
                .map(Secret::new),

            probe_timeout_ms: config.get("probe_timeout_ms")?,
            probe_retries: config.get("probe_retries")?,
        })
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }
}
