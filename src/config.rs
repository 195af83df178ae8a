//! Runtime configuration sourced from environment variables (§6: "Credentials
//! for custody, audit sink, and store; encryption key for sensitive metadata
//! fields; timezone (default UTC). No other runtime configuration.").

use anyhow::Context;

#[derive(Debug, Clone)]
pub struct Config {
    pub custody_credentials: String,
    pub audit_sink_credentials: String,
    pub store_credentials: String,
    pub metadata_encryption_key: String,
    pub timezone: String,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        Ok(Config {
            custody_credentials: env_var("ESCROW_CUSTODY_CREDENTIALS")?,
            audit_sink_credentials: env_var("ESCROW_AUDIT_SINK_CREDENTIALS")?,
            store_credentials: env_var("ESCROW_STORE_CREDENTIALS")?,
            metadata_encryption_key: env_var("ESCROW_METADATA_ENCRYPTION_KEY")?,
            timezone: std::env::var("ESCROW_TIMEZONE").unwrap_or_else(|_| "UTC".to_string()),
        })
    }
}

fn env_var(name: &'static str) -> anyhow::Result<String> {
    std::env::var(name).with_context(|| format!("missing required environment variable {name}"))
}
