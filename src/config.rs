use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use thiserror::Error;

use crate::auth::{SharedSecret, DEFAULT_TOKEN_TTL};

/// ICE event backend
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct CliArgs {
    /// Server host address
    #[arg(short = 'H', long, env = "SERVER_HOST", default_value = "0.0.0.0")]
    pub host: String,

    /// Server port
    #[arg(short, long, env = "SERVER_PORT", default_value = "5000")]
    pub port: u16,

    /// Secret key used to sign session tokens
    #[arg(short = 's', long, env = "SECRET_KEY", hide_env_values = true)]
    pub secret_key: Option<String>,

    /// Path to the SQLite database file
    #[arg(short = 'd', long, env = "DATABASE_FILE", default_value = "ice.sqlite3")]
    pub database: String,

    /// Session token lifetime in seconds
    #[arg(long, env = "TOKEN_TTL", default_value_t = DEFAULT_TOKEN_TTL)]
    pub token_ttl: u64,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,
}

/// Startup configuration errors, fatal before the server binds
#[derive(Error, Debug, PartialEq)]
pub enum ConfigError {
    /// No signing secret configured; tokens could not be issued safely
    #[error("SECRET_KEY is required (use -s or set SECRET_KEY env var)")]
    MissingSecretConfiguration,

    /// Token lifetime must be positive
    #[error("TOKEN_TTL must be greater than zero")]
    InvalidTokenTtl,
}

#[derive(Clone, Debug)]
pub struct Config {
    // Server settings
    pub server_host: String,
    pub server_port: u16,

    // Authentication
    pub secret_key: Option<SharedSecret>,
    pub token_ttl: u64,

    // Storage
    pub database_file: PathBuf,

    // Logging
    pub log_level: String,
}

impl Config {
    /// Load configuration from all sources with priority: CLI > ENV > .env > defaults
    pub fn load() -> Result<Self> {
        // Load .env file if it exists
        dotenvy::dotenv().ok();

        Ok(Self::from_args(CliArgs::parse()))
    }

    /// Build configuration from already-parsed arguments
    pub fn from_args(args: CliArgs) -> Self {
        Config {
            server_host: args.host,
            server_port: args.port,
            secret_key: args.secret_key.as_deref().and_then(SharedSecret::new),
            token_ttl: args.token_ttl,
            database_file: expand_tilde(&args.database),
            log_level: args.log_level,
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.shared_secret()?;

        if self.token_ttl == 0 {
            return Err(ConfigError::InvalidTokenTtl);
        }

        Ok(())
    }

    /// The token signing secret, or the fatal startup error if absent
    pub fn shared_secret(&self) -> Result<SharedSecret, ConfigError> {
        self.secret_key
            .clone()
            .ok_or(ConfigError::MissingSecretConfiguration)
    }
}

/// Expand tilde (~) in file paths to user's home directory
fn expand_tilde(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    PathBuf::from(path)
}
