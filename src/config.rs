//! Configuration management for the election core
//!
//! Loads settings from environment variables (and a `.env` file when present)
//! with validation.

use crate::{Result, validation_error};
use serde::{Deserialize, Serialize};

const DEFAULT_PAGE_SIZE: usize = 50;
const DEFAULT_MAX_PAGE_SIZE: usize = 500;
const DEFAULT_AUDIT_CAPACITY: usize = 10_000;

/// Settings for reporting and the bundled audit trail
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ElectionConfig {
    /// Page size used when a caller does not ask for one
    pub default_page_size: usize,

    /// Upper bound on any requested page size
    pub max_page_size: usize,

    /// Records kept by the in-memory audit trail before the oldest are dropped
    pub audit_capacity: usize,
}

impl ElectionConfig {
    /// Load election configuration from environment variables
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        let config = Self {
            default_page_size: env_or("ASSEMBLY_DEFAULT_PAGE_SIZE", DEFAULT_PAGE_SIZE)?,
            max_page_size: env_or("ASSEMBLY_MAX_PAGE_SIZE", DEFAULT_MAX_PAGE_SIZE)?,
            audit_capacity: env_or("ASSEMBLY_AUDIT_CAPACITY", DEFAULT_AUDIT_CAPACITY)?,
        };
        config.validate()?;
        Ok(config)
    }

    /// Create configuration for testing
    pub fn for_testing() -> Self {
        Self {
            default_page_size: 10,
            max_page_size: 100,
            audit_capacity: 1_000,
        }
    }

    fn validate(&self) -> Result<()> {
        if self.default_page_size == 0 {
            return Err(validation_error!("ASSEMBLY_DEFAULT_PAGE_SIZE must be at least 1"));
        }
        if self.max_page_size < self.default_page_size {
            return Err(validation_error!(
                "ASSEMBLY_MAX_PAGE_SIZE ({}) must not be below ASSEMBLY_DEFAULT_PAGE_SIZE ({})",
                self.max_page_size,
                self.default_page_size
            ));
        }
        if self.audit_capacity == 0 {
            return Err(validation_error!("ASSEMBLY_AUDIT_CAPACITY must be at least 1"));
        }
        Ok(())
    }
}

impl Default for ElectionConfig {
    fn default() -> Self {
        Self {
            default_page_size: DEFAULT_PAGE_SIZE,
            max_page_size: DEFAULT_MAX_PAGE_SIZE,
            audit_capacity: DEFAULT_AUDIT_CAPACITY,
        }
    }
}

/// Application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub election: ElectionConfig,
    pub logging: LoggingConfig,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// `EnvFilter` directive, e.g. `info` or `assembly_vote=debug`
    pub level: String,
    /// One of `full`, `compact` or `pretty`
    pub format: String,
}

impl Config {
    /// Load configuration from environment
    pub fn from_env() -> Result<Self> {
        let election = ElectionConfig::from_env()?;

        let logging = LoggingConfig {
            level: std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            format: std::env::var("LOG_FORMAT").unwrap_or_else(|_| "full".to_string()),
        };

        Ok(Self { election, logging })
    }

    /// Create configuration for testing
    pub fn for_testing() -> Result<Self> {
        Ok(Self {
            election: ElectionConfig::for_testing(),
            logging: LoggingConfig {
                level: "debug".to_string(),
                format: "pretty".to_string(),
            },
        })
    }
}

fn env_or(name: &str, default: usize) -> Result<usize> {
    match std::env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|_| validation_error!("Invalid {}: {:?}", name, raw)),
        Err(_) => Ok(default),
    }
}
