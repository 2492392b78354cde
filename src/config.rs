use anyhow::{anyhow, Result};
use serde::Deserialize;
use std::env;
use std::fmt;
use std::str::FromStr;
use tracing::{info, warn};

// Import logging macros
use crate::{log_system_event, log_validation};

/// Complete application configuration loaded from environment variables
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub store: StoreConfig,
    pub supabase: SupabaseConfig,
    pub server: ServerConfig,
    pub logging: LoggingConfig,
    pub cache: CacheConfig,
}

/// Which store implementation backs questions, activity and prompts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    Supabase,
    Sqlite,
}

impl FromStr for StoreBackend {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "supabase" => Ok(StoreBackend::Supabase),
            "sqlite" | "local" => Ok(StoreBackend::Sqlite),
            other => Err(anyhow!(
                "Invalid STORE_BACKEND value: '{}'. Expected 'supabase' or 'sqlite'",
                other
            )),
        }
    }
}

impl fmt::Display for StoreBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreBackend::Supabase => f.write_str("supabase"),
            StoreBackend::Sqlite => f.write_str("sqlite"),
        }
    }
}

/// Store selection and local database location
#[derive(Debug, Clone, Deserialize)]
pub struct StoreConfig {
    pub backend: StoreBackend,
    pub database_url: String,
}

/// Managed backend project coordinates
#[derive(Debug, Clone, Deserialize)]
pub struct SupabaseConfig {
    pub url: String,
    pub anon_key: String,
}

/// HTTP server configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub port: u16,
    pub host: String,
}

/// Logging system configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
    pub file_enabled: bool,
    pub console_enabled: bool,
    pub log_directory: String,
}

/// Display name cache sizing and in-memory quiz session lifetime
#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
    pub display_name_ttl_minutes: i64,
    pub display_name_cache_size: usize,
    pub quiz_session_ttl_minutes: i64,
}

impl Config {
    /// Load configuration from environment variables with sensible defaults
    pub fn from_env() -> Result<Self> {
        log_system_event!(config, "Loading application configuration from environment variables");

        let config = Config {
            store: StoreConfig::from_env()?,
            supabase: SupabaseConfig::from_env()?,
            server: ServerConfig::from_env()?,
            logging: LoggingConfig::from_env()?,
            cache: CacheConfig::from_env()?,
        };

        log_system_event!(config, "Configuration loaded successfully");
        config.log_configuration_summary();

        Ok(config)
    }

    /// Log a summary of loaded configuration (without sensitive data)
    fn log_configuration_summary(&self) {
        info!(
            store_backend = %self.store.backend,
            database_url = %self.store.database_url,
            supabase_url = %self.supabase.url,
            supabase_anon_key_masked = %mask_sensitive_data(&self.supabase.anon_key),
            server_address = %format!("{}:{}", self.server.host, self.server.port),
            log_level = %self.logging.level,
            display_name_ttl_minutes = self.cache.display_name_ttl_minutes,
            "Configuration summary"
        );
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        match self.store.backend {
            StoreBackend::Sqlite => {
                if !self.store.database_url.starts_with("sqlite:") {
                    return Err(anyhow!("DATABASE_URL must start with 'sqlite:'"));
                }
            }
            StoreBackend::Supabase => {
                if self.supabase.url.is_empty() {
                    return Err(anyhow!("SUPABASE_URL is required for the supabase store"));
                }
            }
        }

        // Sign-in always goes through the managed auth service
        if !self.supabase.url.starts_with("http://") && !self.supabase.url.starts_with("https://") {
            return Err(anyhow!("SUPABASE_URL must start with 'http://' or 'https://'"));
        }

        if self.supabase.anon_key.is_empty() {
            warn!("SUPABASE_ANON_KEY is empty - requests to the managed backend will be rejected");
        }

        if self.server.port == 0 {
            return Err(anyhow!("Server port must be greater than 0"));
        }

        if self.cache.display_name_cache_size == 0 {
            return Err(anyhow!("DISPLAY_NAME_CACHE_SIZE must be greater than 0"));
        }

        if self.cache.display_name_ttl_minutes < 0 {
            return Err(anyhow!("DISPLAY_NAME_TTL_MINUTES must not be negative"));
        }

        if self.cache.quiz_session_ttl_minutes <= 0 {
            return Err(anyhow!("QUIZ_SESSION_TTL_MINUTES must be greater than 0"));
        }

        log_validation!(success, "configuration", "Configuration validation completed successfully");
        Ok(())
    }
}

impl StoreConfig {
    fn from_env() -> Result<Self> {
        let backend = env::var("STORE_BACKEND")
            .unwrap_or_else(|_| "supabase".to_string())
            .parse::<StoreBackend>()?;

        let database_url = env::var("DATABASE_URL")
            .unwrap_or_else(|_| "sqlite:mood_quiz.db".to_string());

        Ok(StoreConfig { backend, database_url })
    }
}

impl SupabaseConfig {
    fn from_env() -> Result<Self> {
        let url = env::var("SUPABASE_URL")
            .unwrap_or_else(|_| "http://localhost:54321".to_string());

        let anon_key = env::var("SUPABASE_ANON_KEY").unwrap_or_default();

        Ok(SupabaseConfig { url, anon_key })
    }
}

impl ServerConfig {
    fn from_env() -> Result<Self> {
        let port_str = env::var("PORT")
            .unwrap_or_else(|_| "3000".to_string());

        let port = port_str.parse::<u16>()
            .map_err(|_| anyhow!("Invalid PORT value: '{}'. Must be a number between 1-65535", port_str))?;

        let host = env::var("HOST")
            .unwrap_or_else(|_| "0.0.0.0".to_string());

        Ok(ServerConfig { port, host })
    }
}

impl LoggingConfig {
    fn from_env() -> Result<Self> {
        let level = env::var("RUST_LOG")
            .unwrap_or_else(|_| "info,mood_quiz=debug".to_string());

        let file_enabled = env::var("LOG_FILE_ENABLED")
            .unwrap_or_else(|_| "true".to_string())
            .parse::<bool>()
            .unwrap_or(true);

        let console_enabled = env::var("LOG_CONSOLE_ENABLED")
            .unwrap_or_else(|_| "true".to_string())
            .parse::<bool>()
            .unwrap_or(true);

        let log_directory = env::var("LOG_DIRECTORY")
            .unwrap_or_else(|_| "logs".to_string());

        Ok(LoggingConfig {
            level,
            file_enabled,
            console_enabled,
            log_directory,
        })
    }
}

impl CacheConfig {
    fn from_env() -> Result<Self> {
        let ttl_str = env::var("DISPLAY_NAME_TTL_MINUTES")
            .unwrap_or_else(|_| "30".to_string());
        let display_name_ttl_minutes = ttl_str.parse::<i64>()
            .map_err(|_| anyhow!("Invalid DISPLAY_NAME_TTL_MINUTES value: '{}'", ttl_str))?;

        let size_str = env::var("DISPLAY_NAME_CACHE_SIZE")
            .unwrap_or_else(|_| "1000".to_string());
        let display_name_cache_size = size_str.parse::<usize>()
            .map_err(|_| anyhow!("Invalid DISPLAY_NAME_CACHE_SIZE value: '{}'", size_str))?;

        let session_ttl_str = env::var("QUIZ_SESSION_TTL_MINUTES")
            .unwrap_or_else(|_| "120".to_string());
        let quiz_session_ttl_minutes = session_ttl_str.parse::<i64>()
            .map_err(|_| anyhow!("Invalid QUIZ_SESSION_TTL_MINUTES value: '{}'", session_ttl_str))?;

        Ok(CacheConfig {
            display_name_ttl_minutes,
            display_name_cache_size,
            quiz_session_ttl_minutes,
        })
    }
}

/// Mask sensitive data in configuration for safe logging
pub fn mask_sensitive_data(data: &str) -> String {
    let chars: Vec<char> = data.chars().collect();
    if chars.len() <= 8 {
        "*".repeat(chars.len())
    } else {
        let head: String = chars[..4].iter().collect();
        let tail: String = chars[chars.len() - 4..].iter().collect();
        format!("{}***{}", head, tail)
    }
}
