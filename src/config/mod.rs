//! Configuration management for the covenant monitoring backend
//!
//! This module handles loading and validating configuration from environment variables,
//! with support for different environments (development, staging, production).

use std::env;
use std::path::PathBuf;
use std::str::FromStr;

use thiserror::Error;

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid environment value: {0}")]
    InvalidValue(String),

    #[error("Invalid port number: {0}")]
    InvalidPort(String),
}

/// Application environment
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Environment {
    #[default]
    Development,
    Staging,
    Production,
}

impl FromStr for Environment {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "dev" | "development" => Ok(Environment::Development),
            "staging" => Ok(Environment::Staging),
            "prod" | "production" => Ok(Environment::Production),
            _ => Err(ConfigError::InvalidValue(format!(
                "Invalid environment: '{}'. Expected: dev, staging, or prod",
                s
            ))),
        }
    }
}

impl Environment {
    /// Check if this is a production environment
    pub fn is_production(&self) -> bool {
        matches!(self, Environment::Production)
    }

    /// Get the environment name as a string
    pub fn as_str(&self) -> &'static str {
        match self {
            Environment::Development => "development",
            Environment::Staging => "staging",
            Environment::Production => "production",
        }
    }
}

const DEV_JWT_SECRET: &str = "development-secret-change-in-production";

/// Application configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Database connection URL; the in-memory store is used when absent
    pub database_url: Option<String>,

    /// Current environment
    pub environment: Environment,

    /// Server port
    pub port: u16,

    /// Maximum database connections
    pub db_max_connections: u32,

    /// CORS allowed origins
    pub cors_allowed_origins: Option<String>,

    /// Log level (RUST_LOG)
    pub log_level: String,

    /// JWT secret for token signing
    pub jwt_secret: String,

    /// Access token TTL in seconds (default: 900 = 15 minutes)
    pub jwt_access_token_ttl_seconds: i64,

    /// Refresh token TTL in days (default: 7)
    pub jwt_refresh_token_ttl_days: i64,

    /// bcrypt work factor for password hashes
    pub bcrypt_cost: u32,

    /// Groq API key; AI features fall back to templates when absent
    pub groq_api_key: Option<String>,

    /// Groq chat model
    pub groq_model: String,

    /// OpenAI-compatible chat completions endpoint
    pub groq_api_url: String,

    /// Timeout for AI and OCR calls
    pub ai_timeout_secs: u64,

    /// OCR.space API key
    pub ocrspace_api_key: Option<String>,

    /// OCR.space parse endpoint
    pub ocrspace_api_url: String,

    /// Directory for uploaded loan documents
    pub upload_dir: PathBuf,

    /// Maximum accepted upload size in bytes
    pub max_upload_bytes: usize,

    /// Seed demo facilities into the in-memory store at startup
    pub seed_demo_data: bool,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors)
        dotenvy::dotenv().ok();

        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build configuration from an arbitrary key lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());
        let parsed = |key: &str, default: &str| var(key).unwrap_or_else(|| default.to_string());

        let environment = match var("ENVIRONMENT") {
            Some(value) => value.parse::<Environment>()?,
            None => Environment::Development,
        };

        let database_url = var("DATABASE_URL");
        if database_url.is_none() && environment.is_production() {
            return Err(ConfigError::MissingEnvVar("DATABASE_URL".to_string()));
        }

        let port = parsed("PORT", "8000")
            .parse::<u16>()
            .map_err(|_| ConfigError::InvalidPort("PORT must be a valid number".to_string()))?;

        let db_max_connections = parsed("DB_MAX_CONNECTIONS", "5")
            .parse::<u32>()
            .unwrap_or(5);

        let cors_allowed_origins = var("CORS_ALLOWED_ORIGINS");

        let log_level = parsed("RUST_LOG", "info");

        // JWT and Auth configuration
        let jwt_secret = match var("JWT_SECRET") {
            Some(secret) => secret,
            None if environment.is_production() => {
                return Err(ConfigError::MissingEnvVar("JWT_SECRET".to_string()))
            }
            None => DEV_JWT_SECRET.to_string(),
        };

        let jwt_access_token_ttl_seconds = parsed("JWT_ACCESS_TOKEN_TTL_SECONDS", "900")
            .parse::<i64>()
            .unwrap_or(900);

        let jwt_refresh_token_ttl_days = parsed("JWT_REFRESH_TOKEN_TTL_DAYS", "7")
            .parse::<i64>()
            .unwrap_or(7);

        let bcrypt_cost = parsed("BCRYPT_COST", "12")
            .parse::<u32>()
            .ok()
            .filter(|cost| (4..=31).contains(cost))
            .ok_or_else(|| {
                ConfigError::InvalidValue("BCRYPT_COST must be between 4 and 31".to_string())
            })?;

        // AI and OCR collaborators
        let groq_api_key = var("GROQ_API_KEY");
        let groq_model = parsed("GROQ_MODEL", "llama-3.3-70b-versatile");
        let groq_api_url = parsed(
            "GROQ_API_URL",
            "https://api.groq.com/openai/v1/chat/completions",
        );

        let ai_timeout_secs = parsed("AI_TIMEOUT_SECS", "30")
            .parse::<u64>()
            .unwrap_or(30);

        let ocrspace_api_key = var("OCRSPACE_API_KEY");
        let ocrspace_api_url = parsed("OCRSPACE_API_URL", "https://api.ocr.space/parse/image");

        let upload_dir = PathBuf::from(parsed("UPLOAD_DIR", "uploads"));

        let max_upload_bytes = parsed("MAX_UPLOAD_BYTES", "20971520")
            .parse::<usize>()
            .unwrap_or(20 * 1024 * 1024);

        let seed_demo_data = matches!(
            parsed("SEED_DEMO_DATA", "false").to_lowercase().as_str(),
            "1" | "true" | "yes"
        );

        Ok(Config {
            database_url,
            environment,
            port,
            db_max_connections,
            cors_allowed_origins,
            log_level,
            jwt_secret,
            jwt_access_token_ttl_seconds,
            jwt_refresh_token_ttl_days,
            bcrypt_cost,
            groq_api_key,
            groq_model,
            groq_api_url,
            ai_timeout_secs,
            ocrspace_api_key,
            ocrspace_api_url,
            upload_dir,
            max_upload_bytes,
            seed_demo_data,
        })
    }

    /// Get database URL (useful for logging masked version)
    pub fn database_url_masked(&self) -> String {
        let Some(url) = self.database_url.as_deref() else {
            return "<in-memory>".to_string();
        };

        // Mask password in database URL for logging
        if let Some(at_pos) = url.find('@') {
            if let Some(colon_pos) = url[..at_pos].rfind(':') {
                let prefix = &url[..colon_pos + 1];
                let suffix = &url[at_pos..];
                return format!("{}****{}", prefix, suffix);
            }
        }
        url.to_string()
    }
}
