use serde::Deserialize;
use std::env;
use std::fs;
use std::path::Path;

use crate::error::{AppError, Result};

const DEFAULT_CONFIG_PATH: &str = "config.toml";

/// Signing key used when none is configured. Only accepted in development and test.
pub const DEV_JWT_SECRET: &str = "proof-dev-secret-change-me-in-production";

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub environment: String,
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub auth: AuthConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Empty means any origin.
    pub cors_origins: Vec<String>,
    /// Base URL used when building published portfolio links.
    pub public_base_url: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
            cors_origins: Vec::new(),
            public_base_url: "http://localhost:3000".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum DatabaseBackend {
    #[default]
    Supabase,
    Memory,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct DatabaseConfig {
    pub backend: DatabaseBackend,
    pub supabase_url: Option<String>,
    pub supabase_key: Option<String>,
    /// Overrides the default request timeout for the PostgREST client.
    pub timeout_seconds: Option<u64>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    pub jwt_secret: String,
    pub access_token_minutes: i64,
    pub refresh_token_days: i64,
    /// Accept the `x-user-id` header forwarded by the frontend proxy.
    pub trust_user_id_header: bool,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            jwt_secret: DEV_JWT_SECRET.to_string(),
            access_token_minutes: 30,
            refresh_token_days: 7,
            trust_user_id_header: true,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub directory: String,
    pub file_prefix: String,
    pub default_directive: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            directory: "logs".to_string(),
            file_prefix: "proof-api.log".to_string(),
            default_directive: "proof_api=info,proof=info".to_string(),
        }
    }
}

impl Config {
    /// Loads `.env`, then the TOML file named by `PROOF_CONFIG` (or `config.toml`),
    /// then applies environment overrides. A missing file falls back to defaults.
    pub fn load() -> Result<Self> {
        dotenv::dotenv().ok();
        let path = env::var("PROOF_CONFIG").unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
        let mut config = if Path::new(&path).exists() {
            Self::from_file(&path)?
        } else {
            Config::default()
        };
        config.apply_env();
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| {
            AppError::Config(format!(
                "Failed to read config file '{}': {}",
                path.display(),
                e
            ))
        })?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    /// In-memory configuration used by tests and local demos.
    pub fn for_memory() -> Self {
        let mut config = Config::default();
        config.environment = "test".to_string();
        config.database.backend = DatabaseBackend::Memory;
        config
    }

    fn apply_env(&mut self) {
        if let Ok(v) = env::var("ENVIRONMENT") {
            self.environment = v;
        }
        if let Ok(v) = env::var("HOST") {
            self.server.host = v;
        }
        if let Some(port) = env::var("PORT").ok().and_then(|p| p.parse().ok()) {
            self.server.port = port;
        }
        if let Ok(v) = env::var("CORS_ORIGINS") {
            self.server.cors_origins = v
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect();
        }
        if let Ok(v) = env::var("PUBLIC_BASE_URL") {
            self.server.public_base_url = v;
        }
        if let Ok(v) = env::var("DATABASE_BACKEND") {
            match v.to_ascii_lowercase().as_str() {
                "memory" => self.database.backend = DatabaseBackend::Memory,
                "supabase" => self.database.backend = DatabaseBackend::Supabase,
                other => tracing::warn!("Unknown DATABASE_BACKEND '{}', keeping configured value", other),
            }
        }
        if let Ok(v) = env::var("SUPABASE_URL") {
            self.database.supabase_url = Some(v);
        }
        if let Ok(v) = env::var("SUPABASE_SERVICE_KEY").or_else(|_| env::var("SUPABASE_KEY")) {
            self.database.supabase_key = Some(v);
        }
        if let Ok(v) = env::var("JWT_SECRET") {
            self.auth.jwt_secret = v;
        }
        if let Ok(v) = env::var("TRUST_USER_ID_HEADER") {
            self.auth.trust_user_id_header = matches!(v.as_str(), "1" | "true" | "yes");
        }
        if self.environment.is_empty() {
            self.environment = "development".to_string();
        }
    }

    fn validate(&self) -> Result<()> {
        if self.database.backend == DatabaseBackend::Supabase {
            if self.database.supabase_url.as_deref().unwrap_or("").is_empty() {
                return Err(AppError::Config("SUPABASE_URL is not set".to_string()));
            }
            if self.database.supabase_key.as_deref().unwrap_or("").is_empty() {
                return Err(AppError::Config("SUPABASE_SERVICE_KEY is not set".to_string()));
            }
        }
        if self.auth.jwt_secret.is_empty() {
            return Err(AppError::Config("JWT_SECRET must not be empty".to_string()));
        }
        let local = matches!(self.environment.as_str(), "" | "development" | "test");
        if !local && self.auth.jwt_secret == DEV_JWT_SECRET {
            return Err(AppError::Config(format!(
                "JWT_SECRET must be set in the '{}' environment",
                self.environment
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn parses_partial_toml_with_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
environment = "staging"

[server]
port = 9000

[database]
backend = "memory"
"#
        )
        .unwrap();

        let config = Config::from_file(file.path()).unwrap();
        assert_eq!(config.environment, "staging");
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.database.backend, DatabaseBackend::Memory);
        assert_eq!(config.auth.access_token_minutes, 30);
        assert_eq!(config.auth.refresh_token_days, 7);
    }

    #[test]
    fn supabase_backend_requires_credentials() {
        let config = Config::default();
        assert!(matches!(config.validate(), Err(AppError::Config(_))));
    }

    #[test]
    fn memory_backend_needs_no_credentials() {
        assert!(Config::for_memory().validate().is_ok());
    }

    #[test]
    fn production_rejects_dev_jwt_secret() {
        let mut config = Config::for_memory();
        config.environment = "production".to_string();
        assert!(matches!(config.validate(), Err(AppError::Config(_))));

        config.auth.jwt_secret = "a-real-deployment-secret".to_string();
        assert!(config.validate().is_ok());

        config.environment = "development".to_string();
        config.auth.jwt_secret = DEV_JWT_SECRET.to_string();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn missing_file_is_config_error() {
        let result = Config::from_file("/definitely/not/here.toml");
        assert!(matches!(result, Err(AppError::Config(_))));
    }
}
