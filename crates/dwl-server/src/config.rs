//! Configuration management

use crate::staging::PATH_DELIMITER;
use dwl_common::DwlError;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::{path::PathBuf, str::FromStr, sync::LazyLock, time::Duration};

// ============================================================================
// Server Configuration Constants
// ============================================================================

/// Default server host binding.
pub const DEFAULT_SERVER_HOST: &str = "127.0.0.1";

/// Default server port.
pub const DEFAULT_SERVER_PORT: u16 = 8000;

/// Default shutdown timeout in seconds.
pub const DEFAULT_SHUTDOWN_TIMEOUT_SECS: u64 = 30;

/// Default request body limit for uploads (256 MiB).
pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 256 * 1024 * 1024;

/// Default database URL for local development.
pub const DEFAULT_DATABASE_URL: &str = "postgresql://localhost/dw_project";

/// Default maximum database connections in the pool.
pub const DEFAULT_DATABASE_MAX_CONNECTIONS: u32 = 10;

/// Default minimum database connections in the pool.
pub const DEFAULT_DATABASE_MIN_CONNECTIONS: u32 = 1;

/// Default database connection timeout in seconds.
pub const DEFAULT_DATABASE_CONNECT_TIMEOUT_SECS: u64 = 10;

/// Default database idle timeout in seconds (10 minutes).
pub const DEFAULT_DATABASE_IDLE_TIMEOUT_SECS: u64 = 600;

/// Default CORS allowed origin for local development.
pub const DEFAULT_CORS_ALLOWED_ORIGIN: &str = "http://localhost:3000";

// ============================================================================
// Pipeline Configuration Constants
// ============================================================================

/// Directory uploaded files are staged into.
pub const DEFAULT_STAGING_DIR: &str = "./uploads";

/// Append-only audit log of batch outcomes.
pub const DEFAULT_AUDIT_LOG: &str = "./logs/message.log";

/// Operational fault log, kept apart from the audit log.
pub const DEFAULT_FAULT_LOG: &str = "./logs/error.log";

/// Stored procedure implementing the transform job.
pub const DEFAULT_PROCEDURE: &str = "data_extraction";

/// Channel the transform job publishes progress notices on.
pub const DEFAULT_NOTIFY_TOPIC: &str = "log_channel";

/// Relation counted to verify that the load materialised.
pub const DEFAULT_VERIFY_RELATION: &str = "sales_data_cube";

/// Single notification poll timeout in milliseconds.
pub const DEFAULT_POLL_TIMEOUT_MS: u64 = 1000;

/// Upper bound on the whole drain loop in seconds.
pub const DEFAULT_MAX_DRAIN_SECS: u64 = 10;

/// Upper bound on the synchronous procedure call in seconds.
pub const DEFAULT_INVOCATION_TIMEOUT_SECS: u64 = 600;

static IDENTIFIER_RE: LazyLock<Regex> = LazyLock::new(|| {
    #[allow(clippy::expect_used)]
    Regex::new(r"^[A-Za-z_][A-Za-z0-9_]{0,62}(\.[A-Za-z_][A-Za-z0-9_]{0,62})?$")
        .expect("identifier pattern is valid")
});

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub cors: CorsConfig,
    pub pipeline: PipelineConfig,
}

/// Server-specific configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub shutdown_timeout_secs: u64,
    pub max_upload_bytes: usize,
    /// Directory served as the fallback route (the upload form), if any
    pub static_dir: Option<PathBuf>,
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
    pub connect_timeout_secs: u64,
    pub idle_timeout_secs: u64,
}

/// CORS configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorsConfig {
    pub allowed_origins: Vec<String>,
    pub allow_credentials: bool,
}

/// Upload pipeline configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    pub staging_dir: PathBuf,
    pub audit_log: PathBuf,
    pub fault_log: PathBuf,
    pub procedure: String,
    /// Pass the orchestrator's start timestamp as a second procedure argument
    pub pass_start_time: bool,
    pub notify_topic: String,
    pub verify_relation: String,
    pub poll_timeout_ms: u64,
    pub max_drain_secs: u64,
    pub invocation_timeout_secs: u64,
}

impl PipelineConfig {
    pub fn poll_timeout(&self) -> Duration {
        Duration::from_millis(self.poll_timeout_ms)
    }

    pub fn max_drain(&self) -> Duration {
        Duration::from_secs(self.max_drain_secs)
    }

    pub fn invocation_timeout(&self) -> Duration {
        Duration::from_secs(self.invocation_timeout_secs)
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            staging_dir: PathBuf::from(DEFAULT_STAGING_DIR),
            audit_log: PathBuf::from(DEFAULT_AUDIT_LOG),
            fault_log: PathBuf::from(DEFAULT_FAULT_LOG),
            procedure: DEFAULT_PROCEDURE.to_string(),
            pass_start_time: false,
            notify_topic: DEFAULT_NOTIFY_TOPIC.to_string(),
            verify_relation: DEFAULT_VERIFY_RELATION.to_string(),
            poll_timeout_ms: DEFAULT_POLL_TIMEOUT_MS,
            max_drain_secs: DEFAULT_MAX_DRAIN_SECS,
            invocation_timeout_secs: DEFAULT_INVOCATION_TIMEOUT_SECS,
        }
    }
}

fn env_or<T: FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|s| s.trim().parse().ok())
        .unwrap_or(default)
}

fn env_string(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

/// Check that `identifier` is a plain, optionally schema-qualified SQL name
///
/// Procedure and relation names are interpolated into statements, so only
/// `[A-Za-z_][A-Za-z0-9_]*` segments are accepted.
pub fn validate_identifier(identifier: &str) -> Result<(), DwlError> {
    if IDENTIFIER_RE.is_match(identifier) {
        Ok(())
    } else {
        Err(DwlError::InvalidIdentifier {
            identifier: identifier.to_string(),
            reason: "expected [schema.]name made of letters, digits and underscores".to_string(),
        })
    }
}

impl Config {
    /// Load configuration from environment and defaults
    pub fn load() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let config = Config {
            server: ServerConfig {
                host: env_string("DWL_HOST", DEFAULT_SERVER_HOST),
                port: env_or("DWL_PORT", DEFAULT_SERVER_PORT),
                shutdown_timeout_secs: env_or("DWL_SHUTDOWN_TIMEOUT", DEFAULT_SHUTDOWN_TIMEOUT_SECS),
                max_upload_bytes: env_or("DWL_MAX_UPLOAD_BYTES", DEFAULT_MAX_UPLOAD_BYTES),
                static_dir: std::env::var("DWL_STATIC_DIR").ok().map(PathBuf::from),
            },
            database: DatabaseConfig {
                url: env_string("DATABASE_URL", DEFAULT_DATABASE_URL),
                max_connections: env_or("DATABASE_MAX_CONNECTIONS", DEFAULT_DATABASE_MAX_CONNECTIONS),
                min_connections: env_or("DATABASE_MIN_CONNECTIONS", DEFAULT_DATABASE_MIN_CONNECTIONS),
                connect_timeout_secs: env_or(
                    "DATABASE_CONNECT_TIMEOUT",
                    DEFAULT_DATABASE_CONNECT_TIMEOUT_SECS,
                ),
                idle_timeout_secs: env_or("DATABASE_IDLE_TIMEOUT", DEFAULT_DATABASE_IDLE_TIMEOUT_SECS),
            },
            cors: CorsConfig {
                allowed_origins: env_string("CORS_ALLOWED_ORIGINS", DEFAULT_CORS_ALLOWED_ORIGIN)
                    .split(',')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect(),
                allow_credentials: env_or("CORS_ALLOW_CREDENTIALS", true),
            },
            pipeline: PipelineConfig {
                staging_dir: PathBuf::from(env_string("DWL_STAGING_DIR", DEFAULT_STAGING_DIR)),
                audit_log: PathBuf::from(env_string("DWL_AUDIT_LOG", DEFAULT_AUDIT_LOG)),
                fault_log: PathBuf::from(env_string("DWL_FAULT_LOG", DEFAULT_FAULT_LOG)),
                procedure: env_string("DWL_PROCEDURE", DEFAULT_PROCEDURE),
                pass_start_time: env_or("DWL_PASS_START_TIME", false),
                notify_topic: env_string("DWL_NOTIFY_TOPIC", DEFAULT_NOTIFY_TOPIC),
                verify_relation: env_string("DWL_VERIFY_RELATION", DEFAULT_VERIFY_RELATION),
                poll_timeout_ms: env_or("DWL_POLL_TIMEOUT_MS", DEFAULT_POLL_TIMEOUT_MS),
                max_drain_secs: env_or("DWL_MAX_DRAIN_SECS", DEFAULT_MAX_DRAIN_SECS),
                invocation_timeout_secs: env_or(
                    "DWL_INVOCATION_TIMEOUT_SECS",
                    DEFAULT_INVOCATION_TIMEOUT_SECS,
                ),
            },
        };

        config.validate()?;

        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.server.port == 0 {
            anyhow::bail!("Server port must be greater than 0");
        }

        if self.server.max_upload_bytes == 0 {
            anyhow::bail!("Upload body limit must be greater than 0");
        }

        if self.database.url.is_empty() {
            anyhow::bail!("Database URL cannot be empty");
        }

        if self.database.max_connections == 0 {
            anyhow::bail!("Database max_connections must be greater than 0");
        }

        if self.database.min_connections > self.database.max_connections {
            anyhow::bail!(
                "Database min_connections ({}) cannot be greater than max_connections ({})",
                self.database.min_connections,
                self.database.max_connections
            );
        }

        if self.pipeline.staging_dir.to_string_lossy().contains(PATH_DELIMITER) {
            return Err(DwlError::config(format!(
                "Staging directory {} contains the path delimiter '{PATH_DELIMITER}'",
                self.pipeline.staging_dir.display()
            ))
            .into());
        }

        validate_identifier(&self.pipeline.procedure)?;
        validate_identifier(&self.pipeline.verify_relation)?;

        if self.pipeline.notify_topic.trim().is_empty() {
            anyhow::bail!("Notification topic cannot be empty");
        }

        if self.pipeline.poll_timeout_ms == 0 {
            anyhow::bail!("Notification poll timeout must be greater than 0");
        }

        if self.pipeline.max_drain() < self.pipeline.poll_timeout() {
            anyhow::bail!(
                "Maximum drain duration ({}s) must cover at least one poll ({}ms)",
                self.pipeline.max_drain_secs,
                self.pipeline.poll_timeout_ms
            );
        }

        if self.pipeline.audit_log == self.pipeline.fault_log {
            anyhow::bail!("Audit log and fault log must be different files");
        }

        if self.cors.allowed_origins.is_empty() {
            tracing::warn!("No CORS origins configured - all origins will be allowed");
        }

        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: DEFAULT_SERVER_HOST.to_string(),
                port: DEFAULT_SERVER_PORT,
                shutdown_timeout_secs: DEFAULT_SHUTDOWN_TIMEOUT_SECS,
                max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
                static_dir: None,
            },
            database: DatabaseConfig {
                url: DEFAULT_DATABASE_URL.to_string(),
                max_connections: DEFAULT_DATABASE_MAX_CONNECTIONS,
                min_connections: DEFAULT_DATABASE_MIN_CONNECTIONS,
                connect_timeout_secs: DEFAULT_DATABASE_CONNECT_TIMEOUT_SECS,
                idle_timeout_secs: DEFAULT_DATABASE_IDLE_TIMEOUT_SECS,
            },
            cors: CorsConfig {
                allowed_origins: vec![DEFAULT_CORS_ALLOWED_ORIGIN.to_string()],
                allow_credentials: true,
            },
            pipeline: PipelineConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn test_identifier_validation() {
        assert!(validate_identifier("data_extraction").is_ok());
        assert!(validate_identifier("warehouse.sales_data_cube").is_ok());
        assert!(validate_identifier("_private1").is_ok());

        assert!(validate_identifier("").is_err());
        assert!(validate_identifier("1table").is_err());
        assert!(validate_identifier("sales; DROP TABLE x").is_err());
        assert!(validate_identifier("a.b.c").is_err());
        assert!(validate_identifier("\"quoted\"").is_err());
    }

    #[test]
    fn test_rejects_unsafe_procedure_name() {
        let mut config = Config::default();
        config.pipeline.procedure = "data_extraction(); --".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_drain_shorter_than_poll() {
        let mut config = Config::default();
        config.pipeline.poll_timeout_ms = 5_000;
        config.pipeline.max_drain_secs = 1;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_staging_dir_with_delimiter() {
        let mut config = Config::default();
        config.pipeline.staging_dir = PathBuf::from("/data/q1,q2");
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("path delimiter"));
    }

    #[test]
    fn test_rejects_shared_log_file() {
        let mut config = Config::default();
        config.pipeline.fault_log = config.pipeline.audit_log.clone();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_min_over_max_connections() {
        let mut config = Config::default();
        config.database.min_connections = 20;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_pipeline_durations() {
        let pipeline = PipelineConfig::default();
        assert_eq!(pipeline.poll_timeout(), Duration::from_millis(1000));
        assert_eq!(pipeline.max_drain(), Duration::from_secs(10));
        assert_eq!(pipeline.invocation_timeout(), Duration::from_secs(600));
    }
}
