//! Server configuration: TOML file plus `DENTORA__` environment overrides.

use std::net::SocketAddr;

use serde::{Deserialize, Serialize};

use dentora_db_postgres::PostgresConfig;
use dentora_notifications::{EmailSettings, WebhookSettings};

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub notifications: NotificationsConfig,
}

impl AppConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.server.port == 0 {
            return Err("server.port must be > 0".into());
        }
        let lvl = self.logging.level.to_ascii_lowercase();
        let valid_levels = ["trace", "debug", "info", "warn", "error", "off"];
        if !valid_levels.contains(&lvl.as_str()) {
            return Err(format!("logging.level must be one of {valid_levels:?}"));
        }
        match self.storage.backend {
            StorageBackend::Memory => {}
            StorageBackend::Postgres => {
                let Some(ref pg) = self.storage.postgres else {
                    return Err("storage.backend = \"postgres\" requires [storage.postgres]".into());
                };
                if pg.url.is_empty() {
                    return Err("storage.postgres.url must not be empty".into());
                }
                if pg.pool_size == 0 {
                    return Err("storage.postgres.pool_size must be > 0".into());
                }
            }
        }
        if self.auth.enabled && self.auth.tokens.is_empty() {
            return Err("auth.enabled = true requires at least one auth.tokens entry".into());
        }
        if self.notifications.enabled && self.notifications.poll_interval_secs == 0 {
            return Err("notifications.poll_interval_secs must be > 0".into());
        }
        if self.notifications.reminders.enabled && self.notifications.reminders.scan_interval_secs == 0
        {
            return Err("notifications.reminders.scan_interval_secs must be > 0".into());
        }
        Ok(())
    }

    pub fn addr(&self) -> SocketAddr {
        use std::net::{IpAddr, Ipv4Addr};
        let host: IpAddr = self
            .server
            .host
            .parse()
            .unwrap_or(IpAddr::V4(Ipv4Addr::new(0, 0, 0, 0)));
        SocketAddr::from((host, self.server.port))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_body_limit")]
    pub body_limit_bytes: usize,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8085
}

fn default_body_limit() -> usize {
    1024 * 1024
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            body_limit_bytes: default_body_limit(),
        }
    }
}

/// Which storage backend to boot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    /// Volatile, for development and tests.
    #[default]
    Memory,
    Postgres,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct StorageConfig {
    #[serde(default)]
    pub backend: StorageBackend,
    #[serde(default)]
    pub postgres: Option<PostgresConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

/// Bearer-token API authentication.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AuthConfig {
    #[serde(default)]
    pub enabled: bool,
    /// Accepted API tokens. Prefer supplying these via environment
    /// override (`DENTORA__AUTH__TOKENS`) rather than the file.
    #[serde(default)]
    pub tokens: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationsConfig {
    /// Starts the queue processor when true.
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,
    #[serde(default = "default_clinic_name")]
    pub clinic_name: String,
    #[serde(default)]
    pub email: Option<EmailSettings>,
    #[serde(default)]
    pub webhook: WebhookSettings,
    #[serde(default)]
    pub reminders: RemindersConfig,
}

fn default_poll_interval() -> u64 {
    30
}

fn default_clinic_name() -> String {
    "Dentora".to_string()
}

impl Default for NotificationsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            poll_interval_secs: default_poll_interval(),
            clinic_name: default_clinic_name(),
            email: None,
            webhook: WebhookSettings::default(),
            reminders: RemindersConfig::default(),
        }
    }
}

/// Appointment reminder scanning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemindersConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_days_ahead")]
    pub days_ahead: u8,
    #[serde(default = "default_scan_interval")]
    pub scan_interval_secs: u64,
}

fn default_days_ahead() -> u8 {
    1
}

fn default_scan_interval() -> u64 {
    3600
}

impl Default for RemindersConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            days_ahead: default_days_ahead(),
            scan_interval_secs: default_scan_interval(),
        }
    }
}

pub mod loader {
    use super::AppConfig;
    use config::{Config, Environment, File};
    use std::path::PathBuf;

    /// Loads configuration from an optional TOML file, then applies
    /// environment overrides such as `DENTORA__SERVER__PORT=9090`.
    pub fn load_config(path: Option<&str>) -> Result<AppConfig, String> {
        let mut builder = Config::builder();
        match path {
            Some(p) => {
                let pathbuf = PathBuf::from(p);
                if pathbuf.exists() {
                    builder = builder.add_source(File::from(pathbuf));
                }
            }
            None => {
                let default_path = PathBuf::from("dentora.toml");
                if default_path.exists() {
                    builder = builder.add_source(File::from(default_path));
                }
            }
        }
        builder = builder.add_source(
            Environment::with_prefix("DENTORA")
                .try_parsing(true)
                .separator("__"),
        );
        let cfg = builder
            .build()
            .map_err(|e| format!("config build error: {e}"))?;
        let merged: AppConfig = cfg
            .try_deserialize()
            .map_err(|e| format!("config deserialize error: {e}"))?;
        merged.validate()?;
        Ok(merged)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let cfg = AppConfig::default();
        assert!(cfg.validate().is_ok());
        assert_eq!(cfg.storage.backend, StorageBackend::Memory);
        assert_eq!(cfg.addr().port(), 8085);
    }

    #[test]
    fn test_postgres_backend_requires_section() {
        let cfg = AppConfig {
            storage: StorageConfig {
                backend: StorageBackend::Postgres,
                postgres: None,
            },
            ..Default::default()
        };
        assert!(cfg.validate().unwrap_err().contains("storage.postgres"));
    }

    #[test]
    fn test_auth_requires_tokens() {
        let cfg = AppConfig {
            auth: AuthConfig {
                enabled: true,
                tokens: Vec::new(),
            },
            ..Default::default()
        };
        assert!(cfg.validate().unwrap_err().contains("auth.tokens"));
    }

    #[test]
    fn test_bad_log_level_rejected() {
        let cfg = AppConfig {
            logging: LoggingConfig {
                level: "verbose".to_string(),
            },
            ..Default::default()
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_invalid_host_falls_back_to_any() {
        let cfg = AppConfig {
            server: ServerConfig {
                host: "not-an-ip".to_string(),
                ..Default::default()
            },
            ..Default::default()
        };
        assert!(cfg.addr().ip().is_unspecified());
    }
}
