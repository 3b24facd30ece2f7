use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use super::{defaults, envconfig::EnvConfig, validate};
use crate::db::connection::redact_url;

/// Raw environment, one field per variable.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct EnvSettings {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub rust_log: Option<String>,
    pub database_url: Option<String>,
    pub db_max_conns: Option<u32>,
    pub db_min_idle: Option<u32>,
    pub jwt_secret: Option<String>,
    pub secret_key: Option<String>,
    pub token_pepper: Option<String>,
    pub access_token_ttl: Option<u64>,
    pub refresh_idle_ttl: Option<u64>,
    pub refresh_abs_ttl: Option<u64>,
    pub cookie_secure: Option<bool>,
    pub cookie_samesite: Option<String>,
    pub cookie_domain: Option<String>,
    pub session_sweep_interval: Option<u64>,
}

impl EnvConfig for EnvSettings {}

#[derive(Debug, Clone, Serialize)]
pub struct AppConfig {
    pub general: GeneralConfig,
    pub logging: LoggingConfig,
    pub database: DatabaseConfig,
    pub session: SessionConfig,
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_settings(EnvSettings::from_env()?)
    }

    pub fn from_settings(raw: EnvSettings) -> Result<Self> {
        let cfg = Self {
            general: GeneralConfig {
                host: raw.host.unwrap_or_else(|| defaults::DEFAULT_HOST.to_string()),
                port: raw.port.unwrap_or(defaults::DEFAULT_PORT),
            },
            logging: LoggingConfig {
                rust_log: raw
                    .rust_log
                    .unwrap_or_else(|| defaults::DEFAULT_RUST_LOG.to_string()),
            },
            database: DatabaseConfig {
                url: required_in_release(
                    raw.database_url,
                    "DATABASE_URL",
                    defaults::DEV_DATABASE_URL,
                )?,
                max_connections: raw
                    .db_max_conns
                    .unwrap_or(defaults::DEFAULT_DB_MAX_CONNECTIONS),
                min_idle: raw.db_min_idle.unwrap_or(defaults::DEFAULT_DB_MIN_IDLE),
            },
            session: SessionConfig {
                jwt_secret: required_in_release(
                    non_blank(raw.jwt_secret).or_else(|| non_blank(raw.secret_key)),
                    "JWT_SECRET (or SECRET_KEY)",
                    defaults::DEV_JWT_SECRET,
                )?,
                token_pepper: required_in_release(
                    non_blank(raw.token_pepper),
                    "TOKEN_PEPPER",
                    defaults::DEV_TOKEN_PEPPER,
                )?,
                access_token_ttl_secs: raw
                    .access_token_ttl
                    .unwrap_or(defaults::DEFAULT_ACCESS_TOKEN_TTL_SECS),
                refresh_idle_ttl_secs: raw
                    .refresh_idle_ttl
                    .unwrap_or(defaults::DEFAULT_REFRESH_IDLE_TTL_SECS),
                refresh_abs_ttl_secs: raw
                    .refresh_abs_ttl
                    .unwrap_or(defaults::DEFAULT_REFRESH_ABS_TTL_SECS),
                sweep_interval_secs: raw
                    .session_sweep_interval
                    .unwrap_or(defaults::DEFAULT_SWEEP_INTERVAL_SECS),
                cookie: CookieConfig {
                    secure: raw.cookie_secure.unwrap_or(defaults::DEFAULT_COOKIE_SECURE),
                    same_site: match raw.cookie_samesite {
                        Some(value) => value
                            .parse()
                            .map_err(|err: String| anyhow::anyhow!(err))
                            .context("COOKIE_SAMESITE must be lax, strict or none")?,
                        None => SameSite::Lax,
                    },
                    domain: non_blank(raw.cookie_domain),
                },
            },
        };

        validate::validate(&cfg)?;
        Ok(cfg)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct GeneralConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Serialize)]
pub struct LoggingConfig {
    pub rust_log: String,
}

#[derive(Clone, Serialize)]
pub struct DatabaseConfig {
    #[serde(skip_serializing)]
    pub url: String,
    pub max_connections: u32,
    pub min_idle: u32,
}

impl std::fmt::Debug for DatabaseConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DatabaseConfig")
            .field("url", &redact_url(&self.url))
            .field("max_connections", &self.max_connections)
            .field("min_idle", &self.min_idle)
            .finish()
    }
}

#[derive(Clone, Serialize)]
pub struct SessionConfig {
    #[serde(skip_serializing)]
    pub jwt_secret: String,
    #[serde(skip_serializing)]
    pub token_pepper: String,
    pub access_token_ttl_secs: u64,
    pub refresh_idle_ttl_secs: u64,
    pub refresh_abs_ttl_secs: u64,
    pub sweep_interval_secs: u64,
    pub cookie: CookieConfig,
}

impl std::fmt::Debug for SessionConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionConfig")
            .field("jwt_secret", &"<redacted>")
            .field("token_pepper", &"<redacted>")
            .field("access_token_ttl_secs", &self.access_token_ttl_secs)
            .field("refresh_idle_ttl_secs", &self.refresh_idle_ttl_secs)
            .field("refresh_abs_ttl_secs", &self.refresh_abs_ttl_secs)
            .field("sweep_interval_secs", &self.sweep_interval_secs)
            .field("cookie", &self.cookie)
            .finish()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CookieConfig {
    pub secure: bool,
    pub same_site: SameSite,
    pub domain: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SameSite {
    Lax,
    Strict,
    None,
}

impl SameSite {
    pub fn as_str(self) -> &'static str {
        match self {
            SameSite::Lax => "Lax",
            SameSite::Strict => "Strict",
            SameSite::None => "None",
        }
    }
}

impl std::str::FromStr for SameSite {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "lax" => Ok(SameSite::Lax),
            "strict" => Ok(SameSite::Strict),
            "none" => Ok(SameSite::None),
            other => Err(format!("unsupported SameSite value: {other}")),
        }
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

fn required_in_release(value: Option<String>, name: &str, dev_default: &str) -> Result<String> {
    match value {
        Some(val) => Ok(val),
        None if cfg!(debug_assertions) => Ok(dev_default.to_string()),
        None => anyhow::bail!("{name} is required in release builds"),
    }
}
