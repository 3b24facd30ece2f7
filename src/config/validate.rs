use anyhow::{Result, bail};

use super::{AppConfig, SameSite};

pub fn validate(cfg: &AppConfig) -> Result<()> {
    let mut errors: Vec<String> = Vec::new();

    if cfg.general.host.trim().is_empty() {
        errors.push("HOST must not be empty".to_string());
    }

    if cfg.database.url.trim().is_empty() {
        errors.push("DATABASE_URL must not be empty".to_string());
    }

    if cfg.database.min_idle > cfg.database.max_connections {
        errors.push(format!(
            "DB_MIN_IDLE ({}) must be <= DB_MAX_CONNS ({})",
            cfg.database.min_idle, cfg.database.max_connections
        ));
    }

    let session = &cfg.session;
    if session.jwt_secret.trim().is_empty() {
        errors.push("JWT_SECRET must not be empty".to_string());
    }

    if session.token_pepper.trim().is_empty() {
        errors.push("TOKEN_PEPPER must not be empty".to_string());
    }

    if session.access_token_ttl_secs == 0 {
        errors.push("ACCESS_TOKEN_TTL must be > 0".to_string());
    }

    if session.refresh_idle_ttl_secs == 0 {
        errors.push("REFRESH_IDLE_TTL must be > 0".to_string());
    }

    if session.refresh_abs_ttl_secs == 0 {
        errors.push("REFRESH_ABS_TTL must be > 0".to_string());
    }

    if session.refresh_idle_ttl_secs > session.refresh_abs_ttl_secs {
        errors.push(format!(
            "REFRESH_IDLE_TTL ({}) must be <= REFRESH_ABS_TTL ({})",
            session.refresh_idle_ttl_secs, session.refresh_abs_ttl_secs
        ));
    }

    // Browsers drop SameSite=None cookies that are not also Secure.
    if session.cookie.same_site == SameSite::None && !session.cookie.secure {
        errors.push("COOKIE_SAMESITE=none requires COOKIE_SECURE=true".to_string());
    }

    if errors.is_empty() {
        return Ok(());
    }

    bail!("invalid app config:\n- {}", errors.join("\n- "))
}
