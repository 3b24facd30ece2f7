use std::{path::Path, sync::Arc};

use axum::Router;
use chrono::{DateTime, TimeZone, Utc};
use sea_orm::{ConnectOptions, Database, DatabaseConnection};

use crate::{
    config::{AppConfig, EnvSettings},
    db::{connection::sync_schema, dao::DaoContext},
    routes::app,
    session::{ManualClock, SessionAuthority},
    state::AppState,
};

pub const TEST_JWT_SECRET: &str = "test-jwt-secret";
pub const TEST_TOKEN_PEPPER: &str = "test-token-pepper";

/// Fixed starting instant for clock-driven tests.
pub fn test_epoch() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 6, 1, 8, 0, 0)
        .single()
        .unwrap_or_else(Utc::now)
}

/// Config with short, distinct lifetimes: access 15 minutes, idle 1 hour, absolute 1 day.
pub fn test_config() -> AppConfig {
    AppConfig::from_settings(EnvSettings {
        database_url: Some("sqlite::memory:".to_string()),
        db_max_conns: Some(1),
        db_min_idle: Some(1),
        jwt_secret: Some(TEST_JWT_SECRET.to_string()),
        token_pepper: Some(TEST_TOKEN_PEPPER.to_string()),
        access_token_ttl: Some(15 * 60),
        refresh_idle_ttl: Some(60 * 60),
        refresh_abs_ttl: Some(24 * 60 * 60),
        cookie_secure: Some(false),
        session_sweep_interval: Some(0),
        ..Default::default()
    })
    .expect("test config should be valid")
}

/// A private in-memory SQLite database with the schema applied.
///
/// One connection only, so every query sees the same in-memory database.
pub async fn sqlite_db() -> DatabaseConnection {
    let mut options = ConnectOptions::new("sqlite::memory:");
    options
        .max_connections(1)
        .min_connections(1)
        .sqlx_logging(false);
    let db = Database::connect(options)
        .await
        .expect("sqlite should connect");
    sync_schema(&db).await.expect("schema should sync");
    db
}

/// A SQLite file shared by a pool of `max_connections`, so requests really overlap.
pub async fn sqlite_file_db(path: &Path, max_connections: u32) -> DatabaseConnection {
    let mut options = ConnectOptions::new(format!("sqlite://{}?mode=rwc", path.display()));
    options
        .max_connections(max_connections)
        .min_connections(1)
        .sqlx_logging(false);
    let db = Database::connect(options)
        .await
        .expect("sqlite file should open");
    sync_schema(&db).await.expect("schema should sync");
    db
}

/// App state over a fresh SQLite database whose authority reads `clock`.
pub async fn test_state(clock: &ManualClock) -> Arc<AppState> {
    test_state_with_db(clock, sqlite_db().await)
}

/// App state over `db` whose authority reads `clock`.
pub fn test_state_with_db(clock: &ManualClock, db: DatabaseConnection) -> Arc<AppState> {
    let cfg = test_config();
    let sessions =
        SessionAuthority::from_config(DaoContext::new(&db).refresh_token(), &cfg.session)
            .with_clock(Arc::new(clock.clone()));
    AppState::with_sessions(cfg, db, sessions)
}

pub fn test_app(state: Arc<AppState>) -> Router {
    app(state)
}
