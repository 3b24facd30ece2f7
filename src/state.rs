use std::sync::Arc;

use sea_orm::DatabaseConnection;

use crate::{config::AppConfig, db::dao::DaoContext, session::SessionAuthority};

#[derive(Clone)]
pub struct AppState {
    pub config: AppConfig,
    pub db: DatabaseConnection,
    pub sessions: SessionAuthority,
}

impl AppState {
    pub fn new(config: AppConfig, db: DatabaseConnection) -> Arc<Self> {
        let sessions =
            SessionAuthority::from_config(DaoContext::new(&db).refresh_token(), &config.session);
        Self::with_sessions(config, db, sessions)
    }

    pub fn with_sessions(
        config: AppConfig,
        db: DatabaseConnection,
        sessions: SessionAuthority,
    ) -> Arc<Self> {
        Arc::new(Self {
            config,
            db,
            sessions,
        })
    }
}
