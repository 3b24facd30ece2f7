use sea_orm::DatabaseConnection;

use crate::{
    db::dao::DaoContext,
    services::{auth_service::AuthService, user_service::UserService},
    session::SessionAuthority,
    state::AppState,
};

#[derive(Clone)]
pub struct ServiceContext {
    daos: DaoContext,
}

impl ServiceContext {
    pub fn new(db: &DatabaseConnection) -> Self {
        Self {
            daos: DaoContext::new(db),
        }
    }

    pub fn from_state(state: &AppState) -> Self {
        Self::new(&state.db)
    }

    pub fn user(&self) -> UserService {
        UserService::new(self.daos.user())
    }

    pub fn auth<'a>(&self, sessions: &'a SessionAuthority) -> AuthService<'a> {
        AuthService::new(self.user(), sessions)
    }
}
