use crate::{
    auth::{AuthenticatedUser, Claims},
    error::AppError,
    services::user_service::UserService,
    session::{IssuedSession, SessionAuthority},
};

/// Password checks in front of the session authority.
#[derive(Clone)]
pub struct AuthService<'a> {
    users: UserService,
    sessions: &'a SessionAuthority,
}

impl<'a> AuthService<'a> {
    pub fn new(users: UserService, sessions: &'a SessionAuthority) -> Self {
        Self { users, sessions }
    }

    pub async fn register(&self, email: &str, password: &str) -> Result<IssuedSession, AppError> {
        let user = self.users.register(email, password).await?;
        Ok(self
            .sessions
            .login(AuthenticatedUser { id: user.id })
            .await?)
    }

    pub async fn login(&self, email: &str, password: &str) -> Result<IssuedSession, AppError> {
        let user = self.users.authenticate(email, password).await?;
        Ok(self
            .sessions
            .login(AuthenticatedUser { id: user.id })
            .await?)
    }

    pub async fn refresh(
        &self,
        refresh_token: &str,
        csrf_header: Option<&str>,
        csrf_cookie: Option<&str>,
    ) -> Result<IssuedSession, AppError> {
        Ok(self
            .sessions
            .refresh(refresh_token, csrf_header, csrf_cookie)
            .await?)
    }

    pub async fn logout(&self, refresh_token: &str) -> Result<(), AppError> {
        Ok(self.sessions.logout(refresh_token).await?)
    }

    pub fn verify(&self, access_token: &str) -> Result<Claims, AppError> {
        Ok(self.sessions.verify_access_token(access_token)?)
    }
}
