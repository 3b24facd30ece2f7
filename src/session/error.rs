use thiserror::Error;

use crate::db::dao::DaoLayerError;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("CSRF token missing or mismatched")]
    CsrfMismatch,
    #[error("Refresh token not recognized")]
    NotFound,
    #[error("Refresh token reuse detected; session revoked")]
    SessionReplayDetected,
    #[error("Session expired due to inactivity")]
    IdleTimeout,
    #[error("Session reached its maximum lifetime")]
    AbsoluteTimeout,
    #[error("Invalid access token")]
    InvalidSignature,
    #[error("Access token expired")]
    Expired,
    #[error(transparent)]
    Store(#[from] DaoLayerError),
    #[error("access token signing failed: {0}")]
    Signing(#[source] jsonwebtoken::errors::Error),
    #[error("secure random generator unavailable: {0}")]
    Randomness(#[from] rand::Error),
}

impl SessionError {
    /// True for the outcomes that send the client back to the login flow,
    /// false for infrastructure failures.
    pub fn is_rejection(&self) -> bool {
        !matches!(
            self,
            SessionError::Store(_) | SessionError::Signing(_) | SessionError::Randomness(_)
        )
    }
}
