pub mod base;
mod context;
pub mod error;
pub mod refresh_token_dao;
pub mod user_dao;

pub use base::DaoBase;
pub use context::DaoContext;
pub use error::{DaoLayerError, DaoResult};
pub use refresh_token_dao::{NewRefreshToken, RefreshTokenDao, RotationOutcome};
pub use user_dao::UserDao;
