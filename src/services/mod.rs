pub mod auth_service;
pub mod context;
pub mod user_service;

pub use auth_service::AuthService;
pub use context::ServiceContext;
pub use user_service::UserService;
