pub mod jwt;
pub mod password;
mod types;

pub use types::{AuthenticatedUser, Claims};
