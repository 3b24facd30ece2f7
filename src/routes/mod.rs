pub mod auth;
mod entry;
pub mod protected;
pub mod public;

pub use entry::{API_PREFIX, AUTH_PREFIX, app, router};
