//! Refresh-token families, access-token issuance and their lifecycle.

mod authority;
mod clock;
pub mod cookies;
mod crypto;
mod error;
mod sweeper;

pub use authority::{IssuedSession, SessionAuthority, SessionPolicy};
pub use clock::{Clock, ManualClock, SystemClock};
pub use crypto::{TokenHasher, constant_time_eq, generate_opaque_token};
pub use error::SessionError;
pub use sweeper::spawn_sweeper;
