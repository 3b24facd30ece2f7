use std::time::Duration;

use tokio::{
    task::JoinHandle,
    time::{MissedTickBehavior, interval},
};
use tracing::{debug, error, info};

use super::SessionAuthority;

/// Periodically deletes refresh tokens past their absolute expiry.
///
/// Returns `None` when `every` is zero, which disables sweeping.
pub fn spawn_sweeper(authority: SessionAuthority, every: Duration) -> Option<JoinHandle<()>> {
    if every.is_zero() {
        info!("expired session sweeper disabled");
        return None;
    }

    Some(tokio::spawn(async move {
        let mut ticker = interval(every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            match authority.sweep_expired().await {
                Ok(0) => debug!("no expired sessions to sweep"),
                Ok(deleted) => info!(deleted, "swept expired sessions"),
                Err(err) => error!(error = %err, "expired session sweep failed"),
            }
        }
    }))
}
