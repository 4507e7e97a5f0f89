//! Periodic keepalive: asks the hub to ping every live connection.
//!
//! Pings only keep proxies and idle-timeout infrastructure from closing quiet
//! sockets; they do not detect dead peers.

use crate::ws::hub::HubHandle;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{MissedTickBehavior, interval};
use tracing::{debug, info};

/// Sends a tick to the hub every `period`, until the hub stops accepting events.
pub async fn run(hub: HubHandle, period: Duration) {
    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // The first tick completes immediately.
    ticker.tick().await;

    loop {
        ticker.tick().await;
        debug!("Keepalive tick.");
        if hub.tick().await.is_err() {
            info!("Hub closed. Stopping keepalive ticker.");
            break;
        }
    }
}

pub fn spawn(hub: HubHandle, period: Duration) -> JoinHandle<()> {
    tokio::spawn(run(hub, period))
}
