use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use stonegate_core::descriptor_protocol::build_measurement_update;
use tracing::instrument;

use crate::state::AppState;

const BROADCAST_INTERVAL: Duration = Duration::from_millis(500);

/// Every 500 ms, build a measurement update and fan it out to every live
/// session. Returns once `running` clears.
#[instrument(skip(state, running))]
pub async fn run(state: Arc<AppState>, running: Arc<AtomicBool>) {
    while running.load(Ordering::SeqCst) {
        let update = build_measurement_update(&state.registry);
        if let Ok(payload) = serde_json::to_string(&update) {
            state.broadcast(payload);
        }
        tokio::time::sleep(BROADCAST_INTERVAL).await;
    }
}
