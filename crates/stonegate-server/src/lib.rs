//! WebSocket server and RPC router (C8): connection lifecycle, broadcast,
//! and message dispatch over the device registry, physics engine, and
//! recorder built by the other stonegate crates.

pub mod action_map;
pub mod broadcast;
pub mod dispatch;
pub mod error;
pub mod rpc_methods;
pub mod state;
pub mod ws;

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use axum::routing::get;
use axum::Router;
use stonegate_core::{DeviceRegistry, PhysicsEngine, Recorder};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tracing::info;

pub use state::AppState;

/// Owns the listening socket and the background broadcast task. `start` is
/// idempotent: a second call on an already-running server is a no-op.
pub struct StonegateServer {
    state: Arc<AppState>,
    running: Arc<AtomicBool>,
    broadcast_task: std::sync::Mutex<Option<JoinHandle<()>>>,
    accept_task: std::sync::Mutex<Option<JoinHandle<()>>>,
}

impl StonegateServer {
    pub fn new(
        registry: Arc<DeviceRegistry>,
        physics: Arc<PhysicsEngine>,
        recorder: Arc<Recorder>,
        port: u16,
        git_commit: String,
        build_time: String,
    ) -> Self {
        let state = Arc::new(AppState {
            registry,
            physics,
            recorder,
            sessions: std::sync::Mutex::new(std::collections::HashMap::new()),
            port,
            git_commit,
            build_time,
        });
        Self {
            state,
            running: Arc::new(AtomicBool::new(false)),
            broadcast_task: std::sync::Mutex::new(None),
            accept_task: std::sync::Mutex::new(None),
        }
    }

    pub fn state(&self) -> Arc<AppState> {
        Arc::clone(&self.state)
    }

    /// Binds the listening socket and starts the accept/read and broadcast
    /// background tasks. Idempotent.
    pub async fn start(&self, addr: SocketAddr) -> std::io::Result<()> {
        if self.running.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        let listener = TcpListener::bind(addr).await?;
        info!(%addr, "stonegate server listening");

        let app = Router::new().route("/ws", get(ws::ws_handler)).with_state(Arc::clone(&self.state));

        let running = Arc::clone(&self.running);
        let accept_running = Arc::clone(&running);
        let accept_task = tokio::spawn(async move {
            let server = axum::serve(listener, app);
            tokio::select! {
                result = server => {
                    if let Err(err) = result {
                        tracing::error!(error = %err, "accept loop exited with error");
                    }
                }
                _ = wait_for_stop(accept_running) => {}
            }
        });
        *self.accept_task.lock().unwrap() = Some(accept_task);

        let broadcast_state = Arc::clone(&self.state);
        let broadcast_running = Arc::clone(&running);
        let broadcast_task = tokio::spawn(broadcast::run(broadcast_state, broadcast_running));
        *self.broadcast_task.lock().unwrap() = Some(broadcast_task);

        Ok(())
    }

    /// Signals the accept and broadcast tasks to stop and drops the
    /// recorder's reference held by this server (outstanding sessions keep
    /// running until their own `stop` is called).
    pub async fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(task) = self.broadcast_task.lock().unwrap().take() {
            let _ = task.await;
        }
        if let Some(task) = self.accept_task.lock().unwrap().take() {
            task.abort();
        }
    }
}

async fn wait_for_stop(running: Arc<AtomicBool>) {
    while running.load(Ordering::SeqCst) {
        tokio::time::sleep(std::time::Duration::from_millis(100)).await;
    }
}
