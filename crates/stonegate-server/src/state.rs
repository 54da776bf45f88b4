use std::collections::HashMap;
use std::sync::Arc;

use axum::extract::ws::Message as WsMessage;
use stonegate_core::{DeviceRegistry, PhysicsEngine, Recorder};
use tokio::sync::mpsc;
use uuid::Uuid;

/// Shared server state. Devices, physics, and the recorder are already
/// internally synchronized; `sessions` is the one collection this crate
/// owns directly, behind its own mutex per the single-mutex-around-a-map
/// convention used throughout the core crate.
pub struct AppState {
    pub registry: Arc<DeviceRegistry>,
    pub physics: Arc<PhysicsEngine>,
    pub recorder: Arc<Recorder>,
    pub sessions: std::sync::Mutex<HashMap<Uuid, mpsc::UnboundedSender<WsMessage>>>,
    pub port: u16,
    pub git_commit: String,
    pub build_time: String,
}

impl AppState {
    pub fn register_session(&self, id: Uuid, sender: mpsc::UnboundedSender<WsMessage>) {
        self.sessions.lock().unwrap().insert(id, sender);
    }

    pub fn remove_session(&self, id: Uuid) {
        self.sessions.lock().unwrap().remove(&id);
    }

    /// Send `text` to every live session. Write errors (the peer closed
    /// without the read loop noticing yet) are ignored; that loop reaps the
    /// session on its next failed read.
    pub fn broadcast(&self, text: String) {
        let sessions = self.sessions.lock().unwrap();
        for sender in sessions.values() {
            let _ = sender.send(WsMessage::Text(text.clone().into()));
        }
    }
}
