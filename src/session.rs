//! In-memory registry of live tunnels, keyed by tunnel uuid.
//!
//! Transports register a tunnel when its session starts and remove it when
//! the session ends; other parts of a deployment (download/upload
//! endpoints) look tunnels up here to start intercepts.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use uuid::Uuid;

use crate::tunnel::{InterceptingTunnel, Tunnel};

#[derive(Default)]
pub struct SessionRegistry {
    sessions: RwLock<HashMap<Uuid, Arc<InterceptingTunnel>>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Track a tunnel. Returns the tunnel previously registered under the
    /// same uuid, if any.
    pub fn add(&self, tunnel: Arc<InterceptingTunnel>) -> Option<Arc<InterceptingTunnel>> {
        let uuid = tunnel.uuid();
        let prior = self.sessions.write().insert(uuid, tunnel);
        debug!("session registered (uuid: {uuid}, active: {})", self.len());
        prior
    }

    /// Stop tracking a tunnel.
    pub fn remove(&self, uuid: Uuid) -> Option<Arc<InterceptingTunnel>> {
        let removed = self.sessions.write().remove(&uuid);
        if removed.is_some() {
            debug!("session removed (uuid: {uuid}, active: {})", self.len());
        }
        removed
    }

    pub fn get(&self, uuid: Uuid) -> Option<Arc<InterceptingTunnel>> {
        self.sessions.read().get(&uuid).cloned()
    }

    /// Uuids and guacd connection ids of every live session.
    pub fn list(&self) -> Vec<(Uuid, String)> {
        self.sessions
            .read()
            .iter()
            .map(|(uuid, tunnel)| (*uuid, tunnel.connection_id()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.sessions.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.read().is_empty()
    }
}
