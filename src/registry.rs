//! Connection registry
//!
//! The single shared table of authenticated clients plus the message
//! history. Everything lives behind one `RwLock`; callers only ever get
//! copies out of it.

use std::collections::HashMap;

use tokio::sync::{RwLock, RwLockWriteGuard};
use tracing::debug;

use crate::client::Client;
use crate::error::RegisterError;
use crate::message::Message;
use crate::types::ConnectionId;

/// State guarded by the registry lock
#[derive(Debug)]
pub struct RegistryState {
    clients: HashMap<ConnectionId, Client>,
    history: Vec<Message>,
    max_clients: usize,
}

impl RegistryState {
    fn new(max_clients: usize) -> Self {
        Self {
            clients: HashMap::new(),
            history: Vec::new(),
            max_clients,
        }
    }

    /// Insert `client` unless the table is full or its name is taken
    pub fn try_register(&mut self, client: Client) -> Result<(), RegisterError> {
        if self.is_full() {
            return Err(RegisterError::Full);
        }
        if self.name_taken(&client.name) {
            return Err(RegisterError::Duplicate);
        }
        debug!(
            "Registered '{}' ({}), {} clients",
            client.name,
            client.id.short(),
            self.clients.len() + 1
        );
        self.clients.insert(client.id, client);
        Ok(())
    }

    pub fn unregister(&mut self, id: ConnectionId) -> Option<Client> {
        self.clients.remove(&id)
    }

    pub fn append(&mut self, msg: Message) {
        self.history.push(msg);
    }

    pub fn history(&self) -> &[Message] {
        &self.history
    }

    /// Case-sensitive name lookup
    pub fn name_taken(&self, name: &str) -> bool {
        self.clients.values().any(|c| c.name == name)
    }

    pub fn is_full(&self) -> bool {
        self.clients.len() >= self.max_clients
    }

    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }

    /// Every registered client except the one holding `exclude`
    pub fn recipients(&self, exclude: Option<ConnectionId>) -> impl Iterator<Item = &Client> {
        self.clients
            .values()
            .filter(move |c| Some(c.id) != exclude)
    }
}

/// Shared client table and history
#[derive(Debug)]
pub struct Registry {
    state: RwLock<RegistryState>,
}

impl Registry {
    pub fn new(max_clients: usize) -> Self {
        Self {
            state: RwLock::new(RegistryState::new(max_clients)),
        }
    }

    pub async fn try_register(&self, client: Client) -> Result<(), RegisterError> {
        self.state.write().await.try_register(client)
    }

    /// Remove the client if present; no-op otherwise
    pub async fn unregister(&self, id: ConnectionId) -> Option<Client> {
        self.state.write().await.unregister(id)
    }

    pub async fn append_history(&self, msg: Message) {
        self.state.write().await.append(msg);
    }

    /// Names of all registered clients, order unspecified
    pub async fn snapshot_clients(&self) -> Vec<String> {
        self.state
            .read()
            .await
            .clients
            .values()
            .map(|c| c.name.clone())
            .collect()
    }

    /// The most recent `limit` messages, oldest first
    pub async fn snapshot_history(&self, limit: usize) -> Vec<Message> {
        let state = self.state.read().await;
        let start = state.history.len().saturating_sub(limit);
        state.history[start..].to_vec()
    }

    pub async fn client_count(&self) -> usize {
        self.state.read().await.len()
    }

    pub async fn is_name_taken(&self, name: &str) -> bool {
        self.state.read().await.name_taken(name)
    }

    /// Exclusive access for the broadcast engine
    pub(crate) async fn write(&self) -> RwLockWriteGuard<'_, RegistryState> {
        self.state.write().await
    }

    #[cfg(test)]
    pub(crate) async fn read(&self) -> tokio::sync::RwLockReadGuard<'_, RegistryState> {
        self.state.read().await
    }
}
