//! Broadcast engine
//!
//! Fan-out of one message to every registered client except its author,
//! plus history append, log hand-off and observer notification.
//!
//! The registry write lock is held for the whole fan-out, including the
//! writes to each peer. Writes to the recipients of one broadcast run
//! concurrently and are each bounded by the per-write deadline, so a stalled
//! peer holds up other broadcasts for at most one deadline. Peers whose
//! write fails are left alone here; their own session notices the broken
//! connection and unregisters them.

use futures_util::future::join_all;
use tracing::{debug, warn};

use crate::client::Client;
use crate::error::RegisterError;
use crate::message::Message;
use crate::notify::Signal;
use crate::registry::RegistryState;
use crate::server::ChatServer;
use crate::types::ConnectionId;

impl ChatServer {
    /// Store `msg` and deliver it to everyone but its sender
    ///
    /// Messages with empty text are ignored.
    pub async fn broadcast(&self, msg: Message) {
        if msg.text.is_empty() {
            return;
        }

        {
            let mut state = self.registry.write().await;
            self.deliver(&mut state, msg).await;
        }

        let _ = self.notifier.notify(Signal::HistoryChanged).await;
    }

    /// Register `client`, replay history to it and announce it
    ///
    /// Registration, replay and announcement happen in one critical section,
    /// so the new client sees every message exactly once: either in the
    /// replay or as a live broadcast.
    pub async fn join(&self, client: Client) -> Result<(), RegisterError> {
        let name = client.name.clone();
        let id = client.id;

        {
            let mut state = self.registry.write().await;
            state.try_register(client.clone())?;

            let mut replay = String::new();
            for msg in state.history() {
                replay.push_str(&msg.to_string());
                replay.push('\n');
            }
            replay.push_str(&Message::prompt(&name));
            if let Err(e) = client.send(&replay).await {
                warn!("Failed to send history to '{}': {}", name, e);
            }

            self.deliver(&mut state, Message::joined(&name, id)).await;
        }

        debug!("'{}' joined", name);
        let _ = self.notifier.notify(Signal::ClientsChanged).await;
        let _ = self.notifier.notify(Signal::HistoryChanged).await;
        Ok(())
    }

    /// Unregister `id` and announce the departure
    ///
    /// Does nothing if the client was already gone.
    pub async fn leave(&self, id: ConnectionId) {
        let name = {
            let mut state = self.registry.write().await;
            let Some(client) = state.unregister(id) else {
                return;
            };
            self.deliver(&mut state, Message::left(&client.name, id)).await;
            client.name
        };

        debug!("'{}' left", name);
        let _ = self.notifier.notify(Signal::ClientsChanged).await;
        let _ = self.notifier.notify(Signal::HistoryChanged).await;
    }

    /// Unregister `id` without telling anyone; used while shutting down
    pub async fn drop_client(&self, id: ConnectionId) {
        if self.registry.unregister(id).await.is_some() {
            let _ = self.notifier.notify(Signal::ClientsChanged).await;
        }
    }

    /// Append, log and fan out while the caller holds the write lock
    async fn deliver(&self, state: &mut RegistryState, msg: Message) {
        if msg.text.is_empty() {
            return;
        }

        let line = format!("\n{}", msg);
        let sender = msg.sender;
        self.log.submit(msg.clone());
        state.append(msg);

        let recipients: Vec<&Client> = state.recipients(sender).collect();
        send_all(&recipients, |_| line.clone()).await;
        send_all(&recipients, |c| format!("\n{}", Message::prompt(&c.name))).await;
    }
}

/// Write to every recipient concurrently, logging failures
async fn send_all<F>(recipients: &[&Client], render: F)
where
    F: Fn(&Client) -> String,
{
    let writes = recipients.iter().map(|client| {
        let text = render(client);
        async move {
            if let Err(e) = client.send(&text).await {
                warn!("Failed to write to '{}': {}", client.name, e);
            }
        }
    });
    join_all(writes).await;
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use tokio::io::{AsyncReadExt, DuplexStream};

    use super::*;
    use crate::client::Outbound;
    use crate::config::ServerConfig;
    use crate::log_sink::{LogEntry, LogIntake};
    use crate::notify::Notifications;

    fn server() -> (Arc<ChatServer>, Notifications, tokio::sync::mpsc::Receiver<LogEntry>) {
        let (intake, log_rx) = LogIntake::channel(64);
        let (server, notifications) = ChatServer::new(ServerConfig::default(), intake);
        (server, notifications, log_rx)
    }

    fn peer(name: &str) -> (Client, DuplexStream) {
        let (local, remote) = tokio::io::duplex(16 * 1024);
        let client = Client::new(
            ConnectionId::new(),
            name,
            Outbound::new(local, Duration::from_millis(500)),
        );
        (client, remote)
    }

    /// Everything currently buffered on `stream`
    async fn drain(stream: &mut DuplexStream) -> String {
        let mut out = Vec::new();
        let mut buf = [0u8; 4096];
        while let Ok(Ok(n)) =
            tokio::time::timeout(Duration::from_millis(50), stream.read(&mut buf)).await
        {
            if n == 0 {
                break;
            }
            out.extend_from_slice(&buf[..n]);
        }
        String::from_utf8(out).unwrap()
    }

    #[tokio::test]
    async fn test_broadcast_excludes_sender() {
        let (server, _notifications, _log) = server();
        let (alice, mut alice_rx) = peer("alice");
        let (bob, mut bob_rx) = peer("bob");
        let (carol, mut carol_rx) = peer("carol");
        let alice_id = alice.id;

        server.join(alice).await.unwrap();
        server.join(bob).await.unwrap();
        server.join(carol).await.unwrap();
        drain(&mut alice_rx).await;
        drain(&mut bob_rx).await;
        drain(&mut carol_rx).await;

        server.broadcast(Message::chat("alice", alice_id, "hi all")).await;

        assert!(!drain(&mut alice_rx).await.contains("hi all"));
        let bob_out = drain(&mut bob_rx).await;
        assert!(bob_out.contains("[alice]: hi all"));
        assert!(bob_out.ends_with("][bob]: "));
        assert!(drain(&mut carol_rx).await.contains("[alice]: hi all"));
    }

    #[tokio::test]
    async fn test_admin_message_reaches_everyone() {
        let (server, _notifications, _log) = server();
        let (alice, mut alice_rx) = peer("alice");
        let (bob, mut bob_rx) = peer("bob");
        server.join(alice).await.unwrap();
        server.join(bob).await.unwrap();
        drain(&mut alice_rx).await;
        drain(&mut bob_rx).await;

        server.broadcast(Message::admin("maintenance at noon")).await;

        assert!(drain(&mut alice_rx).await.contains("[Admin]: maintenance at noon"));
        assert!(drain(&mut bob_rx).await.contains("[Admin]: maintenance at noon"));
    }

    #[tokio::test]
    async fn test_empty_message_is_ignored() {
        let (server, _notifications, mut log) = server();
        server.broadcast(Message::admin("")).await;

        assert!(server.registry().snapshot_history(10).await.is_empty());
        assert!(log.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_broadcast_appends_logs_and_signals() {
        let (server, mut notifications, mut log) = server();

        server.broadcast(Message::admin("first")).await;
        server.broadcast(Message::admin("second")).await;

        let history = server.registry().snapshot_history(10).await;
        let texts: Vec<_> = history.iter().map(|m| m.text.as_str()).collect();
        assert_eq!(texts, vec!["first", "second"]);

        for expected in ["first", "second"] {
            match log.try_recv().unwrap() {
                LogEntry::Record(msg) => assert_eq!(msg.text, expected),
                other => panic!("unexpected entry {:?}", other),
            }
        }
        assert!(notifications.history.try_recv().is_ok());
    }

    #[tokio::test]
    async fn test_join_replays_history_then_prompts() {
        let (server, _notifications, _log) = server();
        server.broadcast(Message::admin("welcome everyone")).await;

        let (alice, mut alice_rx) = peer("alice");
        server.join(alice).await.unwrap();

        let out = drain(&mut alice_rx).await;
        assert!(out.starts_with('['));
        assert!(out.contains("[Admin]: welcome everyone\n"));
        assert!(out.ends_with("][alice]: "));
        assert!(!out.contains("has joined"));
    }

    #[tokio::test]
    async fn test_join_announces_to_others() {
        let (server, mut notifications, _log) = server();
        let (alice, mut alice_rx) = peer("alice");
        server.join(alice).await.unwrap();
        drain(&mut alice_rx).await;

        let (bob, _bob_rx) = peer("bob");
        server.join(bob).await.unwrap();

        assert!(drain(&mut alice_rx).await.contains("\nbob has joined our chat...\n"));
        assert!(notifications.clients.try_recv().is_ok());
    }

    #[tokio::test]
    async fn test_join_duplicate_leaves_registry_untouched() {
        let (server, _notifications, _log) = server();
        let (alice, _alice_rx) = peer("alice");
        server.join(alice).await.unwrap();

        let (imposter, mut imposter_rx) = peer("alice");
        assert_eq!(server.join(imposter).await, Err(RegisterError::Duplicate));
        assert_eq!(server.registry().client_count().await, 1);
        assert!(drain(&mut imposter_rx).await.is_empty());
    }

    #[tokio::test]
    async fn test_leave_announces_once() {
        let (server, _notifications, _log) = server();
        let (alice, mut alice_rx) = peer("alice");
        let (bob, _bob_rx) = peer("bob");
        let bob_id = bob.id;
        server.join(alice).await.unwrap();
        server.join(bob).await.unwrap();
        drain(&mut alice_rx).await;

        server.leave(bob_id).await;
        server.leave(bob_id).await;

        let out = drain(&mut alice_rx).await;
        assert_eq!(out.matches("bob has left our chat...").count(), 1);
        assert_eq!(server.registry().snapshot_clients().await, vec!["alice".to_string()]);
    }

    #[tokio::test]
    async fn test_dead_peer_does_not_block_broadcast() {
        let (server, _notifications, _log) = server();
        let (alice, mut alice_rx) = peer("alice");
        let (bob, bob_rx) = peer("bob");
        server.join(alice).await.unwrap();
        server.join(bob).await.unwrap();
        drop(bob_rx);
        drain(&mut alice_rx).await;

        server.broadcast(Message::admin("still here")).await;

        assert!(drain(&mut alice_rx).await.contains("still here"));
        assert_eq!(server.registry().snapshot_history(10).await.len(), 3);
    }
}
