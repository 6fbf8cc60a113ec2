//! Operator dashboard
//!
//! Consumes the notification signals and re-renders from a fresh registry
//! snapshot each time. Signals carry no data, so a dropped or coalesced
//! one only delays a redraw.

use std::io::Write;
use std::sync::Arc;

use tracing::debug;

use crate::message::Message;
use crate::notify::Notifications;
use crate::server::{wait_for_shutdown, ChatServer};

/// Render target for the two read-only panels
pub trait Dashboard: Send + Sync {
    /// Most recent messages, oldest first
    fn render_history(&self, recent: &[Message]);

    /// Names of connected clients, order unspecified
    fn render_clients(&self, names: &[String]);
}

/// Prints both panels to stdout
#[derive(Debug, Default)]
pub struct ConsoleDashboard;

impl Dashboard for ConsoleDashboard {
    fn render_history(&self, recent: &[Message]) {
        let stdout = std::io::stdout();
        let mut out = stdout.lock();
        let _ = writeln!(out, " - General Chat");
        for msg in recent {
            let _ = writeln!(out, "{}", msg);
        }
    }

    fn render_clients(&self, names: &[String]) {
        let stdout = std::io::stdout();
        let mut out = stdout.lock();
        let _ = writeln!(out, "Connected Users");
        for name in names {
            let _ = writeln!(out, " - {}", name);
        }
    }
}

/// Redraw on every signal until shutdown or until both queues close
pub async fn run_dashboard<D: Dashboard>(
    server: Arc<ChatServer>,
    mut notifications: Notifications,
    dashboard: D,
) {
    let limit = server.config.dashboard_history;
    let mut shutdown = server.shutdown_signal();
    let mut history_open = true;
    let mut clients_open = true;

    dashboard.render_history(&server.registry.snapshot_history(limit).await);
    dashboard.render_clients(&server.registry.snapshot_clients().await);

    while history_open || clients_open {
        tokio::select! {
            signal = notifications.history.recv(), if history_open => match signal {
                Some(()) => {
                    let recent = server.registry.snapshot_history(limit).await;
                    dashboard.render_history(&recent);
                }
                None => history_open = false,
            },
            signal = notifications.clients.recv(), if clients_open => match signal {
                Some(()) => {
                    let names = server.registry.snapshot_clients().await;
                    dashboard.render_clients(&names);
                }
                None => clients_open = false,
            },
            _ = wait_for_shutdown(&mut shutdown) => break,
        }
    }

    debug!("Dashboard stopped");
}
