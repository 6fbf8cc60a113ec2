//! Admin console
//!
//! Lines typed by the operator go straight into the broadcast engine as
//! messages from `Admin`. `/quit` asks the process owner to shut down.
//!
//! Stdin is read on a plain OS thread. A blocking read there can't be
//! cancelled, and on a runtime blocking thread it would keep the runtime
//! from shutting down until the operator pressed Enter.

use std::io::BufRead;
use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::message::Message;
use crate::server::ChatServer;

/// Command that stops the server
pub const QUIT_COMMAND: &str = "/quit";

/// Why the console stopped reading
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdminExit {
    /// Operator asked for shutdown
    Quit,
    /// Input ended or failed; the server keeps running
    InputClosed,
}

/// Forward stdin lines over a channel from a dedicated thread
///
/// The thread ends on end of input, on a read error or once the receiver
/// is gone. It is never joined, so the process can exit while it is still
/// blocked in a read.
pub fn spawn_stdin_reader() -> mpsc::UnboundedReceiver<String> {
    let (tx, rx) = mpsc::unbounded_channel();

    std::thread::spawn(move || {
        let stdin = std::io::stdin();
        for line in stdin.lock().lines() {
            match line {
                Ok(line) => {
                    if tx.send(line).is_err() {
                        break;
                    }
                }
                Err(e) => {
                    warn!("Admin console input failed: {}", e);
                    break;
                }
            }
        }
    });

    rx
}

/// Broadcast operator lines until `/quit` or end of input
pub async fn run_admin_console(
    server: Arc<ChatServer>,
    mut input: mpsc::UnboundedReceiver<String>,
) -> AdminExit {
    while let Some(line) = input.recv().await {
        let text = line.trim_end();
        if text == QUIT_COMMAND {
            info!("Quit requested from admin console");
            return AdminExit::Quit;
        }
        if !text.is_empty() {
            server.broadcast(Message::admin(text)).await;
        }
    }
    AdminExit::InputClosed
}
