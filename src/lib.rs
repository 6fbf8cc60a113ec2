//! Single-room TCP Chat Server Library
//!
//! A line-based chat server built on tokio. Clients connect over TCP, pick a
//! unique name and every line they type is broadcast to everyone else.
//!
//! # Features
//! - Name negotiation with up to 5 attempts
//! - At most 10 connected clients
//! - Full history replay for late joiners
//! - Join/leave announcements
//! - Admin console messages
//! - Append-only message log file
//! - Ordered shutdown that drains the log first
//!
//! # Architecture
//! One shared `ChatServer` context behind an `Arc`:
//! - The `Registry` holds clients and history behind a single `RwLock`
//! - Each connection runs a `session` task driving the name state machine
//! - The broadcast engine fans out while holding the registry write lock
//! - Observers are woken through lossy, bounded `notify` signals
//!
//! # Example
//! ```ignore
//! use tcp_chat::{ServerConfig, ServerHandle};
//!
//! #[tokio::main]
//! async fn main() {
//!     let handle = ServerHandle::bind(ServerConfig::default()).await.unwrap();
//!     tokio::signal::ctrl_c().await.unwrap();
//!     handle.shutdown().await.unwrap();
//! }
//! ```

pub mod admin;
pub mod broadcast;
pub mod client;
pub mod config;
pub mod dashboard;
pub mod error;
pub mod log_sink;
pub mod message;
pub mod notify;
pub mod registry;
pub mod server;
pub mod session;
pub mod shutdown;
pub mod types;

// Re-export main types for convenience
pub use admin::{run_admin_console, spawn_stdin_reader, AdminExit};
pub use client::Client;
pub use config::ServerConfig;
pub use dashboard::{run_dashboard, ConsoleDashboard, Dashboard};
pub use error::{AppError, NameError, RegisterError, SendError, SessionError};
pub use log_sink::{LogIntake, LogSink};
pub use message::Message;
pub use registry::Registry;
pub use server::{ChatServer, ServerHandle};
pub use session::handle_connection;
pub use types::ConnectionId;
