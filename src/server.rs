//! ChatServer context and accept loop
//!
//! `ChatServer` is the one shared context every task holds an `Arc` to: the
//! registry, the notification producers, the log intake and the shutdown
//! flag. `ServerHandle` owns the background tasks and is what the process
//! owner uses to stop everything again.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::config::ServerConfig;
use crate::error::AppError;
use crate::log_sink::{LogIntake, LogSink};
use crate::notify::{self, Notifications, Notifier};
use crate::registry::Registry;
use crate::session::handle_connection;

/// Shared server context
#[derive(Debug)]
pub struct ChatServer {
    pub(crate) config: ServerConfig,
    pub(crate) registry: Registry,
    pub(crate) notifier: Notifier,
    pub(crate) log: LogIntake,
    shutdown: watch::Sender<bool>,
}

impl ChatServer {
    /// Create the context around an existing log intake
    ///
    /// Returns the consumer side of the notification queues alongside.
    pub fn new(config: ServerConfig, log: LogIntake) -> (Arc<Self>, Notifications) {
        let (notifier, notifications) = notify::channel(config.notify_capacity, config.notify_wait);
        let (shutdown, _) = watch::channel(false);
        let server = Arc::new(Self {
            registry: Registry::new(config.max_clients),
            config,
            notifier,
            log,
            shutdown,
        });
        (server, notifications)
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Receiver that flips to `true` once shutdown has begun
    pub fn shutdown_signal(&self) -> watch::Receiver<bool> {
        self.shutdown.subscribe()
    }

    /// Tell the accept loop and every session to stop
    pub(crate) fn begin_shutdown(&self) {
        self.shutdown.send_replace(true);
    }
}

/// Running server: context plus the tasks the shutdown sequence joins
pub struct ServerHandle {
    pub(crate) server: Arc<ChatServer>,
    pub(crate) local_addr: SocketAddr,
    pub(crate) accept_task: JoinHandle<()>,
    pub(crate) sink_task: JoinHandle<()>,
    pub(crate) notifications: Option<Notifications>,
}

impl ServerHandle {
    /// Bind the configured address and start serving
    ///
    /// A bind failure is the only error that stops the process.
    pub async fn bind(config: ServerConfig) -> Result<Self, AppError> {
        let addr = config.bind_addr();
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|source| AppError::Bind { addr, source })?;
        Self::start(config, listener).await
    }

    /// Start the log sink and the accept loop on an already bound listener
    pub async fn start(config: ServerConfig, listener: TcpListener) -> Result<Self, AppError> {
        let local_addr = listener.local_addr()?;

        let (intake, rx) = LogIntake::channel(config.log_queue_capacity);
        let sink = if config.log_enabled {
            LogSink::open(&config.log_dir, rx).await
        } else {
            LogSink::disabled(rx)
        };
        let sink_task = tokio::spawn(sink.run());

        let (server, notifications) = ChatServer::new(config, intake);
        let accept_task = tokio::spawn(accept_loop(server.clone(), listener));

        info!("Chat server listening on {}", local_addr);

        Ok(Self {
            server,
            local_addr,
            accept_task,
            sink_task,
            notifications: Some(notifications),
        })
    }

    pub fn server(&self) -> Arc<ChatServer> {
        self.server.clone()
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Consumer side of the notification queues, available once
    pub fn take_notifications(&mut self) -> Option<Notifications> {
        self.notifications.take()
    }
}

/// Resolve once the shutdown flag is set (or its sender is gone)
pub async fn wait_for_shutdown(rx: &mut watch::Receiver<bool>) {
    loop {
        if *rx.borrow_and_update() {
            return;
        }
        if rx.changed().await.is_err() {
            return;
        }
    }
}

/// Accept connections until shutdown; each one gets its own session task
async fn accept_loop(server: Arc<ChatServer>, listener: TcpListener) {
    let mut shutdown = server.shutdown_signal();

    loop {
        tokio::select! {
            accepted = listener.accept() => match accepted {
                Ok((stream, addr)) => {
                    info!("New connection from {}", addr);
                    let server = server.clone();

                    tokio::spawn(async move {
                        match handle_connection(server, stream, addr.to_string()).await {
                            Ok(()) => debug!("Connection {} closed", addr),
                            Err(e) if e.is_rejection() => {
                                info!("Connection {} rejected: {}", addr, e)
                            }
                            Err(e) => warn!("Connection {} ended with error: {}", addr, e),
                        }
                    });
                }
                Err(e) => {
                    error!("Failed to accept connection: {}", e);
                }
            },
            _ = wait_for_shutdown(&mut shutdown) => break,
        }
    }

    drop(listener);
    info!("Listener closed");
}
