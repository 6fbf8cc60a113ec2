//! Append-only message log
//!
//! The broadcast engine hands every stored message to a `LogIntake` without
//! blocking; a single `LogSink` task writes them, one formatted line each, to
//! a file named after the server start time. The shutdown sequence sends a
//! `Final` entry, which the sink writes, flushes and acknowledges before it
//! stops taking records.

use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::Local;
use tokio::fs::File;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::sync::oneshot;
use tokio::time;
use tracing::{debug, info, warn};

use crate::error::LogError;
use crate::message::{now_timestamp, Message};

/// Sender name written for records without one
pub const SYSTEM_NAME: &str = "System";

/// File name layout for the log, e.g. `2024-01-01_10-00-00.log`
const FILE_NAME_FORMAT: &str = "%Y-%m-%d_%H-%M-%S.log";

/// One item on the sink's intake
#[derive(Debug)]
pub enum LogEntry {
    Record(Message),
    /// Last record: write, flush, acknowledge, stop
    Final {
        message: Message,
        done: oneshot::Sender<()>,
    },
}

/// Producer side of the log
#[derive(Debug, Clone)]
pub struct LogIntake {
    tx: mpsc::Sender<LogEntry>,
}

impl LogIntake {
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<LogEntry>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self { tx }, rx)
    }

    /// Best-effort hand-off; never waits
    ///
    /// A saturated intake drops the record from the durable log only. The
    /// message itself is already in history.
    pub fn submit(&self, msg: Message) {
        match self.tx.try_send(LogEntry::Record(msg)) {
            Ok(()) => {}
            Err(TrySendError::Full(LogEntry::Record(msg))) => {
                warn!("Log intake full, dropped record: {}", msg);
            }
            Err(TrySendError::Full(_)) => {}
            Err(TrySendError::Closed(_)) => {
                debug!("Log intake closed, record not logged");
            }
        }
    }

    /// Send the terminal record and wait for the sink to acknowledge it
    ///
    /// Unlike `submit` this waits for room on the intake, so the terminal
    /// record is never dropped.
    pub async fn finish(&self, message: Message, timeout: Duration) -> Result<(), LogError> {
        let (done_tx, done_rx) = oneshot::channel();
        let exchange = async {
            self.tx
                .send(LogEntry::Final {
                    message,
                    done: done_tx,
                })
                .await
                .map_err(|_| LogError::Closed)?;
            done_rx.await.map_err(|_| LogError::Closed)
        };
        time::timeout(timeout, exchange)
            .await
            .map_err(|_| LogError::AckTimeout)?
    }
}

/// Consumer side of the log, run as its own task
pub struct LogSink {
    rx: mpsc::Receiver<LogEntry>,
    out: Option<Box<dyn AsyncWrite + Send + Unpin>>,
    path: Option<PathBuf>,
}

impl LogSink {
    /// Create `<dir>/<start time>.log`
    ///
    /// Failing to create the file is not fatal: the sink still runs and
    /// acknowledges shutdown, it just writes nothing.
    pub async fn open(dir: &Path, rx: mpsc::Receiver<LogEntry>) -> Self {
        let path = dir.join(Local::now().format(FILE_NAME_FORMAT).to_string());
        match File::create(&path).await {
            Ok(file) => {
                info!("Logging messages to {}", path.display());
                Self {
                    rx,
                    out: Some(Box::new(file)),
                    path: Some(path),
                }
            }
            Err(e) => {
                let err = LogError::Unavailable(e);
                warn!("Couldn't create log file {}: {}", path.display(), err);
                Self::disabled(rx)
            }
        }
    }

    /// Sink that writes to an arbitrary stream
    pub fn with_writer<W>(rx: mpsc::Receiver<LogEntry>, writer: W) -> Self
    where
        W: AsyncWrite + Send + Unpin + 'static,
    {
        Self {
            rx,
            out: Some(Box::new(writer)),
            path: None,
        }
    }

    /// Sink that only drains and acknowledges
    pub fn disabled(rx: mpsc::Receiver<LogEntry>) -> Self {
        Self {
            rx,
            out: None,
            path: None,
        }
    }

    /// Path of the log file, if one was opened
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Drain the intake until the final record (or until every producer
    /// is gone)
    pub async fn run(mut self) {
        self.write(Message::system(None, "Server Started...")).await;

        while let Some(entry) = self.rx.recv().await {
            match entry {
                LogEntry::Record(msg) => self.write(msg).await,
                LogEntry::Final { message, done } => {
                    self.write(message).await;
                    self.rx.close();
                    let _ = done.send(());
                    break;
                }
            }
        }

        info!("Log: closing log file");
    }

    async fn write(&mut self, mut msg: Message) {
        let Some(out) = self.out.as_mut() else {
            return;
        };

        if msg.timestamp.is_empty() {
            msg.timestamp = now_timestamp();
        }
        if msg.sender_name.is_empty() {
            msg.sender_name = SYSTEM_NAME.to_string();
        }

        let line = format!("{}\n", msg);
        let result = async {
            out.write_all(line.as_bytes()).await?;
            out.flush().await
        }
        .await;

        if let Err(e) = result {
            warn!("{}; durable logging disabled", LogError::Unavailable(e));
            self.out = None;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncReadExt;

    #[tokio::test]
    async fn test_sink_writes_records_in_order() {
        let (intake, rx) = LogIntake::channel(16);
        let (writer, mut reader) = tokio::io::duplex(4096);
        let sink = tokio::spawn(LogSink::with_writer(rx, writer).run());

        intake.submit(Message::system(None, "alice has joined our chat..."));
        let mut msg = Message::admin("hello");
        msg.timestamp = "2024-01-01 10:00:00".to_string();
        intake.submit(msg);

        let mut closing = Message::system(None, "Server Closed");
        closing.sender_name = "system".to_string();
        intake
            .finish(closing, Duration::from_secs(1))
            .await
            .unwrap();
        sink.await.unwrap();

        let mut out = String::new();
        reader.read_to_string(&mut out).await.unwrap();
        let lines: Vec<_> = out.lines().collect();

        assert_eq!(lines.len(), 4);
        assert!(lines[0].ends_with("[System]: Server Started..."));
        assert!(lines[1].ends_with("[System]: alice has joined our chat..."));
        assert_eq!(lines[2], "[2024-01-01 10:00:00][Admin]: hello");
        assert!(lines[3].ends_with("[system]: Server Closed"));
    }

    #[tokio::test]
    async fn test_intake_closed_after_final() {
        let (intake, rx) = LogIntake::channel(16);
        let sink = tokio::spawn(LogSink::disabled(rx).run());

        intake
            .finish(Message::system(None, "Server Closed"), Duration::from_secs(1))
            .await
            .unwrap();
        sink.await.unwrap();

        // Later records are silently dropped, a second finish reports closed
        intake.submit(Message::system(None, "too late"));
        let result = intake
            .finish(Message::system(None, "again"), Duration::from_secs(1))
            .await;
        assert!(matches!(result, Err(LogError::Closed)));
    }

    #[tokio::test]
    async fn test_saturated_intake_drops_without_blocking() {
        let (intake, _rx) = LogIntake::channel(1);

        intake.submit(Message::system(None, "kept"));
        // Would block forever if submit waited for room
        intake.submit(Message::system(None, "dropped"));
    }

    #[tokio::test]
    async fn test_finish_times_out_without_sink() {
        let (intake, _rx) = LogIntake::channel(4);

        let result = intake
            .finish(Message::system(None, "Server Closed"), Duration::from_millis(20))
            .await;
        assert!(matches!(result, Err(LogError::AckTimeout)));
    }

    #[tokio::test]
    async fn test_open_creates_timestamped_file() {
        let dir = std::env::temp_dir().join(format!("tcp_chat_log_{}", uuid::Uuid::new_v4()));
        tokio::fs::create_dir_all(&dir).await.unwrap();

        let (intake, rx) = LogIntake::channel(4);
        let sink = LogSink::open(&dir, rx).await;
        let path = sink.path().unwrap().to_path_buf();
        assert_eq!(path.extension().unwrap(), "log");

        let task = tokio::spawn(sink.run());
        intake
            .finish(Message::system(None, "Server Closed"), Duration::from_secs(1))
            .await
            .unwrap();
        task.await.unwrap();

        let contents = tokio::fs::read_to_string(&path).await.unwrap();
        assert!(contents.contains("Server Started..."));
        assert!(contents.contains("Server Closed"));

        tokio::fs::remove_dir_all(&dir).await.unwrap();
    }

    #[tokio::test]
    async fn test_open_in_missing_dir_disables_logging() {
        let dir = std::env::temp_dir().join(format!("tcp_chat_missing_{}", uuid::Uuid::new_v4()));

        let (intake, rx) = LogIntake::channel(4);
        let sink = LogSink::open(&dir, rx).await;
        assert!(sink.path().is_none());

        let task = tokio::spawn(sink.run());
        intake.submit(Message::admin("still fine"));
        intake
            .finish(Message::system(None, "Server Closed"), Duration::from_secs(1))
            .await
            .unwrap();
        task.await.unwrap();
    }
}
