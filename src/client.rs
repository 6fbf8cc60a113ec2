//! Client struct definition
//!
//! Represents an authenticated client with its name and outbound stream.

use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::Mutex;
use tokio::time;

use crate::error::{NameError, SendError};
use crate::types::ConnectionId;

type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// Write half of a peer connection
///
/// Cheap to clone. Writes from the broadcast fan-out and from the peer's own
/// session are serialized through the inner mutex, and each write must finish
/// within `timeout`.
#[derive(Clone)]
pub struct Outbound {
    writer: Arc<Mutex<BoxedWriter>>,
    timeout: Duration,
}

impl Outbound {
    pub fn new<W>(writer: W, timeout: Duration) -> Self
    where
        W: AsyncWrite + Send + Unpin + 'static,
    {
        Self {
            writer: Arc::new(Mutex::new(Box::new(writer))),
            timeout,
        }
    }

    /// Write `text` verbatim and flush
    pub async fn write(&self, text: &str) -> Result<(), SendError> {
        let write = async {
            let mut writer = self.writer.lock().await;
            writer.write_all(text.as_bytes()).await?;
            writer.flush().await
        };
        match time::timeout(self.timeout, write).await {
            Ok(result) => result.map_err(SendError::Io),
            Err(_) => Err(SendError::Timeout),
        }
    }

    /// Shut down the write direction; errors are irrelevant at this point
    pub async fn close(&self) {
        let shutdown = async {
            let mut writer = self.writer.lock().await;
            let _ = writer.shutdown().await;
        };
        let _ = time::timeout(self.timeout, shutdown).await;
    }
}

impl std::fmt::Debug for Outbound {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Outbound")
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

/// Authenticated client information
#[derive(Debug, Clone)]
pub struct Client {
    /// Connection handle
    pub id: ConnectionId,
    /// Validated display name
    pub name: String,
    /// Server → Client stream
    pub outbound: Outbound,
}

impl Client {
    /// Create a new client with the given handle, name and outbound stream
    pub fn new(id: ConnectionId, name: impl Into<String>, outbound: Outbound) -> Self {
        Self {
            id,
            name: name.into(),
            outbound,
        }
    }

    /// Send raw text to this client
    ///
    /// Returns an error if the write fails or misses its deadline.
    pub async fn send(&self, text: &str) -> Result<(), SendError> {
        self.outbound.write(text).await
    }
}

/// Check the shape of a proposed name
///
/// Uniqueness is the registry's job; this only covers what can be decided
/// from the name alone. Length is counted in characters.
pub fn validate_name(name: &str, max_len: usize) -> Result<(), NameError> {
    if name.is_empty() {
        return Err(NameError::Empty);
    }
    if name.chars().count() > max_len {
        return Err(NameError::TooLong { max: max_len });
    }
    if name.chars().any(char::is_whitespace) {
        return Err(NameError::HasWhitespace);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncReadExt;

    #[test]
    fn test_validate_name_accepts_plain_names() {
        assert!(validate_name("alice", 12).is_ok());
        assert!(validate_name("twelve_chars", 12).is_ok());
    }

    #[test]
    fn test_validate_name_rejections() {
        assert_eq!(validate_name("", 12), Err(NameError::Empty));
        assert_eq!(
            validate_name("thirteen_char", 12),
            Err(NameError::TooLong { max: 12 })
        );
        assert_eq!(validate_name("bob smith", 12), Err(NameError::HasWhitespace));
        assert_eq!(validate_name("bob\tsmith", 12), Err(NameError::HasWhitespace));
    }

    #[test]
    fn test_validate_name_counts_chars() {
        // 12 multi-byte characters are still 12 characters
        assert!(validate_name("éééééééééééé", 12).is_ok());
    }

    #[tokio::test]
    async fn test_outbound_write() {
        let (local, mut remote) = tokio::io::duplex(64);
        let client = Client::new(
            ConnectionId::new(),
            "alice",
            Outbound::new(local, Duration::from_secs(1)),
        );

        client.send("hello\n").await.unwrap();

        let mut buf = [0u8; 6];
        remote.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"hello\n");
    }

    #[tokio::test]
    async fn test_outbound_write_times_out_on_stalled_peer() {
        // Nobody reads the other end, so the 4 byte buffer fills up
        let (local, _remote) = tokio::io::duplex(4);
        let outbound = Outbound::new(local, Duration::from_millis(50));

        let result = outbound.write("more than four bytes").await;
        assert!(matches!(result, Err(SendError::Timeout)));
    }

    #[tokio::test]
    async fn test_outbound_write_to_closed_peer() {
        let (local, remote) = tokio::io::duplex(64);
        drop(remote);
        let outbound = Outbound::new(local, Duration::from_secs(1));

        let result = outbound.write("hello").await;
        assert!(matches!(result, Err(SendError::Io(_))));
    }
}
