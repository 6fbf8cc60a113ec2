//! Error types for the chat server
//!
//! Defines process-level errors plus the per-connection taxonomy:
//! registration, name validation, peer I/O, notification and log sink
//! failures. Uses thiserror for ergonomic error definitions.

use std::io;

use thiserror::Error;

/// Application-level errors
///
/// Only `Bind` is fatal to the process. Everything a single connection can
/// run into is a `SessionError` and stays inside that connection's task.
#[derive(Debug, Error)]
pub enum AppError {
    /// Listener could not be bound (fatal at startup)
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: io::Error,
    },

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// A background task panicked or was cancelled
    #[error("background task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

/// Registry insertion failures
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum RegisterError {
    /// Registry already holds the maximum number of clients
    #[error("server is full")]
    Full,

    /// Another registered client already uses this name
    #[error("name already taken")]
    Duplicate,
}

/// Reasons a proposed display name is rejected
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum NameError {
    #[error("name is empty")]
    Empty,

    #[error("name longer than {max} characters")]
    TooLong { max: usize },

    #[error("name contains whitespace")]
    HasWhitespace,

    #[error("name already taken")]
    Duplicate,
}

impl NameError {
    /// Whether this rejection uses up one of the peer's naming attempts
    pub fn consumes_attempt(&self) -> bool {
        !matches!(self, NameError::Empty)
    }

    /// Re-prompt written back to the peer
    pub fn prompt(&self) -> String {
        match self {
            NameError::Empty => "Invalid input. Try again: ".to_string(),
            NameError::TooLong { max } => {
                format!("Name too long (max {} chars). Try again: ", max)
            }
            NameError::HasWhitespace => "No spaces allowed in username. Try again: ".to_string(),
            NameError::Duplicate => "Name already taken. Try again: ".to_string(),
        }
    }
}

/// Peer write errors
///
/// Occurs when writing to a peer's outbound stream fails or stalls.
#[derive(Debug, Error)]
pub enum SendError {
    /// The write did not complete within the per-write deadline
    #[error("write timed out")]
    Timeout,

    /// The underlying stream failed
    #[error("write failed: {0}")]
    Io(#[from] io::Error),
}

/// Notification signal errors
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum NotifyError {
    /// Queue stayed full for the whole fallback wait; the signal was dropped
    #[error("notification queue saturated")]
    Saturated,
}

/// Log sink errors
#[derive(Debug, Error)]
pub enum LogError {
    /// The durable log could not be opened or written
    #[error("log sink unavailable: {0}")]
    Unavailable(#[source] io::Error),

    /// The sink stopped before acknowledging the final entry
    #[error("log sink closed")]
    Closed,

    /// The sink did not acknowledge the final entry in time
    #[error("log sink did not acknowledge shutdown")]
    AckTimeout,
}

/// Errors that end a single connection
#[derive(Debug, Error)]
pub enum SessionError {
    /// Server was full when the peer connected or tried to register
    #[error("capacity exceeded")]
    CapacityExceeded,

    /// Peer used up all naming attempts
    #[error("too many invalid name attempts")]
    TooManyAttempts,

    /// Writing to the peer failed
    #[error("peer write error: {0}")]
    PeerWrite(#[from] SendError),

    /// Reading from the peer failed
    #[error("peer read error: {0}")]
    PeerRead(#[from] io::Error),
}

impl SessionError {
    /// Expected rejections, as opposed to transport failures
    pub fn is_rejection(&self) -> bool {
        matches!(
            self,
            SessionError::CapacityExceeded | SessionError::TooManyAttempts
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_name_error_prompts() {
        assert_eq!(
            NameError::TooLong { max: 12 }.prompt(),
            "Name too long (max 12 chars). Try again: "
        );
        assert_eq!(
            NameError::Duplicate.prompt(),
            "Name already taken. Try again: "
        );
    }

    #[test]
    fn test_empty_name_does_not_consume_attempt() {
        assert!(!NameError::Empty.consumes_attempt());
        assert!(NameError::HasWhitespace.consumes_attempt());
        assert!(NameError::Duplicate.consumes_attempt());
    }

    #[test]
    fn test_session_rejections() {
        assert!(SessionError::TooManyAttempts.is_rejection());
        assert!(SessionError::CapacityExceeded.is_rejection());
        assert!(!SessionError::PeerWrite(SendError::Timeout).is_rejection());
    }
}
