//! Message record
//!
//! The immutable value appended to history, handed to the log sink and
//! rendered onto every peer's stream.

use std::fmt;

use chrono::Local;

use crate::types::ConnectionId;

/// Timestamp layout used for messages and prompts
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Sender name used for messages typed on the admin console
pub const ADMIN_NAME: &str = "Admin";

/// Current local time in `TIMESTAMP_FORMAT`
pub fn now_timestamp() -> String {
    Local::now().format(TIMESTAMP_FORMAT).to_string()
}

/// A chat message
///
/// An empty `sender_name` marks a system-originated message. `sender` is the
/// originating connection, `None` for system and admin messages, and is the
/// key used to keep a broadcast away from its own author.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub sender_name: String,
    pub sender: Option<ConnectionId>,
    pub timestamp: String,
    pub text: String,
}

impl Message {
    /// A line typed by an authenticated client, stamped now
    pub fn chat(sender_name: &str, sender: ConnectionId, text: impl Into<String>) -> Self {
        Self {
            sender_name: sender_name.to_string(),
            sender: Some(sender),
            timestamp: now_timestamp(),
            text: text.into(),
        }
    }

    /// A line typed on the admin console; reaches every client
    pub fn admin(text: impl Into<String>) -> Self {
        Self {
            sender_name: ADMIN_NAME.to_string(),
            sender: None,
            timestamp: now_timestamp(),
            text: text.into(),
        }
    }

    /// A bare server announcement, rendered verbatim
    ///
    /// `about` is the connection the announcement concerns, which is then
    /// excluded from the fan-out like any other sender.
    pub fn system(about: Option<ConnectionId>, text: impl Into<String>) -> Self {
        Self {
            sender_name: String::new(),
            sender: about,
            timestamp: String::new(),
            text: text.into(),
        }
    }

    /// `<name> has joined our chat...`
    pub fn joined(name: &str, id: ConnectionId) -> Self {
        Self::system(Some(id), format!("{} has joined our chat...", name))
    }

    /// `<name> has left our chat...`
    pub fn left(name: &str, id: ConnectionId) -> Self {
        Self::system(Some(id), format!("{} has left our chat...", name))
    }

    /// The timestamped prompt shown in front of a client's input
    pub fn prompt(name: &str) -> String {
        Self {
            sender_name: name.to_string(),
            sender: None,
            timestamp: now_timestamp(),
            text: String::new(),
        }
        .to_string()
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.timestamp.is_empty() && !self.sender_name.is_empty() {
            write!(f, "[{}][{}]: {}", self.timestamp, self.sender_name, self.text)
        } else {
            f.write_str(&self.text)
        }
    }
}
