//! Server configuration

use std::path::PathBuf;
use std::time::Duration;

/// Port used when none is given on the command line
pub const DEFAULT_PORT: u16 = 8989;

/// Configuration options for the server
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Host address to bind to
    pub host: String,

    /// Port number to listen on (0 picks a free port)
    pub port: u16,

    /// Maximum number of registered clients
    pub max_clients: usize,

    /// Maximum display name length, in characters
    pub max_name_len: usize,

    /// Naming attempts a peer gets before being disconnected
    pub max_name_attempts: u32,

    /// Deadline for a single write to a peer
    pub write_timeout: Duration,

    /// Capacity of each notification queue
    pub notify_capacity: usize,

    /// How long a producer waits on a full notification queue
    pub notify_wait: Duration,

    /// Capacity of the log sink intake
    pub log_queue_capacity: usize,

    /// Directory the message log file is created in
    pub log_dir: PathBuf,

    /// Write a durable message log at all
    pub log_enabled: bool,

    /// Number of recent messages handed to the dashboard
    pub dashboard_history: usize,

    /// How long shutdown waits for the log sink to acknowledge
    pub shutdown_timeout: Duration,
}

impl ServerConfig {
    /// `host:port` string for binding
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Parse a port given as `8989` or `:8989`
    pub fn parse_port(raw: &str) -> Result<u16, String> {
        let digits = raw.strip_prefix(':').unwrap_or(raw);
        digits
            .parse::<u16>()
            .map_err(|e| format!("invalid port '{}': {}", raw, e))
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: DEFAULT_PORT,
            max_clients: 10,
            max_name_len: 12,
            max_name_attempts: 5,
            write_timeout: Duration::from_secs(5),
            notify_capacity: 10,
            notify_wait: Duration::from_secs(1),
            log_queue_capacity: 256,
            log_dir: PathBuf::from("."),
            log_enabled: true,
            dashboard_history: 20,
            shutdown_timeout: Duration::from_secs(5),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ServerConfig::default();
        assert_eq!(config.port, 8989);
        assert_eq!(config.max_clients, 10);
        assert_eq!(config.max_name_len, 12);
        assert_eq!(config.max_name_attempts, 5);
        assert_eq!(config.bind_addr(), "0.0.0.0:8989");
    }

    #[test]
    fn test_parse_port() {
        assert_eq!(ServerConfig::parse_port("8989"), Ok(8989));
        assert_eq!(ServerConfig::parse_port(":2525"), Ok(2525));
        assert!(ServerConfig::parse_port("chat").is_err());
        assert!(ServerConfig::parse_port("70000").is_err());
    }
}
