//! Shutdown coordination
//!
//! Order matters: the log sink has to see every message broadcast before
//! the quit, so it is drained and acknowledged first. Only then is the
//! listener released and are the remaining peers told to go away.

use tracing::{info, warn};

use crate::error::AppError;
use crate::message::Message;
use crate::server::ServerHandle;

/// Text of the terminal log record
pub const CLOSING_TEXT: &str = "Server Closed";

impl ServerHandle {
    /// Stop the server
    ///
    /// 1. write the terminal `Server Closed` record to the log
    /// 2. wait for the sink to flush and acknowledge it
    /// 3. join the sink task, whose intake is closed by then
    /// 4. close the listener and end every session
    /// 5. report back to the caller
    pub async fn shutdown(self) -> Result<(), AppError> {
        let ServerHandle {
            server,
            accept_task,
            sink_task,
            ..
        } = self;
        info!("Shutting down");

        let mut closing = Message::system(None, CLOSING_TEXT);
        closing.sender_name = "system".to_string();
        match server
            .log
            .finish(closing, server.config.shutdown_timeout)
            .await
        {
            Ok(()) => {
                sink_task.await?;
            }
            Err(e) => {
                warn!("Log sink did not finish cleanly: {}", e);
                sink_task.abort();
            }
        }

        server.begin_shutdown();
        accept_task.await?;

        info!("Server shut down");
        Ok(())
    }
}
