//! Per-connection session
//!
//! Drives one peer through `Connecting → Validating → Authenticated →
//! Terminated`. The session owns both halves of the stream; whatever path
//! leads out of the state machine, the write half is shut down and, should
//! the task be torn down while still registered, the drop guard takes the
//! client out of the registry.

use std::io;
use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, BufReader, ReadHalf};
use tokio::sync::watch;
use tracing::{debug, info};

use crate::client::{validate_name, Client, Outbound};
use crate::error::{NameError, RegisterError, SessionError};
use crate::message::Message;
use crate::server::{wait_for_shutdown, ChatServer};
use crate::types::ConnectionId;

const SERVER_FULL: &str = "Server full. Please try again later\n";
const TOO_MANY_ATTEMPTS: &str = "\nToo many invalid attempts. You are disconnected\n";
const SHUTTING_DOWN: &str = "\nServer is shutting down.\n";

/// Longest line accepted from a peer, newline included
const MAX_LINE_BYTES: u64 = 64 * 1024;

const WELCOME: &str = concat!(
    "Welcome to TCP-Chat!\n",
    "         _nnnn_\n",
    "        dGGGGMMb\n",
    "       @p~qp~~qMb\n",
    "       M|@||@) M|\n",
    "       @,----.JM|\n",
    "      JS^\\__/  qKL\n",
    "     dZP        qKRb\n",
    "    dZP          qKKb\n",
    "   fZP            SMMb\n",
    "   HZM            MMMM\n",
    "   FqM            MMMM\n",
    " __| \".        |\\dS\"qML\n",
    " |    `.       | ' \\Zq\n",
    "_)      \\.___.,|     .'\n",
    "\\____   )MMMMMP|   .'\n",
    "     `-'       `--'\n\n",
    "Username rules:\n",
    "- Max 12 characters\n",
    "- No spaces\n",
    "- Unique name\n\n",
    "[ENTER YOUR NAME]: ",
);

/// Where a session currently is
#[derive(Debug)]
enum SessionState {
    Connecting,
    /// `attempt` is the 1-based number of the next naming attempt
    Validating { attempt: u32 },
    Authenticated { name: String },
    Terminated(Result<(), SessionError>),
}

/// One line read from the peer
#[derive(Debug)]
enum Incoming {
    /// Trimmed text
    Line(String),
    /// Bytes that are not UTF-8
    Unparsable,
    /// Peer closed its side
    Closed,
    /// Server began shutting down while waiting
    Shutdown,
}

/// Handle one accepted connection until it terminates
///
/// Works over any byte stream, which keeps the state machine testable with
/// in-memory pipes.
pub async fn handle_connection<S>(
    server: Arc<ChatServer>,
    stream: S,
    peer: String,
) -> Result<(), SessionError>
where
    S: AsyncRead + AsyncWrite + Send + 'static,
{
    let (reader, writer) = tokio::io::split(stream);
    let outbound = Outbound::new(writer, server.config.write_timeout);
    let mut session = Session::new(server, reader, outbound.clone(), peer);

    let result = session.run().await;
    drop(session);
    outbound.close().await;
    result
}

struct Session<R> {
    id: ConnectionId,
    peer: String,
    server: Arc<ChatServer>,
    reader: BufReader<ReadHalf<R>>,
    outbound: Outbound,
    shutdown: watch::Receiver<bool>,
    /// Set while the client is in the registry
    registered: bool,
}

impl<R: AsyncRead> Session<R> {
    fn new(server: Arc<ChatServer>, reader: ReadHalf<R>, outbound: Outbound, peer: String) -> Self {
        let shutdown = server.shutdown_signal();
        Self {
            id: ConnectionId::new(),
            peer,
            server,
            reader: BufReader::new(reader),
            outbound,
            shutdown,
            registered: false,
        }
    }

    async fn run(&mut self) -> Result<(), SessionError> {
        let mut state = SessionState::Connecting;
        loop {
            state = match state {
                SessionState::Connecting => self.connect().await,
                SessionState::Validating { attempt } => self.validate(attempt).await,
                SessionState::Authenticated { name } => self.receive(name).await,
                SessionState::Terminated(result) => return result,
            };
        }
    }

    /// Optimistic capacity check, then the banner
    async fn connect(&mut self) -> SessionState {
        if self.server.registry.client_count().await >= self.server.config.max_clients {
            return self.reject_full().await;
        }
        match self.outbound.write(WELCOME).await {
            Ok(()) => SessionState::Validating { attempt: 1 },
            Err(e) => SessionState::Terminated(Err(e.into())),
        }
    }

    async fn validate(&mut self, attempt: u32) -> SessionState {
        let name = match self.read_line().await {
            Ok(Incoming::Line(line)) => line,
            Ok(Incoming::Unparsable) => return self.reprompt(attempt, NameError::Empty).await,
            Ok(Incoming::Closed) => return SessionState::Terminated(Ok(())),
            Ok(Incoming::Shutdown) => {
                let _ = self.outbound.write(SHUTTING_DOWN).await;
                return SessionState::Terminated(Ok(()));
            }
            Err(e) => return SessionState::Terminated(Err(e.into())),
        };

        let mut checked = validate_name(&name, self.server.config.max_name_len);
        if checked.is_ok() && self.server.registry.is_name_taken(&name).await {
            checked = Err(NameError::Duplicate);
        }
        if let Err(reason) = checked {
            return self.reprompt(attempt, reason).await;
        }

        let client = Client::new(self.id, name.clone(), self.outbound.clone());
        match self.server.join(client).await {
            Ok(()) => {
                self.registered = true;
                info!("{} joined as '{}'", self.peer, name);
                SessionState::Authenticated { name }
            }
            // Lost a race against another peer with the same name
            Err(RegisterError::Duplicate) => self.reprompt(attempt, NameError::Duplicate).await,
            Err(RegisterError::Full) => self.reject_full().await,
        }
    }

    async fn receive(&mut self, name: String) -> SessionState {
        match self.read_line().await {
            Ok(Incoming::Line(text)) if !text.is_empty() => {
                debug!("{} says: {}", name, text);
                self.server
                    .broadcast(Message::chat(&name, self.id, text))
                    .await;
                self.prompt(name).await
            }
            Ok(Incoming::Line(_)) | Ok(Incoming::Unparsable) => self.prompt(name).await,
            Ok(Incoming::Closed) => {
                self.depart().await;
                SessionState::Terminated(Ok(()))
            }
            Ok(Incoming::Shutdown) => {
                let _ = self.outbound.write(SHUTTING_DOWN).await;
                self.server.drop_client(self.id).await;
                self.registered = false;
                SessionState::Terminated(Ok(()))
            }
            Err(e) => {
                self.depart().await;
                SessionState::Terminated(Err(e.into()))
            }
        }
    }

    /// Re-display the peer's own prompt; a failed write counts as a logout
    async fn prompt(&mut self, name: String) -> SessionState {
        match self.outbound.write(&Message::prompt(&name)).await {
            Ok(()) => SessionState::Authenticated { name },
            Err(e) => {
                self.depart().await;
                SessionState::Terminated(Err(e.into()))
            }
        }
    }

    /// Write the rejection reason and use up an attempt if it costs one
    async fn reprompt(&mut self, attempt: u32, reason: NameError) -> SessionState {
        debug!("{} name attempt {} rejected: {}", self.peer, attempt, reason);
        if let Err(e) = self.outbound.write(&reason.prompt()).await {
            return SessionState::Terminated(Err(e.into()));
        }

        if !reason.consumes_attempt() {
            return SessionState::Validating { attempt };
        }
        if attempt >= self.server.config.max_name_attempts {
            let _ = self.outbound.write(TOO_MANY_ATTEMPTS).await;
            return SessionState::Terminated(Err(SessionError::TooManyAttempts));
        }
        SessionState::Validating {
            attempt: attempt + 1,
        }
    }

    async fn reject_full(&mut self) -> SessionState {
        let _ = self.outbound.write(SERVER_FULL).await;
        SessionState::Terminated(Err(SessionError::CapacityExceeded))
    }

    /// Unregister and announce the departure
    async fn depart(&mut self) {
        if self.registered {
            self.server.leave(self.id).await;
            self.registered = false;
        }
    }

    /// Read one newline-terminated line, or notice shutdown
    ///
    /// A line that reaches `MAX_LINE_BYTES` without a newline is a read error.
    async fn read_line(&mut self) -> io::Result<Incoming> {
        let mut buf = Vec::new();
        let mut limited = (&mut self.reader).take(MAX_LINE_BYTES);
        let read = tokio::select! {
            read = limited.read_until(b'\n', &mut buf) => read?,
            _ = wait_for_shutdown(&mut self.shutdown) => return Ok(Incoming::Shutdown),
        };
        if read == 0 {
            return Ok(Incoming::Closed);
        }
        if buf.last() != Some(&b'\n') && read as u64 >= MAX_LINE_BYTES {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("line exceeds {} bytes", MAX_LINE_BYTES),
            ));
        }

        match String::from_utf8(buf) {
            Ok(line) => Ok(Incoming::Line(line.trim().to_string())),
            Err(_) => Ok(Incoming::Unparsable),
        }
    }
}

impl<R> Drop for Session<R> {
    fn drop(&mut self) {
        if !self.registered {
            return;
        }
        // Torn down mid-flight: unregister on a fresh task
        let server = self.server.clone();
        let id = self.id;
        if let Ok(runtime) = tokio::runtime::Handle::try_current() {
            runtime.spawn(async move { server.leave(id).await });
        }
    }
}
