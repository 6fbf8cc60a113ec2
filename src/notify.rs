//! Observer notification signals
//!
//! Two bounded, lossy wakeup queues: one for "history changed", one for
//! "client set changed". A signal carries no data; consumers re-read the
//! registry whenever they wake up, so dropped or coalesced signals are fine.

use std::time::Duration;

use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::time;
use tracing::{trace, warn};

use crate::error::NotifyError;

/// Which part of the shared state changed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signal {
    HistoryChanged,
    ClientsChanged,
}

/// Producer side, held by the server context
#[derive(Debug, Clone)]
pub struct Notifier {
    history: mpsc::Sender<()>,
    clients: mpsc::Sender<()>,
    wait: Duration,
}

/// Consumer side, handed to whatever renders the state
#[derive(Debug)]
pub struct Notifications {
    pub history: mpsc::Receiver<()>,
    pub clients: mpsc::Receiver<()>,
}

/// Create both queues with `capacity` slots each
///
/// `wait` bounds how long a producer blocks on a full queue before the
/// signal is dropped.
pub fn channel(capacity: usize, wait: Duration) -> (Notifier, Notifications) {
    let (history_tx, history_rx) = mpsc::channel(capacity);
    let (clients_tx, clients_rx) = mpsc::channel(capacity);
    (
        Notifier {
            history: history_tx,
            clients: clients_tx,
            wait,
        },
        Notifications {
            history: history_rx,
            clients: clients_rx,
        },
    )
}

impl Notifier {
    /// Raise `signal`
    ///
    /// Tries a non-blocking send first, then waits up to the fallback wait.
    /// A queue nobody listens to any more is not an error.
    pub async fn notify(&self, signal: Signal) -> Result<(), NotifyError> {
        let tx = match signal {
            Signal::HistoryChanged => &self.history,
            Signal::ClientsChanged => &self.clients,
        };

        match tx.try_send(()) {
            Ok(()) => Ok(()),
            Err(TrySendError::Closed(())) => {
                trace!("No observer for {:?}", signal);
                Ok(())
            }
            Err(TrySendError::Full(())) => match time::timeout(self.wait, tx.send(())).await {
                Ok(_) => Ok(()),
                Err(_) => {
                    warn!("{:?} signal skipped due to full queue", signal);
                    Err(NotifyError::Saturated)
                }
            },
        }
    }
}
