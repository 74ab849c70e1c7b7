//! Dispatch loop
//!
//! [`LdapProxy`] is the single consumer of the sync queue. For every message
//! it opens a fresh directory connection, runs the matching handler and goes
//! back to waiting. Producers hold a cloneable [`ProxyHandle`].
//!
//! The loop stops on [`SyncMessage::Shutdown`] or once every handle is
//! dropped. Messages still queued behind the shutdown are discarded.

use idsync_common::config::ProxyConfig;
use idsync_common::Record;
use std::fmt;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::directory::{self, DirectoryConnector};
use crate::error::{ProxyError, ProxyResult};
use crate::handlers;
use crate::messages::SyncMessage;
use crate::session::Session;

/// Lifecycle of the dispatch loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProxyState {
    /// Waiting for the next message
    Idle,
    /// Opening and binding a directory connection
    Connecting,
    /// Running a handler
    Dispatching,
    Stopped,
}

impl fmt::Display for ProxyState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ProxyState::Idle => "idle",
            ProxyState::Connecting => "connecting",
            ProxyState::Dispatching => "dispatching",
            ProxyState::Stopped => "stopped",
        };
        f.write_str(name)
    }
}

/// Counters returned when the loop stops
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProxyStats {
    /// Messages taken off the queue, shutdown excluded
    pub received: u64,
    /// Handled messages that committed a touch
    pub succeeded: u64,
    /// Handled messages that produced no touch
    pub failed: u64,
    /// Messages discarded because the directory connection failed
    pub dropped: u64,
    /// Messages of an unknown type
    pub ignored: u64,
}

/// Producer side of the sync queue
#[derive(Clone)]
pub struct ProxyHandle {
    sender: mpsc::UnboundedSender<SyncMessage>,
    state: watch::Receiver<ProxyState>,
}

impl ProxyHandle {
    /// Enqueue a message; fails once the loop has stopped
    pub fn put(&self, message: SyncMessage) -> ProxyResult<()> {
        self.sender.send(message).map_err(|_| ProxyError::QueueClosed)
    }

    /// Enqueue the shutdown message
    pub fn shutdown(&self) -> ProxyResult<()> {
        self.put(SyncMessage::Shutdown)
    }

    pub fn state(&self) -> ProxyState {
        *self.state.borrow()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<ProxyState> {
        self.state.clone()
    }

    /// Wait until the loop reports `Stopped`
    pub async fn stopped(&self) {
        let mut state = self.state.clone();
        // A dropped sender means the loop is gone as well
        let _ = state.wait_for(|state| *state == ProxyState::Stopped).await;
    }
}

/// Single-consumer dispatch loop
pub struct LdapProxy {
    config: ProxyConfig,
    session: Box<dyn Session>,
    connector: Arc<dyn DirectoryConnector>,
    receiver: mpsc::UnboundedReceiver<SyncMessage>,
    state: watch::Sender<ProxyState>,
}

impl LdapProxy {
    /// Build the loop around a long-lived session
    pub fn new(
        config: ProxyConfig,
        session: Box<dyn Session>,
        connector: Arc<dyn DirectoryConnector>,
    ) -> (Self, ProxyHandle) {
        let (sender, receiver) = mpsc::unbounded_channel();
        let (state_tx, state_rx) = watch::channel(ProxyState::Idle);

        let proxy = Self {
            config,
            session,
            connector,
            receiver,
            state: state_tx,
        };
        let handle = ProxyHandle {
            sender,
            state: state_rx,
        };
        (proxy, handle)
    }

    /// Run the loop on the tokio runtime
    pub fn spawn(self) -> JoinHandle<ProxyStats> {
        tokio::spawn(self.run())
    }

    pub async fn run(mut self) -> ProxyStats {
        let mut stats = ProxyStats::default();
        info!("Dispatch loop started");

        loop {
            self.set_state(ProxyState::Idle);
            let Some(message) = self.receiver.recv().await else {
                info!("All queue handles dropped");
                break;
            };

            match message {
                SyncMessage::Shutdown => {
                    warn!("Shutdown message received, stopping dispatch loop");
                    break;
                }
                SyncMessage::Unknown => {
                    stats.received += 1;
                    stats.ignored += 1;
                    warn!("Ignoring message of unknown type");
                    continue;
                }
                _ => stats.received += 1,
            }
            debug!(
                kind = message.kind(),
                attributes = message.record().map_or(0, Record::len),
                "Message received"
            );

            self.set_state(ProxyState::Connecting);
            let mut connection = match directory::open(self.connector.as_ref(), &self.config.ldap).await {
                Ok(connection) => connection,
                Err(e) => {
                    error!(kind = message.kind(), error = %e, "Directory connection failed, dropping message");
                    stats.dropped += 1;
                    continue;
                }
            };

            self.set_state(ProxyState::Dispatching);
            let touch = handlers::dispatch(
                &message,
                &self.config,
                self.session.as_mut(),
                connection.as_mut(),
            )
            .await;

            if let Err(e) = connection.unbind().await {
                debug!(error = %e, "Unbind failed");
            }

            match touch {
                Some(touch) => {
                    info!("{}", touch);
                    stats.succeeded += 1;
                }
                None => stats.failed += 1,
            }
        }

        self.receiver.close();
        self.set_state(ProxyState::Stopped);
        info!(?stats, "Dispatch loop stopped");
        stats
    }

    fn set_state(&self, state: ProxyState) {
        self.state.send_replace(state);
    }
}
