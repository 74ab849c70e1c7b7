//! Error types for idsync-proxy
//!
//! Every variant is recoverable at the dispatch loop: a failing message is
//! logged and rolled back, and the loop moves on to the next one.

use thiserror::Error;

pub type ProxyResult<T> = std::result::Result<T, ProxyError>;

#[derive(Debug, Error)]
pub enum ProxyError {
    /// Directory transport, bind or operation failure
    #[error("Directory error: {0}")]
    Directory(String),

    /// Record lacks an attribute the handler needs
    #[error("Record has no {0} attribute")]
    MissingAttribute(&'static str),

    /// Registration or membership not present in the database
    #[error("Not found: {0}")]
    NotFound(String),

    /// Transaction already finished or never started
    #[error("Session error: {0}")]
    Session(String),

    /// Dispatch queue receiver is gone
    #[error("Dispatch queue is closed")]
    QueueClosed,

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Common error: {0}")]
    Common(#[from] idsync_common::Error),
}

impl ProxyError {
    pub fn directory(err: impl std::fmt::Display) -> Self {
        ProxyError::Directory(err.to_string())
    }
}
