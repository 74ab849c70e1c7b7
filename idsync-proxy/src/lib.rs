//! idsync-proxy library interface
//!
//! The dispatch core of the identity synchronization proxy: a single task
//! consumes [`SyncMessage`]s from an unbounded queue, writes each change to
//! the directory over a fresh connection, and records the outcome as a
//! state transition in the database.

pub mod db;
pub mod directory;
pub mod error;
pub mod handlers;
pub mod messages;
pub mod proxy;
pub mod session;

pub use crate::error::{ProxyError, ProxyResult};
pub use crate::messages::SyncMessage;
pub use crate::proxy::{LdapProxy, ProxyHandle, ProxyState, ProxyStats};
pub use crate::session::{Session, SqliteSession};
