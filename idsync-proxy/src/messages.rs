//! Dispatch queue messages
//!
//! Producers enqueue one [`SyncMessage`] per directory change. Each variant
//! carries the attributes to write plus the id of the tracked entity whose
//! state records the outcome. `Shutdown` stops the dispatch loop.
//!
//! Messages decode from an internally tagged JSON form:
//!
//! ```json
//! {"type": "write_uid_number", "record": {"uidnumber": ["10001"]}, "registration_id": "..."}
//! ```
//!
//! An unrecognised `type` decodes to [`SyncMessage::Unknown`], which the loop
//! logs and skips so older proxies tolerate newer producers.

use idsync_common::Record;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SyncMessage {
    /// Create the directory entry for a new common name
    WriteCommonName {
        record: Record,
        #[serde(default)]
        registration_id: Option<Uuid>,
    },
    /// Add posix account attributes to an existing entry
    WriteUidNumber { record: Record, registration_id: Uuid },
    /// Add a public key to an existing entry
    WriteSshPublicKey { record: Record, registration_id: Uuid },
    /// Add arbitrary attributes on behalf of a membership
    WriteLdapAttribute { record: Record, membership_id: Uuid },
    /// Stop the dispatch loop
    Shutdown,
    #[serde(other)]
    Unknown,
}

impl SyncMessage {
    /// Short name used in log fields
    pub fn kind(&self) -> &'static str {
        match self {
            SyncMessage::WriteCommonName { .. } => "write_common_name",
            SyncMessage::WriteUidNumber { .. } => "write_uid_number",
            SyncMessage::WriteSshPublicKey { .. } => "write_ssh_public_key",
            SyncMessage::WriteLdapAttribute { .. } => "write_ldap_attribute",
            SyncMessage::Shutdown => "shutdown",
            SyncMessage::Unknown => "unknown",
        }
    }

    /// Attributes to write, absent for `Shutdown` and `Unknown`
    pub fn record(&self) -> Option<&Record> {
        match self {
            SyncMessage::WriteCommonName { record, .. }
            | SyncMessage::WriteUidNumber { record, .. }
            | SyncMessage::WriteSshPublicKey { record, .. }
            | SyncMessage::WriteLdapAttribute { record, .. } => Some(record),
            SyncMessage::Shutdown | SyncMessage::Unknown => None,
        }
    }
}
