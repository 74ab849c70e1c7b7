//! Message handlers
//!
//! One handler per [`SyncMessage`] variant. A handler fetches the tracked
//! entity, performs at most one directory write, records the outcome through
//! the session and commits. Any error is logged and rolled back by
//! [`dispatch`]; handlers never propagate failures to the loop.

use idsync_common::config::ProxyConfig;
use idsync_common::db::{Artifact, RegistrationState, Registration, Touch};
use idsync_common::Record;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::directory::{self, DirectoryConnection, SearchScope};
use crate::error::{ProxyError, ProxyResult};
use crate::messages::SyncMessage;
use crate::session::Session;

/// Verb stored with every attribute row the proxy writes
pub const ADD_VERB: &str = "add";

const DN: &str = "dn";
const CN: &str = "cn";
const SSH_PUBLIC_KEY: &str = "sshpublickey";

/// Run the handler for `message` over an open, bound connection
///
/// Returns the committed touch, or `None` when the message produced no
/// state change or failed. A failure rolls the session back.
pub async fn dispatch(
    message: &SyncMessage,
    config: &ProxyConfig,
    session: &mut dyn Session,
    connection: &mut dyn DirectoryConnection,
) -> Option<Touch> {
    let result = match message {
        SyncMessage::WriteCommonName {
            record,
            registration_id,
        } => write_common_name(record, *registration_id, config, session, connection).await,
        SyncMessage::WriteUidNumber {
            record,
            registration_id,
        } => write_uid_number(record, *registration_id, config, session, connection).await,
        SyncMessage::WriteSshPublicKey {
            record,
            registration_id,
        } => write_ssh_public_key(record, *registration_id, config, session, connection).await,
        SyncMessage::WriteLdapAttribute { record, membership_id } => {
            write_ldap_attribute(record, *membership_id, session, connection).await
        }
        SyncMessage::Shutdown | SyncMessage::Unknown => {
            warn!(kind = message.kind(), "No handler for message");
            return None;
        }
    };

    match result {
        Ok(touch) => touch,
        Err(e) => {
            error!(kind = message.kind(), error = %e, "Failed to dispatch message");
            if let Err(e) = session.rollback().await {
                error!(error = %e, "Rollback failed");
            }
            None
        }
    }
}

/// Create the directory entry for a new common name
///
/// An existing entry matching the configured filter is a duplicate: the
/// registration moves to manual review and nothing is written.
pub async fn write_common_name(
    record: &Record,
    registration_id: Option<Uuid>,
    config: &ProxyConfig,
    session: &mut dyn Session,
    connection: &mut dyn DirectoryConnection,
) -> ProxyResult<Option<Touch>> {
    let registration = match registration_id {
        Some(id) => Some(session.registration(id).await?),
        None => None,
    };

    let cn = common_name(record)?;
    let matching = &config.ldap.matching;
    let filter = matching.filter_for(cn);
    let found = connection
        .search(&matching.query, &filter, SearchScope::Subtree)
        .await?;

    match (found, registration) {
        (false, registration) => {
            let dn = record.first(DN).ok_or(ProxyError::MissingAttribute(DN))?;
            let (objectclasses, attributes) = directory::add_request(record);
            connection.add(dn, &objectclasses, &attributes).await?;
            info!(dn, "Added directory entry");

            let Some(registration) = registration else {
                return Ok(None);
            };
            session.add_posix_uid(registration.id, cn).await?;
            let touch = session
                .touch(
                    Artifact::Registration(registration.id),
                    RegistrationState::PreUserPosixaccount.as_str(),
                )
                .await?;
            session.commit().await?;
            Ok(Some(touch))
        }
        (true, Some(registration)) => {
            warn!(cn, registration = %registration.id, "Common name already in directory");
            let touch = session
                .touch(
                    Artifact::Registration(registration.id),
                    RegistrationState::PreUserInetorgpersonDn.as_str(),
                )
                .await?;
            session.commit().await?;
            Ok(Some(touch))
        }
        (true, None) => {
            debug!(cn, "Common name already in directory, nothing to record");
            Ok(None)
        }
    }
}

/// Add posix account attributes; a key in the same record completes the account
pub async fn write_uid_number(
    record: &Record,
    registration_id: Uuid,
    config: &ProxyConfig,
    session: &mut dyn Session,
    connection: &mut dyn DirectoryConnection,
) -> ProxyResult<Option<Touch>> {
    let registration = session.registration(registration_id).await?;
    let dn = registration_dn(record, &registration, config, session).await?;

    connection.modify(&dn, &directory::add_modifications(record)).await?;

    let has_key = record.get(SSH_PUBLIC_KEY).is_some_and(|keys| !keys.is_empty());
    let state = if has_key {
        RegistrationState::Valid
    } else {
        RegistrationState::PreUserLdappublickey
    };
    let touch = session
        .touch(Artifact::Registration(registration.id), state.as_str())
        .await?;
    session.commit().await?;
    Ok(Some(touch))
}

pub async fn write_ssh_public_key(
    record: &Record,
    registration_id: Uuid,
    config: &ProxyConfig,
    session: &mut dyn Session,
    connection: &mut dyn DirectoryConnection,
) -> ProxyResult<Option<Touch>> {
    let registration = session.registration(registration_id).await?;
    let dn = registration_dn(record, &registration, config, session).await?;

    connection.modify(&dn, &directory::add_modifications(record)).await?;

    let touch = session
        .touch(Artifact::Registration(registration.id), RegistrationState::Valid.as_str())
        .await?;
    session.commit().await?;
    Ok(Some(touch))
}

/// Add attributes for a membership, keeping its state and logging each value
pub async fn write_ldap_attribute(
    record: &Record,
    membership_id: Uuid,
    session: &mut dyn Session,
    connection: &mut dyn DirectoryConnection,
) -> ProxyResult<Option<Touch>> {
    let membership = session.membership(membership_id).await?;
    let dn = record.first(DN).ok_or(ProxyError::MissingAttribute(DN))?;

    connection.modify(dn, &directory::add_modifications(record)).await?;

    for (key, values) in record.iter().filter(|(key, _)| *key != DN) {
        for value in values {
            session
                .add_ldap_attribute(membership.id, key, value, ADD_VERB)
                .await?;
        }
    }

    let touch = session
        .touch(Artifact::Membership(membership.id), &membership.state)
        .await?;
    session.commit().await?;
    Ok(Some(touch))
}

/// First `cn` value, else the value of a leading `cn=` RDN of `dn`
fn common_name(record: &Record) -> ProxyResult<&str> {
    record
        .first(CN)
        .or_else(|| record.first(DN).and_then(|dn| directory::first_rdn_value(dn, CN)))
        .ok_or(ProxyError::MissingAttribute(CN))
}

/// Entry to modify for a registration
///
/// Records without a `dn` target the entry created for the registration's
/// first claimed common name under the configured search base.
async fn registration_dn(
    record: &Record,
    registration: &Registration,
    config: &ProxyConfig,
    session: &mut dyn Session,
) -> ProxyResult<String> {
    if let Some(dn) = record.first(DN) {
        return Ok(dn.to_string());
    }

    let posix_uid = session
        .posix_uids(registration.id)
        .await?
        .into_iter()
        .next()
        .ok_or(ProxyError::MissingAttribute(DN))?;
    Ok(format!("{}={},{}", CN, posix_uid.common_name, config.ldap.matching.query))
}
