//! Directory-side rows: posix uids and written attributes

use idsync_common::db::{LdapAttribute, PosixUid};
use idsync_common::Result;
use sqlx::{Executor, Sqlite};
use uuid::Uuid;

use super::parse_guid;

pub async fn insert_posix_uid<'e, E>(executor: E, posix_uid: &PosixUid) -> Result<()>
where
    E: Executor<'e, Database = Sqlite>,
{
    sqlx::query("INSERT INTO posix_uids (guid, registration_guid, common_name) VALUES (?, ?, ?)")
        .bind(posix_uid.id.to_string())
        .bind(posix_uid.registration_id.to_string())
        .bind(posix_uid.common_name.clone())
        .execute(executor)
        .await?;

    Ok(())
}

pub async fn posix_uids_for<'e, E>(executor: E, registration_id: Uuid) -> Result<Vec<PosixUid>>
where
    E: Executor<'e, Database = Sqlite>,
{
    let rows = sqlx::query_as::<_, (String, String)>(
        "SELECT guid, common_name FROM posix_uids WHERE registration_guid = ? ORDER BY created_at, guid",
    )
    .bind(registration_id.to_string())
    .fetch_all(executor)
    .await?;

    rows.into_iter()
        .map(|(guid, common_name)| {
            Ok(PosixUid {
                id: parse_guid(&guid)?,
                registration_id,
                common_name,
            })
        })
        .collect()
}

pub async fn insert_ldap_attribute<'e, E>(executor: E, attribute: &LdapAttribute) -> Result<()>
where
    E: Executor<'e, Database = Sqlite>,
{
    sqlx::query("INSERT INTO ldap_attributes (membership_guid, key, value, verb) VALUES (?, ?, ?, ?)")
        .bind(attribute.membership_id.to_string())
        .bind(attribute.key.clone())
        .bind(attribute.value.clone())
        .bind(attribute.verb.clone())
        .execute(executor)
        .await?;

    Ok(())
}

pub async fn ldap_attributes_for<'e, E>(executor: E, membership_id: Uuid) -> Result<Vec<LdapAttribute>>
where
    E: Executor<'e, Database = Sqlite>,
{
    let rows = sqlx::query_as::<_, (String, String, String)>(
        "SELECT key, value, verb FROM ldap_attributes WHERE membership_guid = ? ORDER BY id",
    )
    .bind(membership_id.to_string())
    .fetch_all(executor)
    .await?;

    Ok(rows
        .into_iter()
        .map(|(key, value, verb)| LdapAttribute {
            membership_id,
            key,
            value,
            verb,
        })
        .collect())
}
