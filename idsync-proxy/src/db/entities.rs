//! Registration and membership rows

use idsync_common::db::{Membership, Registration};
use idsync_common::Result;
use sqlx::{Executor, Sqlite};
use uuid::Uuid;

pub async fn find_registration<'e, E>(executor: E, id: Uuid) -> Result<Option<Registration>>
where
    E: Executor<'e, Database = Sqlite>,
{
    let row = sqlx::query_as::<_, (String,)>("SELECT state FROM registrations WHERE guid = ?")
        .bind(id.to_string())
        .fetch_optional(executor)
        .await?;

    Ok(row.map(|(state,)| Registration { id, state }))
}

pub async fn insert_registration<'e, E>(executor: E, id: Uuid, state: &str) -> Result<()>
where
    E: Executor<'e, Database = Sqlite>,
{
    sqlx::query("INSERT INTO registrations (guid, state) VALUES (?, ?)")
        .bind(id.to_string())
        .bind(state.to_string())
        .execute(executor)
        .await?;

    Ok(())
}

/// Move a registration to `state`; returns whether a row was updated
pub async fn set_registration_state<'e, E>(executor: E, id: Uuid, state: &str) -> Result<bool>
where
    E: Executor<'e, Database = Sqlite>,
{
    let result = sqlx::query(
        "UPDATE registrations SET state = ?, updated_at = CURRENT_TIMESTAMP WHERE guid = ?",
    )
    .bind(state.to_string())
    .bind(id.to_string())
    .execute(executor)
    .await?;

    Ok(result.rows_affected() > 0)
}

pub async fn find_membership<'e, E>(executor: E, id: Uuid) -> Result<Option<Membership>>
where
    E: Executor<'e, Database = Sqlite>,
{
    let row = sqlx::query_as::<_, (String,)>("SELECT state FROM memberships WHERE guid = ?")
        .bind(id.to_string())
        .fetch_optional(executor)
        .await?;

    Ok(row.map(|(state,)| Membership { id, state }))
}

pub async fn insert_membership<'e, E>(executor: E, id: Uuid, state: &str) -> Result<()>
where
    E: Executor<'e, Database = Sqlite>,
{
    sqlx::query("INSERT INTO memberships (guid, state) VALUES (?, ?)")
        .bind(id.to_string())
        .bind(state.to_string())
        .execute(executor)
        .await?;

    Ok(())
}

/// Re-stamp a membership without changing its state
pub async fn restamp_membership<'e, E>(executor: E, id: Uuid) -> Result<bool>
where
    E: Executor<'e, Database = Sqlite>,
{
    let result = sqlx::query("UPDATE memberships SET updated_at = CURRENT_TIMESTAMP WHERE guid = ?")
        .bind(id.to_string())
        .execute(executor)
        .await?;

    Ok(result.rows_affected() > 0)
}
