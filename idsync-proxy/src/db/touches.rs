//! Touch log

use chrono::{DateTime, Utc};
use idsync_common::db::{Artifact, Touch};
use idsync_common::{Error, Result};
use sqlx::{Executor, Sqlite};
use uuid::Uuid;

use super::parse_guid;

pub async fn insert_touch<'e, E>(executor: E, touch: &Touch) -> Result<()>
where
    E: Executor<'e, Database = Sqlite>,
{
    sqlx::query(
        r#"
        INSERT INTO touches (artifact_kind, artifact_guid, actor, state, touched_at)
        VALUES (?, ?, ?, ?, ?)
        "#,
    )
    .bind(touch.artifact.kind())
    .bind(touch.artifact.id().to_string())
    .bind(touch.actor.clone())
    .bind(touch.state.clone())
    .bind(touch.touched_at.to_rfc3339())
    .execute(executor)
    .await?;

    Ok(())
}

/// Touches stamped on `artifact_id`, oldest first
pub async fn touch_history<'e, E>(executor: E, artifact_id: Uuid) -> Result<Vec<Touch>>
where
    E: Executor<'e, Database = Sqlite>,
{
    let rows = sqlx::query_as::<_, (String, String, String, String, String)>(
        r#"
        SELECT artifact_kind, artifact_guid, actor, state, touched_at
        FROM touches
        WHERE artifact_guid = ?
        ORDER BY id
        "#,
    )
    .bind(artifact_id.to_string())
    .fetch_all(executor)
    .await?;

    rows.into_iter()
        .map(|(kind, guid, actor, state, touched_at)| {
            let touched_at = DateTime::parse_from_rfc3339(&touched_at)
                .map_err(|e| Error::InvalidInput(format!("Failed to parse touched_at: {}", e)))?
                .with_timezone(&Utc);
            Ok(Touch {
                artifact: Artifact::from_parts(&kind, parse_guid(&guid)?)?,
                actor,
                state,
                touched_at,
            })
        })
        .collect()
}

pub async fn count_touches<'e, E>(executor: E, artifact_id: Uuid) -> Result<i64>
where
    E: Executor<'e, Database = Sqlite>,
{
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM touches WHERE artifact_guid = ?")
        .bind(artifact_id.to_string())
        .fetch_one(executor)
        .await?;

    Ok(count)
}
