//! Tests for database initialization

use idsync_common::db::init::init_database;

#[tokio::test]
async fn test_database_creation_when_missing() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("nested").join("idsync.db");

    let result = init_database(&db_path).await;

    assert!(result.is_ok(), "Database initialization failed: {:?}", result.err());
    assert!(db_path.exists(), "Database file was not created");
}

#[tokio::test]
async fn test_database_opens_existing() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("idsync.db");

    let pool1 = init_database(&db_path).await;
    assert!(pool1.is_ok());

    // Schema creation must be idempotent
    let pool2 = init_database(&db_path).await;
    assert!(pool2.is_ok(), "Failed to open existing database: {:?}", pool2.err());
}

#[tokio::test]
async fn test_all_tables_created() {
    let dir = tempfile::tempdir().unwrap();
    let pool = init_database(&dir.path().join("idsync.db")).await.unwrap();

    for table in ["registrations", "memberships", "touches", "posix_uids", "ldap_attributes"] {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?",
        )
        .bind(table)
        .fetch_one(&pool)
        .await
        .unwrap();
        assert_eq!(count, 1, "table {} missing", table);
    }
}

#[tokio::test]
async fn test_touch_artifact_kind_is_checked() {
    let dir = tempfile::tempdir().unwrap();
    let pool = init_database(&dir.path().join("idsync.db")).await.unwrap();

    let result = sqlx::query(
        "INSERT INTO touches (artifact_kind, artifact_guid, actor, state, touched_at) VALUES ('group', 'x', 'a', 's', 't')",
    )
    .execute(&pool)
    .await;

    assert!(result.is_err(), "unknown artifact kind must be rejected");
}

#[tokio::test]
async fn test_posix_uid_common_name_is_unique() {
    let dir = tempfile::tempdir().unwrap();
    let pool = init_database(&dir.path().join("idsync.db")).await.unwrap();

    sqlx::query("INSERT INTO registrations (guid, state) VALUES ('r1', 'pre_user_inetorgperson')")
        .execute(&pool)
        .await
        .unwrap();

    let insert = "INSERT INTO posix_uids (guid, registration_guid, common_name) VALUES (?, 'r1', 'alice')";
    sqlx::query(insert).bind("p1").execute(&pool).await.unwrap();
    let duplicate = sqlx::query(insert).bind("p2").execute(&pool).await;

    assert!(duplicate.is_err());
}
