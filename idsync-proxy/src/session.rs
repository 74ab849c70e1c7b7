//! Persistence session
//!
//! The dispatch loop owns one [`Session`] for its whole life and drives it
//! sequentially: each handler reads and writes through it, then either
//! commits or the loop rolls it back. Writes of one message never leak into
//! another because every message ends in exactly one commit or rollback.

use async_trait::async_trait;
use chrono::Utc;
use idsync_common::db::{Artifact, LdapAttribute, Membership, PosixUid, Registration, Touch};
use sqlx::{Sqlite, SqlitePool, Transaction};
use tracing::debug;
use uuid::Uuid;

use crate::db;
use crate::error::{ProxyError, ProxyResult};

/// Unit of work against the tracked identity entities
#[async_trait]
pub trait Session: Send {
    async fn registration(&mut self, id: Uuid) -> ProxyResult<Registration>;

    async fn membership(&mut self, id: Uuid) -> ProxyResult<Membership>;

    /// Append a touch stamping `artifact` with `state`
    ///
    /// A registration also moves to `state`; a membership keeps its state and
    /// only gets a fresh timestamp.
    async fn touch(&mut self, artifact: Artifact, state: &str) -> ProxyResult<Touch>;

    async fn add_posix_uid(&mut self, registration_id: Uuid, common_name: &str) -> ProxyResult<PosixUid>;

    /// Common names already claimed by a registration, oldest first
    async fn posix_uids(&mut self, registration_id: Uuid) -> ProxyResult<Vec<PosixUid>>;

    async fn add_ldap_attribute(
        &mut self,
        membership_id: Uuid,
        key: &str,
        value: &str,
        verb: &str,
    ) -> ProxyResult<LdapAttribute>;

    async fn commit(&mut self) -> ProxyResult<()>;

    async fn rollback(&mut self) -> ProxyResult<()>;
}

/// SQLite-backed session
///
/// A transaction is opened on first use and closed by `commit` or `rollback`.
pub struct SqliteSession {
    pool: SqlitePool,
    actor: String,
    tx: Option<Transaction<'static, Sqlite>>,
}

impl SqliteSession {
    /// `actor` is stamped on every touch this session writes
    pub fn new(pool: SqlitePool, actor: impl Into<String>) -> Self {
        Self {
            pool,
            actor: actor.into(),
            tx: None,
        }
    }

    /// Whether a transaction is currently open
    pub fn in_transaction(&self) -> bool {
        self.tx.is_some()
    }

    async fn transaction(&mut self) -> ProxyResult<&mut Transaction<'static, Sqlite>> {
        if self.tx.is_none() {
            debug!("Beginning transaction");
            self.tx = Some(self.pool.begin().await?);
        }
        self.tx
            .as_mut()
            .ok_or_else(|| ProxyError::Session("transaction unavailable".to_string()))
    }
}

#[async_trait]
impl Session for SqliteSession {
    async fn registration(&mut self, id: Uuid) -> ProxyResult<Registration> {
        let tx = self.transaction().await?;
        db::find_registration(&mut **tx, id)
            .await?
            .ok_or_else(|| ProxyError::NotFound(format!("registration {}", id)))
    }

    async fn membership(&mut self, id: Uuid) -> ProxyResult<Membership> {
        let tx = self.transaction().await?;
        db::find_membership(&mut **tx, id)
            .await?
            .ok_or_else(|| ProxyError::NotFound(format!("membership {}", id)))
    }

    async fn touch(&mut self, artifact: Artifact, state: &str) -> ProxyResult<Touch> {
        let touch = Touch {
            artifact,
            actor: self.actor.clone(),
            state: state.to_string(),
            touched_at: Utc::now(),
        };

        let tx = self.transaction().await?;
        let updated = match artifact {
            Artifact::Registration(id) => db::set_registration_state(&mut **tx, id, state).await?,
            Artifact::Membership(id) => db::restamp_membership(&mut **tx, id).await?,
        };
        if !updated {
            return Err(ProxyError::NotFound(format!("{} {}", artifact.kind(), artifact.id())));
        }
        db::insert_touch(&mut **tx, &touch).await?;

        Ok(touch)
    }

    async fn add_posix_uid(&mut self, registration_id: Uuid, common_name: &str) -> ProxyResult<PosixUid> {
        let posix_uid = PosixUid {
            id: Uuid::new_v4(),
            registration_id,
            common_name: common_name.to_string(),
        };
        let tx = self.transaction().await?;
        db::insert_posix_uid(&mut **tx, &posix_uid).await?;
        Ok(posix_uid)
    }

    async fn posix_uids(&mut self, registration_id: Uuid) -> ProxyResult<Vec<PosixUid>> {
        let tx = self.transaction().await?;
        Ok(db::posix_uids_for(&mut **tx, registration_id).await?)
    }

    async fn add_ldap_attribute(
        &mut self,
        membership_id: Uuid,
        key: &str,
        value: &str,
        verb: &str,
    ) -> ProxyResult<LdapAttribute> {
        let attribute = LdapAttribute {
            membership_id,
            key: key.to_string(),
            value: value.to_string(),
            verb: verb.to_string(),
        };
        let tx = self.transaction().await?;
        db::insert_ldap_attribute(&mut **tx, &attribute).await?;
        Ok(attribute)
    }

    async fn commit(&mut self) -> ProxyResult<()> {
        if let Some(tx) = self.tx.take() {
            tx.commit().await?;
            debug!("Transaction committed");
        }
        Ok(())
    }

    async fn rollback(&mut self) -> ProxyResult<()> {
        if let Some(tx) = self.tx.take() {
            tx.rollback().await?;
            debug!("Transaction rolled back");
        }
        Ok(())
    }
}
