//! Directory service collaborator
//!
//! The proxy talks to the directory only through these traits. A transport
//! crate supplies the real connector; [`memory::MemoryDirectory`] is an
//! in-process implementation that records every call.
//!
//! One connection is opened per dispatched message and never shared.

pub mod memory;

use async_trait::async_trait;
use idsync_common::config::LdapConfig;
use idsync_common::Record;
use std::collections::BTreeMap;
use tracing::debug;

use crate::error::ProxyResult;

/// Attribute name to values, as sent with an add request
pub type Attributes = BTreeMap<String, Vec<String>>;

const DN: &str = "dn";
const OBJECTCLASS: &str = "objectclass";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchScope {
    Base,
    OneLevel,
    Subtree,
}

/// Modify operation kind; the proxy itself only ever adds values
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModifyOp {
    Add,
    Replace,
    Delete,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Modification {
    pub op: ModifyOp,
    pub attribute: String,
    pub values: Vec<String>,
}

/// Opens connections to the directory server
#[async_trait]
pub trait DirectoryConnector: Send + Sync {
    async fn connect(&self, host: &str, port: u16) -> ProxyResult<Box<dyn DirectoryConnection>>;
}

/// One open directory connection
#[async_trait]
pub trait DirectoryConnection: Send {
    /// Upgrade the connection to TLS
    async fn start_tls(&mut self) -> ProxyResult<()>;

    async fn bind(&mut self, user: &str, password: &str) -> ProxyResult<()>;

    /// Whether any entry under `base` matches `filter`
    async fn search(&mut self, base: &str, filter: &str, scope: SearchScope) -> ProxyResult<bool>;

    async fn add(&mut self, dn: &str, objectclasses: &[String], attributes: &Attributes) -> ProxyResult<()>;

    async fn modify(&mut self, dn: &str, changes: &[Modification]) -> ProxyResult<()>;

    async fn unbind(&mut self) -> ProxyResult<()> {
        Ok(())
    }
}

/// Connect, negotiate TLS and bind with the configured service account
pub async fn open(
    connector: &dyn DirectoryConnector,
    config: &LdapConfig,
) -> ProxyResult<Box<dyn DirectoryConnection>> {
    debug!(host = %config.search.host, port = config.search.port, "Opening directory connection");
    let mut connection = connector.connect(&config.search.host, config.search.port).await?;
    connection.start_tls().await?;
    connection.bind(&config.creds.user, &config.creds.password).await?;
    Ok(connection)
}

/// Object classes and remaining attributes of `record`, `dn` excluded
///
/// Keys with no values (left behind by auto-vivifying lookups) are skipped.
pub fn add_request(record: &Record) -> (Vec<String>, Attributes) {
    let objectclasses = record
        .get(OBJECTCLASS)
        .map(|classes| classes.iter().cloned().collect())
        .unwrap_or_default();

    let attributes = record
        .iter()
        .filter(|(key, values)| *key != DN && *key != OBJECTCLASS && !values.is_empty())
        .map(|(key, values)| (key.to_string(), values.iter().cloned().collect()))
        .collect();

    (objectclasses, attributes)
}

/// One add modification per attribute of `record`, `dn` excluded
pub fn add_modifications(record: &Record) -> Vec<Modification> {
    record
        .iter()
        .filter(|(key, values)| *key != DN && !values.is_empty())
        .map(|(key, values)| Modification {
            op: ModifyOp::Add,
            attribute: key.to_string(),
            values: values.iter().cloned().collect(),
        })
        .collect()
}

/// Value of the first RDN of `dn` when its attribute is `attribute`
///
/// `first_rdn_value("cn=alice,ou=people", "cn")` is `alice`; the same dn asked
/// for `uid` gives `None`.
pub fn first_rdn_value<'a>(dn: &'a str, attribute: &str) -> Option<&'a str> {
    let rdn = dn.split(',').next()?;
    let (name, value) = rdn.split_once('=')?;
    let value = value.trim();
    (name.trim().eq_ignore_ascii_case(attribute) && !value.is_empty()).then_some(value)
}
