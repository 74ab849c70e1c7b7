//! In-memory directory
//!
//! Keeps entries in a shared map and logs every call so callers can assert on
//! exactly what was sent. Individual operations can be set to fail.
//! Filters support `(attr=value)` equality and `(attr=*)` presence
//! assertions, ANDed together regardless of the surrounding operators.

use async_trait::async_trait;
use idsync_common::Record;
use std::collections::{BTreeMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};

use super::{Attributes, DirectoryConnection, DirectoryConnector, Modification, ModifyOp, SearchScope};
use crate::error::{ProxyError, ProxyResult};

/// Call received by a [`MemoryDirectory`] connection
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DirectoryCall {
    Connect { host: String, port: u16 },
    StartTls,
    Bind { user: String },
    Search { base: String, filter: String, scope: SearchScope },
    Add { dn: String, objectclasses: Vec<String>, attributes: Attributes },
    Modify { dn: String, changes: Vec<Modification> },
    Unbind,
}

/// Operation that can be made to fail
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailurePoint {
    Connect,
    StartTls,
    Bind,
    Search,
    Add,
    Modify,
}

#[derive(Default)]
struct DirectoryState {
    /// Keyed by lowercased dn
    entries: BTreeMap<String, Record>,
    calls: Vec<DirectoryCall>,
    failures: HashSet<FailurePoint>,
}

/// Shared in-memory directory; clones see the same entries
#[derive(Clone, Default)]
pub struct MemoryDirectory {
    state: Arc<Mutex<DirectoryState>>,
}

impl MemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `record` under its `dn`
    pub fn insert_entry(&self, record: Record) {
        let dn = record.first("dn").unwrap_or_default().to_lowercase();
        self.lock().entries.insert(dn, record);
    }

    pub fn entry(&self, dn: &str) -> Option<Record> {
        self.lock().entries.get(&dn.to_lowercase()).cloned()
    }

    pub fn entry_count(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn fail_on(&self, point: FailurePoint) {
        self.lock().failures.insert(point);
    }

    pub fn clear_failures(&self) {
        self.lock().failures.clear();
    }

    /// Every call received so far, oldest first
    pub fn calls(&self) -> Vec<DirectoryCall> {
        self.lock().calls.clone()
    }

    pub fn add_count(&self) -> usize {
        self.count_calls(|call| matches!(call, DirectoryCall::Add { .. }))
    }

    pub fn modify_count(&self) -> usize {
        self.count_calls(|call| matches!(call, DirectoryCall::Modify { .. }))
    }

    pub fn connect_count(&self) -> usize {
        self.count_calls(|call| matches!(call, DirectoryCall::Connect { .. }))
    }

    fn count_calls(&self, predicate: impl Fn(&DirectoryCall) -> bool) -> usize {
        self.lock().calls.iter().filter(|call| predicate(call)).count()
    }

    fn lock(&self) -> MutexGuard<'_, DirectoryState> {
        // A panicking test thread must not hide the log from the others
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Record `call`, then fail if `point` is armed
    fn record_call(&self, call: DirectoryCall, point: FailurePoint) -> ProxyResult<MutexGuard<'_, DirectoryState>> {
        let mut state = self.lock();
        state.calls.push(call);
        if state.failures.contains(&point) {
            return Err(ProxyError::directory(format_args!("{:?} failed", point)));
        }
        Ok(state)
    }
}

#[async_trait]
impl DirectoryConnector for MemoryDirectory {
    async fn connect(&self, host: &str, port: u16) -> ProxyResult<Box<dyn DirectoryConnection>> {
        self.record_call(
            DirectoryCall::Connect {
                host: host.to_string(),
                port,
            },
            FailurePoint::Connect,
        )?;
        Ok(Box::new(MemoryConnection {
            directory: self.clone(),
            bound: false,
        }))
    }
}

struct MemoryConnection {
    directory: MemoryDirectory,
    bound: bool,
}

impl MemoryConnection {
    fn ensure_bound(&self) -> ProxyResult<()> {
        if self.bound {
            Ok(())
        } else {
            Err(ProxyError::directory("operation requires a bound connection"))
        }
    }
}

#[async_trait]
impl DirectoryConnection for MemoryConnection {
    async fn start_tls(&mut self) -> ProxyResult<()> {
        self.directory.record_call(DirectoryCall::StartTls, FailurePoint::StartTls)?;
        Ok(())
    }

    async fn bind(&mut self, user: &str, _password: &str) -> ProxyResult<()> {
        self.directory.record_call(
            DirectoryCall::Bind {
                user: user.to_string(),
            },
            FailurePoint::Bind,
        )?;
        self.bound = true;
        Ok(())
    }

    async fn search(&mut self, base: &str, filter: &str, scope: SearchScope) -> ProxyResult<bool> {
        self.ensure_bound()?;
        let state = self.directory.record_call(
            DirectoryCall::Search {
                base: base.to_string(),
                filter: filter.to_string(),
                scope,
            },
            FailurePoint::Search,
        )?;

        let base = base.to_lowercase();
        let assertions = parse_assertions(filter);
        let found = state
            .entries
            .iter()
            .filter(|(dn, _)| in_scope(dn, &base, scope))
            .any(|(_, entry)| assertions.iter().all(|assertion| assertion.matches(entry)));
        Ok(found)
    }

    async fn add(&mut self, dn: &str, objectclasses: &[String], attributes: &Attributes) -> ProxyResult<()> {
        self.ensure_bound()?;
        let mut state = self.directory.record_call(
            DirectoryCall::Add {
                dn: dn.to_string(),
                objectclasses: objectclasses.to_vec(),
                attributes: attributes.clone(),
            },
            FailurePoint::Add,
        )?;

        let key = dn.to_lowercase();
        if state.entries.contains_key(&key) {
            return Err(ProxyError::directory(format_args!("entryAlreadyExists: {}", dn)));
        }

        let mut entry = Record::new();
        entry.insert("dn", dn);
        for objectclass in objectclasses {
            entry.insert("objectclass", objectclass.as_str());
        }
        for (attribute, values) in attributes {
            entry.lookup(attribute).extend(values.iter().cloned());
        }
        state.entries.insert(key, entry);
        Ok(())
    }

    async fn modify(&mut self, dn: &str, changes: &[Modification]) -> ProxyResult<()> {
        self.ensure_bound()?;
        let mut state = self.directory.record_call(
            DirectoryCall::Modify {
                dn: dn.to_string(),
                changes: changes.to_vec(),
            },
            FailurePoint::Modify,
        )?;

        let entry = state
            .entries
            .get_mut(&dn.to_lowercase())
            .ok_or_else(|| ProxyError::directory(format_args!("noSuchObject: {}", dn)))?;

        for change in changes {
            match change.op {
                ModifyOp::Add => entry.lookup(&change.attribute).extend(change.values.iter().cloned()),
                ModifyOp::Replace => {
                    *entry.lookup(&change.attribute) = change.values.iter().cloned().collect();
                }
                ModifyOp::Delete if change.values.is_empty() => {
                    entry.remove(&change.attribute);
                }
                ModifyOp::Delete => {
                    let values = entry.lookup(&change.attribute);
                    for value in &change.values {
                        values.remove(value);
                    }
                }
            }
        }
        Ok(())
    }

    async fn unbind(&mut self) -> ProxyResult<()> {
        self.bound = false;
        self.directory.lock().calls.push(DirectoryCall::Unbind);
        Ok(())
    }
}

fn in_scope(dn: &str, base: &str, scope: SearchScope) -> bool {
    if base.is_empty() {
        return scope != SearchScope::Base || dn.is_empty();
    }
    match scope {
        SearchScope::Base => dn == base,
        SearchScope::OneLevel => dn
            .split_once(',')
            .is_some_and(|(_, parent)| parent == base),
        SearchScope::Subtree => dn == base || dn.ends_with(&format!(",{}", base)),
    }
}

struct Assertion {
    attribute: String,
    /// `None` for a presence test
    value: Option<String>,
}

impl Assertion {
    fn matches(&self, entry: &Record) -> bool {
        let Some(values) = entry.get(&self.attribute) else {
            return false;
        };
        match &self.value {
            None => !values.is_empty(),
            Some(expected) => values.iter().any(|value| value.eq_ignore_ascii_case(expected)),
        }
    }
}

fn parse_assertions(filter: &str) -> Vec<Assertion> {
    filter
        .split('(')
        .filter_map(|part| part.split_once(')').map(|(inner, _)| inner))
        .filter_map(|inner| inner.split_once('='))
        .map(|(attribute, value)| Assertion {
            attribute: attribute.trim().to_lowercase(),
            value: (value != "*").then(|| unescape_filter_value(value)),
        })
        .collect()
}

/// Undo RFC 4515 `\xx` escapes
fn unescape_filter_value(value: &str) -> String {
    let mut bytes = Vec::with_capacity(value.len());
    let raw = value.as_bytes();
    let mut i = 0;
    while i < raw.len() {
        if raw[i] == b'\\' && i + 2 < raw.len() {
            let byte = std::str::from_utf8(&raw[i + 1..i + 3])
                .ok()
                .and_then(|hex| u8::from_str_radix(hex, 16).ok());
            if let Some(byte) = byte {
                bytes.push(byte);
                i += 3;
                continue;
            }
        }
        bytes.push(raw[i]);
        i += 1;
    }
    String::from_utf8_lossy(&bytes).into_owned()
}
