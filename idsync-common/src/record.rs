//! Directory record model
//!
//! A [`Record`] is one directory entry: a case-insensitive mapping from
//! attribute name to a set of string values. Records are built from
//! line-oriented `key: value` text (LDIF style) and are the unit of data
//! exchanged between the classifier, the dispatch core and the directory.
//!
//! # Semantics
//!
//! - Keys are stored lowercased; value order is irrelevant and duplicates merge.
//! - Two records are equal iff they have the same keys and each key maps to the
//!   same value set. Keys with an empty value set still count as keys.
//! - `a > b` iff `a` holds more values in total than `b` (see [`Record::value_count`]).
//! - [`Record::lookup`] creates an empty entry for a missing key. Callers that
//!   must not alter the key set use [`Record::get`] instead.

use base64::Engine;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// Multi-valued, case-insensitive directory entry
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(
    from = "BTreeMap<String, BTreeSet<String>>",
    into = "BTreeMap<String, BTreeSet<String>>"
)]
pub struct Record {
    entries: BTreeMap<String, BTreeSet<String>>,
}

impl Record {
    /// Create an empty record
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a line-oriented `key: value` block
    ///
    /// - Lines starting with whitespace continue the previous value; their
    ///   trimmed content is appended to it.
    /// - `key:: value` marks a base64 encoded value (decoded after folding).
    /// - Blank lines, `#` comments and lines without a `:` are skipped.
    pub fn parse(text: &str) -> Self {
        let mut record = Self::new();
        let mut pending: Option<PendingValue> = None;

        for line in text.lines() {
            if line.starts_with([' ', '\t']) {
                if let Some(pending) = pending.as_mut() {
                    pending.value.push_str(line.trim());
                }
                continue;
            }

            if let Some(done) = pending.take() {
                done.flush_into(&mut record);
            }
            pending = PendingValue::from_line(line);
        }

        if let Some(done) = pending {
            done.flush_into(&mut record);
        }

        record
    }

    /// Add `value` to the value set of `key`
    pub fn insert(&mut self, key: impl AsRef<str>, value: impl Into<String>) {
        self.entries
            .entry(key.as_ref().to_lowercase())
            .or_default()
            .insert(value.into());
    }

    /// Value set for `key`, created empty (and kept) when the key is unknown
    ///
    /// This auto-vivification is relied on by record producers that build
    /// entries incrementally; it changes the key set and therefore equality.
    pub fn lookup(&mut self, key: &str) -> &mut BTreeSet<String> {
        self.entries.entry(key.to_lowercase()).or_default()
    }

    /// Value set for `key` without creating an entry
    pub fn get(&self, key: &str) -> Option<&BTreeSet<String>> {
        self.entries.get(&key.to_lowercase())
    }

    /// First value (in canonical order) of `key`
    pub fn first(&self, key: &str) -> Option<&str> {
        self.get(key)
            .and_then(|values| values.iter().next())
            .map(String::as_str)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.contains_key(&key.to_lowercase())
    }

    pub fn remove(&mut self, key: &str) -> Option<BTreeSet<String>> {
        self.entries.remove(&key.to_lowercase())
    }

    /// Iterate `(key, values)` in key order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &BTreeSet<String>)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    /// Number of keys (including auto-vivified empty ones)
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Total number of values across all keys
    pub fn value_count(&self) -> usize {
        self.entries.values().map(BTreeSet::len).sum()
    }
}

impl PartialOrd for Record {
    /// Equal records compare `Equal`; otherwise the record with more values is
    /// greater. Unequal records holding the same number of values are unordered.
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        if self == other {
            return Some(Ordering::Equal);
        }
        match self.value_count().cmp(&other.value_count()) {
            Ordering::Equal => None,
            ordering => Some(ordering),
        }
    }
}

impl fmt::Display for Record {
    /// Canonical emission: one line per value, keys and values sorted
    ///
    /// Values that would not survive a plain `key: value` line are written
    /// as `key:: <base64>`.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (key, values) in &self.entries {
            for value in values {
                if is_safe_string(value) {
                    writeln!(f, "{}: {}", key, value)?;
                } else {
                    let encoded = base64::engine::general_purpose::STANDARD.encode(value.as_bytes());
                    writeln!(f, "{}:: {}", key, encoded)?;
                }
            }
        }
        Ok(())
    }
}

/// RFC 2849 SAFE-STRING, tightened to what `parse` keeps verbatim
fn is_safe_string(value: &str) -> bool {
    let starts_ok = !value.starts_with([':', '<']) && !value.starts_with(char::is_whitespace);
    let ends_ok = !value.ends_with(char::is_whitespace);
    let chars_ok = value
        .chars()
        .all(|c| c.is_ascii() && !matches!(c, '\r' | '\n' | '\0'));
    starts_ok && ends_ok && chars_ok
}

impl<K, V> FromIterator<(K, V)> for Record
where
    K: AsRef<str>,
    V: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut record = Self::new();
        for (key, value) in iter {
            record.insert(key, value);
        }
        record
    }
}

impl From<BTreeMap<String, BTreeSet<String>>> for Record {
    fn from(map: BTreeMap<String, BTreeSet<String>>) -> Self {
        let mut record = Self::new();
        for (key, values) in map {
            record.lookup(&key).extend(values);
        }
        record
    }
}

impl From<Record> for BTreeMap<String, BTreeSet<String>> {
    fn from(record: Record) -> Self {
        record.entries
    }
}

/// Split LDIF text into entries on blank lines and parse each one
///
/// Blocks that yield no attributes (comment-only, `version:`-less noise) are dropped.
pub fn parse_ldif(text: &str) -> Vec<Record> {
    let mut records = Vec::new();
    let mut block = String::new();

    for line in text.lines() {
        if line.trim().is_empty() {
            push_block(&mut records, &block);
            block.clear();
        } else {
            block.push_str(line);
            block.push('\n');
        }
    }
    push_block(&mut records, &block);

    records
}

fn push_block(records: &mut Vec<Record>, block: &str) {
    if block.is_empty() {
        return;
    }
    let record = Record::parse(block);
    if !record.is_empty() {
        records.push(record);
    }
}

/// Key/value line awaiting possible continuation lines
struct PendingValue {
    key: String,
    value: String,
    base64: bool,
}

impl PendingValue {
    fn from_line(line: &str) -> Option<Self> {
        if line.starts_with('#') {
            return None;
        }
        let (key, rest) = line.split_once(':')?;
        let key = key.trim();
        if key.is_empty() {
            return None;
        }
        let (base64, value) = match rest.strip_prefix(':') {
            Some(encoded) => (true, encoded.trim()),
            None => (false, rest.trim()),
        };
        Some(Self {
            key: key.to_string(),
            value: value.to_string(),
            base64,
        })
    }

    fn flush_into(self, record: &mut Record) {
        if !self.base64 {
            record.insert(&self.key, self.value);
            return;
        }
        let decoded = base64::engine::general_purpose::STANDARD
            .decode(self.value.as_bytes())
            .ok()
            .and_then(|bytes| String::from_utf8(bytes).ok());
        match decoded {
            Some(value) => record.insert(&self.key, value),
            None => tracing::debug!(key = %self.key, "Skipping undecodable base64 value"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn alice() -> Record {
        Record::parse("dn: cn=alice,ou=people\ncn: alice\nobjectClass: top\nobjectClass: person\n")
    }

    #[test]
    fn test_parse_lowercases_keys_and_merges_values() {
        let record = Record::parse("CN: alice\ncn: alice\ncn: Alice\n");
        assert_eq!(record.len(), 1);
        assert_eq!(record.get("cn").map(BTreeSet::len), Some(2));
        assert!(record.contains_key("Cn"));
    }

    #[test]
    fn test_parse_continuation_lines() {
        let record = Record::parse("description: first\n  part\n\tsecond\ncn: bob\n");
        assert_eq!(record.first("description"), Some("firstpartsecond"));
        assert_eq!(record.first("cn"), Some("bob"));
    }

    #[test]
    fn test_parse_skips_blank_comment_and_unparsable_lines() {
        let record = Record::parse("# comment\n\nnot a pair\n: novalue\n  orphan continuation\ncn: carol\n");
        assert_eq!(record.len(), 1);
        assert_eq!(record.first("cn"), Some("carol"));
    }

    #[test]
    fn test_parse_splits_on_first_colon_only() {
        let record = Record::parse("labeledURI: https://example.org/~carol\n");
        assert_eq!(record.first("labeleduri"), Some("https://example.org/~carol"));
    }

    #[test]
    fn test_parse_base64_value() {
        // "Zoë" in UTF-8
        let record = Record::parse("givenName:: Wm/Dqw==\n");
        assert_eq!(record.first("givenname"), Some("Zoë"));
    }

    #[test]
    fn test_parse_invalid_base64_is_skipped() {
        let record = Record::parse("givenName:: !!!\ncn: dave\n");
        assert!(!record.contains_key("givenname"));
        assert_eq!(record.first("cn"), Some("dave"));
    }

    #[test]
    fn test_lookup_auto_vivifies() {
        let mut record = alice();
        let before = record.clone();
        assert!(record.lookup("mail").is_empty());
        assert!(record.contains_key("mail"));
        assert_ne!(record, before, "vivified key must change equality");
    }

    #[test]
    fn test_get_does_not_vivify() {
        let record = alice();
        assert!(record.get("mail").is_none());
        assert!(!record.contains_key("mail"));
    }

    #[test]
    fn test_equality_reflexive_and_symmetric() {
        let a = alice();
        let b = Record::parse("objectclass: person\nobjectclass: top\ncn: alice\ndn: cn=alice,ou=people\n");
        assert_eq!(a, a.clone());
        assert_eq!(a, b);
        assert_eq!(b, a);
    }

    #[test]
    fn test_equality_requires_same_value_sets() {
        let a = alice();
        let mut b = alice();
        b.insert("cn", "alicia");
        assert_ne!(a, b);
        assert_ne!(b, a);
    }

    #[test]
    fn test_ordering_by_value_count() {
        let small = Record::parse("cn: a\n");
        let large = Record::parse("cn: a\nsn: b\n");
        assert!(large > small);
        assert!(small < large);
        assert!(!(small > large));
    }

    #[test]
    fn test_equal_records_are_not_greater() {
        let a = alice();
        let b = alice();
        assert!(!(a > b));
        assert!(!(b > a));
        assert_eq!(a.partial_cmp(&b), Some(Ordering::Equal));
    }

    #[test]
    fn test_unequal_records_with_same_count_are_unordered() {
        let a = Record::parse("cn: a\n");
        let b = Record::parse("sn: a\n");
        assert_eq!(a.partial_cmp(&b), None);
        assert!(!(a > b) && !(b > a));
    }

    #[test]
    fn test_canonical_emission_reparses_equal() {
        let original = Record::parse(
            "dn: cn=erin,ou=people\nobjectClass: top\nobjectClass: inetOrgPerson\ndescription: long\n  text\n",
        );
        let reparsed = Record::parse(&original.to_string());
        assert_eq!(original, reparsed);
    }

    #[test]
    fn test_unsafe_values_emit_as_base64() {
        let original = Record::parse("description:: IGxlYWQ=\nnote:: YQpiOiBj\ngivenName:: Wm/Dqw==\ncn: plain\n");
        assert_eq!(original.first("description"), Some(" lead"));
        assert_eq!(original.first("note"), Some("a\nb: c"));

        let emitted = original.to_string();
        assert!(emitted.contains("cn: plain\n"));
        assert!(emitted.contains("description:: IGxlYWQ=\n"));
        assert!(emitted.contains("givenname:: Wm/Dqw==\n"));

        let reparsed = Record::parse(&emitted);
        assert_eq!(original, reparsed);
        assert!(!reparsed.contains_key("b"));
    }

    #[test]
    fn test_values_with_edge_characters_reparse_equal() {
        let original: Record = [
            ("description", "trailing "),
            ("description", ":colon first"),
            ("description", "<angle first"),
            ("description", "nul\0inside"),
            ("description", "cr\rinside"),
            ("description", ""),
        ]
        .into_iter()
        .collect();
        let reparsed = Record::parse(&original.to_string());
        assert_eq!(original, reparsed);
    }

    #[test]
    fn test_parse_ldif_splits_entries() {
        let text = "version: 1\n\ndn: cn=a\ncn: a\n\n\n# only a comment\n\ndn: cn=b\ncn: b\n";
        let records = parse_ldif(text);
        assert_eq!(records.len(), 3);
        assert_eq!(records[1].first("cn"), Some("a"));
        assert_eq!(records[2].first("dn"), Some("cn=b"));
    }

    #[test]
    fn test_serde_normalizes_keys() {
        let record: Record = serde_json::from_str(r#"{"CN": ["alice"], "cn": ["al"]}"#).unwrap();
        assert_eq!(record.get("cn").map(BTreeSet::len), Some(2));
        let json = serde_json::to_string(&record).unwrap();
        assert_eq!(json, r#"{"cn":["al","alice"]}"#);
    }
}
