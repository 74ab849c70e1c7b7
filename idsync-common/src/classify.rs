//! Registration shape classifier
//!
//! Identity registrations progress through a fixed series of directory entry
//! shapes, each one the previous shape plus extra object classes and
//! attributes. [`classify`] finds the most specific shape a [`Record`] matches.
//!
//! Matching is structural: each template copies its attribute values from the
//! candidate, so only the presence of keys and the object class set decide
//! equality. Object class names compare case-insensitively.
//!
//! | stage | adds object classes | adds attributes | verdict |
//! |---|---|---|---|
//! | 1 | top, person | dn, cn, sn | unverified-anonymous |
//! | 2 | organizationalPerson, inetOrgPerson | mail | by surname / cn length |
//! | 3 | | givenName, displayName | by cn length |
//! | 4 | posixAccount | uid, uidNumber, gidNumber, homeDirectory | user-account |
//! | 5 | ldapPublicKey | loginShell | user-account |
//! | 6 | | sshPublicKey | user-account-with-key |

use crate::record::Record;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// Surname recorded for registrations that never disclosed a name
pub const UNKNOWN_SURNAME: &str = "UNKNOWN";

/// Length of generated account identifiers used as common names
pub const GENERATED_CN_LENGTH: usize = 8;

const OBJECTCLASS: &str = "objectclass";

/// Registration shape of a directory entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RegistrationKind {
    UnverifiedAnonymous,
    VerifiedAnonymous,
    VerifiedNamed,
    UserWithoutAccount,
    UserAccount,
    UserAccountWithKey,
    Unrecognized,
}

impl RegistrationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RegistrationKind::UnverifiedAnonymous => "unverified-anonymous",
            RegistrationKind::VerifiedAnonymous => "verified-anonymous",
            RegistrationKind::VerifiedNamed => "verified-named",
            RegistrationKind::UserWithoutAccount => "user-without-account",
            RegistrationKind::UserAccount => "user-account",
            RegistrationKind::UserAccountWithKey => "user-account-with-key",
            RegistrationKind::Unrecognized => "unrecognized",
        }
    }
}

impl fmt::Display for RegistrationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

struct Stage {
    objectclasses: &'static [&'static str],
    attributes: &'static [&'static str],
    verdict: fn(&Record) -> RegistrationKind,
}

const STAGES: [Stage; 6] = [
    Stage {
        objectclasses: &["top", "person"],
        attributes: &["dn", "cn", "sn"],
        verdict: anonymous_verdict,
    },
    Stage {
        objectclasses: &["organizationalperson", "inetorgperson"],
        attributes: &["mail"],
        verdict: identity_verdict,
    },
    Stage {
        objectclasses: &[],
        attributes: &["givenname", "displayname"],
        verdict: named_verdict,
    },
    Stage {
        objectclasses: &["posixaccount"],
        attributes: &["uid", "uidnumber", "gidnumber", "homedirectory"],
        verdict: account_verdict,
    },
    Stage {
        objectclasses: &["ldappublickey"],
        attributes: &["loginshell"],
        verdict: account_verdict,
    },
    Stage {
        objectclasses: &[],
        attributes: &["sshpublickey"],
        verdict: keyed_account_verdict,
    },
];

/// Classify `record` against the registration shapes
///
/// Deterministic and side-effect free. Stops with `Unrecognized` as soon as
/// the record lacks a key or object class of the current template, since
/// every later template only adds to it.
pub fn classify(record: &Record) -> RegistrationKind {
    let candidate = normalize_objectclasses(record);
    let mut objectclasses = BTreeSet::new();
    let mut attributes: Vec<&str> = Vec::new();

    for stage in &STAGES {
        objectclasses.extend(stage.objectclasses.iter().map(|oc| oc.to_string()));
        attributes.extend_from_slice(stage.attributes);

        let template = build_template(&candidate, &objectclasses, &attributes);
        if candidate == template {
            return (stage.verdict)(&candidate);
        }
        if !covers(&candidate, &template) {
            return RegistrationKind::Unrecognized;
        }
    }

    RegistrationKind::Unrecognized
}

fn anonymous_verdict(_: &Record) -> RegistrationKind {
    RegistrationKind::UnverifiedAnonymous
}

fn account_verdict(_: &Record) -> RegistrationKind {
    RegistrationKind::UserAccount
}

fn keyed_account_verdict(_: &Record) -> RegistrationKind {
    RegistrationKind::UserAccountWithKey
}

/// Surname marker first, then the generated-identifier heuristic
fn identity_verdict(record: &Record) -> RegistrationKind {
    let unknown_surname = record
        .get("sn")
        .is_some_and(|sn| sn.len() == 1 && sn.contains(UNKNOWN_SURNAME));
    if unknown_surname {
        RegistrationKind::VerifiedAnonymous
    } else {
        named_verdict(record)
    }
}

fn named_verdict(record: &Record) -> RegistrationKind {
    if has_generated_cn(record) {
        RegistrationKind::UserWithoutAccount
    } else {
        RegistrationKind::VerifiedNamed
    }
}

fn has_generated_cn(record: &Record) -> bool {
    record
        .get("cn")
        .is_some_and(|cns| cns.iter().any(|cn| cn.chars().count() == GENERATED_CN_LENGTH))
}

fn normalize_objectclasses(record: &Record) -> Record {
    let mut normalized = record.clone();
    if let Some(classes) = record.get(OBJECTCLASS) {
        *normalized.lookup(OBJECTCLASS) = classes.iter().map(|oc| oc.to_lowercase()).collect();
    }
    normalized
}

/// Template with fixed object classes and the candidate's values for `attributes`
fn build_template(candidate: &Record, objectclasses: &BTreeSet<String>, attributes: &[&str]) -> Record {
    let mut template = Record::new();
    *template.lookup(OBJECTCLASS) = objectclasses.clone();
    for attribute in attributes {
        *template.lookup(attribute) = candidate.get(attribute).cloned().unwrap_or_default();
    }
    template
}

/// Whether `candidate` has every key of `template` and all of its object classes
fn covers(candidate: &Record, template: &Record) -> bool {
    let has_keys = template.keys().all(|key| candidate.contains_key(key));
    let has_classes = match (candidate.get(OBJECTCLASS), template.get(OBJECTCLASS)) {
        (Some(have), Some(need)) => need.is_subset(have),
        (_, None) => true,
        (None, Some(_)) => false,
    };
    has_keys && has_classes
}

#[cfg(test)]
mod tests {
    use super::*;

    const STAGE1: &str = "dn: cn=alice,ou=people\ncn: alice\nsn: UNKNOWN\nobjectClass: top\nobjectClass: person\n";
    const STAGE2_EXTRA: &str = "objectClass: organizationalPerson\nobjectClass: inetOrgPerson\nmail: alice@example.org\n";
    const STAGE3_EXTRA: &str = "givenName: Alice\ndisplayName: Alice Liddell\n";
    const STAGE4_EXTRA: &str = "objectClass: posixAccount\nuid: alice\nuidNumber: 10001\ngidNumber: 10001\nhomeDirectory: /home/alice\n";
    const STAGE5_EXTRA: &str = "objectClass: ldapPublicKey\nloginShell: /bin/bash\n";
    const STAGE6_EXTRA: &str = "sshPublicKey: ssh-ed25519 AAAAC3Nza alice@laptop\n";

    fn stages(n: usize) -> Record {
        let parts = [STAGE1, STAGE2_EXTRA, STAGE3_EXTRA, STAGE4_EXTRA, STAGE5_EXTRA, STAGE6_EXTRA];
        Record::parse(&parts[..n].concat())
    }

    fn with_values(mut record: Record, key: &str, values: &[&str]) -> Record {
        *record.lookup(key) = values.iter().map(|v| v.to_string()).collect();
        record
    }

    #[test]
    fn test_stage1_is_unverified_anonymous() {
        assert_eq!(classify(&stages(1)), RegistrationKind::UnverifiedAnonymous);
    }

    #[test]
    fn test_stage2_unknown_surname_is_verified_anonymous() {
        assert_eq!(classify(&stages(2)), RegistrationKind::VerifiedAnonymous);
    }

    #[test]
    fn test_stage2_generated_cn_is_user_without_account() {
        let record = with_values(stages(2), "sn", &["Liddell"]);
        let record = with_values(record, "cn", &["ab12cd34"]);
        assert_eq!(classify(&record), RegistrationKind::UserWithoutAccount);
    }

    #[test]
    fn test_stage2_named_surname_is_verified_named() {
        let record = with_values(stages(2), "sn", &["Liddell"]);
        assert_eq!(classify(&record), RegistrationKind::VerifiedNamed);
    }

    #[test]
    fn test_stage2_unknown_surname_wins_over_generated_cn() {
        let record = with_values(stages(2), "cn", &["ab12cd34"]);
        assert_eq!(classify(&record), RegistrationKind::VerifiedAnonymous);
    }

    #[test]
    fn test_stage3_named_and_generated() {
        assert_eq!(classify(&stages(3)), RegistrationKind::VerifiedNamed);
        let record = with_values(stages(3), "cn", &["alice", "x7k2m9q4"]);
        assert_eq!(classify(&record), RegistrationKind::UserWithoutAccount);
    }

    #[test]
    fn test_account_stages() {
        assert_eq!(classify(&stages(4)), RegistrationKind::UserAccount);
        assert_eq!(classify(&stages(5)), RegistrationKind::UserAccount);
        assert_eq!(classify(&stages(6)), RegistrationKind::UserAccountWithKey);
    }

    #[test]
    fn test_objectclass_case_is_ignored() {
        let record = with_values(stages(1), "objectclass", &["TOP", "Person"]);
        assert_eq!(classify(&record), RegistrationKind::UnverifiedAnonymous);
    }

    #[test]
    fn test_missing_objectclasses_is_unrecognized() {
        let record = Record::parse("dn: cn=x\ncn: x\nsn: y\nobjectClass: device\n");
        assert_eq!(classify(&record), RegistrationKind::Unrecognized);
        assert_eq!(classify(&Record::new()), RegistrationKind::Unrecognized);
    }

    #[test]
    fn test_extra_attribute_is_unrecognized() {
        let mut record = stages(2);
        record.insert("telephoneNumber", "+1 555 0100");
        assert_eq!(classify(&record), RegistrationKind::Unrecognized);
    }

    #[test]
    fn test_partial_stage_is_unrecognized() {
        // posixAccount without homeDirectory
        let mut record = stages(4);
        record.remove("homeDirectory");
        assert_eq!(classify(&record), RegistrationKind::Unrecognized);
    }

    #[test]
    fn test_empty_vivified_key_breaks_match() {
        let mut record = stages(1);
        record.lookup("mail");
        assert_eq!(classify(&record), RegistrationKind::Unrecognized);
    }

    #[test]
    fn test_classify_is_deterministic_and_pure() {
        let record = stages(3);
        let before = record.clone();
        assert_eq!(classify(&record), classify(&record));
        assert_eq!(record, before);
    }
}
