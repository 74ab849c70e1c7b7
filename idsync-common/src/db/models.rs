//! Database models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::Error;

/// Registration lifecycle states written by the proxy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RegistrationState {
    /// Directory entry created, posix attributes pending
    PreUserPosixaccount,
    /// Common name already taken in the directory; needs manual review
    PreUserInetorgpersonDn,
    /// Posix attributes written, public key pending
    PreUserLdappublickey,
    Valid,
}

impl RegistrationState {
    pub fn as_str(&self) -> &'static str {
        match self {
            RegistrationState::PreUserPosixaccount => "pre_user_posixaccount",
            RegistrationState::PreUserInetorgpersonDn => "pre_user_inetorgperson_dn",
            RegistrationState::PreUserLdappublickey => "pre_user_ldappublickey",
            RegistrationState::Valid => "valid",
        }
    }
}

impl fmt::Display for RegistrationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RegistrationState {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pre_user_posixaccount" => Ok(RegistrationState::PreUserPosixaccount),
            "pre_user_inetorgperson_dn" => Ok(RegistrationState::PreUserInetorgpersonDn),
            "pre_user_ldappublickey" => Ok(RegistrationState::PreUserLdappublickey),
            "valid" => Ok(RegistrationState::Valid),
            other => Err(Error::InvalidInput(format!("Unknown registration state: {}", other))),
        }
    }
}

/// Tracked entity a touch is stamped on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum Artifact {
    Registration(Uuid),
    Membership(Uuid),
}

impl Artifact {
    /// Value of the `touches.artifact_kind` column
    pub fn kind(&self) -> &'static str {
        match self {
            Artifact::Registration(_) => "registration",
            Artifact::Membership(_) => "membership",
        }
    }

    pub fn id(&self) -> Uuid {
        match self {
            Artifact::Registration(id) | Artifact::Membership(id) => *id,
        }
    }

    /// Rebuild from stored column values
    pub fn from_parts(kind: &str, id: Uuid) -> crate::Result<Self> {
        match kind {
            "registration" => Ok(Artifact::Registration(id)),
            "membership" => Ok(Artifact::Membership(id)),
            other => Err(Error::InvalidInput(format!("Unknown artifact kind: {}", other))),
        }
    }
}

/// Audit row stamping an artifact with a state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Touch {
    pub artifact: Artifact,
    pub actor: String,
    pub state: String,
    pub touched_at: DateTime<Utc>,
}

impl fmt::Display for Touch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.artifact.id(), self.state)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Registration {
    pub id: Uuid,
    /// Stored as text: registrations may sit in states the proxy never writes
    pub state: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Membership {
    pub id: Uuid,
    pub state: String,
}

/// Common name claimed in the directory by a registration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PosixUid {
    pub id: Uuid,
    pub registration_id: Uuid,
    pub common_name: String,
}

/// Attribute value written to the directory on behalf of a membership
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LdapAttribute {
    pub membership_id: Uuid,
    pub key: String,
    pub value: String,
    pub verb: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registration_state_round_trips_through_str() {
        for state in [
            RegistrationState::PreUserPosixaccount,
            RegistrationState::PreUserInetorgpersonDn,
            RegistrationState::PreUserLdappublickey,
            RegistrationState::Valid,
        ] {
            assert_eq!(state.as_str().parse::<RegistrationState>().unwrap(), state);
        }
        assert!("pre_user".parse::<RegistrationState>().is_err());
    }

    #[test]
    fn test_artifact_parts() {
        let id = Uuid::new_v4();
        let artifact = Artifact::Membership(id);
        assert_eq!(artifact.kind(), "membership");
        assert_eq!(Artifact::from_parts(artifact.kind(), id).unwrap(), artifact);
        assert!(Artifact::from_parts("group", id).is_err());
    }

    #[test]
    fn test_touch_display_is_uuid_and_state() {
        let id = Uuid::new_v4();
        let touch = Touch {
            artifact: Artifact::Registration(id),
            actor: "idsync".to_string(),
            state: RegistrationState::Valid.to_string(),
            touched_at: Utc::now(),
        };
        assert_eq!(touch.to_string(), format!("{} valid", id));
    }
}
