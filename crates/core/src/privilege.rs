//! Privileges and the explicit actor context passed into every workflow
//! operation.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::types::{DbId, Timestamp};

// ---------------------------------------------------------------------------
// Privilege
// ---------------------------------------------------------------------------

/// A named right held by an account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Privilege {
    /// Submit new import requests.
    #[serde(rename = "request-import")]
    RequestImport,
    /// Review, comment on, decline and start imports.
    #[serde(rename = "handle-import-requests")]
    HandleImportRequests,
    /// See requests flagged private.
    #[serde(rename = "view-private-import-requests")]
    ViewPrivateImportRequests,
    /// Assign interwiki prefixes.
    #[serde(rename = "handle-interwiki")]
    HandleInterwiki,
}

impl Privilege {
    pub const ALL: [Privilege; 4] = [
        Self::RequestImport,
        Self::HandleImportRequests,
        Self::ViewPrivateImportRequests,
        Self::HandleInterwiki,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::RequestImport => "request-import",
            Self::HandleImportRequests => "handle-import-requests",
            Self::ViewPrivateImportRequests => "view-private-import-requests",
            Self::HandleInterwiki => "handle-interwiki",
        }
    }

    pub fn from_str(s: &str) -> Result<Self, CoreError> {
        Self::ALL
            .into_iter()
            .find(|p| p.as_str() == s)
            .ok_or_else(|| CoreError::Validation(format!("Unknown privilege: '{s}'")))
    }
}

impl std::fmt::Display for Privilege {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The set of privileges an actor holds.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PrivilegeSet(HashSet<Privilege>);

impl PrivilegeSet {
    pub fn new(privileges: impl IntoIterator<Item = Privilege>) -> Self {
        Self(privileges.into_iter().collect())
    }

    /// Every privilege. Used for the system accounts.
    pub fn all() -> Self {
        Self::new(Privilege::ALL)
    }

    /// Parse the stored privilege names, skipping unknown ones.
    pub fn from_names<S: AsRef<str>>(names: &[S]) -> Self {
        Self(
            names
                .iter()
                .filter_map(|n| Privilege::from_str(n.as_ref()).ok())
                .collect(),
        )
    }

    pub fn has(&self, privilege: Privilege) -> bool {
        self.0.contains(&privilege)
    }

    /// Fail with [`CoreError::Forbidden`] unless `privilege` is held.
    pub fn require(&self, privilege: Privilege) -> Result<(), CoreError> {
        if self.has(privilege) {
            Ok(())
        } else {
            Err(CoreError::Forbidden(format!(
                "Missing required privilege: {privilege}"
            )))
        }
    }
}

// ---------------------------------------------------------------------------
// ActorContext
// ---------------------------------------------------------------------------

/// Identity of the account performing an operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub id: DbId,
    pub username: String,
}

/// Everything an operation needs to know about who is acting and when.
#[derive(Debug, Clone)]
pub struct ActorContext {
    pub actor: Actor,
    pub privileges: PrivilegeSet,
    pub now: Timestamp,
}

impl ActorContext {
    pub fn new(actor: Actor, privileges: PrivilegeSet, now: Timestamp) -> Self {
        Self {
            actor,
            privileges,
            now,
        }
    }

    /// Context for a system account, which holds every privilege.
    pub fn system(actor: Actor, now: Timestamp) -> Self {
        Self::new(actor, PrivilegeSet::all(), now)
    }

    pub fn actor_id(&self) -> DbId {
        self.actor.id
    }

    pub fn is_reviewer(&self) -> bool {
        self.privileges.has(Privilege::HandleImportRequests)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
