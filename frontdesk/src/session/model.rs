use crate::authz::permissions::PermissionSet;
use crate::models::{Identity, Profile, UserId};
use serde::Serialize;

/// Resolution state of a [`Session`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "reason", rename_all = "snake_case")]
pub enum SessionStatus {
    /// Profile and grants are not known yet.
    Loading,
    /// Either fully resolved or confirmed anonymous.
    Resolved,
    /// Resolution for the current identity failed.
    Failed(String),
}

/// Derived view of who is signed in and what they may do.
///
/// Fields are private so every state goes through a constructor that keeps
/// `identity == None => profile == None && permissions == {} && !is_owner`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Session {
    identity: Option<Identity>,
    profile: Option<Profile>,
    permissions: PermissionSet,
    is_owner: bool,
    status: SessionStatus,
}

impl Session {
    /// Process start: nothing is known yet.
    pub fn initial() -> Self {
        Self {
            identity: None,
            profile: None,
            permissions: PermissionSet::new(),
            is_owner: false,
            status: SessionStatus::Loading,
        }
    }

    /// Confirmed absence of an identity.
    pub fn anonymous() -> Self {
        Self {
            status: SessionStatus::Resolved,
            ..Self::initial()
        }
    }

    /// Identity known, profile and grants still in flight.
    pub fn pending(identity: Identity) -> Self {
        Self {
            identity: Some(identity),
            ..Self::initial()
        }
    }

    pub fn resolved(identity: Identity, profile: Profile, permissions: PermissionSet) -> Self {
        Self {
            is_owner: profile.is_owner,
            identity: Some(identity),
            profile: Some(profile),
            permissions,
            status: SessionStatus::Resolved,
        }
    }

    /// Resolution failed; the identity is kept but nothing is granted.
    pub fn failed(identity: Option<Identity>, reason: impl Into<String>) -> Self {
        Self {
            identity,
            status: SessionStatus::Failed(reason.into()),
            ..Self::initial()
        }
    }

    pub fn identity(&self) -> Option<&Identity> {
        self.identity.as_ref()
    }

    pub fn identity_id(&self) -> Option<UserId> {
        self.identity.as_ref().map(|identity| identity.id)
    }

    pub fn profile(&self) -> Option<&Profile> {
        self.profile.as_ref()
    }

    pub fn permissions(&self) -> &PermissionSet {
        &self.permissions
    }

    pub fn is_owner(&self) -> bool {
        self.is_owner
    }

    pub fn status(&self) -> &SessionStatus {
        &self.status
    }

    pub fn is_loading(&self) -> bool {
        self.status == SessionStatus::Loading
    }

    pub fn is_failed(&self) -> bool {
        matches!(self.status, SessionStatus::Failed(_))
    }

    /// Signed in with a resolved profile.
    pub fn is_authenticated(&self) -> bool {
        self.identity.is_some() && self.profile.is_some()
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::initial()
    }
}
