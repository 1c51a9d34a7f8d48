//! Access policy engine.
//!
//! A pure decision layer: given who is calling, what they want to do and to which
//! kind of resource, it answers Allow or Deny and, for listings, which rows the
//! caller may see. Nothing in here touches the store, so every rule can be tested
//! without a database or an HTTP server.

use serde::Serialize;
use uuid::Uuid;

use crate::{
    auth::AuthUser,
    error::{AppError, AppResult},
    models::Role,
};

/// The operation being attempted. Full and partial updates share `Update`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Action {
    List,
    Retrieve,
    Create,
    Update,
    Delete,
}

impl Action {
    pub fn is_read(&self) -> bool {
        matches!(self, Action::List | Action::Retrieve)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ResourceKind {
    DriverProfile,
    Vehicle,
    Route,
    Schedule,
    SystemLog,
}

/// Principal
///
/// The caller as the policy sees it. One variant per role plus `Anonymous`; the
/// rules are a `match` over this tag rather than a hierarchy of permission objects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Principal {
    Anonymous,
    Admin { id: Uuid },
    Driver { id: Uuid },
    Passenger { id: Uuid },
}

impl From<&AuthUser> for Principal {
    fn from(user: &AuthUser) -> Self {
        match user.role {
            Role::Admin => Principal::Admin { id: user.id },
            Role::Driver => Principal::Driver { id: user.id },
            Role::Passenger => Principal::Passenger { id: user.id },
        }
    }
}

impl From<Option<&AuthUser>> for Principal {
    fn from(user: Option<&AuthUser>) -> Self {
        user.map_or(Principal::Anonymous, Principal::from)
    }
}

/// Target
///
/// What the policy needs to know about an existing record for object-level checks.
/// `owner` is the identity that owns the record (the vehicle's driver), if any.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Target {
    pub owner: Option<Uuid>,
}

impl Target {
    pub fn owned_by(owner: Uuid) -> Self {
        Self { owner: Some(owner) }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Denial {
    /// No credentials were presented.
    Unauthenticated,
    /// Credentials were presented but the role may not do this.
    Forbidden,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Allow,
    Deny(Denial),
}

impl Decision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Decision::Allow)
    }

    /// Turns a denial into the matching error. Call before any store access.
    pub fn enforce(self) -> AppResult<()> {
        match self {
            Decision::Allow => Ok(()),
            Decision::Deny(Denial::Unauthenticated) => Err(AppError::Unauthorized(
                "Authentication credentials were not provided".to_string(),
            )),
            Decision::Deny(Denial::Forbidden) => Err(AppError::Forbidden(
                "You do not have permission to perform this action".to_string(),
            )),
        }
    }
}

/// Visibility
///
/// The row filter applied to listings and detail reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Visibility {
    All,
    ActiveOnly,
    /// Rows owned by the given identity, whatever their `is_active` flag.
    OwnedBy(Uuid),
}

impl Visibility {
    pub fn admits(&self, owner: Option<Uuid>, is_active: bool) -> bool {
        match self {
            Visibility::All => true,
            Visibility::ActiveOnly => is_active,
            Visibility::OwnedBy(id) => owner == Some(*id),
        }
    }
}

impl Principal {
    pub fn id(&self) -> Option<Uuid> {
        match self {
            Principal::Anonymous => None,
            Principal::Admin { id } | Principal::Driver { id } | Principal::Passenger { id } => {
                Some(*id)
            }
        }
    }

    pub fn is_admin(&self) -> bool {
        matches!(self, Principal::Admin { .. })
    }

    fn deny(&self) -> Decision {
        match self {
            Principal::Anonymous => Decision::Deny(Denial::Unauthenticated),
            _ => Decision::Deny(Denial::Forbidden),
        }
    }

    fn allow_if(&self, condition: bool) -> Decision {
        if condition { Decision::Allow } else { self.deny() }
    }

    /// decide
    ///
    /// The access table. `target` is only consulted for object-level rules
    /// (vehicle ownership); callers without a record pass `None`.
    pub fn decide(&self, action: Action, kind: ResourceKind, target: Option<&Target>) -> Decision {
        let authenticated = !matches!(self, Principal::Anonymous);

        match kind {
            ResourceKind::DriverProfile => match action {
                Action::List | Action::Retrieve => self.allow_if(authenticated),
                // Open registration; there is no CRUD create route for profiles.
                Action::Create => Decision::Allow,
                Action::Update | Action::Delete => self.allow_if(self.is_admin()),
            },
            ResourceKind::Vehicle => match action {
                Action::List | Action::Retrieve => Decision::Allow,
                Action::Create => self.allow_if(matches!(
                    self,
                    Principal::Admin { .. } | Principal::Driver { .. }
                )),
                Action::Update | Action::Delete => match self {
                    Principal::Admin { .. } => Decision::Allow,
                    Principal::Driver { id } => {
                        self.allow_if(target.and_then(|t| t.owner) == Some(*id))
                    }
                    _ => self.deny(),
                },
            },
            ResourceKind::Route => {
                if action.is_read() {
                    Decision::Allow
                } else {
                    self.allow_if(self.is_admin())
                }
            }
            // Writes are open to any authenticated caller that can see the row.
            ResourceKind::Schedule => {
                if action.is_read() {
                    Decision::Allow
                } else {
                    self.allow_if(authenticated)
                }
            }
            ResourceKind::SystemLog => {
                if action.is_read() {
                    self.allow_if(self.is_admin())
                } else {
                    self.deny()
                }
            }
        }
    }

    /// visibility
    ///
    /// Row filter for `kind`. Only meaningful once `decide(List | Retrieve, ..)`
    /// has allowed the read.
    pub fn visibility(&self, kind: ResourceKind) -> Visibility {
        match (kind, self) {
            (ResourceKind::DriverProfile, _) | (ResourceKind::Route, _) => Visibility::All,
            (ResourceKind::SystemLog, _) => Visibility::All,
            (ResourceKind::Vehicle | ResourceKind::Schedule, Principal::Admin { .. }) => {
                Visibility::All
            }
            (ResourceKind::Vehicle | ResourceKind::Schedule, Principal::Driver { id }) => {
                Visibility::OwnedBy(*id)
            }
            (ResourceKind::Vehicle | ResourceKind::Schedule, _) => Visibility::ActiveOnly,
        }
    }

    /// Shorthand for `decide(..).enforce()` with a debug trace of denials.
    pub fn authorize(&self, action: Action, kind: ResourceKind, target: Option<&Target>) -> AppResult<()> {
        let decision = self.decide(action, kind, target);
        if !decision.is_allowed() {
            tracing::debug!(principal = ?self, ?action, ?kind, "policy denied");
        }
        decision.enforce()
    }
}
