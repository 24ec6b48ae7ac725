//! Actor classes a restriction applies to.

use super::actor::{ActorContext, Registration, Role};
use serde::{Deserialize, Serialize};

/// Named actor class, a conjunction of a role filter and a registration filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RestrictionTarget {
    All,
    Unregistered,
    Registered,
    User,
    UnregisteredUser,
    RegisteredUser,
    Mod,
    UnregisteredMod,
    RegisteredMod,
    Creator,
}

/// Constraint on the caller's room role.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoleFilter {
    Any,
    Is(Role),
}

/// Constraint on the caller's registration status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistrationFilter {
    Any,
    Is(Registration),
}

impl RoleFilter {
    #[must_use]
    pub fn accepts(self, role: Role) -> bool {
        match self {
            Self::Any => true,
            Self::Is(expected) => expected == role,
        }
    }
}

impl RegistrationFilter {
    #[must_use]
    pub fn accepts(self, registration: Registration) -> bool {
        match self {
            Self::Any => true,
            Self::Is(expected) => expected == registration,
        }
    }
}

impl RestrictionTarget {
    /// Every target, in declaration order.
    pub const ALL_TARGETS: [Self; 10] = [
        Self::All,
        Self::Unregistered,
        Self::Registered,
        Self::User,
        Self::UnregisteredUser,
        Self::RegisteredUser,
        Self::Mod,
        Self::UnregisteredMod,
        Self::RegisteredMod,
        Self::Creator,
    ];

    /// The role and registration filters this target stands for.
    #[must_use]
    pub const fn filters(self) -> (RoleFilter, RegistrationFilter) {
        use RegistrationFilter as Reg;
        use RoleFilter as R;

        const REGISTERED: Reg = Reg::Is(Registration::Registered);
        const UNREGISTERED: Reg = Reg::Is(Registration::Unregistered);
        const PARTICIPANT: R = R::Is(Role::Participant);
        const MODERATOR: R = R::Is(Role::Moderator);

        match self {
            Self::All => (R::Any, Reg::Any),
            Self::Unregistered => (R::Any, UNREGISTERED),
            Self::Registered => (R::Any, REGISTERED),
            Self::User => (PARTICIPANT, Reg::Any),
            Self::UnregisteredUser => (PARTICIPANT, UNREGISTERED),
            Self::RegisteredUser => (PARTICIPANT, REGISTERED),
            Self::Mod => (MODERATOR, Reg::Any),
            Self::UnregisteredMod => (MODERATOR, UNREGISTERED),
            Self::RegisteredMod => (MODERATOR, REGISTERED),
            Self::Creator => (R::Is(Role::Creator), Reg::Any),
        }
    }

    /// Whether the actor belongs to this class.
    #[must_use]
    pub fn matches(self, actor: &ActorContext) -> bool {
        let (role, registration) = self.filters();
        role.accepts(actor.role) && registration.accepts(actor.registration)
    }
}

/// Outcome of checking an actor against a restriction's target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RoleCheck {
    pub needed: RestrictionTarget,
    pub allowed: bool,
}

impl RoleCheck {
    #[must_use]
    pub fn evaluate(target: RestrictionTarget, actor: &ActorContext) -> Self {
        Self {
            needed: target,
            allowed: target.matches(actor),
        }
    }
}
