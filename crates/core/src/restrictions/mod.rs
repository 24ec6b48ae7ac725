//! Restriction model and evaluators.
//!
//! Everything here is synchronous and free of I/O. Callers pass the current
//! instant explicitly and persist any mutated quota themselves; see
//! [`crate::services`] for the storage-backed workflow.

#![allow(missing_docs)]

pub mod actor;
pub mod block;
pub mod quota;
pub mod set;
pub mod target;
pub mod time;
pub mod window;

pub use actor::{ActorContext, Registration, Role};
pub use block::{BlockRestriction, any_blocking};
pub use quota::{
    DEFAULT_MINIMUM_LEASE, QuotaDenial, QuotaReservation, QuotaRestriction, QuotaStatus,
    ReleaseOutcome, ReserveOutcome,
};
pub use set::{AccessDecision, QuotaCheck, RestrictionOwner, RestrictionSet};
pub use target::{RegistrationFilter, RestrictionTarget, RoleCheck, RoleFilter};
pub use time::{TimeRestriction, TimeRestrictionStatus};
pub use window::{
    PeriodStrategy, PeriodUnit, Window, WindowError, local_now, localize, parse_timezone,
    resolve_windows,
};
