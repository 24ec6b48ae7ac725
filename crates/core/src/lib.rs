//! Restriction and quota accounting for quotagate.
//!
//! [`restrictions`] holds the pure evaluators: actor matching, calendar
//! window resolution, and the two-phase quota reservation protocol.
//! [`services`] wraps them with ownership checks and versioned persistence.

pub mod restrictions;
pub mod services;

pub use restrictions::*;
pub use services::*;

/// Generate a unique ID using ULID.
pub fn generate_id() -> String {
    ulid::Ulid::new().to_string().to_lowercase()
}
