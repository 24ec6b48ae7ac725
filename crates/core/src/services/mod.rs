//! Storage-backed restriction management.

#![allow(missing_docs)]

pub mod restriction;
pub mod store;

pub use restriction::{
    CreateBlockInput, CreateQuotaInput, CreateSetInput, CreateTimeInput, QuotaPatch,
    RestrictionService, TimePatch,
};
pub use store::{InMemoryRestrictionStore, RestrictionStore};
