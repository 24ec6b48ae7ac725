//! Common utilities and shared types for quotagate.
//!
//! This crate provides foundational components used across all quotagate crates:
//!
//! - **Configuration**: Application settings via [`Config`]
//! - **Error handling**: Unified error types via [`AppError`] and [`AppResult`]
//! - **Logging**: Tracing subscriber bootstrap via [`init_tracing`]
//! - **Metrics**: Reservation and rollover counters via [`Metrics`]
//!
//! # Example
//!
//! ```no_run
//! use quotagate_common::{AppResult, Config, init_tracing};
//!
//! fn example() -> AppResult<()> {
//!     let config = Config::load()?;
//!     init_tracing(&config.logging)?;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod logging;
pub mod metrics;

pub use config::{Config, LoggingConfig, RestrictionConfig};
pub use error::{AppError, AppResult};
pub use logging::init_tracing;
pub use metrics::{Metrics, MetricsSnapshot, get_metrics};
