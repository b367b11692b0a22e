//! # lib_common
//!
//! Shared building blocks for the applicant reconciliation tools. Each top-level
//! folder is gated behind a cargo feature of the same name so binaries only pull
//! in what they use.

#[cfg(feature = "configs")]
pub mod configs;
#[cfg(feature = "loggers")]
pub mod loggers; // Parent module for logrecord and loggerlocal
#[cfg(feature = "reconcile")]
pub mod reconcile;
#[cfg(feature = "utils")]
pub mod utils; // Parent module for time and process helpers

// Re-export everything
#[cfg(feature = "configs")]
pub use configs::config_sys::*;
#[cfg(feature = "loggers")]
pub use loggers::loggerlocal::*;
#[cfg(feature = "loggers")]
pub use loggers::logrecord::*;
#[cfg(feature = "utils")]
pub use utils::misc::utils::*;
