//! # Utilities Module
//!
//! A collection point for small, general-purpose helpers that are shared by the
//! logger, the backup rotation and the reconciliation pipeline.
//!
//! ## Contained Modules:
//!
//! - **`misc`**: timestamp formatting and process naming helpers (`utils`).

#![forbid(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms, unused_qualifications)]

/// Miscellaneous utility functions.
pub mod misc;
