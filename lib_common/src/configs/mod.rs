//! # Configuration Modules
//!
//! This module aggregates the configuration providers used by the command-line
//! tools. Settings live in a single INI file that is parsed once at startup.

/// Provides INI settings loading into a flat, case-insensitive key/value map.
pub mod config_sys;
