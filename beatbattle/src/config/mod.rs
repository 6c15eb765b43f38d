//! Configuration module
//!
//! Loads and validates the beatbattle YAML configuration. The typed schema
//! lives in `beatbattle_core::config` so the core crate can share it.

pub mod loader;
pub mod validation;

pub use beatbattle_core::config::*;
pub use loader::{ConfigLimits, ConfigLoader, ConfigOverrides, LoadResult, LoadWarning};
pub use validation::{ValidationResult, Validator};
