//! Engine Configuration Module
//!
//! Provides operator-tunable thresholds, collaborator endpoints and
//! orchestrator settings loaded from TOML files.
//!
//! ## Loading Order
//!
//! 1. An explicit path (`--config` flag or `OPS_HEALTH_CONFIG` environment variable)
//! 2. `ops_health.toml` in the current working directory
//! 3. Built-in defaults
//!
//! See [`OpsConfig::load`].
//!
//! Credentials are not part of this file: the binary reads them once at
//! startup and injects the resulting clients into the tool layer.

mod ops_config;
pub mod defaults;
pub mod validation;

pub use ops_config::*;
