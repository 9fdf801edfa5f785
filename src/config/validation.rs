//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Check artifact file names are distinct plain names
//! - Validate value ranges (timeouts > 0, intervals > 0)
//! - Check addresses parse
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: ReconcilerConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::collections::HashSet;
use std::net::SocketAddr;

use thiserror::Error;

use crate::config::schema::ReconcilerConfig;

/// A single semantic problem in a configuration file.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("{field} must not be empty")]
    Empty { field: &'static str },

    #[error("{field} must be a plain file name, got {value:?}")]
    NotAFileName { field: &'static str, value: String },

    #[error("artifact file name {0:?} is used more than once")]
    DuplicateFileName(String),

    #[error("{field} must be greater than zero")]
    Zero { field: &'static str },

    #[error("{field} is not a valid socket address: {value:?}")]
    BadAddress { field: &'static str, value: String },
}

/// Validate a configuration, collecting every problem found.
pub fn validate_config(config: &ReconcilerConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.paths.policy_dir.as_os_str().is_empty() {
        errors.push(ValidationError::Empty { field: "paths.policy_dir" });
    }
    if config.paths.dkim_dir.as_os_str().is_empty() {
        errors.push(ValidationError::Empty { field: "paths.dkim_dir" });
    }

    let files = [
        ("paths.sources_file", &config.paths.sources_file),
        ("paths.queues_file", &config.paths.queues_file),
        ("paths.listener_domains_file", &config.paths.listener_domains_file),
        ("paths.dkim_data_file", &config.paths.dkim_data_file),
        ("paths.init_lua_file", &config.paths.init_lua_file),
    ];
    let mut seen = HashSet::new();
    for (field, name) in files {
        if name.is_empty() {
            errors.push(ValidationError::Empty { field });
            continue;
        }
        if name.contains('/') || name.contains('\\') || name == "." || name == ".." {
            errors.push(ValidationError::NotAFileName {
                field,
                value: name.clone(),
            });
        }
        if !seen.insert(name.as_str()) {
            errors.push(ValidationError::DuplicateFileName(name.clone()));
        }
    }

    if config.engine.binary.as_os_str().is_empty() {
        errors.push(ValidationError::Empty { field: "engine.binary" });
    }
    if config.engine.service_manager.is_empty() {
        errors.push(ValidationError::Empty { field: "engine.service_manager" });
    }
    if config.engine.service_unit.is_empty() {
        errors.push(ValidationError::Empty { field: "engine.service_unit" });
    }
    if config.engine.validate_timeout_secs == 0 {
        errors.push(ValidationError::Zero { field: "engine.validate_timeout_secs" });
    }
    if config.engine.restart_timeout_secs == 0 {
        errors.push(ValidationError::Zero { field: "engine.restart_timeout_secs" });
    }

    if config.store.state_file.as_os_str().is_empty() {
        errors.push(ValidationError::Empty { field: "store.state_file" });
    }

    if config.warmup.interval_secs == 0 {
        errors.push(ValidationError::Zero { field: "warmup.interval_secs" });
    }

    if config.observability.metrics_enabled
        && config.observability.metrics_address.parse::<SocketAddr>().is_err()
    {
        errors.push(ValidationError::BadAddress {
            field: "observability.metrics_address",
            value: config.observability.metrics_address.clone(),
        });
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
