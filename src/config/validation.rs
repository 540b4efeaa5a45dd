//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (body limit > 0, connection limit > 0)
//! - Check that every TLS section names both files
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is a pure function: &ServerConfig → Result<(), Vec<ValidationError>>

use std::net::SocketAddr;

use crate::config::schema::ServerConfig;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("at least one listener is required")]
    NoListeners,
    #[error("listener {index}: address is empty")]
    EmptyAddress { index: usize },
    #[error("listener {index}: max_connections must be positive")]
    ZeroConnections { index: usize },
    #[error("listener {index}: TLS needs both cert_path and key_path")]
    IncompleteTls { index: usize },
    #[error("http.max_body_bytes must be positive")]
    ZeroBodyLimit,
    #[error("session.cookie_name is empty")]
    EmptyCookieName,
    #[error("metrics.address {0:?} is not a socket address")]
    MetricsAddress(String),
}

pub fn validate_config(config: &ServerConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listeners.is_empty() {
        errors.push(ValidationError::NoListeners);
    }
    for (index, listener) in config.listeners.iter().enumerate() {
        if listener.address.trim().is_empty() {
            errors.push(ValidationError::EmptyAddress { index });
        }
        if listener.max_connections == 0 {
            errors.push(ValidationError::ZeroConnections { index });
        }
        if let Some(tls) = &listener.tls {
            if tls.cert_path.is_empty() || tls.key_path.is_empty() {
                errors.push(ValidationError::IncompleteTls { index });
            }
        }
    }

    if config.http.max_body_bytes == 0 {
        errors.push(ValidationError::ZeroBodyLimit);
    }
    if config.session.cookie_name.trim().is_empty() {
        errors.push(ValidationError::EmptyCookieName);
    }
    if config.metrics.enabled && config.metrics.address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::MetricsAddress(config.metrics.address.clone()));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
