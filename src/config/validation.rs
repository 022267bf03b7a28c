//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Reject half-configured TLS before any socket work happens
//! - Validate value ranges (backlog > 0, header limit large enough)
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: Config → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system, at startup and on reload

use crate::config::schema::{Config, ServerConfig};

/// Smallest read buffer hyper accepts for a request head.
pub const MIN_HEADER_LINE: usize = 8192;

/// A single semantic problem with a configuration document.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error(
        "when running server in SSL mode, you must specify both a cert_file and key_file option value"
    )]
    PartialTls,

    #[error("ca_file is set but TLS is not enabled (cert_file and key_file are required)")]
    CaWithoutTls,

    #[error("bind_host must not be empty")]
    EmptyBindHost,

    #[error("backlog must be positive, got {0}")]
    InvalidBacklog(i32),

    #[error("max_header_line must be at least 8192, got {0}")]
    HeaderLineTooSmall(usize),

    #[error("max_connections_per_worker must be at least 1")]
    NoConnectionSlots,

    #[error("logging level must not be empty")]
    EmptyLogLevel,
}

/// Validate a full configuration document.
pub fn validate_config(config: &Config) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if let Err(mut server_errors) = validate_server(&config.server) {
        errors.append(&mut server_errors);
    }

    if config.logging.level.trim().is_empty() {
        errors.push(ValidationError::EmptyLogLevel);
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

/// Validate the server section on its own.
pub fn validate_server(server: &ServerConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if server.cert_file.is_some() != server.key_file.is_some() {
        errors.push(ValidationError::PartialTls);
    } else if server.ca_file.is_some() && !server.use_tls() {
        errors.push(ValidationError::CaWithoutTls);
    }

    if server.bind_host.trim().is_empty() {
        errors.push(ValidationError::EmptyBindHost);
    }

    if server.backlog <= 0 {
        errors.push(ValidationError::InvalidBacklog(server.backlog));
    }

    if server.max_header_line < MIN_HEADER_LINE {
        errors.push(ValidationError::HeaderLineTooSmall(server.max_header_line));
    }

    if server.max_connections_per_worker == 0 {
        errors.push(ValidationError::NoConnectionSlots);
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        assert!(validate_config(&Config::default()).is_ok());
    }

    #[test]
    fn cert_without_key_is_rejected() {
        let mut config = Config::default();
        config.server.cert_file = Some("server.crt".into());

        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors, vec![ValidationError::PartialTls]);
    }

    #[test]
    fn key_without_cert_is_rejected() {
        let mut config = Config::default();
        config.server.key_file = Some("server.key".into());

        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors, vec![ValidationError::PartialTls]);
    }

    #[test]
    fn zero_connection_slots_is_rejected() {
        let mut config = Config::default();
        config.server.max_connections_per_worker = 0;

        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors, vec![ValidationError::NoConnectionSlots]);
    }

    #[test]
    fn collects_every_error() {
        let mut config = Config::default();
        config.server.backlog = 0;
        config.server.max_header_line = 100;
        config.server.bind_host = " ".into();
        config.logging.level = String::new();

        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors.len(), 4);
        assert!(errors.contains(&ValidationError::InvalidBacklog(0)));
        assert!(errors.contains(&ValidationError::HeaderLineTooSmall(100)));
    }

    #[test]
    fn ca_file_needs_tls() {
        let mut config = Config::default();
        config.server.ca_file = Some("ca.pem".into());

        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors, vec![ValidationError::CaWithoutTls]);
    }
}
