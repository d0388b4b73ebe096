//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Check that TLS settings can produce a usable context
//! - Validate value ranges (timeouts > 0, backlog > 0, packet sizes)
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is a pure function: EtlsConfig → Result<(), Vec<ValidationError>>
//! - File contents (certificates, keys) are not read here; the context
//!   builder reports those problems when it loads them

use rustls::pki_types::ServerName;
use thiserror::Error;

use crate::config::schema::{EngineConfig, EtlsConfig, Settings, VerifyMode};
use crate::tls::ciphers;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("keyfile is set but certfile is missing")]
    KeyWithoutCertificate,

    #[error("verify = \"peer\" needs at least one entry in cacerts")]
    MissingTrustAnchors,

    #[error("verify_hostname '{0}' is neither a DNS name nor an IP address")]
    InvalidHostname(String),

    #[error("cipher specification '{0}' selects no supported suite")]
    InvalidCiphers(String),

    #[error("packet must be 0, 1, 2 or 4, got {0}")]
    InvalidPacket(u8),

    #[error("engine.operation_timeout_ms must be greater than zero")]
    ZeroTimeout,

    #[error("engine.listen_backlog must be greater than zero")]
    ZeroBacklog,
}

/// Validate a whole configuration file.
pub fn validate_config(config: &EtlsConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = engine_errors(&config.engine);
    errors.extend(settings_errors(&config.tls));
    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

/// Validate one settings structure.
pub fn validate_settings(settings: &Settings) -> Result<(), Vec<ValidationError>> {
    let errors = settings_errors(settings);
    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn engine_errors(engine: &EngineConfig) -> Vec<ValidationError> {
    let mut errors = Vec::new();
    if engine.operation_timeout_ms == 0 {
        errors.push(ValidationError::ZeroTimeout);
    }
    if engine.listen_backlog == 0 {
        errors.push(ValidationError::ZeroBacklog);
    }
    errors
}

fn settings_errors(settings: &Settings) -> Vec<ValidationError> {
    let mut errors = Vec::new();

    if settings.keyfile.is_some() && settings.certfile.is_none() {
        errors.push(ValidationError::KeyWithoutCertificate);
    }
    if settings.verify == VerifyMode::Peer && settings.cacerts.is_empty() {
        errors.push(ValidationError::MissingTrustAnchors);
    }
    if let Some(name) = &settings.verify_hostname {
        if ServerName::try_from(name.as_str()).is_err() {
            errors.push(ValidationError::InvalidHostname(name.clone()));
        }
    }
    if !settings.ciphers.is_default() {
        let filter = settings.ciphers.to_filter();
        if ciphers::select(&filter).is_err() {
            errors.push(ValidationError::InvalidCiphers(filter));
        }
    }
    if !matches!(settings.packet, 0 | 1 | 2 | 4) {
        errors.push(ValidationError::InvalidPacket(settings.packet));
    }

    errors
}
