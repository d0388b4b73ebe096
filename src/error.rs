//! Error taxonomy for engine operations.
//!
//! # Responsibilities
//! - Define every failure an operation can deliver ([`EtlsError`])
//! - Collapse failures into symbolic categories ([`ErrorKind`]) for the host boundary
//! - Classify rustls failures into handshake vs certificate-verification errors
//!
//! # Design Decisions
//! - Errors never carry live resources, so they can cross task boundaries freely
//! - The boundary only ever sees a [`Reason`], never a Rust error type

use std::any::Any;
use std::fmt;
use std::io;
use std::time::Duration;

use rustls::AlertDescription;
use thiserror::Error;

use crate::engine::state::{Direction, Operation, SocketState};

/// Result alias used throughout the engine.
pub type EtlsResult<T> = Result<T, EtlsError>;

/// Symbolic failure category handed to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Host unresolvable or no addresses returned.
    Resolution,
    /// Every candidate endpoint refused or timed out.
    Connection,
    /// TLS protocol negotiation failed.
    Handshake,
    /// Certificate chain, revocation or hostname check failed.
    Verification,
    /// Transport failure or unexpected end of stream.
    Io,
    /// Handle closed, direction shut down, or operation invalid in the current state.
    Closed,
    /// Settings rejected before any network resource was allocated.
    Config,
    /// Caller stopped waiting for the outcome.
    Timeout,
    /// A fault escaped an operation step and was caught at its boundary.
    Internal,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Resolution => "resolution",
            ErrorKind::Connection => "connection",
            ErrorKind::Handshake => "handshake",
            ErrorKind::Verification => "verification",
            ErrorKind::Io => "io",
            ErrorKind::Closed => "closed",
            ErrorKind::Config => "config",
            ErrorKind::Timeout => "timeout",
            ErrorKind::Internal => "internal",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors that can occur during engine operations.
#[derive(Debug, Error)]
pub enum EtlsError {
    #[error("cannot resolve '{host}': {source}")]
    Resolve {
        host: String,
        #[source]
        source: io::Error,
    },

    #[error("no addresses found for '{host}'")]
    NoAddresses { host: String },

    /// Aggregated failure after every endpoint was tried.
    #[error("all {attempts} endpoint(s) refused the connection, last error: {last}")]
    Connect { attempts: usize, last: io::Error },

    #[error("TLS handshake failed: {0}")]
    Handshake(String),

    #[error("certificate verification failed: {0}")]
    Verification(String),

    #[error("peer presented no certificate")]
    NoPeerCertificate,

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("end of stream")]
    EndOfStream,

    #[error("handle is closed")]
    Closed,

    #[error("{0} direction is already shut down")]
    DirectionShutDown(Direction),

    #[error("cannot {operation} while {state}")]
    InvalidState {
        operation: Operation,
        state: SocketState,
    },

    #[error("configuration error: {0}")]
    Config(String),

    #[error("listening requires a certificate file")]
    MissingCertificate,

    #[error("invalid cipher specification '{0}'")]
    InvalidCipherSpec(String),

    #[error("{operation} timed out after {elapsed:?}")]
    Timeout {
        operation: Operation,
        elapsed: Duration,
    },

    #[error("internal fault during {operation}: {message}")]
    Internal {
        operation: Operation,
        message: String,
    },
}

impl EtlsError {
    /// Category of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            EtlsError::Resolve { .. } | EtlsError::NoAddresses { .. } => ErrorKind::Resolution,
            EtlsError::Connect { .. } => ErrorKind::Connection,
            EtlsError::Handshake(_) => ErrorKind::Handshake,
            EtlsError::Verification(_) | EtlsError::NoPeerCertificate => ErrorKind::Verification,
            EtlsError::Io(_) | EtlsError::EndOfStream => ErrorKind::Io,
            EtlsError::Closed
            | EtlsError::DirectionShutDown(_)
            | EtlsError::InvalidState { .. } => ErrorKind::Closed,
            EtlsError::Config(_)
            | EtlsError::MissingCertificate
            | EtlsError::InvalidCipherSpec(_) => ErrorKind::Config,
            EtlsError::Timeout { .. } => ErrorKind::Timeout,
            EtlsError::Internal { .. } => ErrorKind::Internal,
        }
    }

    /// Map an I/O error coming out of a TLS session.
    ///
    /// tokio-rustls wraps protocol failures in `io::Error`; those are unwrapped
    /// and classified, anything else stays an I/O error.
    pub(crate) fn from_session(err: io::Error) -> Self {
        let classified = err
            .get_ref()
            .and_then(|inner| inner.downcast_ref::<rustls::Error>())
            .map(EtlsError::from_tls);
        classified.unwrap_or(EtlsError::Io(err))
    }

    pub(crate) fn from_tls(err: &rustls::Error) -> Self {
        if is_verification_failure(err) {
            EtlsError::Verification(err.to_string())
        } else {
            EtlsError::Handshake(err.to_string())
        }
    }

    pub(crate) fn from_panic(operation: Operation, payload: Box<dyn Any + Send>) -> Self {
        let message = if let Some(text) = payload.downcast_ref::<&str>() {
            (*text).to_string()
        } else if let Some(text) = payload.downcast_ref::<String>() {
            text.clone()
        } else {
            "panic with a non-string payload".to_string()
        };
        EtlsError::Internal { operation, message }
    }
}

impl From<rustls::Error> for EtlsError {
    fn from(err: rustls::Error) -> Self {
        EtlsError::from_tls(&err)
    }
}

fn is_verification_failure(err: &rustls::Error) -> bool {
    match err {
        rustls::Error::InvalidCertificate(_)
        | rustls::Error::NoCertificatesPresented
        | rustls::Error::InvalidCertRevocationList(_) => true,
        rustls::Error::AlertReceived(alert) => matches!(
            alert,
            AlertDescription::BadCertificate
                | AlertDescription::UnsupportedCertificate
                | AlertDescription::CertificateRevoked
                | AlertDescription::CertificateExpired
                | AlertDescription::CertificateUnknown
                | AlertDescription::CertificateRequired
                | AlertDescription::UnknownCA
                | AlertDescription::AccessDenied
        ),
        _ => false,
    }
}

/// Categorized failure delivered through an error continuation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reason {
    pub kind: ErrorKind,
    pub message: String,
}

impl Reason {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

impl From<&EtlsError> for Reason {
    fn from(err: &EtlsError) -> Self {
        Self::new(err.kind(), err.to_string())
    }
}

impl From<EtlsError> for Reason {
    fn from(err: EtlsError) -> Self {
        Self::from(&err)
    }
}

impl fmt::Display for Reason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

impl std::error::Error for Reason {}
