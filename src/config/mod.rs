//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → EtlsConfig (validated, immutable)
//!     → Settings handed to TlsContext::new
//! ```
//!
//! # Design Decisions
//! - Settings are plain data; the TLS context is built from them once
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, ConfigError};
pub use schema::{ActiveMode, CipherSpec, EngineConfig, EtlsConfig, Settings, VerifyMode};
