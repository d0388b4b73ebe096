//! Configuration loading from disk.

use std::fs;
use std::path::Path;

use crate::config::schema::EtlsConfig;
use crate::config::validation::{validate_config, ValidationError};

/// Error type for configuration loading.
#[derive(Debug)]
pub enum ConfigError {
    Io(std::io::Error),
    Parse(toml::de::Error),
    Validation(Vec<ValidationError>),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(e) => write!(f, "IO error: {}", e),
            ConfigError::Parse(e) => write!(f, "Parse error: {}", e),
            ConfigError::Validation(errors) => {
                write!(f, "Validation failed: ")?;
                for (i, err) in errors.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", err)?;
                }
                Ok(())
            }
        }
    }
}

impl std::error::Error for ConfigError {}

/// Load and validate configuration from a TOML file.
pub fn load_config(path: &Path) -> Result<EtlsConfig, ConfigError> {
    let content = fs::read_to_string(path).map_err(ConfigError::Io)?;
    let config = parse_config(&content)?;
    tracing::debug!(path = %path.display(), "Configuration loaded");
    Ok(config)
}

/// Parse and validate configuration from TOML text.
pub fn parse_config(content: &str) -> Result<EtlsConfig, ConfigError> {
    let config: EtlsConfig = toml::from_str(content).map_err(ConfigError::Parse)?;
    validate_config(&config).map_err(ConfigError::Validation)?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::VerifyMode;

    #[test]
    fn parses_full_file() {
        let config = parse_config(
            r#"
            [engine]
            worker_threads = 2
            listen_backlog = 16

            [tls]
            certfile = "/etc/etls/server.pem"
            verify = "peer"
            fail_if_no_peer_cert = true
            cacerts = ["-----BEGIN CERTIFICATE-----\n-----END CERTIFICATE-----\n"]
            ciphers = ["ECDHE-RSA-AES128-GCM-SHA256", "ECDHE-RSA-AES256-GCM-SHA384"]

            [observability]
            log_level = "debug"
            "#,
        )
        .unwrap();

        assert_eq!(config.engine.worker_threads, 2);
        assert_eq!(config.engine.listen_backlog, 16);
        assert_eq!(config.tls.verify, VerifyMode::Peer);
        assert!(config.tls.fail_if_no_peer_cert);
        assert_eq!(config.observability.log_level, "debug");
    }

    #[test]
    fn rejects_invalid_values() {
        let err = parse_config("[engine]\nlisten_backlog = 0\n").unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Validation(ref errors) if errors == &[ValidationError::ZeroBacklog]
        ));
        assert!(err.to_string().starts_with("Validation failed: "));
    }

    #[test]
    fn rejects_malformed_toml() {
        assert!(matches!(
            parse_config("[tls\nverify = 1"),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn missing_file_is_io_error() {
        let err = load_config(Path::new("/nonexistent/etls.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Io(_)));
    }
}
