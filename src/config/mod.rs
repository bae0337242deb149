//! Configuration for a TLS context.
//!
//! This module provides:
//! - [`types`]: the YAML schema ([`TlsContextConfig`])
//! - [`pem`]: loading PEM fields given either as a path or inline
//! - [`validate`]: consistency checks run before a context is built

mod pem;
mod types;
mod validate;

use std::path::Path;

pub use pem::{is_pem_file_path, load_pem};
pub use types::*;

/// Loads a TLS context configuration file.
pub fn load_config<P: AsRef<Path>>(path: P) -> std::io::Result<TlsContextConfig> {
    let path = path.as_ref();
    let config_bytes = match std::fs::read(path) {
        Ok(b) => b,
        Err(e) => {
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                format!("Could not read config file {}: {e}", path.display()),
            ));
        }
    };

    let config_str = match String::from_utf8(config_bytes) {
        Ok(s) => s,
        Err(e) => {
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                format!(
                    "Could not parse config file {} as UTF8: {e}",
                    path.display()
                ),
            ));
        }
    };

    TlsContextConfig::from_yaml_str(&config_str).map_err(|e| {
        std::io::Error::new(
            e.kind(),
            format!("Could not load config file {}: {e}", path.display()),
        )
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_config_missing_file() {
        let err = load_config("/nonexistent/tls.yaml").unwrap_err();
        assert_eq!(err.kind(), std::io::ErrorKind::InvalidInput);
        assert!(err.to_string().contains("/nonexistent/tls.yaml"));
    }

    #[test]
    fn test_load_config_from_file() {
        let file_name = format!("ssl-conn-config-{}.yaml", std::process::id());
        let path = std::env::temp_dir().join(file_name);
        std::fs::write(&path, "server_name: localhost\nalpn_protocols: h2\n").unwrap();
        let config = load_config(&path);
        std::fs::remove_file(&path).unwrap();

        let config = config.unwrap();
        assert_eq!(config.server_name.as_deref(), Some("localhost"));
        assert_eq!(config.alpn_protocols.into_vec(), vec!["h2".to_string()]);
    }
}
