//! Consistency checks for [`TlsContextConfig`].

use std::io;

use super::types::TlsContextConfig;
use crate::util::process_fingerprints;

fn invalid(message: impl Into<String>) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidInput, message.into())
}

impl TlsContextConfig {
    pub fn validate(&self) -> io::Result<()> {
        match (&self.cert, &self.key) {
            (Some(_), None) => return Err(invalid("cert is set but key is missing")),
            (None, Some(_)) => return Err(invalid("key is set but cert is missing")),
            _ => {}
        }

        if self.require_client_certificate && self.cert.is_none() {
            return Err(invalid("require_client_certificate needs a server cert and key"));
        }

        for protocol in self.alpn_protocols.iter() {
            if protocol.is_empty() || protocol.len() > 255 {
                return Err(invalid(format!(
                    "ALPN protocol must be 1 to 255 bytes long: {protocol:?}"
                )));
            }
        }

        for name in self.verify_subject_alt_names.iter() {
            if name.is_empty() {
                return Err(invalid("empty subject alt name in verify_subject_alt_names"));
            }
        }

        process_fingerprints(self.verify_certificate_hashes.as_slice())?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(yaml: &str) -> TlsContextConfig {
        TlsContextConfig::from_yaml_str(yaml).unwrap()
    }

    #[test]
    fn test_valid_configs() {
        assert!(parse("{}").validate().is_ok());
        let server = "cert: a.crt\nkey: a.key\nrequire_client_certificate: true\n";
        assert!(parse(server).validate().is_ok());
    }

    #[test]
    fn test_cert_without_key() {
        assert!(parse("cert: a.crt\n").validate().is_err());
        assert!(parse("key: a.key\n").validate().is_err());
    }

    #[test]
    fn test_require_client_certificate_needs_server_identity() {
        let err = parse("require_client_certificate: true\n").validate().unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidInput);
    }

    #[test]
    fn test_bad_alpn_and_names() {
        assert!(parse("alpn_protocols: ['']\n").validate().is_err());
        let long = "x".repeat(256);
        assert!(parse(&format!("alpn_protocol: {long}\n")).validate().is_err());
        assert!(parse("verify_subject_alt_names: ['']\n").validate().is_err());
    }

    #[test]
    fn test_bad_fingerprint() {
        assert!(parse("verify_certificate_hash: abcd\n").validate().is_err());
    }
}
