use serde::{Deserialize, Serialize};

use crate::option_util::NoneOrSome;

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct TlsContextConfig {
    // PEM path or inline PEM data. Both are required for server sessions and
    // are presented as the client certificate for client sessions.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cert: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,

    // trusted CA certs that the peer certificate must chain to.
    #[serde(
        alias = "ca_cert",
        default,
        skip_serializing_if = "NoneOrSome::is_unspecified"
    )]
    pub ca_certs: NoneOrSome<String>,

    #[serde(
        alias = "alpn_protocol",
        default,
        skip_serializing_if = "NoneOrSome::is_unspecified"
    )]
    pub alpn_protocols: NoneOrSome<String>,

    // sha256 fingerprints of allowed peer certificates. Get one with:
    //    openssl x509 -in peer.crt -noout -fingerprint -sha256
    #[serde(
        alias = "verify_certificate_hash",
        default,
        skip_serializing_if = "NoneOrSome::is_unspecified"
    )]
    pub verify_certificate_hashes: NoneOrSome<String>,

    // DNS or URI subject alt names, at least one of which the peer
    // certificate must carry.
    #[serde(
        alias = "verify_subject_alt_name",
        default,
        skip_serializing_if = "NoneOrSome::is_unspecified"
    )]
    pub verify_subject_alt_names: NoneOrSome<String>,

    #[serde(default)]
    pub require_client_certificate: bool,

    // name sent as SNI and verified by client sessions.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server_name: Option<String>,

    // verify servers against the bundled Mozilla roots when no ca_certs are set.
    #[serde(default)]
    pub verify_webpki: bool,
}

impl TlsContextConfig {
    pub fn from_yaml_str(s: &str) -> std::io::Result<Self> {
        serde_yaml::from_str(s).map_err(|e| {
            std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                format!("Could not parse TLS config YAML: {e}"),
            )
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_full_config() {
        let config = TlsContextConfig::from_yaml_str(
            r#"
cert: certs/server.crt
key: certs/server.key
ca_certs: [certs/ca.crt, certs/other-ca.crt]
alpn_protocols: [h2, http/1.1]
verify_certificate_hashes: "13:a3:3d:1e"
verify_subject_alt_names: [localhost]
require_client_certificate: true
server_name: localhost
"#,
        )
        .unwrap();

        assert_eq!(config.cert.as_deref(), Some("certs/server.crt"));
        assert_eq!(config.key.as_deref(), Some("certs/server.key"));
        assert_eq!(config.ca_certs.len(), 2);
        assert_eq!(
            config.alpn_protocols.iter().cloned().collect::<Vec<_>>(),
            vec!["h2".to_string(), "http/1.1".to_string()]
        );
        assert_eq!(config.verify_certificate_hashes.len(), 1);
        assert_eq!(config.verify_subject_alt_names.len(), 1);
        assert!(config.require_client_certificate);
        assert!(!config.verify_webpki);
        assert_eq!(config.server_name.as_deref(), Some("localhost"));
    }

    #[test]
    fn test_singular_aliases() {
        let config = TlsContextConfig::from_yaml_str(
            "ca_cert: ca.crt\nalpn_protocol: h2\nverify_subject_alt_name: api.example.com\n",
        )
        .unwrap();
        assert_eq!(config.ca_certs.into_vec(), vec!["ca.crt".to_string()]);
        assert_eq!(config.alpn_protocols.into_vec(), vec!["h2".to_string()]);
        assert_eq!(
            config.verify_subject_alt_names.into_vec(),
            vec!["api.example.com".to_string()]
        );
    }

    #[test]
    fn test_empty_config() {
        let config = TlsContextConfig::from_yaml_str("{}").unwrap();
        assert!(config.cert.is_none());
        assert!(config.alpn_protocols.is_unspecified());
        assert!(!config.require_client_certificate);
    }

    #[test]
    fn test_unknown_field_rejected() {
        let err = TlsContextConfig::from_yaml_str("certificate: server.crt\n").unwrap_err();
        assert_eq!(err.kind(), std::io::ErrorKind::InvalidInput);
    }
}
