//! Long-lived TLS configuration: creates per-connection sessions and checks
//! the peer against the configured identity policy once a handshake ends.

use std::collections::BTreeSet;
use std::io;
use std::sync::{Arc, OnceLock};

use log::debug;
use rustls::pki_types::pem::PemObject;
use rustls::pki_types::{CertificateDer, PrivateKeyDer, ServerName};
use rustls::server::WebPkiClientVerifier;
use x509_parser::certificate::X509Certificate;
use x509_parser::extensions::GeneralName;
use x509_parser::prelude::FromDer;

use crate::config::{TlsContextConfig, load_pem};
use crate::rustls_session::RustlsSession;
use crate::tls_session::{PeerIdentity, Role, TlsSession};
use crate::util::{SHA256_DIGEST_LEN, process_fingerprints, sha256, to_hex};

pub trait TlsContext {
    type Session: TlsSession;

    /// Create a session that plays `role` in the handshake.
    fn new_session(&self, role: Role) -> io::Result<Self::Session>;

    /// Check a peer that completed the handshake against the configured policy.
    fn verify_peer(&self, peer: &dyn PeerIdentity) -> bool;
}

/// How a client session authenticates the server during the handshake.
pub enum ClientVerification {
    /// Chain-verify against the given PEM encoded roots.
    WebPki(Vec<Vec<u8>>),
    /// Chain-verify against the bundled Mozilla root store.
    WebPkiRoots,
    /// Accept any certificate; identity is left to `verify_peer`.
    None,
}

pub struct RustlsContext {
    server_config: Option<Arc<rustls::ServerConfig>>,
    client_config: Option<Arc<rustls::ClientConfig>>,
    server_name: Option<ServerName<'static>>,
    verify_certificate_hashes: BTreeSet<[u8; SHA256_DIGEST_LEN]>,
    verify_subject_alt_names: Vec<String>,
}

impl RustlsContext {
    /// Build the server and client configurations described by `config`.
    ///
    /// The server side is only available when a certificate and key are
    /// configured. The client side always is.
    pub fn from_config(config: &TlsContextConfig) -> io::Result<Self> {
        config.validate()?;

        let alpn_protocols = config.alpn_protocols.as_slice();
        let ca_certs = config
            .ca_certs
            .iter()
            .map(|pem| load_pem(pem))
            .collect::<io::Result<Vec<_>>>()?;

        let key_and_cert = match (&config.cert, &config.key) {
            (Some(cert), Some(key)) => Some((load_pem(cert)?, load_pem(key)?)),
            _ => None,
        };

        let server_config = match key_and_cert {
            Some((ref cert_bytes, ref key_bytes)) => {
                let request_client_cert = !config.verify_certificate_hashes.is_empty()
                    || !config.verify_subject_alt_names.is_empty()
                    || config.require_client_certificate;
                Some(Arc::new(create_server_config(
                    cert_bytes,
                    key_bytes,
                    &ca_certs,
                    alpn_protocols,
                    request_client_cert,
                    config.require_client_certificate,
                )?))
            }
            None => None,
        };

        let verification = if !ca_certs.is_empty() {
            ClientVerification::WebPki(ca_certs)
        } else if config.verify_webpki {
            ClientVerification::WebPkiRoots
        } else {
            ClientVerification::None
        };
        let client_config = create_client_config(
            verification,
            alpn_protocols,
            key_and_cert.map(|(cert, key)| (key, cert)),
        )?;

        let server_name = match config.server_name {
            Some(ref name) => Some(ServerName::try_from(name.clone()).map_err(|e| {
                io::Error::new(
                    io::ErrorKind::InvalidInput,
                    format!("invalid server name {name}: {e}"),
                )
            })?),
            None => None,
        };

        let verify_certificate_hashes =
            process_fingerprints(config.verify_certificate_hashes.as_slice())?;

        Ok(Self {
            server_config,
            client_config: Some(Arc::new(client_config)),
            server_name,
            verify_certificate_hashes,
            verify_subject_alt_names: config.verify_subject_alt_names.as_slice().to_vec(),
        })
    }
}

impl TlsContext for RustlsContext {
    type Session = RustlsSession;

    fn new_session(&self, role: Role) -> io::Result<RustlsSession> {
        match role {
            Role::Server => {
                let config = self.server_config.as_ref().ok_or_else(|| {
                    io::Error::new(
                        io::ErrorKind::InvalidInput,
                        "server sessions require a certificate and key",
                    )
                })?;
                RustlsSession::new_server(config.clone())
            }
            Role::Client => {
                let config = self.client_config.as_ref().ok_or_else(|| {
                    io::Error::new(io::ErrorKind::InvalidInput, "no client configuration")
                })?;
                let server_name = self.server_name.as_ref().ok_or_else(|| {
                    io::Error::new(
                        io::ErrorKind::InvalidInput,
                        "client sessions require a server_name",
                    )
                })?;
                RustlsSession::new_client(config.clone(), server_name.clone())
            }
        }
    }

    fn verify_peer(&self, peer: &dyn PeerIdentity) -> bool {
        if self.verify_subject_alt_names.is_empty() && self.verify_certificate_hashes.is_empty() {
            return true;
        }

        let Some(cert) = peer.peer_certificate() else {
            debug!("peer presented no certificate");
            return false;
        };

        if !self.verify_subject_alt_names.is_empty()
            && !verify_subject_alt_name(cert, &self.verify_subject_alt_names)
        {
            debug!("peer certificate subject alt names did not match");
            return false;
        }

        if !self.verify_certificate_hashes.is_empty() {
            let digest = sha256(cert);
            if !self.verify_certificate_hashes.contains(&digest) {
                debug!("unknown peer certificate hash: {}", to_hex(&digest));
                return false;
            }
        }

        true
    }
}

/// Whether any DNS or URI subject alt name of `cert_der` matches one of
/// `names`.
pub fn verify_subject_alt_name(cert_der: &[u8], names: &[String]) -> bool {
    let Ok((_, cert)) = X509Certificate::from_der(cert_der) else {
        return false;
    };
    let Ok(Some(san)) = cert.subject_alternative_name() else {
        return false;
    };

    san.value.general_names.iter().any(|general_name| match general_name {
        GeneralName::DNSName(dns_name) => names.iter().any(|name| dns_name_match(name, dns_name)),
        GeneralName::URI(uri) => names.iter().any(|name| name == uri),
        _ => false,
    })
}

/// Match a configured name against a certificate DNS name. A leading `*.`
/// in the certificate name matches exactly one label.
pub fn dns_name_match(name: &str, cert_name: &str) -> bool {
    if name.eq_ignore_ascii_case(cert_name) {
        return true;
    }
    match (cert_name.strip_prefix("*."), name.split_once('.')) {
        (Some(cert_suffix), Some((label, suffix))) => {
            !label.is_empty() && suffix.eq_ignore_ascii_case(cert_suffix)
        }
        _ => false,
    }
}

fn get_crypto_provider() -> Arc<rustls::crypto::CryptoProvider> {
    static INSTANCE: OnceLock<Arc<rustls::crypto::CryptoProvider>> = OnceLock::new();
    INSTANCE
        .get_or_init(|| Arc::new(rustls::crypto::aws_lc_rs::default_provider()))
        .clone()
}

fn get_supported_algorithms() -> rustls::crypto::WebPkiSupportedAlgorithms {
    get_crypto_provider().signature_verification_algorithms
}

fn get_webpki_root_store() -> Arc<rustls::RootCertStore> {
    static INSTANCE: OnceLock<Arc<rustls::RootCertStore>> = OnceLock::new();
    INSTANCE
        .get_or_init(|| {
            Arc::new(rustls::RootCertStore {
                roots: webpki_roots::TLS_SERVER_ROOTS.to_vec(),
            })
        })
        .clone()
}

fn tls_error(context: &str, e: impl std::fmt::Display) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidInput, format!("{context}: {e}"))
}

fn parse_cert_chain(cert_bytes: &[u8]) -> io::Result<Vec<CertificateDer<'static>>> {
    let certs = CertificateDer::pem_slice_iter(cert_bytes)
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| tls_error("could not parse certificate", e))?;
    if certs.is_empty() {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            "no certificates found in PEM data",
        ));
    }
    Ok(certs)
}

fn build_root_store(ca_certs: &[Vec<u8>]) -> io::Result<rustls::RootCertStore> {
    let mut roots = rustls::RootCertStore::empty();
    for ca in ca_certs {
        for cert in parse_cert_chain(ca)? {
            roots
                .add(cert)
                .map_err(|e| tls_error("invalid CA certificate", e))?;
        }
    }
    Ok(roots)
}

pub fn create_server_config(
    cert_bytes: &[u8],
    key_bytes: &[u8],
    ca_certs: &[Vec<u8>],
    alpn_protocols: &[String],
    request_client_cert: bool,
    require_client_cert: bool,
) -> io::Result<rustls::ServerConfig> {
    let certs = parse_cert_chain(cert_bytes)?;
    let privkey = PrivateKeyDer::from_pem_slice(key_bytes)
        .map_err(|e| tls_error("could not parse private key", e))?;

    let builder = rustls::ServerConfig::builder_with_provider(get_crypto_provider())
        .with_safe_default_protocol_versions()
        .map_err(|e| tls_error("unsupported protocol versions", e))?;

    let builder = if !ca_certs.is_empty() {
        let roots = Arc::new(build_root_store(ca_certs)?);
        let verifier_builder =
            WebPkiClientVerifier::builder_with_provider(roots, get_crypto_provider());
        let verifier_builder = if require_client_cert {
            verifier_builder
        } else {
            verifier_builder.allow_unauthenticated()
        };
        let verifier = verifier_builder
            .build()
            .map_err(|e| tls_error("could not build client verifier", e))?;
        builder.with_client_cert_verifier(verifier)
    } else if request_client_cert {
        builder.with_client_cert_verifier(Arc::new(AcceptAnyClientVerifier {
            supported_algs: get_supported_algorithms(),
            mandatory: require_client_cert,
        }))
    } else {
        builder.with_no_client_auth()
    };

    let mut config = builder
        .with_single_cert(certs, privkey)
        .map_err(|e| tls_error("bad certificate/key", e))?;

    config.alpn_protocols = alpn_protocols
        .iter()
        .map(|s| s.as_bytes().to_vec())
        .collect();

    Ok(config)
}

pub fn create_client_config(
    verification: ClientVerification,
    alpn_protocols: &[String],
    client_key_and_cert: Option<(Vec<u8>, Vec<u8>)>,
) -> io::Result<rustls::ClientConfig> {
    let builder = rustls::ClientConfig::builder_with_provider(get_crypto_provider())
        .with_safe_default_protocol_versions()
        .map_err(|e| tls_error("unsupported protocol versions", e))?;

    let builder = match verification {
        ClientVerification::WebPki(ca_certs) => {
            let roots = Arc::new(build_root_store(&ca_certs)?);
            let verifier = rustls::client::WebPkiServerVerifier::builder_with_provider(
                roots,
                get_crypto_provider(),
            )
            .build()
            .map_err(|e| tls_error("could not build server verifier", e))?;
            builder.with_webpki_verifier(verifier)
        }
        ClientVerification::WebPkiRoots => {
            let verifier = rustls::client::WebPkiServerVerifier::builder_with_provider(
                get_webpki_root_store(),
                get_crypto_provider(),
            )
            .build()
            .map_err(|e| tls_error("could not build server verifier", e))?;
            builder.with_webpki_verifier(verifier)
        }
        ClientVerification::None => builder
            .dangerous()
            .with_custom_certificate_verifier(get_accept_any_server_verifier()),
    };

    let mut config = match client_key_and_cert {
        Some((key_bytes, cert_bytes)) => {
            let certs = parse_cert_chain(&cert_bytes)?;
            let privkey = PrivateKeyDer::from_pem_slice(&key_bytes)
                .map_err(|e| tls_error("could not parse private key", e))?;
            builder
                .with_client_auth_cert(certs, privkey)
                .map_err(|e| tls_error("could not use client certificate", e))?
        }
        None => builder.with_no_client_auth(),
    };

    config.alpn_protocols = alpn_protocols
        .iter()
        .map(|s| s.as_bytes().to_vec())
        .collect();

    Ok(config)
}

#[derive(Debug)]
pub struct AcceptAnyServerVerifier {
    supported_algs: rustls::crypto::WebPkiSupportedAlgorithms,
}

impl rustls::client::danger::ServerCertVerifier for AcceptAnyServerVerifier {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: rustls::pki_types::UnixTime,
    ) -> Result<rustls::client::danger::ServerCertVerified, rustls::Error> {
        Ok(rustls::client::danger::ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &rustls::DigitallySignedStruct,
    ) -> Result<rustls::client::danger::HandshakeSignatureValid, rustls::Error> {
        rustls::crypto::verify_tls12_signature(message, cert, dss, &self.supported_algs)
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &rustls::DigitallySignedStruct,
    ) -> Result<rustls::client::danger::HandshakeSignatureValid, rustls::Error> {
        rustls::crypto::verify_tls13_signature(message, cert, dss, &self.supported_algs)
    }

    fn supported_verify_schemes(&self) -> Vec<rustls::SignatureScheme> {
        self.supported_algs.supported_schemes()
    }
}

fn get_accept_any_server_verifier() -> Arc<AcceptAnyServerVerifier> {
    static INSTANCE: OnceLock<Arc<AcceptAnyServerVerifier>> = OnceLock::new();
    INSTANCE
        .get_or_init(|| {
            Arc::new(AcceptAnyServerVerifier {
                supported_algs: get_supported_algorithms(),
            })
        })
        .clone()
}

/// Requests a client certificate without chain-verifying it. Signatures are
/// still checked, so the client proves possession of the key.
#[derive(Debug)]
pub struct AcceptAnyClientVerifier {
    supported_algs: rustls::crypto::WebPkiSupportedAlgorithms,
    mandatory: bool,
}

impl rustls::server::danger::ClientCertVerifier for AcceptAnyClientVerifier {
    fn offer_client_auth(&self) -> bool {
        true
    }

    fn client_auth_mandatory(&self) -> bool {
        self.mandatory
    }

    fn root_hint_subjects(&self) -> &[rustls::DistinguishedName] {
        &[]
    }

    fn verify_client_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _now: rustls::pki_types::UnixTime,
    ) -> Result<rustls::server::danger::ClientCertVerified, rustls::Error> {
        Ok(rustls::server::danger::ClientCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &rustls::DigitallySignedStruct,
    ) -> Result<rustls::client::danger::HandshakeSignatureValid, rustls::Error> {
        rustls::crypto::verify_tls12_signature(message, cert, dss, &self.supported_algs)
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &rustls::DigitallySignedStruct,
    ) -> Result<rustls::client::danger::HandshakeSignatureValid, rustls::Error> {
        rustls::crypto::verify_tls13_signature(message, cert, dss, &self.supported_algs)
    }

    fn supported_verify_schemes(&self) -> Vec<rustls::SignatureScheme> {
        self.supported_algs.supported_schemes()
    }
}
