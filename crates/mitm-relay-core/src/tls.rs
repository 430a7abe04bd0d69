//! TLS identity and transport configuration.
//!
//! The relay terminates TLS from clients with an identity that is either
//! loaded from disk or synthesized at startup, and re-originates TLS to the
//! upstream server without verifying its certificate.

use rcgen::{
    BasicConstraints, CertificateParams, DistinguishedName, DnType, ExtendedKeyUsagePurpose, IsCa,
    KeyPair, KeyUsagePurpose, SerialNumber,
};
use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::crypto::CryptoProvider;
use rustls::pki_types::{CertificateDer, PrivateKeyDer, PrivatePkcs8KeyDer, ServerName, UnixTime};
use rustls::{ClientConfig, DigitallySignedStruct, ServerConfig, SignatureScheme};
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use time::{Duration, OffsetDateTime};
use tokio_rustls::{TlsAcceptor, TlsConnector};
use tracing::info;

use crate::config::{RelayConfig, TlsSubjectConfig};
use crate::error::{Error, Result};

/// Serial number stamped on every synthesized certificate.
const SELF_SIGNED_SERIAL: u64 = 1653;

/// Validity of the synthesized certificate, in years.
const SELF_SIGNED_YEARS: i32 = 10;

/// Where the relay's TLS identity comes from.
#[derive(Debug, Clone)]
pub enum IdentitySource {
    /// A PEM certificate chain and PEM private key on disk.
    Files { cert: PathBuf, key: PathBuf },
    /// A self-signed CA certificate generated in memory.
    SelfSigned(TlsSubjectConfig),
}

impl IdentitySource {
    /// `<base>.pem` and `<base>.key`.
    pub fn from_base(base: impl AsRef<Path>) -> Self {
        let base = base.as_ref().as_os_str().to_os_string();
        let mut cert = base.clone();
        cert.push(".pem");
        let mut key = base;
        key.push(".key");
        IdentitySource::Files {
            cert: PathBuf::from(cert),
            key: PathBuf::from(key),
        }
    }

    /// Pick the source the relay configuration asks for.
    pub fn from_config(relay: &RelayConfig, subject: &TlsSubjectConfig) -> Self {
        match relay.cert_base() {
            Some(base) => Self::from_base(base),
            None => IdentitySource::SelfSigned(subject.clone()),
        }
    }

    /// Produce the identity. Nothing is written to disk.
    pub fn obtain(&self) -> Result<TlsIdentity> {
        match self {
            IdentitySource::Files { cert, key } => TlsIdentity::load(cert, key),
            IdentitySource::SelfSigned(subject) => {
                info!("Generating self-signed certificate for {}", subject.common_name);
                TlsIdentity::self_signed(subject)
            }
        }
    }
}

/// Certificate chain and private key used to terminate client TLS.
#[derive(Debug)]
pub struct TlsIdentity {
    cert_chain: Vec<CertificateDer<'static>>,
    key: PrivateKeyDer<'static>,
}

impl Clone for TlsIdentity {
    fn clone(&self) -> Self {
        Self {
            cert_chain: self.cert_chain.clone(),
            key: self.key.clone_key(),
        }
    }
}

impl TlsIdentity {
    /// Load a PEM certificate chain and PEM private key.
    pub fn load(cert_path: &Path, key_path: &Path) -> Result<Self> {
        let cert_file = File::open(cert_path).map_err(|e| {
            Error::certificate(format!("cannot open {}: {}", cert_path.display(), e))
        })?;
        let cert_chain = rustls_pemfile::certs(&mut BufReader::new(cert_file))
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| {
                Error::certificate(format!("cannot parse {}: {}", cert_path.display(), e))
            })?;
        if cert_chain.is_empty() {
            return Err(Error::certificate(format!(
                "no certificate found in {}",
                cert_path.display()
            )));
        }

        let key_file = File::open(key_path).map_err(|e| {
            Error::certificate(format!("cannot open {}: {}", key_path.display(), e))
        })?;
        let key = rustls_pemfile::private_key(&mut BufReader::new(key_file))
            .map_err(|e| {
                Error::certificate(format!("cannot parse {}: {}", key_path.display(), e))
            })?
            .ok_or_else(|| {
                Error::certificate(format!("no private key found in {}", key_path.display()))
            })?;

        Ok(Self { cert_chain, key })
    }

    /// Synthesize a self-signed CA certificate valid for ten years.
    ///
    /// The key is ECDSA P-256; ring can neither generate RSA keys nor accept
    /// 1024-bit ones.
    pub fn self_signed(subject: &TlsSubjectConfig) -> Result<Self> {
        let mut params = CertificateParams::new(vec![subject.common_name.clone()])
            .map_err(|e| Error::certificate(format!("invalid common name: {}", e)))?;

        params.serial_number = Some(SerialNumber::from(SELF_SIGNED_SERIAL));

        let mut dn = DistinguishedName::new();
        if let Some(country) = subject.country.first() {
            dn.push(DnType::CountryName, country.as_str());
        }
        if let Some(org) = subject.organization.first() {
            dn.push(DnType::OrganizationName, org.as_str());
        }
        dn.push(DnType::CommonName, subject.common_name.as_str());
        params.distinguished_name = dn;

        params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
        params.key_usages = vec![
            KeyUsagePurpose::DigitalSignature,
            KeyUsagePurpose::KeyCertSign,
        ];
        params.extended_key_usages = vec![
            ExtendedKeyUsagePurpose::ClientAuth,
            ExtendedKeyUsagePurpose::ServerAuth,
        ];

        let now = OffsetDateTime::now_utc();
        params.not_before = now;
        params.not_after = now
            .replace_year(now.year() + SELF_SIGNED_YEARS)
            .unwrap_or(now + Duration::days(365 * SELF_SIGNED_YEARS as i64 + 3));

        let key_pair = KeyPair::generate()
            .map_err(|e| Error::certificate(format!("failed to generate key pair: {}", e)))?;
        let cert = params
            .self_signed(&key_pair)
            .map_err(|e| Error::certificate(format!("failed to sign certificate: {}", e)))?;

        Ok(Self {
            cert_chain: vec![cert.der().clone()],
            key: PrivateKeyDer::Pkcs8(PrivatePkcs8KeyDer::from(key_pair.serialize_der())),
        })
    }

    /// The leaf certificate presented to clients.
    pub fn certificate(&self) -> &CertificateDer<'static> {
        &self.cert_chain[0]
    }

    /// Build an acceptor for client-facing TLS. Fails if certificate and key
    /// do not belong together.
    pub fn acceptor(&self) -> Result<TlsAcceptor> {
        let config = ServerConfig::builder_with_provider(crypto_provider())
            .with_safe_default_protocol_versions()?
            .with_no_client_auth()
            .with_single_cert(self.cert_chain.clone(), self.key.clone_key())?;
        Ok(TlsAcceptor::from(Arc::new(config)))
    }
}

fn crypto_provider() -> Arc<CryptoProvider> {
    Arc::new(rustls::crypto::ring::default_provider())
}

/// Build a connector that accepts any server certificate.
///
/// The relay impersonates the server to the client, so it has no trust chain
/// to check the real server against.
pub fn insecure_connector() -> Result<TlsConnector> {
    let provider = crypto_provider();
    let verifier = NoVerifier {
        schemes: provider
            .signature_verification_algorithms
            .supported_schemes(),
    };
    let config = ClientConfig::builder_with_provider(provider)
        .with_safe_default_protocol_versions()?
        .dangerous()
        .with_custom_certificate_verifier(Arc::new(verifier))
        .with_no_client_auth();
    Ok(TlsConnector::from(Arc::new(config)))
}

#[derive(Debug)]
struct NoVerifier {
    schemes: Vec<SignatureScheme>,
}

impl ServerCertVerifier for NoVerifier {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> std::result::Result<ServerCertVerified, rustls::Error> {
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        _message: &[u8],
        _cert: &CertificateDer<'_>,
        _dss: &DigitallySignedStruct,
    ) -> std::result::Result<HandshakeSignatureValid, rustls::Error> {
        Ok(HandshakeSignatureValid::assertion())
    }

    fn verify_tls13_signature(
        &self,
        _message: &[u8],
        _cert: &CertificateDer<'_>,
        _dss: &DigitallySignedStruct,
    ) -> std::result::Result<HandshakeSignatureValid, rustls::Error> {
        Ok(HandshakeSignatureValid::assertion())
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.schemes.clone()
    }
}

/// Split `host:port`, accepting bracketed IPv6 literals.
pub fn split_host_port(addr: &str) -> Result<(&str, u16)> {
    let (host, port) = addr
        .rsplit_once(':')
        .ok_or_else(|| Error::InvalidAddress(format!("missing port in {}", addr)))?;
    let port = port
        .parse()
        .map_err(|_| Error::InvalidAddress(format!("invalid port in {}", addr)))?;
    let host = host
        .strip_prefix('[')
        .and_then(|h| h.strip_suffix(']'))
        .unwrap_or(host);
    if host.is_empty() {
        return Err(Error::InvalidAddress(format!("missing host in {}", addr)));
    }
    Ok((host, port))
}

/// Name sent in the upstream ClientHello.
pub fn server_name(addr: &str) -> Result<ServerName<'static>> {
    let (host, _) = split_host_port(addr)?;
    ServerName::try_from(host.to_string())
        .map_err(|e| Error::InvalidAddress(format!("{}: {}", host, e)))
}
