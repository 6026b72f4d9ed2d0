// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # TLS Context Builder
//!
//! Builds the transport security context used for `amqps` connections from the
//! keystore and truststore files referenced by a [`SecureSocket`].
//!
//! Construction is one-shot and all-or-nothing: any failure while reading or
//! decoding the stores aborts the whole build with a single classified
//! [`SecureConnectionError`], so no connection is ever attempted with a partial
//! context.

use crate::{
    config::{KeyStoreConfig, SecureSocket, TrustStoreConfig},
    errors::{SecureConnectionError, StoreKind},
};
use base64::{engine::general_purpose::STANDARD, Engine};
use lapin::tcp::{OwnedIdentity, OwnedTLSConfig};
use p12::PFX;
use std::{fmt, io, path::Path, str::FromStr};
use tracing::{debug, error};

const PEM_MARKER: &[u8] = b"-----BEGIN";
const PEM_LINE_WIDTH: usize = 64;

/// Secure transport protocol requested for a connection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TlsProtocol {
    /// Let the TLS backend negotiate the highest version both sides support
    #[default]
    Tls,
    Tls12,
    Tls13,
}

impl FromStr for TlsProtocol {
    type Err = SecureConnectionError;

    fn from_str(name: &str) -> Result<Self, Self::Err> {
        match name.trim().to_ascii_uppercase().as_str() {
            "TLS" => Ok(TlsProtocol::Tls),
            "TLSV1.2" => Ok(TlsProtocol::Tls12),
            "TLSV1.3" => Ok(TlsProtocol::Tls13),
            _ => Err(SecureConnectionError::AlgorithmUnavailable(name.to_owned())),
        }
    }
}

impl fmt::Display for TlsProtocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TlsProtocol::Tls => write!(f, "TLS"),
            TlsProtocol::Tls12 => write!(f, "TLSv1.2"),
            TlsProtocol::Tls13 => write!(f, "TLSv1.3"),
        }
    }
}

/// PKCS#12 archive proving the client identity, with its passphrase.
#[derive(Clone)]
struct ClientIdentity {
    der: Vec<u8>,
    password: String,
}

/// A complete, ready to use TLS context.
#[derive(Clone)]
pub struct SecureContext {
    identity: Option<ClientIdentity>,
    trust_chain: String,
    protocol: TlsProtocol,
    verify_host_name: bool,
}

impl SecureContext {
    /// Whether a keystore was loaded to authenticate the client.
    pub fn has_client_identity(&self) -> bool {
        self.identity.is_some()
    }

    /// PEM encoded certificates used to verify the broker.
    pub fn trust_chain(&self) -> &str {
        &self.trust_chain
    }

    /// Protocol the context was requested with.
    pub fn protocol(&self) -> TlsProtocol {
        self.protocol
    }

    pub fn verify_host_name(&self) -> bool {
        self.verify_host_name
    }

    /// Converts the context into the TLS configuration lapin connects with.
    pub fn to_tls_config(&self) -> OwnedTLSConfig {
        let mut config = OwnedTLSConfig::default();
        config.identity = self.identity.as_ref().map(|id| OwnedIdentity {
            der: id.der.clone(),
            password: id.password.clone(),
        });
        config.cert_chain = Some(self.trust_chain.clone());
        config
    }
}

impl fmt::Debug for SecureContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SecureContext")
            .field("client_identity", &self.identity.is_some())
            .field("trust_chain_len", &self.trust_chain.len())
            .field("protocol", &self.protocol)
            .field("verify_host_name", &self.verify_host_name)
            .finish()
    }
}

/// Builds a TLS context from the given secure socket settings.
///
/// The keystore is optional; the truststore is always loaded. The protocol
/// defaults to [`TlsProtocol::Tls`] when none is configured.
///
/// # Parameters
/// * `socket` - Keystore, truststore, protocol and host name verification settings
///
/// # Returns
/// The complete context, or the first failure classified as a `SecureConnectionError`
pub fn build_secure_context(socket: &SecureSocket) -> Result<SecureContext, SecureConnectionError> {
    debug!("building tls context...");

    let identity = match &socket.key_store {
        Some(cfg) => Some(load_key_store(cfg)?),
        None => None,
    };

    let certs = load_trust_store(&socket.trust_store)?;

    let protocol = match &socket.protocol {
        Some(name) => name.parse()?,
        None => TlsProtocol::default(),
    };

    debug!(
        protocol = protocol.to_string(),
        certificates = certs.len(),
        client_identity = identity.is_some(),
        "tls context built"
    );

    Ok(SecureContext {
        identity,
        trust_chain: pem_chain(&certs),
        protocol,
        verify_host_name: socket.verify_host_name,
    })
}

fn read_store(path: Option<&Path>, store: StoreKind) -> Result<Vec<u8>, SecureConnectionError> {
    let Some(path) = path else {
        error!("path for the {} is not found", store);
        return Err(SecureConnectionError::MissingPath(store));
    };

    std::fs::read(path).map_err(|err| {
        let detail = format!("{}: {}", path.display(), err);
        error!(error = detail.as_str(), "failure to read the {}", store);
        match err.kind() {
            io::ErrorKind::NotFound => SecureConnectionError::FileNotFound { store, detail },
            _ => SecureConnectionError::Io { store, detail },
        }
    })
}

fn load_key_store(cfg: &KeyStoreConfig) -> Result<ClientIdentity, SecureConnectionError> {
    let der = read_store(cfg.path.as_deref(), StoreKind::KeyStore)?;

    let pfx = PFX::parse(&der).map_err(|err| {
        SecureConnectionError::KeystoreType(format!("keystore is not a PKCS#12 archive: {:?}", err))
    })?;

    if !pfx.verify_mac(&cfg.password) {
        return Err(SecureConnectionError::KeyUnrecoverable(
            "keystore integrity check failed for the given passphrase".to_owned(),
        ));
    }

    let keys = pfx
        .key_bags(&cfg.password)
        .map_err(|err| SecureConnectionError::KeyUnrecoverable(format!("{:?}", err)))?;

    if keys.is_empty() {
        return Err(SecureConnectionError::KeyManagement(
            "keystore does not hold a private key".to_owned(),
        ));
    }

    Ok(ClientIdentity {
        der,
        password: cfg.password.clone(),
    })
}

/// Loads the trusted certificates as DER blobs, from either a PEM bundle or a
/// PKCS#12 archive.
fn load_trust_store(cfg: &TrustStoreConfig) -> Result<Vec<Vec<u8>>, SecureConnectionError> {
    let raw = read_store(cfg.path.as_deref(), StoreKind::TrustStore)?;

    let certs = if is_pem(&raw) {
        rustls_pemfile::certs(&mut raw.as_slice())
            .map(|cert| cert.map(|der| der.as_ref().to_vec()))
            .collect::<Result<Vec<_>, _>>()
            .map_err(|err| SecureConnectionError::Certificate(err.to_string()))?
    } else {
        let pfx = PFX::parse(&raw).map_err(|err| {
            SecureConnectionError::KeystoreType(format!(
                "truststore is neither a PEM bundle nor a PKCS#12 archive: {:?}",
                err
            ))
        })?;

        if !pfx.verify_mac(&cfg.password) {
            return Err(SecureConnectionError::Certificate(
                "truststore integrity check failed for the given passphrase".to_owned(),
            ));
        }

        pfx.cert_x509_bags(&cfg.password)
            .map_err(|err| SecureConnectionError::Certificate(format!("{:?}", err)))?
    };

    if certs.is_empty() {
        return Err(SecureConnectionError::Certificate(
            "truststore does not hold any certificate".to_owned(),
        ));
    }

    Ok(certs)
}

fn is_pem(raw: &[u8]) -> bool {
    raw.windows(PEM_MARKER.len()).any(|w| w == PEM_MARKER)
}

fn pem_chain(certs: &[Vec<u8>]) -> String {
    let mut pem = String::new();
    for der in certs {
        let encoded = STANDARD.encode(der);
        pem.push_str("-----BEGIN CERTIFICATE-----\n");
        for line in encoded.as_bytes().chunks(PEM_LINE_WIDTH) {
            // base64 output is ascii
            pem.push_str(std::str::from_utf8(line).unwrap_or_default());
            pem.push('\n');
        }
        pem.push_str("-----END CERTIFICATE-----\n");
    }
    pem
}
