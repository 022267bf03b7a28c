//! TLS configuration and certificate loading.

use std::fmt;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use axum_server::tls_rustls::RustlsConfig;
use rustls::crypto::CryptoProvider;
use rustls::pki_types::{CertificateDer, PrivateKeyDer};
use rustls::server::{VerifierBuilderError, WebPkiClientVerifier};
use rustls::RootCertStore;

use crate::config::ServerConfig;

/// Error type for loading TLS material.
#[derive(Debug, thiserror::Error)]
pub enum TlsError {
    #[error("TLS requires both cert_file and key_file")]
    Incomplete,

    #[error("failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("no certificates found in {}", .0.display())]
    NoCertificates(PathBuf),

    #[error("no private key found in {}", .0.display())]
    NoPrivateKey(PathBuf),

    #[error("invalid CA certificate in {}: {source}", path.display())]
    InvalidCa {
        path: PathBuf,
        source: rustls::Error,
    },

    #[error("cannot build client verifier: {0}")]
    Verifier(#[from] VerifierBuilderError),

    #[error("certificate and key do not form a usable pair: {0}")]
    KeyPair(#[from] rustls::Error),
}

/// Server-side TLS state wrapped around the listening socket.
///
/// The `RustlsConfig` handle is shared with every acceptor created from it,
/// so [`TlsContext::reload`] swaps certificates in place without touching
/// the socket.
#[derive(Clone)]
pub struct TlsContext {
    rustls: RustlsConfig,
    cert_file: PathBuf,
    key_file: PathBuf,
    ca_file: Option<PathBuf>,
}

impl TlsContext {
    /// Load and validate cert/key (and CA, if any) named in `server`.
    pub fn load(server: &ServerConfig) -> Result<Self, TlsError> {
        let (cert_file, key_file) = tls_paths(server)?;
        let rustls = RustlsConfig::from_config(build_server_config(
            cert_file,
            key_file,
            server.ca_file.as_deref(),
        )?);

        tracing::info!(
            cert_file = %cert_file.display(),
            key_file = %key_file.display(),
            client_verification = server.ca_file.is_some(),
            "TLS context loaded"
        );

        Ok(Self {
            rustls,
            cert_file: cert_file.to_path_buf(),
            key_file: key_file.to_path_buf(),
            ca_file: server.ca_file.clone(),
        })
    }

    /// Validate the new cert/key pair and hot-swap it into the live context.
    ///
    /// On error the previous certificates stay in service.
    pub fn reload(&mut self, server: &ServerConfig) -> Result<(), TlsError> {
        let (cert_file, key_file) = tls_paths(server)?;
        let config = build_server_config(cert_file, key_file, server.ca_file.as_deref())?;
        self.rustls.reload_from_config(config);

        tracing::info!(
            cert_file = %cert_file.display(),
            key_file = %key_file.display(),
            "TLS certificates reloaded"
        );

        self.cert_file = cert_file.to_path_buf();
        self.key_file = key_file.to_path_buf();
        self.ca_file = server.ca_file.clone();
        Ok(())
    }

    /// Handle for building acceptors; shares state with this context.
    pub fn rustls_config(&self) -> RustlsConfig {
        self.rustls.clone()
    }

    pub fn cert_file(&self) -> &Path {
        &self.cert_file
    }

    pub fn key_file(&self) -> &Path {
        &self.key_file
    }

    pub fn ca_file(&self) -> Option<&Path> {
        self.ca_file.as_deref()
    }
}

impl fmt::Debug for TlsContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TlsContext")
            .field("cert_file", &self.cert_file)
            .field("key_file", &self.key_file)
            .field("ca_file", &self.ca_file)
            .finish()
    }
}

fn tls_paths(server: &ServerConfig) -> Result<(&Path, &Path), TlsError> {
    match (server.cert_file.as_deref(), server.key_file.as_deref()) {
        (Some(cert), Some(key)) => Ok((cert, key)),
        _ => Err(TlsError::Incomplete),
    }
}

fn provider() -> Arc<CryptoProvider> {
    Arc::new(rustls::crypto::aws_lc_rs::default_provider())
}

/// Build a rustls server config. With a CA file every client must present a
/// certificate signed by it; without one client certificates are not asked
/// for.
pub fn build_server_config(
    cert_file: &Path,
    key_file: &Path,
    ca_file: Option<&Path>,
) -> Result<Arc<rustls::ServerConfig>, TlsError> {
    let certs = load_certs(cert_file)?;
    let key = load_private_key(key_file)?;

    let builder = rustls::ServerConfig::builder_with_provider(provider())
        .with_safe_default_protocol_versions()?;

    let builder = match ca_file {
        Some(ca_file) => {
            let mut roots = RootCertStore::empty();
            for cert in load_certs(ca_file)? {
                roots.add(cert).map_err(|source| TlsError::InvalidCa {
                    path: ca_file.to_path_buf(),
                    source,
                })?;
            }
            let verifier =
                WebPkiClientVerifier::builder_with_provider(Arc::new(roots), provider()).build()?;
            builder.with_client_cert_verifier(verifier)
        }
        None => builder.with_no_client_auth(),
    };

    let mut config = builder.with_single_cert(certs, key)?;
    config.alpn_protocols = vec![b"h2".to_vec(), b"http/1.1".to_vec()];

    Ok(Arc::new(config))
}

fn open(path: &Path) -> Result<BufReader<File>, TlsError> {
    let file = File::open(path).map_err(|source| TlsError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(BufReader::new(file))
}

/// Read every certificate from a PEM file.
pub fn load_certs(path: &Path) -> Result<Vec<CertificateDer<'static>>, TlsError> {
    let mut reader = open(path)?;
    let certs = rustls_pemfile::certs(&mut reader)
        .collect::<Result<Vec<_>, _>>()
        .map_err(|source| TlsError::Read {
            path: path.to_path_buf(),
            source,
        })?;

    if certs.is_empty() {
        return Err(TlsError::NoCertificates(path.to_path_buf()));
    }
    Ok(certs)
}

/// Read the first private key (PKCS#1, PKCS#8 or SEC1) from a PEM file.
pub fn load_private_key(path: &Path) -> Result<PrivateKeyDer<'static>, TlsError> {
    let mut reader = open(path)?;
    rustls_pemfile::private_key(&mut reader)
        .map_err(|source| TlsError::Read {
            path: path.to_path_buf(),
            source,
        })?
        .ok_or_else(|| TlsError::NoPrivateKey(path.to_path_buf()))
}
