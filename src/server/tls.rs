//! TLS termination setup.

use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::sync::Arc;

use tokio_rustls::TlsAcceptor;
use tokio_rustls::rustls::ServerConfig as RustlsConfig;

use crate::server::config::TlsSettings;
use crate::server::error::Error;

fn open(path: &Path, what: &str) -> Result<BufReader<File>, Error> {
    File::open(path)
        .map(BufReader::new)
        .map_err(|e| Error::TlsError(format!("cannot open {what} file {}: {e}", path.display())))
}

/// Build a TLS acceptor from PEM-encoded key and certificate files.
///
/// The files are read once; there is no reload.
pub fn load_acceptor(settings: &TlsSettings) -> Result<TlsAcceptor, Error> {
    let certs = rustls_pemfile::certs(&mut open(&settings.cert, "certificate")?)
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| Error::TlsError(format!("failed to read certificate: {e}")))?;
    if certs.is_empty() {
        return Err(Error::TlsError(format!(
            "no certificate found in {}",
            settings.cert.display()
        )));
    }

    let key = rustls_pemfile::private_key(&mut open(&settings.key, "private key")?)
        .map_err(|e| Error::TlsError(format!("failed to read private key: {e}")))?
        .ok_or_else(|| {
            Error::TlsError(format!("no private key found in {}", settings.key.display()))
        })?;

    let config = RustlsConfig::builder()
        .with_no_client_auth()
        .with_single_cert(certs, key)
        .map_err(|e| Error::TlsError(format!("invalid certificate or key: {e}")))?;

    Ok(TlsAcceptor::from(Arc::new(config)))
}
