//! TLS configuration and certificate loading.

use std::path::Path;

use axum_server::tls_rustls::RustlsConfig;
use tokio_rustls::TlsAcceptor;

/// Certificate material for a TLS listener.
#[derive(Clone)]
pub struct SecurityContext {
    config: RustlsConfig,
}

impl SecurityContext {
    /// Load a certificate chain and private key from PEM files.
    pub async fn from_pem_files(cert_path: &Path, key_path: &Path) -> Result<Self, std::io::Error> {
        if !cert_path.exists() {
            return Err(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("Certificate file not found: {:?}", cert_path),
            ));
        }
        if !key_path.exists() {
            return Err(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("Private key file not found: {:?}", key_path),
            ));
        }

        let config = RustlsConfig::from_pem_file(cert_path, key_path).await?;
        Ok(Self { config })
    }

    /// Wrap an already-built rustls configuration.
    pub fn from_config(config: RustlsConfig) -> Self {
        Self { config }
    }

    pub(crate) fn acceptor(&self) -> TlsAcceptor {
        TlsAcceptor::from(self.config.get_inner())
    }
}

impl std::fmt::Debug for SecurityContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecurityContext").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_certificate_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let err = SecurityContext::from_pem_files(&dir.path().join("cert.pem"), &dir.path().join("key.pem"))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), std::io::ErrorKind::NotFound);
        assert!(err.to_string().contains("Certificate"));
    }

    #[tokio::test]
    async fn missing_key_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let cert = dir.path().join("cert.pem");
        std::fs::write(&cert, "").unwrap();
        let err = SecurityContext::from_pem_files(&cert, &dir.path().join("key.pem")).await.unwrap_err();
        assert!(err.to_string().contains("Private key"));
    }
}
