//! Self-signed TLS material for the site listener

use axum_server::tls_rustls::RustlsConfig;

/// Names the generated certificate is issued for
pub const CERT_NAMES: &[&str] = &["localhost", "127.0.0.1", "::1"];

/// PEM-encoded certificate and private key
#[derive(Debug, Clone)]
pub struct SelfSignedCert {
    pub cert_pem: String,
    pub key_pem: String,
}

impl SelfSignedCert {
    /// Generate a fresh certificate for the given DNS names / IP literals
    pub fn generate(names: &[&str]) -> anyhow::Result<Self> {
        let subject_alt_names: Vec<String> = names.iter().map(|n| n.to_string()).collect();
        let rcgen::CertifiedKey { cert, key_pair } =
            rcgen::generate_simple_self_signed(subject_alt_names)?;

        Ok(Self {
            cert_pem: cert.pem(),
            key_pem: key_pair.serialize_pem(),
        })
    }

    /// Build the rustls acceptor configuration. ALPN offers `h2` and `http/1.1`.
    pub async fn rustls_config(&self) -> anyhow::Result<RustlsConfig> {
        let config = RustlsConfig::from_pem(
            self.cert_pem.clone().into_bytes(),
            self.key_pem.clone().into_bytes(),
        )
        .await?;
        Ok(config)
    }
}
