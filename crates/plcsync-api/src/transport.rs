// Shared transport configuration for building reqwest::Client instances.
//
// Redirects are never followed by reqwest itself: the gateway sits behind a
// proxy that sometimes bounces requests to a misspelled host, and the client
// decides per response whether a redirect is safe to replay.

use std::path::PathBuf;
use std::time::Duration;

use reqwest::redirect::Policy;

/// TLS verification mode.
#[derive(Debug, Clone)]
pub enum TlsMode {
    /// Use the system certificate store.
    System,
    /// Use a custom CA certificate from the given PEM file.
    CustomCa(PathBuf),
    /// Accept any certificate (for self-signed gateways).
    DangerAcceptInvalid,
}

/// Shared transport configuration for building HTTP clients.
#[derive(Debug, Clone)]
pub struct TransportConfig {
    pub tls: TlsMode,
    /// Timeout for single-tag reads and writes.
    pub timeout: Duration,
    /// Timeout for a whole batch request. The gateway writes every tag
    /// before answering, so this is a multiple of `timeout`.
    pub batch_timeout: Duration,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self::with_timeout(Duration::from_secs(30))
    }
}

impl TransportConfig {
    /// System TLS with the given per-request timeout and a batch timeout of three times that.
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            tls: TlsMode::System,
            timeout,
            batch_timeout: timeout * 3,
        }
    }

    /// Build a `reqwest::Client` from this config.
    pub fn build_client(&self) -> Result<reqwest::Client, crate::error::Error> {
        let mut builder = reqwest::Client::builder()
            .timeout(self.timeout)
            .redirect(Policy::none())
            .user_agent(concat!("plcsync/", env!("CARGO_PKG_VERSION")));

        match &self.tls {
            TlsMode::System => {}
            TlsMode::CustomCa(path) => {
                let cert_pem = std::fs::read(path).map_err(|e| {
                    crate::error::Error::Tls(format!("failed to read CA cert: {e}"))
                })?;
                let cert = reqwest::Certificate::from_pem(&cert_pem)
                    .map_err(|e| crate::error::Error::Tls(format!("invalid CA cert: {e}")))?;
                builder = builder.add_root_certificate(cert);
            }
            TlsMode::DangerAcceptInvalid => {
                builder = builder.danger_accept_invalid_certs(true);
            }
        }

        builder
            .build()
            .map_err(|e| crate::error::Error::Tls(format!("failed to build HTTP client: {e}")))
    }
}
