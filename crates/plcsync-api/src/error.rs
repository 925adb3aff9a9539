use thiserror::Error;

/// Top-level error type for the `plcsync-api` crate.
///
/// Covers every failure mode of the gateway protocol: authentication,
/// transport, redirects, per-tag rejections, and malformed payloads.
/// `plcsync-core` folds these into its sync fault taxonomy.
#[derive(Debug, Error)]
pub enum Error {
    // ── Authentication ──────────────────────────────────────────────
    /// Gateway rejected the Basic credentials (HTTP 401/403).
    #[error("Authentication failed (HTTP {status})")]
    Authentication { status: u16 },

    // ── Transport ───────────────────────────────────────────────────
    /// HTTP transport error (connection refused, DNS failure, timeout, etc.)
    #[error("HTTP transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// URL parsing error.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// TLS setup or HTTP client construction error.
    #[error("TLS error: {0}")]
    Tls(String),

    /// Redirect to a host that is neither the API host nor a known misspelling of it.
    #[error("Unexpected redirect to {location}")]
    UnexpectedRedirect { location: String },

    // ── Gateway ─────────────────────────────────────────────────────
    /// Non-success HTTP status other than auth failures.
    #[error("Gateway returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    /// Single-tag write answered `{"sucesso": false}`.
    #[error("Write to {address} rejected by controller")]
    Rejected { address: String },

    /// Batch endpoint reported failure without per-tag results.
    #[error("Batch write rejected: {message}")]
    BatchRejected { message: String },

    // ── Data ────────────────────────────────────────────────────────
    /// JSON deserialization failed, with the raw body for debugging.
    #[error("Deserialization error: {message}")]
    Deserialization { message: String, body: String },

    /// Tag address not in `FILE:ELEMENT` form.
    #[error("Invalid tag address: {0}")]
    InvalidTag(String),
}

impl Error {
    /// Returns `true` if the gateway refused our credentials.
    pub fn is_auth(&self) -> bool {
        matches!(self, Self::Authentication { .. })
    }

    /// Returns `true` if this is a transient error worth retrying.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Transport(e) => e.is_timeout() || e.is_connect(),
            _ => false,
        }
    }

    /// Returns `true` for protocol-level failures (bad redirects, malformed bodies).
    pub fn is_protocol(&self) -> bool {
        matches!(
            self,
            Self::UnexpectedRedirect { .. }
                | Self::Deserialization { .. }
                | Self::InvalidUrl(_)
                | Self::InvalidTag(_)
        )
    }

    /// Returns `true` if the batch endpoint itself is missing or refused the
    /// request, so a sequential fallback may still succeed.
    pub fn is_batch_unavailable(&self) -> bool {
        match self {
            Self::Status { status, .. } => matches!(status, 404 | 405 | 500 | 501),
            Self::BatchRejected { .. } | Self::Deserialization { .. } => true,
            _ => false,
        }
    }
}
