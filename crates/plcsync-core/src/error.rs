// ── Core error types ──
//
// `CoreError` is what callers of the engine see when an operation cannot
// even be attempted (unknown target, pass already running, bad config) or
// when a direct controller operation fails. `SyncFault` is the per-pass
// error record: sync passes never propagate errors, they finish `Failed`
// with a list of faults that is persisted in the target's status.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Unified error type for the core crate.
#[derive(Debug, Error)]
pub enum CoreError {
    // ── Controller errors ────────────────────────────────────────────
    #[error("Cannot reach controller: {reason}")]
    ConnectionFailed { reason: String },

    #[error("Authentication failed: {message}")]
    AuthenticationFailed { message: String },

    #[error("Controller request timed out")]
    Timeout,

    #[error("Protocol error: {message}")]
    Protocol { message: String },

    #[error("Controller error (HTTP {status}): {message}")]
    Api { message: String, status: u16 },

    #[error("Write rejected by controller: {message}")]
    Rejected { message: String },

    // ── Target errors ────────────────────────────────────────────────
    #[error("Unknown sync target: {key}")]
    TargetNotFound { key: String },

    #[error("A sync pass is already running for {target}")]
    SyncInProgress { target: String },

    // ── Collaborator errors ──────────────────────────────────────────
    #[error("Calendar unavailable: {message}")]
    Calendar { message: String },

    #[error("Status persistence failed: {message}")]
    Persistence { message: String },

    // ── Configuration errors ─────────────────────────────────────────
    #[error("Configuration error: {message}")]
    Config { message: String },
}

// ── Conversion from transport-layer errors ───────────────────────────

impl From<plcsync_api::Error> for CoreError {
    fn from(err: plcsync_api::Error) -> Self {
        use plcsync_api::Error as Api;

        match err {
            Api::Authentication { status } => CoreError::AuthenticationFailed {
                message: format!("gateway refused credentials (HTTP {status})"),
            },
            Api::Transport(ref e) if e.is_timeout() => CoreError::Timeout,
            Api::Transport(e) => CoreError::ConnectionFailed {
                reason: e.to_string(),
            },
            Api::Tls(reason) => CoreError::ConnectionFailed {
                reason: format!("TLS error: {reason}"),
            },
            Api::InvalidUrl(e) => CoreError::Config {
                message: format!("Invalid URL: {e}"),
            },
            Api::InvalidTag(tag) => CoreError::Config {
                message: format!("Invalid tag address: {tag}"),
            },
            Api::UnexpectedRedirect { location } => CoreError::Protocol {
                message: format!("unexpected redirect to {location}"),
            },
            Api::Deserialization { message, body: _ } => CoreError::Protocol { message },
            Api::Status { status, body } => CoreError::Api {
                message: body,
                status,
            },
            Api::Rejected { address } => CoreError::Rejected {
                message: format!("write to {address} not applied"),
            },
            Api::BatchRejected { message } => CoreError::Rejected { message },
        }
    }
}

// ── Per-pass fault records ───────────────────────────────────────────

/// One failure recorded during a sync pass.
///
/// `Auth`, `Connectivity` and `Protocol` end the pass where they occur;
/// `WriteRejected` and `VerifyMismatch` are collected and reported together.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Error)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SyncFault {
    #[error("authentication failed: {message}")]
    Auth { message: String },

    #[error("controller unreachable: {message}")]
    Connectivity { message: String },

    #[error("protocol error: {message}")]
    Protocol { message: String },

    #[error("calendar unavailable: {message}")]
    Calendar { message: String },

    #[error("write rejected{}: {reason}", at(.address.as_deref()))]
    WriteRejected {
        address: Option<String>,
        reason: String,
    },

    #[error("verify mismatch at {address}: expected {expected}, read {actual}")]
    VerifyMismatch {
        address: String,
        expected: i64,
        actual: i64,
    },
}

fn at(address: Option<&str>) -> String {
    address.map(|a| format!(" at {a}")).unwrap_or_default()
}

impl SyncFault {
    /// Returns `true` for faults that stop a pass before verification.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::Auth { .. }
                | Self::Connectivity { .. }
                | Self::Protocol { .. }
                | Self::Calendar { .. }
        )
    }
}

impl From<&plcsync_api::Error> for SyncFault {
    fn from(err: &plcsync_api::Error) -> Self {
        let message = err.to_string();
        if err.is_auth() {
            Self::Auth { message }
        } else if matches!(
            err,
            plcsync_api::Error::Transport(_) | plcsync_api::Error::Tls(_)
        ) {
            Self::Connectivity { message }
        } else if err.is_protocol() {
            Self::Protocol { message }
        } else if let plcsync_api::Error::Status { status, .. } = err {
            if *status >= 500 {
                Self::Connectivity { message }
            } else {
                Self::Protocol { message }
            }
        } else {
            Self::WriteRejected {
                address: None,
                reason: message,
            }
        }
    }
}

impl From<CoreError> for SyncFault {
    fn from(err: CoreError) -> Self {
        let message = err.to_string();
        match err {
            CoreError::AuthenticationFailed { .. } => Self::Auth { message },
            CoreError::ConnectionFailed { .. } | CoreError::Timeout => {
                Self::Connectivity { message }
            }
            CoreError::Calendar { .. } => Self::Calendar { message },
            CoreError::Rejected { .. } | CoreError::Api { .. } => Self::WriteRejected {
                address: None,
                reason: message,
            },
            _ => Self::Protocol { message },
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn faults_serialize_with_kind_tag() {
        let fault = SyncFault::VerifyMismatch {
            address: "N60:2".into(),
            expected: 14,
            actual: 0,
        };
        let json = serde_json::to_value(&fault).unwrap();
        assert_eq!(json["kind"], "verify_mismatch");
        assert_eq!(json["address"], "N60:2");
    }

    #[test]
    fn auth_errors_become_auth_faults() {
        let err = plcsync_api::Error::Authentication { status: 401 };
        let fault = SyncFault::from(&err);
        assert!(matches!(fault, SyncFault::Auth { .. }));
        assert!(fault.is_fatal());
    }

    #[test]
    fn gateway_server_errors_are_connectivity_faults() {
        let err = plcsync_api::Error::Status {
            status: 503,
            body: "driver fault".into(),
        };
        let fault = SyncFault::from(&err);
        assert!(matches!(fault, SyncFault::Connectivity { .. }));
        assert!(fault.is_fatal());
    }

    #[test]
    fn gateway_client_errors_are_protocol_faults() {
        let err = plcsync_api::Error::Status {
            status: 400,
            body: "bad tag list".into(),
        };
        assert!(matches!(SyncFault::from(&err), SyncFault::Protocol { .. }));
    }

    #[test]
    fn register_rejections_stay_write_rejections() {
        let err = plcsync_api::Error::BatchRejected {
            message: "tag locked".into(),
        };
        let fault = SyncFault::from(&err);
        assert!(matches!(fault, SyncFault::WriteRejected { address: None, .. }));
        assert!(!fault.is_fatal());
    }

    #[test]
    fn write_rejection_display_names_address() {
        let fault = SyncFault::WriteRejected {
            address: Some("N91:0".into()),
            reason: "tag locked".into(),
        };
        assert_eq!(fault.to_string(), "write rejected at N91:0: tag locked");
    }
}
