//! CLI error types with miette diagnostics.
//!
//! Maps core, config, and sync failures into user-facing errors with
//! actionable help text and stable exit codes.

use miette::Diagnostic;
use thiserror::Error;

use plcsync_config::ConfigError;
use plcsync_core::{CoreError, SyncFault};

/// Process exit codes.
pub mod exit_code {
    pub const GENERAL: i32 = 1;
    pub const USAGE: i32 = 2;
    pub const AUTH: i32 = 3;
    pub const NOT_FOUND: i32 = 4;
    pub const CONFLICT: i32 = 6;
    pub const CONNECTION: i32 = 7;
    pub const TIMEOUT: i32 = 8;
    pub const SYNC_FAILED: i32 = 9;
}

#[derive(Debug, Error, Diagnostic)]
pub enum CliError {
    // ── Connection ───────────────────────────────────────────────────

    #[error("Could not reach the controller for '{target}'")]
    #[diagnostic(
        code(plcsync::connection_failed),
        help(
            "Check the gateway URL and that the PLC is online.\n\
             Reason: {reason}\n\
             Try: plcsync probe {target}"
        )
    )]
    ConnectionFailed { target: String, reason: String },

    #[error("Request to the controller gateway timed out")]
    #[diagnostic(
        code(plcsync::timeout),
        help("Raise `timeout` in the config or check gateway responsiveness.")
    )]
    Timeout,

    // ── Authentication ───────────────────────────────────────────────

    #[error("The gateway rejected the credentials for '{target}'")]
    #[diagnostic(
        code(plcsync::auth_failed),
        help(
            "Verify the username and password.\n\
             Passwords are read from `password_env`, the keyring entry\n\
             plcsync/{target}/password, or the config file, in that order."
        )
    )]
    AuthFailed { target: String },

    #[error("No credentials configured for target '{target}'")]
    #[diagnostic(
        code(plcsync::no_credentials),
        help(
            "Set `username` and `password_env` under [defaults] or [targets.{target}],\n\
             or store the password in the system keyring as plcsync/{target}/password."
        )
    )]
    NoCredentials { target: String },

    // ── Targets ──────────────────────────────────────────────────────

    #[error("Target '{key}' not found")]
    #[diagnostic(
        code(plcsync::not_found),
        help("Run: plcsync targets to see configured targets")
    )]
    TargetNotFound { key: String },

    #[error("A sync pass is already running for '{target}'")]
    #[diagnostic(
        code(plcsync::conflict),
        help("Wait for it to finish, then check: plcsync status {target}")
    )]
    SyncInProgress { target: String },

    // ── Sync ─────────────────────────────────────────────────────────

    #[error("Sync of '{target}' failed with {count} error(s): {first}")]
    #[diagnostic(
        code(plcsync::sync_failed),
        help("Run: plcsync read {target} to inspect the controller registers")
    )]
    SyncFailed {
        target: String,
        count: usize,
        first: String,
    },

    #[error("Controller error: {message}")]
    #[diagnostic(code(plcsync::controller))]
    Controller { message: String },

    #[error("Calendar unavailable: {message}")]
    #[diagnostic(
        code(plcsync::calendar),
        help("Check `calendar_file` in the config; it must hold a JSON array of entries.")
    )]
    Calendar { message: String },

    #[error("Could not persist status: {message}")]
    #[diagnostic(code(plcsync::persistence), help("Check that `data_dir` is writable."))]
    Persistence { message: String },

    // ── Validation / configuration ───────────────────────────────────

    #[error("Invalid value for {field}: {reason}")]
    #[diagnostic(code(plcsync::validation))]
    Validation { field: String, reason: String },

    #[error("Configuration error: {message}")]
    #[diagnostic(
        code(plcsync::config),
        help("Inspect the effective configuration with: plcsync config show")
    )]
    Config { message: String },

    // ── Interactive ──────────────────────────────────────────────────

    #[error("Destructive operation '{action}' requires confirmation")]
    #[diagnostic(
        code(plcsync::confirmation_required),
        help("Use --yes (-y) to skip confirmation in non-interactive contexts.")
    )]
    NonInteractiveRequiresYes { action: String },

    // ── IO / Serialization ───────────────────────────────────────────

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("JSON serialization failed: {0}")]
    #[diagnostic(code(plcsync::json))]
    Json(#[from] serde_json::Error),

    #[error("YAML serialization failed: {0}")]
    #[diagnostic(code(plcsync::yaml))]
    Yaml(#[from] serde_yaml::Error),
}

impl CliError {
    /// Map this error to an exit code for process termination.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::ConnectionFailed { .. } => exit_code::CONNECTION,
            Self::Timeout => exit_code::TIMEOUT,
            Self::AuthFailed { .. } | Self::NoCredentials { .. } => exit_code::AUTH,
            Self::TargetNotFound { .. } => exit_code::NOT_FOUND,
            Self::SyncInProgress { .. } => exit_code::CONFLICT,
            Self::SyncFailed { .. } => exit_code::SYNC_FAILED,
            Self::Validation { .. } | Self::Config { .. } | Self::NonInteractiveRequiresYes { .. } => {
                exit_code::USAGE
            }
            _ => exit_code::GENERAL,
        }
    }

    /// Turn the faults of a failed pass into the most specific error.
    pub fn from_faults(target: &str, errors: &[SyncFault]) -> Self {
        match errors.first() {
            Some(SyncFault::Auth { .. }) => Self::AuthFailed {
                target: target.into(),
            },
            Some(SyncFault::Connectivity { message }) => Self::ConnectionFailed {
                target: target.into(),
                reason: message.clone(),
            },
            first => Self::SyncFailed {
                target: target.into(),
                count: errors.len(),
                first: first.map(ToString::to_string).unwrap_or_default(),
            },
        }
    }

    /// Attach a target to a core error raised while talking to it.
    pub fn for_target(target: &str, err: CoreError) -> Self {
        match err {
            CoreError::ConnectionFailed { reason } => Self::ConnectionFailed {
                target: target.into(),
                reason,
            },
            CoreError::AuthenticationFailed { .. } => Self::AuthFailed {
                target: target.into(),
            },
            other => other.into(),
        }
    }
}

// ── CoreError → CliError mapping ─────────────────────────────────────

impl From<CoreError> for CliError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::ConnectionFailed { reason } => CliError::ConnectionFailed {
                target: "(unknown)".into(),
                reason,
            },

            CoreError::AuthenticationFailed { message: _ } => CliError::AuthFailed {
                target: "(unknown)".into(),
            },

            CoreError::Timeout => CliError::Timeout,

            CoreError::Protocol { message }
            | CoreError::Rejected { message }
            | CoreError::Api { message, .. } => CliError::Controller { message },

            CoreError::TargetNotFound { key } => CliError::TargetNotFound { key },

            CoreError::SyncInProgress { target } => CliError::SyncInProgress { target },

            CoreError::Calendar { message } => CliError::Calendar { message },

            CoreError::Persistence { message } => CliError::Persistence { message },

            CoreError::Config { message } => CliError::Config { message },
        }
    }
}

// ── ConfigError → CliError mapping ───────────────────────────────────

impl From<ConfigError> for CliError {
    fn from(err: ConfigError) -> Self {
        match err {
            ConfigError::Validation { field, reason } => CliError::Validation { field, reason },
            ConfigError::NoCredentials { target } => CliError::NoCredentials { target },
            ConfigError::UnknownTarget { key } => CliError::TargetNotFound { key },
            ConfigError::Io(e) => CliError::Io(e),
            other => CliError::Config {
                message: other.to_string(),
            },
        }
    }
}
