//! CLI error types with miette diagnostics.
//!
//! Maps `CoreError` and `ConfigError` variants into user-facing errors with
//! actionable help text.

use miette::Diagnostic;
use thiserror::Error;

use nextlink_config::ConfigError;
use nextlink_core::CoreError;

/// Process exit codes.
pub mod exit_code {
    pub const SUCCESS: i32 = 0;
    pub const GENERAL: i32 = 1;
    pub const USAGE: i32 = 2;
    pub const AUTH: i32 = 3;
    pub const NOT_FOUND: i32 = 4;
    pub const PERMISSION: i32 = 5;
    pub const CONFLICT: i32 = 6;
    pub const CONNECTION: i32 = 7;
    pub const TIMEOUT: i32 = 8;
}

#[derive(Debug, Error, Diagnostic)]
pub enum CliError {
    // ── Connection ───────────────────────────────────────────────────
    #[error("Could not connect to {url}")]
    #[diagnostic(
        code(nextlink::connection_failed),
        help(
            "Check that the server is running and reachable.\n\
             Reason: {reason}"
        )
    )]
    ConnectionFailed { url: String, reason: String },

    // ── Authentication ───────────────────────────────────────────────
    #[error("Authentication failed for account {account_id}")]
    #[diagnostic(
        code(nextlink::auth_failed),
        help(
            "The server rejected the stored credentials; the account is now\n\
             flagged as needing new credentials. Update the password or token\n\
             for account {account_id} in the config file or keyring."
        )
    )]
    AuthFailed { account_id: u32 },

    #[error("No usable credentials for account {account_id}")]
    #[diagnostic(
        code(nextlink::no_credentials),
        help(
            "Set `password`, `password_env`, `token` or `token_env` for the account,\n\
             or store a secret in the system keyring under service \"nextlink\".\n\
             Run: nextlink accounts"
        )
    )]
    NoCredentials { account_id: u32 },

    #[error("No signed-in account available")]
    #[diagnostic(
        code(nextlink::no_account),
        help("{reason}\nRun: nextlink accounts")
    )]
    NoAccount { reason: String },

    // ── Server ───────────────────────────────────────────────────────
    #[error("'{path}' not found")]
    #[diagnostic(
        code(nextlink::not_found),
        help("Run: nextlink ls to see available entries")
    )]
    NotFound { path: String },

    #[error("Permission denied ({status})")]
    #[diagnostic(code(nextlink::permission))]
    Permission { status: u16 },

    #[error("'{path}' already exists")]
    #[diagnostic(code(nextlink::conflict))]
    Conflict { path: String },

    #[error("Request rejected by server ({status}): {message}")]
    #[diagnostic(code(nextlink::rejected))]
    Rejected { status: u16, message: String },

    // ── Transfers ────────────────────────────────────────────────────
    #[error("Transfer stalled: no progress for {seconds}s")]
    #[diagnostic(
        code(nextlink::timeout),
        help("Raise `defaults.stall_timeout` or check server responsiveness.")
    )]
    Timeout { seconds: u64 },

    #[error("Transfer aborted")]
    #[diagnostic(code(nextlink::aborted))]
    Aborted,

    // ── Validation ───────────────────────────────────────────────────
    #[error("Invalid value for {field}: {reason}")]
    #[diagnostic(code(nextlink::validation))]
    Validation { field: String, reason: String },

    // ── Configuration ────────────────────────────────────────────────
    #[error("Account {id} not found in configuration")]
    #[diagnostic(
        code(nextlink::unknown_account),
        help("Configured accounts: {available}")
    )]
    UnknownAccount { id: u32, available: String },

    #[error(transparent)]
    #[diagnostic(
        code(nextlink::config),
        help("Check the config file. Run: nextlink config path")
    )]
    Config(Box<ConfigError>),

    // ── Internal ─────────────────────────────────────────────────────
    #[error("{0}")]
    #[diagnostic(code(nextlink::internal))]
    Internal(String),

    // ── IO / Serialization ───────────────────────────────────────────
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl CliError {
    /// Map this error to an exit code for process termination.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::ConnectionFailed { .. } => exit_code::CONNECTION,
            Self::AuthFailed { .. } | Self::NoCredentials { .. } | Self::NoAccount { .. } => {
                exit_code::AUTH
            }
            Self::NotFound { .. } | Self::UnknownAccount { .. } => exit_code::NOT_FOUND,
            Self::Permission { .. } => exit_code::PERMISSION,
            Self::Conflict { .. } => exit_code::CONFLICT,
            Self::Timeout { .. } => exit_code::TIMEOUT,
            Self::Validation { .. } => exit_code::USAGE,
            _ => exit_code::GENERAL,
        }
    }

    /// Attach the account and path a core error was raised for.
    pub fn from_core(err: CoreError, account_id: u32, path: &str) -> Self {
        match err {
            CoreError::Rejected { status: 401, .. } => Self::AuthFailed { account_id },
            CoreError::Rejected { status: 403, .. } => Self::Permission { status: 403 },
            CoreError::Rejected { status: 404, .. } => Self::NotFound {
                path: path.to_owned(),
            },
            CoreError::Rejected { status: 405, .. } => Self::Conflict {
                path: path.to_owned(),
            },
            other => other.into(),
        }
    }
}

// ── CoreError → CliError mapping ─────────────────────────────────────

impl From<CoreError> for CliError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::InvalidArgument { field } => CliError::Validation {
                field: field.into(),
                reason: "must not be empty".into(),
            },
            CoreError::Decode { message } | CoreError::Internal(message) => {
                CliError::Internal(message)
            }
            CoreError::Rejected { status, message } => CliError::Rejected { status, message },
            CoreError::ConnectionFailed { url, reason } => {
                CliError::ConnectionFailed { url, reason }
            }
            CoreError::AuthResolution { account_id, .. }
            | CoreError::NoCredentials { account_id } => CliError::NoCredentials { account_id },
            CoreError::TransferTimeout { timeout_secs } => CliError::Timeout {
                seconds: timeout_secs,
            },
            CoreError::Aborted => CliError::Aborted,
            CoreError::Config { message } => CliError::Validation {
                field: "config".into(),
                reason: message,
            },
        }
    }
}

impl From<ConfigError> for CliError {
    fn from(err: ConfigError) -> Self {
        match err {
            ConfigError::Validation { field, reason } => CliError::Validation { field, reason },
            ConfigError::NoCredentials { id } => CliError::NoCredentials { account_id: id },
            ConfigError::Io(e) => CliError::Io(e),
            other => CliError::Config(Box::new(other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unauthorized_maps_to_auth_exit_code() {
        let err = CliError::from_core(
            CoreError::Rejected {
                status: 401,
                message: "Unauthorized".into(),
            },
            2,
            "/",
        );
        assert!(matches!(err, CliError::AuthFailed { account_id: 2 }));
        assert_eq!(err.exit_code(), exit_code::AUTH);
    }

    #[test]
    fn missing_path_maps_to_not_found() {
        let err = CliError::from_core(
            CoreError::Rejected {
                status: 404,
                message: "Not Found".into(),
            },
            1,
            "/missing",
        );
        assert_eq!(err.exit_code(), exit_code::NOT_FOUND);
        assert_eq!(err.to_string(), "'/missing' not found");
    }

    #[test]
    fn stall_maps_to_timeout_exit_code() {
        let err = CliError::from(CoreError::TransferTimeout { timeout_secs: 60 });
        assert_eq!(err.exit_code(), exit_code::TIMEOUT);
    }

    #[test]
    fn other_statuses_stay_general() {
        let err = CliError::from(CoreError::Rejected {
            status: 500,
            message: "Internal Server Error".into(),
        });
        assert_eq!(err.exit_code(), exit_code::GENERAL);
    }
}
