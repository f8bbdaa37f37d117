// ── Core error types ──
//
// User-facing errors from nextlink-core. Decode failures never reach this
// layer from the recovering decoders; what remains is argument guards,
// server rejections, account resolution and transfer outcomes.
// The `From<nextlink_api::Error>` impl translates wire-layer errors.

use nextlink_api::transport::StatusCode;
use thiserror::Error;

/// Unified error type for the core crate.
#[derive(Debug, Error)]
pub enum CoreError {
    // ── Caller errors ────────────────────────────────────────────────
    #[error("Missing required argument: {field}")]
    InvalidArgument { field: &'static str },

    #[error("Could not decode server reply: {message}")]
    Decode { message: String },

    // ── Server errors ────────────────────────────────────────────────
    /// Non-2xx HTTP status or OCS statuscode other than 200.
    #[error("Request rejected by server ({status}): {message}")]
    Rejected { status: u16, message: String },

    #[error("Cannot connect to {url}: {reason}")]
    ConnectionFailed { url: String, reason: String },

    // ── Account errors ───────────────────────────────────────────────
    #[error("Sign-in failed for account {account_id}: {message}")]
    AuthResolution { account_id: u32, message: String },

    #[error("No usable credentials for account {account_id}")]
    NoCredentials { account_id: u32 },

    // ── Transfer errors ──────────────────────────────────────────────
    #[error("Transfer stalled: no progress for {timeout_secs}s")]
    TransferTimeout { timeout_secs: u64 },

    #[error("Transfer aborted")]
    Aborted,

    // ── Configuration errors ─────────────────────────────────────────
    #[error("Configuration error: {message}")]
    Config { message: String },

    // ── Internal errors ──────────────────────────────────────────────
    #[error("Internal error: {0}")]
    Internal(String),
}

impl CoreError {
    /// `true` after an HTTP 401: the account's stored credentials are stale.
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, Self::Rejected { status: 401, .. })
    }

    /// Build a rejection from a non-success HTTP status.
    pub fn rejected(status: StatusCode) -> Self {
        Self::Rejected {
            status: status.as_u16(),
            message: status.canonical_reason().unwrap_or("unknown status").to_owned(),
        }
    }
}

// ── Conversion from wire-layer errors ────────────────────────────────

impl From<nextlink_api::Error> for CoreError {
    fn from(err: nextlink_api::Error) -> Self {
        match err {
            nextlink_api::Error::InvalidArgument { field } => CoreError::InvalidArgument { field },
            nextlink_api::Error::Xml { message }
            | nextlink_api::Error::MalformedResponse { message } => CoreError::Decode { message },
            nextlink_api::Error::ServerRejected { code, message } => CoreError::Rejected {
                status: u16::try_from(code).unwrap_or(u16::MAX),
                message,
            },
            nextlink_api::Error::Timeout { timeout_secs } => {
                CoreError::TransferTimeout { timeout_secs }
            }
            nextlink_api::Error::Aborted => CoreError::Aborted,
            nextlink_api::Error::Transport(ref e) => {
                if let Some(status) = e.status() {
                    CoreError::rejected(status)
                } else {
                    CoreError::ConnectionFailed {
                        url: e
                            .url()
                            .map(|u| {
                                let mut u = u.clone();
                                let _ = u.set_password(None);
                                u.to_string()
                            })
                            .unwrap_or_else(|| "<unknown>".into()),
                        reason: e.to_string(),
                    }
                }
            }
            nextlink_api::Error::InvalidUrl(e) => CoreError::Config {
                message: format!("Invalid URL: {e}"),
            },
            nextlink_api::Error::Tls(msg) => CoreError::ConnectionFailed {
                url: String::new(),
                reason: format!("TLS error: {msg}"),
            },
        }
    }
}
