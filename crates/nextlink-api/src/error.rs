use thiserror::Error;

/// Top-level error type for the `nextlink-api` crate.
///
/// Covers every failure mode of the wire layer: builder argument guards,
/// reply decoding, server-side rejection, and transport.
/// `nextlink-core` maps these into account- and session-level errors.
#[derive(Debug, Error)]
pub enum Error {
    // ── Arguments ───────────────────────────────────────────────────
    /// A required builder input was empty. Programmer error: no request is built.
    #[error("Missing required argument: {field}")]
    InvalidArgument { field: &'static str },

    // ── Decoding ────────────────────────────────────────────────────
    /// The reply was not well-formed XML.
    #[error("XML decode error: {message}")]
    Xml { message: String },

    /// The reply was not valid JSON, or lacked the expected envelope.
    #[error("Malformed response: {message}")]
    MalformedResponse { message: String },

    // ── Server ──────────────────────────────────────────────────────
    /// OCS `statuscode` other than 200, or a non-2xx HTTP status.
    #[error("Server rejected request ({code}): {message}")]
    ServerRejected { code: i64, message: String },

    // ── Transfer ────────────────────────────────────────────────────
    /// No progress was observed within the stall window.
    #[error("Transfer timed out after {timeout_secs}s without progress")]
    Timeout { timeout_secs: u64 },

    /// The caller aborted the transfer.
    #[error("Transfer aborted")]
    Aborted,

    // ── Transport ───────────────────────────────────────────────────
    /// HTTP transport error (connection refused, DNS failure, etc.)
    #[error("HTTP transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// URL parsing error.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// TLS setup error while building an HTTP client.
    #[error("TLS error: {0}")]
    Tls(String),
}

impl Error {
    /// Returns `true` for reply-decoding failures (XML or JSON).
    pub fn is_decode(&self) -> bool {
        matches!(self, Self::Xml { .. } | Self::MalformedResponse { .. })
    }

    /// Returns `true` if the server answered HTTP 401.
    ///
    /// Callers use this to flag the account's stored credentials as stale.
    pub fn is_unauthorized(&self) -> bool {
        match self {
            Self::ServerRejected { code, .. } => *code == 401,
            Self::Transport(e) => e.status() == Some(reqwest::StatusCode::UNAUTHORIZED),
            _ => false,
        }
    }

    /// Returns `true` if this is a transient error worth retrying.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Transport(e) => e.is_timeout() || e.is_connect(),
            Self::Timeout { .. } => true,
            _ => false,
        }
    }

    pub(crate) fn xml(err: impl std::fmt::Display) -> Self {
        Self::Xml {
            message: err.to_string(),
        }
    }

    pub(crate) fn malformed(err: impl std::fmt::Display) -> Self {
        Self::MalformedResponse {
            message: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unauthorized_only_for_401() {
        let rejected = Error::ServerRejected {
            code: 401,
            message: "Unauthorized".into(),
        };
        assert!(rejected.is_unauthorized());

        let forbidden = Error::ServerRejected {
            code: 403,
            message: "Forbidden".into(),
        };
        assert!(!forbidden.is_unauthorized());
        assert!(!Error::Aborted.is_unauthorized());
    }

    #[test]
    fn decode_classification() {
        assert!(Error::xml("unexpected eof").is_decode());
        assert!(Error::malformed("expected value").is_decode());
        assert!(!Error::InvalidArgument { field: "path" }.is_decode());
    }
}
