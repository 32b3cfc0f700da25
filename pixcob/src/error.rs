//! Error taxonomy for PSP charge operations.
//!
//! Every error mapped from an HTTP response keeps the raw response body so
//! operators can diagnose rejections without re-issuing the call. The
//! [`ErrorClass`] split exists so the orchestration layer can make its
//! retry decision without matching on individual variants: only a txid
//! conflict is retryable (with a freshly generated identifier), everything
//! else is fatal for the current call.

/// Errors produced by PSP charge operations.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum PspError {
    /// The TLS client identity is missing, corrupt, or the passphrase is
    /// wrong. Fatal and non-retryable.
    #[error("client certificate error: {0}")]
    Certificate(String),

    /// Token acquisition failed, or the PSP rejected the bearer token.
    #[error("PSP authentication failed: {reason}")]
    Auth {
        /// What went wrong while authenticating.
        reason: String,
        /// Raw response body, when the failure came from an HTTP response.
        body: Option<String>,
    },

    /// The request shape was rejected, either locally before the network
    /// call or by the PSP with a 400.
    #[error("invalid charge request: {detail}")]
    Validation {
        /// What was wrong with the request.
        detail: String,
        /// Raw PSP response body, when rejected remotely.
        body: Option<String>,
    },

    /// The txid already keys another charge at the PSP (HTTP 409).
    #[error("txid already exists at the PSP")]
    Conflict {
        /// Raw PSP response body.
        body: String,
    },

    /// No charge exists under the given txid (HTTP 404).
    #[error("charge not found at the PSP")]
    NotFound {
        /// Raw PSP response body.
        body: String,
    },

    /// The PSP throttled the call (HTTP 429). Surfaced for the caller's
    /// own backoff policy, never retried internally.
    #[error("PSP rate limit exceeded")]
    RateLimit {
        /// Raw PSP response body.
        body: String,
    },

    /// The PSP reported a server-side failure (HTTP 5xx).
    #[error("PSP unavailable (status {status})")]
    ServiceUnavailable {
        /// HTTP status code.
        status: u16,
        /// Raw PSP response body.
        body: String,
    },

    /// Fallback for any other unexpected PSP response.
    #[error("unexpected PSP response (status {status})")]
    Protocol {
        /// HTTP status code.
        status: u16,
        /// Raw PSP response body.
        body: String,
    },

    /// The request never produced an HTTP response (DNS, TLS handshake,
    /// timeout, connection reset).
    #[error("PSP transport error: {0}")]
    Transport(String),
}

/// Retry classification for a [`PspError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// A txid collision: retry once with a newly generated identifier.
    RetryableConflict,
    /// Fatal for the current call; propagate to the caller.
    Fatal,
}

impl PspError {
    /// Builds a local validation error (no PSP response involved).
    #[must_use]
    pub fn validation(detail: impl Into<String>) -> Self {
        Self::Validation {
            detail: detail.into(),
            body: None,
        }
    }

    /// Maps an HTTP status and response body to the error taxonomy.
    ///
    /// `401` maps to [`PspError::Auth`]; the transport layer is responsible
    /// for invalidating its cached token when it sees that variant.
    #[must_use]
    pub fn from_status(status: u16, body: String) -> Self {
        match status {
            400 => Self::Validation {
                detail: "request rejected by PSP".to_owned(),
                body: Some(body),
            },
            401 => Self::Auth {
                reason: "PSP rejected the access token".to_owned(),
                body: Some(body),
            },
            404 => Self::NotFound { body },
            409 => Self::Conflict { body },
            429 => Self::RateLimit { body },
            500..=599 => Self::ServiceUnavailable { status, body },
            _ => Self::Protocol { status, body },
        }
    }

    /// Retry classification used by the orchestration layer.
    #[must_use]
    pub fn class(&self) -> ErrorClass {
        match self {
            Self::Conflict { .. } => ErrorClass::RetryableConflict,
            _ => ErrorClass::Fatal,
        }
    }

    /// The raw PSP response body attached to this error, if any.
    #[must_use]
    pub fn body(&self) -> Option<&str> {
        match self {
            Self::Auth { body, .. } | Self::Validation { body, .. } => body.as_deref(),
            Self::Conflict { body }
            | Self::NotFound { body }
            | Self::RateLimit { body }
            | Self::ServiceUnavailable { body, .. }
            | Self::Protocol { body, .. } => Some(body),
            Self::Certificate(_) | Self::Transport(_) => None,
        }
    }
}
