//! Error taxonomy shared by the vault, gateway, limiter, pipeline and sync orchestrator

use thiserror::Error;

use crate::models::{LimitedResource, PlanTier};

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    /// The channel has no stored credentials
    #[error("Channel is not connected")]
    NotConnected,

    /// The granted OAuth scopes do not cover the requested operation
    #[error("Insufficient permissions granted, reconnect the channel")]
    ScopeInsufficient,

    /// Refresh exchange failed or the token was revoked; the user must reconnect
    #[error("Token refresh failed, reconnect required: {0}")]
    TokenRefreshFailed(String),

    #[error("Remote resource not found: {0}")]
    RemoteNotFound(String),

    /// Rate limited or remote server error. The caller may retry with backoff.
    #[error("Remote service temporarily unavailable: {0}")]
    RemoteTransient(String),

    #[error("Remote error{}: {message}", .status.map(|s| format!(" ({})", s)).unwrap_or_default())]
    RemoteError { status: Option<u16>, message: String },

    #[error("Plan limit reached: {limit} {resource} allowed on the {tier} plan")]
    LimitReached {
        resource: LimitedResource,
        limit: u32,
        tier: PlanTier,
    },

    #[error("Channel {0} is already syncing")]
    AlreadySyncing(i64),

    #[error("Invalid input: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Access denied")]
    AccessDenied,

    /// Stored ciphertext could not be decrypted or the vault secret is unusable.
    /// Always a configuration problem, never recoverable by retrying.
    #[error("Credential encryption error: {0}")]
    Crypto(String),

    #[error("Database error: {0}")]
    Storage(String),

    #[error("Job queue unavailable: {0}")]
    QueueUnavailable(String),
}

impl Error {
    /// Stable identifier used in usage-log outcomes and API error bodies
    pub fn kind(&self) -> &'static str {
        match self {
            Error::NotConnected => "not_connected",
            Error::ScopeInsufficient => "scope_insufficient",
            Error::TokenRefreshFailed(_) => "token_refresh_failed",
            Error::RemoteNotFound(_) => "remote_not_found",
            Error::RemoteTransient(_) => "remote_transient",
            Error::RemoteError { .. } => "remote_error",
            Error::LimitReached { .. } => "limit_reached",
            Error::AlreadySyncing(_) => "already_syncing",
            Error::Validation(_) => "validation_error",
            Error::NotFound(_) => "not_found",
            Error::AccessDenied => "access_denied",
            Error::Crypto(_) => "crypto_error",
            Error::Storage(_) => "storage_error",
            Error::QueueUnavailable(_) => "queue_unavailable",
        }
    }

    /// Only transient remote failures may be retried, and only by the caller
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::RemoteTransient(_))
    }

    /// Whether the user must reconnect the channel before anything else can succeed
    pub fn requires_reconnect(&self) -> bool {
        matches!(
            self,
            Error::NotConnected | Error::ScopeInsufficient | Error::TokenRefreshFailed(_)
        )
    }
}

impl From<rusqlite::Error> for Error {
    fn from(e: rusqlite::Error) -> Self {
        Error::Storage(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_transient_is_retryable() {
        assert!(Error::RemoteTransient("503".into()).is_retryable());
        assert!(!Error::RemoteNotFound("video".into()).is_retryable());
        assert!(!Error::AlreadySyncing(1).is_retryable());
        assert!(
            !Error::LimitReached {
                resource: LimitedResource::Videos,
                limit: 25,
                tier: PlanTier::Free,
            }
            .is_retryable()
        );
    }

    #[test]
    fn test_reconnect_errors() {
        assert!(Error::ScopeInsufficient.requires_reconnect());
        assert!(Error::TokenRefreshFailed("invalid_grant".into()).requires_reconnect());
        assert!(!Error::RemoteTransient("429".into()).requires_reconnect());
    }

    #[test]
    fn test_display_messages() {
        let err = Error::LimitReached {
            resource: LimitedResource::Channels,
            limit: 1,
            tier: PlanTier::Free,
        };
        assert_eq!(err.to_string(), "Plan limit reached: 1 channels allowed on the free plan");

        let err = Error::RemoteError {
            status: Some(400),
            message: "Bad request".into(),
        };
        assert_eq!(err.to_string(), "Remote error (400): Bad request");
        assert_eq!(err.kind(), "remote_error");
    }
}
