//! Error types for the transaction orchestration layer
//!
//! The taxonomy distinguishes failures that are recovered locally via an
//! availability-preserving fallback (token-program detection, source account
//! substitution) from signing/broadcast failures, which always surface
//! because money movement is involved.

use thiserror::Error;

/// Error type covering the full place-action lifecycle: provider discovery,
/// config load, account resolution, plan assembly, signing and broadcast.
#[derive(Error, Debug)]
pub enum ClientError {
    /// No injected wallet object detected at all
    #[error("No wallet provider detected")]
    ProviderMissing,

    /// More than one provider is available and none is already connected;
    /// the caller must surface a selection to the user instead of guessing
    #[error("Multiple wallet providers available: {0:?}")]
    ProviderChoiceRequired(Vec<String>),

    /// The user declined the authorization prompt. Returns the app to the
    /// disconnected state; not an alarm-level error.
    #[error("Wallet connection rejected by user")]
    ConnectRejected,

    /// Backend config fetch failed; blocks all transacting actions until a
    /// later attempt succeeds (retried lazily, not via background loop)
    #[error("Backend config unavailable: {0}")]
    ConfigUnavailable(String),

    /// Local configuration file invalid or unreadable
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Token account resolution failed in a way no fallback could absorb
    #[error("Account resolution failed: {0}")]
    AccountResolution(String),

    /// The active provider exposes none of the recognized signing APIs
    #[error("Wallet provider exposes no supported send method")]
    NoSendMethod,

    /// The chosen send path rejected: signing refused, malformed signed
    /// artifact, or the RPC node rejected the broadcast
    #[error("Transaction submission failed: {0}")]
    SubmissionFailed(String),

    /// Backend API request failed
    #[error("API error ({endpoint}): {reason}")]
    Api {
        /// The endpoint path that failed
        endpoint: String,
        /// Underlying failure description
        reason: String,
    },

    /// Direct RPC read/write failure
    #[error("RPC error: {0}")]
    Rpc(String),

    /// Wrapped error from external crates
    #[error("External error: {0}")]
    External(#[from] anyhow::Error),
}

impl ClientError {
    /// Whether retrying the same operation might succeed.
    ///
    /// Signing-layer rejections are never retryable: a declined signature or
    /// a malformed artifact will not fix itself, and re-broadcasting a money
    /// movement without the user re-confirming is not acceptable.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::ConfigUnavailable(_) => true,
            Self::Api { .. } => true,
            Self::Rpc(_) => true,
            Self::AccountResolution(_) => true,

            Self::ProviderMissing => false,
            Self::ProviderChoiceRequired(_) => false,
            Self::ConnectRejected => false,
            Self::Configuration(_) => false,
            Self::NoSendMethod => false,
            Self::SubmissionFailed(_) => false,
            Self::External(_) => false,
        }
    }

    /// Error category for logging and diagnostics
    pub fn category(&self) -> &'static str {
        match self {
            Self::ProviderMissing => "provider",
            Self::ProviderChoiceRequired(_) => "provider",
            Self::ConnectRejected => "connect",
            Self::ConfigUnavailable(_) => "config",
            Self::Configuration(_) => "config",
            Self::AccountResolution(_) => "resolution",
            Self::NoSendMethod => "send",
            Self::SubmissionFailed(_) => "send",
            Self::Api { .. } => "api",
            Self::Rpc(_) => "rpc",
            Self::External(_) => "external",
        }
    }

    /// Create an API error for a specific endpoint
    pub fn api(endpoint: impl Into<String>, reason: impl std::fmt::Display) -> Self {
        Self::Api {
            endpoint: endpoint.into(),
            reason: reason.to_string(),
        }
    }

    /// Create a submission failure with a provider-supplied message
    pub fn submission(reason: impl Into<String>) -> Self {
        Self::SubmissionFailed(reason.into())
    }
}

/// Convenience alias used throughout the crate
pub type Result<T> = std::result::Result<T, ClientError>;
