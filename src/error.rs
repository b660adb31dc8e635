//! Error types for the lead-flow orchestration core.

use uuid::Uuid;

/// Top-level error type for the orchestration core.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Send error: {0}")]
    Send(#[from] SendError),

    #[error("State error: {0}")]
    State(#[from] StateError),

    #[error("CRM error: {0}")]
    Crm(#[from] CrmError),

    #[error("Lead sync error: {0}")]
    Sync(#[from] SyncError),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required configuration: {key}. {hint}")]
    MissingRequired { key: String, hint: String },

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    #[error("No channel route registered for id {0}")]
    UnknownChannel(String),

    #[error("No channel could be resolved for contact {contact_id}")]
    NoChannelResolved { contact_id: String },
}

/// Outbound send errors, surfaced to the ingress caller.
#[derive(Debug, thiserror::Error)]
pub enum SendError {
    /// Provider 5xx/timeout. The state machine does not advance; the
    /// user's next message or a follow-up reminder recovers the flow.
    #[error("Transient send failure on channel {channel}: {reason}")]
    Transient { channel: String, reason: String },

    #[error("Send rejected by provider on channel {channel}: {reason}")]
    Rejected { channel: String, reason: String },

    #[error("Channel {channel} credentials invalid")]
    BadCredentials { channel: String },
}

impl SendError {
    /// Whether retrying the same send later could succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient { .. })
    }
}

/// Conversation state store errors.
#[derive(Debug, thiserror::Error)]
pub enum StateError {
    #[error("State backend unavailable: {0}")]
    Backend(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// External CRM client errors.
#[derive(Debug, thiserror::Error)]
pub enum CrmError {
    /// 401 / invalid token. The sync service refreshes the access token
    /// exactly once and retries the same payload once.
    #[error("CRM access token expired")]
    AuthExpired,

    #[error("CRM token refresh failed: {0}")]
    RefreshFailed(String),

    #[error("CRM request failed: {reason}")]
    RequestFailed { reason: String },

    #[error("CRM rejected lead payload: {reason}")]
    InvalidPayload { reason: String },
}

/// Lead sync errors. Terminal for one sync attempt; never allowed to
/// corrupt or block the user-facing conversation path.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error("Lead sync failed for {record_id}: {reason}")]
    Failed { record_id: Uuid, reason: String },

    #[error("Lead store error: {0}")]
    Store(String),

    #[error("Contact {contact_id} has no usable phone number")]
    NoPhone { contact_id: String },
}

/// Result type alias for the orchestration core.
pub type Result<T> = std::result::Result<T, Error>;
