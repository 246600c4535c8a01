use std::fmt;

use crate::client::ClientError;
use crate::credential::ExchangeError;
use crate::store::StoreError;

/// Machine-readable error codes attached to every dropped event and failed
/// operator command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    ConfigParseError,
    ConfigMissingValue,
    Unauthenticated,
    TokenExchangeFailed,
    RemoteRejected,
    StaleMapping,
    CorruptedState,
    MalformedEvent,
    StoreFailure,
    TransportFailure,
    InternalUnexpected,
}

impl ErrorCode {
    /// Stable code identifier (`E####`) for machine parsing.
    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Self::ConfigParseError => "E1001",
            Self::ConfigMissingValue => "E1002",
            Self::Unauthenticated => "E2001",
            Self::TokenExchangeFailed => "E2002",
            Self::RemoteRejected => "E3001",
            Self::StaleMapping => "E3002",
            Self::CorruptedState => "E4001",
            Self::MalformedEvent => "E4002",
            Self::StoreFailure => "E5001",
            Self::TransportFailure => "E5002",
            Self::InternalUnexpected => "E9001",
        }
    }

    /// Short human-facing summary for logs and terminal output.
    #[must_use]
    pub const fn message(self) -> &'static str {
        match self {
            Self::ConfigParseError => "Config file parse error",
            Self::ConfigMissingValue => "Required config value missing",
            Self::Unauthenticated => "User has not authorized the bridge",
            Self::TokenExchangeFailed => "Refresh token exchange failed",
            Self::RemoteRejected => "Target API rejected the request",
            Self::StaleMapping => "Stored mapping points at a missing target task",
            Self::CorruptedState => "Required store entry missing",
            Self::MalformedEvent => "Webhook payload could not be decoded",
            Self::StoreFailure => "Key-value store failure",
            Self::TransportFailure => "Outbound request failed before a response",
            Self::InternalUnexpected => "Internal unexpected error",
        }
    }

    /// Optional remediation hint that can be surfaced to operators.
    #[must_use]
    pub const fn hint(self) -> Option<&'static str> {
        match self {
            Self::ConfigParseError => Some("Fix syntax in the taskbridge config.toml and retry."),
            Self::ConfigMissingValue => {
                Some("Set identity.client_id/client_secret or TASKBRIDGE_CLIENT_ID/SECRET.")
            }
            Self::Unauthenticated => {
                Some("Store a refresh token with `tbridge credentials set-refresh`.")
            }
            Self::TokenExchangeFailed => Some("Re-authorize the user; the refresh token may be revoked."),
            Self::RemoteRejected | Self::StaleMapping => None,
            Self::CorruptedState => Some("Store the user's list with `tbridge credentials set-list`."),
            Self::MalformedEvent => Some("Check the webhook sender is delivering task events."),
            Self::StoreFailure => Some("Check disk space and permissions on the store file."),
            Self::TransportFailure => Some("Check network reachability of the target API."),
            Self::InternalUnexpected => Some("Retry once. If persistent, report a bug with logs."),
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// Terminal failure for a single event. None of these cross the webhook
/// boundary as a non-200 response.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error(transparent)]
    Client(#[from] ClientError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Exchange(#[from] ExchangeError),

    #[error("corrupted state: {0}")]
    CorruptedState(String),

    #[error("malformed event: {0}")]
    MalformedEvent(String),
}

impl SyncError {
    /// Machine-readable code associated with this error.
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::Client(ClientError::Remote(_)) => ErrorCode::RemoteRejected,
            Self::Client(ClientError::Transport(_)) => ErrorCode::TransportFailure,
            Self::Client(ClientError::Decode(_)) => ErrorCode::InternalUnexpected,
            Self::Store(_) => ErrorCode::StoreFailure,
            Self::Exchange(ExchangeError::Rejected { .. }) => ErrorCode::TokenExchangeFailed,
            Self::Exchange(ExchangeError::Transport(_)) => ErrorCode::TransportFailure,
            Self::Exchange(ExchangeError::Decode(_)) => ErrorCode::InternalUnexpected,
            Self::CorruptedState(_) => ErrorCode::CorruptedState,
            Self::MalformedEvent(_) => ErrorCode::MalformedEvent,
        }
    }

    /// Optional remediation hint for operators.
    #[must_use]
    pub const fn hint(&self) -> Option<&'static str> {
        self.code().hint()
    }
}
