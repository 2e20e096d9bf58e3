use bitcoin::Txid;
use reqwest::StatusCode;

#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    /// The caller passed an argument the operation cannot accept.
    #[error("precondition violated: {0}")]
    Precondition(String),

    /// The backend answered with a status the operation does not expect.
    #[error(transparent)]
    Remote(#[from] RemoteError),

    #[error(transparent)]
    Transport(#[from] TransportError),

    /// Spend dependencies among the given transactions form a cycle.
    #[error("dependency cycle detected among {} transactions", txids.len())]
    CycleDetected { txids: Vec<Txid> },

    /// The caller's cancellation token fired before the next request.
    #[error("operation cancelled")]
    Cancelled,

    #[error("invalid transaction data: {0}")]
    InvalidTxData(String),

    #[error("invalid backend response: {0}")]
    InvalidResponse(String),

    /// A request payload could not be serialized.
    #[error("failed to encode request: {0}")]
    Encode(String),

    #[error("invalid configuration: {0}")]
    Config(String),
}

/// A non-success response from the backend, with the detail it sent back.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("backend returned {status}: {detail}")]
pub struct RemoteError {
    pub status: StatusCode,
    pub detail: String,
}

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Connecting timed out or was refused; nothing reached the backend.
    #[error("backend unavailable: {0}")]
    Unavailable(String),
}

impl TransportError {
    /// Sort a reqwest failure into "never reached the backend" versus
    /// everything else.
    pub(crate) fn from_reqwest(err: reqwest::Error) -> Self {
        if err.is_connect() {
            Self::Unavailable(err.to_string())
        } else {
            Self::Http(err)
        }
    }
}
