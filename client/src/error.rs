use reqwest::StatusCode;
use thiserror::Error;

/// Every failure a view can surface. Views keep only the display string.
#[derive(Error, Debug)]
pub enum ClientError {
    /// Local form validation failed; no request was sent.
    #[error("{0}")]
    Validation(String),

    /// The backend answered with a non-success status. `message` is shown verbatim.
    #[error("{message}")]
    Api { status: StatusCode, message: String },

    #[error("session expired, please log in again")]
    Unauthorized,

    #[error("not logged in")]
    NotAuthenticated,

    #[error("network error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("unexpected response: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("realtime channel error: {0}")]
    Socket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("local storage error: {0}")]
    Storage(#[from] std::io::Error),

    #[error("invalid url: {0}")]
    Url(#[from] url::ParseError),
}

impl ClientError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Status code reported by the backend, if any.
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            Self::Api { status, .. } => Some(*status),
            Self::Unauthorized => Some(StatusCode::UNAUTHORIZED),
            _ => None,
        }
    }
}

pub type ClientResult<T> = Result<T, ClientError>;
