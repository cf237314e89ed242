use thiserror::Error;

#[derive(Error, Debug)]
pub enum ThinkoraError {
    /// The refresh endpoint rejected the ambient session. The credential has
    /// already been cleared when this is returned.
    #[error("Session expired")]
    SessionExpired,

    /// The request failed before any status existed.
    #[error("Network error: {0}")]
    Network(String),

    #[error("{message}")]
    Server { status: u16, message: String },

    #[error("{0}")]
    Validation(String),

    #[error("Request cancelled")]
    Cancelled,

    #[error("Unexpected response: {0}")]
    Decode(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ThinkoraError {
    pub fn is_session_expired(&self) -> bool {
        matches!(self, ThinkoraError::SessionExpired)
    }
}

impl From<reqwest::Error> for ThinkoraError {
    fn from(err: reqwest::Error) -> Self {
        ThinkoraError::Network(err.to_string())
    }
}

impl From<serde_json::Error> for ThinkoraError {
    fn from(err: serde_json::Error) -> Self {
        ThinkoraError::Decode(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, ThinkoraError>;
