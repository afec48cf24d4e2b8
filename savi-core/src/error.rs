use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Invalid payload: {0}")]
    InvalidPayload(String),

    #[error("Missing field: {0}")]
    MissingField(String),

    #[error("Session not found: {0}")]
    SessionNotFound(String),

    #[error("Inference failure: {0}")]
    InferenceFailure(String),

    #[error("Malformed message: {0}")]
    MalformedMessage(String),

    #[error("Stream cancelled: {0}")]
    Cancelled(String),
}

impl Error {
    /// Errors caused by the request itself rather than the server.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Error::InvalidPayload(_) | Error::MissingField(_) | Error::SessionNotFound(_)
        )
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
