//! Failure taxonomy shared by the request client, the push channel and the store.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// The backend could not be reached, or the channel dropped.
    #[error("transport failure: {0}")]
    Transport(String),

    /// The backend answered with a non-success status.
    #[error("API {status}: {body}")]
    Request { status: u16, body: String },

    /// A push frame or response body did not match the expected shape.
    #[error("malformed payload: {0}")]
    Parse(#[from] serde_json::Error),

    /// The reconnection budget was spent without reaching an open channel.
    #[error("gave up reconnecting after {attempts} attempts")]
    ReconnectExhausted { attempts: u32 },
}

impl Error {
    /// Network-level failures are worth retrying; backend rejections are not.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::Transport(_))
    }
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        Error::Transport(err.to_string())
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for Error {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        Error::Transport(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
