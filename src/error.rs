use std::time::Duration;

use thiserror::Error;

use crate::driver::protocol::ResponseError;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum DriverError {
    /// The buffer ends before the current frame does. Recoverable: read more and retry.
    #[error("Incomplete frame: need at least {needed} more bytes")]
    Incomplete { needed: usize },

    #[error("Decode error: {0}")]
    Decode(String),

    #[error("Encode error: {0}")]
    Encode(String),

    #[error("Message too large: {0} bytes")]
    MessageTooLarge(usize),

    #[error("Invalid arguments: {0}")]
    Argument(String),

    #[error("Invalid state: {0}")]
    State(String),

    #[error("Fatal protocol error: {0}")]
    FatalProtocol(String),

    #[error("Connection closed: {0}")]
    ConnectionClosed(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Server error: {0}")]
    Server(ResponseError),

    #[error("Request timed out after {0:?}")]
    Timeout(Duration),

    #[error("Too many pending requests (limit {0})")]
    TooManyPending(usize),

    #[error("Unexpected response: {0}")]
    UnexpectedResponse(String),
}

pub type DriverResult<T> = Result<T, DriverError>;

impl DriverError {
    /// Whether the error leaves the multiplexed stream in an unknown state,
    /// so the connection must be torn down.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            DriverError::Decode(_)
                | DriverError::MessageTooLarge(_)
                | DriverError::FatalProtocol(_)
                | DriverError::ConnectionClosed(_)
                | DriverError::Transport(_)
        )
    }
}

impl From<std::io::Error> for DriverError {
    fn from(err: std::io::Error) -> Self {
        DriverError::Transport(err.to_string())
    }
}
