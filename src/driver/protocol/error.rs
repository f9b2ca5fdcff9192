use serde::{Deserialize, Serialize};

/// Category of an error reported by the engine for one request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServerErrorKind {
    #[default]
    Unspecified,
    /// A queued command was rejected, so the whole transaction was discarded
    ExecAbort,
    Timeout,
    Disconnect,
}

/// Error descriptor carried by a response frame or a batch element
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponseError {
    #[serde(default)]
    pub kind: ServerErrorKind,
    pub message: String,
}

impl ResponseError {
    pub fn new(kind: ServerErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn unspecified(message: impl Into<String>) -> Self {
        Self::new(ServerErrorKind::Unspecified, message)
    }
}

impl std::fmt::Display for ResponseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.kind {
            ServerErrorKind::Unspecified => write!(f, "{}", self.message),
            ServerErrorKind::ExecAbort => write!(f, "EXECABORT {}", self.message),
            ServerErrorKind::Timeout => write!(f, "TIMEOUT {}", self.message),
            ServerErrorKind::Disconnect => write!(f, "DISCONNECT {}", self.message),
        }
    }
}
