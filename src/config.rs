use std::time::Duration;

use crate::driver::protocol::ProtocolVersion;

/// Upper bound on requests awaiting a reply on one session
pub const DEFAULT_MAX_PENDING: usize = 1000;

/// Per-session settings.
///
/// `client_name` and `protocol` are only forwarded in the `HELLO` handshake;
/// the session never changes behaviour based on them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    pub client_name: Option<String>,
    pub protocol: ProtocolVersion,
    /// How long a caller waits for its reply; `None` waits until the
    /// connection fails.
    pub request_timeout: Option<Duration>,
    pub max_pending: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            client_name: None,
            protocol: ProtocolVersion::default(),
            request_timeout: None,
            max_pending: DEFAULT_MAX_PENDING,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = SessionConfig::default();
        assert!(config.client_name.is_none());
        assert_eq!(config.protocol, ProtocolVersion::Resp3);
        assert!(config.request_timeout.is_none());
        assert_eq!(config.max_pending, DEFAULT_MAX_PENDING);
    }
}
