use std::time::Duration;
use tokio::net::TcpStream;

use super::Session;
use crate::config::SessionConfig;
use crate::driver::protocol::ProtocolVersion;
use crate::error::{DriverError, DriverResult};

pub struct SessionBuilder {
    addr: String,
    config: SessionConfig,
    handshake: bool,
}

impl SessionBuilder {
    pub fn new(addr: &str) -> Self {
        Self {
            addr: addr.to_string(),
            config: SessionConfig::default(),
            handshake: true,
        }
    }

    pub fn client_name(mut self, name: &str) -> Self {
        self.config.client_name = Some(name.to_string());
        self
    }

    pub fn protocol(mut self, protocol: ProtocolVersion) -> Self {
        self.config.protocol = protocol;
        self
    }

    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.config.request_timeout = Some(timeout);
        self
    }

    pub fn timeout_ms(self, ms: u64) -> Self {
        self.request_timeout(Duration::from_millis(ms))
    }

    pub fn max_pending(mut self, max: usize) -> Self {
        self.config.max_pending = max;
        self
    }

    pub fn config(mut self, config: SessionConfig) -> Self {
        self.config = config;
        self
    }

    /// Connect without sending `HELLO`.
    pub fn skip_handshake(mut self) -> Self {
        self.handshake = false;
        self
    }

    pub async fn connect(self) -> DriverResult<Session> {
        let stream = TcpStream::connect(&self.addr).await.map_err(|e| {
            DriverError::Transport(format!("Failed to connect to {}: {}", self.addr, e))
        })?;

        stream.set_nodelay(true).map_err(|e| {
            DriverError::Transport(format!("Failed to set TCP_NODELAY: {}", e))
        })?;

        let (read, write) = stream.into_split();
        let session = Session::new(read, write, self.config);
        tracing::info!(addr = %self.addr, "Connected");

        if self.handshake {
            if let Err(e) = session.hello().await {
                session.close().await;
                return Err(e);
            }
        }

        Ok(session)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_chained() {
        let builder = SessionBuilder::new("127.0.0.1:6379")
            .client_name("worker-1")
            .protocol(ProtocolVersion::Resp2)
            .timeout_ms(250)
            .max_pending(16)
            .skip_handshake();

        assert_eq!(builder.addr, "127.0.0.1:6379");
        assert_eq!(builder.config.client_name.as_deref(), Some("worker-1"));
        assert_eq!(builder.config.protocol, ProtocolVersion::Resp2);
        assert_eq!(builder.config.request_timeout, Some(Duration::from_millis(250)));
        assert_eq!(builder.config.max_pending, 16);
        assert!(!builder.handshake);
    }

    #[tokio::test]
    async fn test_connect_refused_is_transport_error() {
        // Bind then drop to get a port nobody listens on
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        drop(listener);

        let err = SessionBuilder::new(&addr).connect().await.err().unwrap();
        assert!(matches!(err, DriverError::Transport(_)));
    }
}
