use serde::{Deserialize, Serialize};

/// Tag correlating one outstanding request with its reply on a connection
pub type CallbackIndex = u32;

/// Protocol variant announced to the engine during the handshake.
///
/// The driver never interprets replies differently based on this value; it is
/// forwarded verbatim as the `HELLO` protocol argument.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProtocolVersion {
    Resp2,
    #[default]
    Resp3,
}

impl ProtocolVersion {
    pub fn as_arg(&self) -> &'static str {
        match self {
            ProtocolVersion::Resp2 => "2",
            ProtocolVersion::Resp3 => "3",
        }
    }
}
