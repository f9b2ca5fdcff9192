use serde::{Deserialize, Serialize};
use serde_bytes::ByteBuf;
use std::fmt;
use std::str::FromStr;

use super::types::CallbackIndex;
use crate::error::{DriverError, DriverResult};

/// Opcode of a single command.
///
/// `CustomCommand` carries its own name as the first argument; every other
/// variant implies the name and its arguments start at the first key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestType {
    CustomCommand,
    Ping,
    Echo,
    Hello,
    ClientSetName,
    Info,
    Get,
    Set,
    Del,
    Exists,
    Incr,
    IncrBy,
    Decr,
    Append,
    MGet,
    MSet,
    Expire,
    Ttl,
    Watch,
    Unwatch,
}

/// Number of arguments a command accepts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arity {
    Exact(usize),
    AtLeast(usize),
    Range(usize, usize),
    /// Non-empty sequence of key/value pairs
    Pairs,
    Any,
}

impl Arity {
    pub fn accepts(&self, count: usize) -> bool {
        match *self {
            Arity::Exact(n) => count == n,
            Arity::AtLeast(n) => count >= n,
            Arity::Range(min, max) => (min..=max).contains(&count),
            Arity::Pairs => count > 0 && count % 2 == 0,
            Arity::Any => true,
        }
    }
}

impl fmt::Display for Arity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Arity::Exact(n) => write!(f, "exactly {}", n),
            Arity::AtLeast(n) => write!(f, "at least {}", n),
            Arity::Range(min, max) => write!(f, "{} to {}", min, max),
            Arity::Pairs => write!(f, "an even, non-zero number of"),
            Arity::Any => write!(f, "any number of"),
        }
    }
}

impl RequestType {
    pub fn name(&self) -> &'static str {
        match self {
            RequestType::CustomCommand => "CUSTOM",
            RequestType::Ping => "PING",
            RequestType::Echo => "ECHO",
            RequestType::Hello => "HELLO",
            RequestType::ClientSetName => "CLIENT SETNAME",
            RequestType::Info => "INFO",
            RequestType::Get => "GET",
            RequestType::Set => "SET",
            RequestType::Del => "DEL",
            RequestType::Exists => "EXISTS",
            RequestType::Incr => "INCR",
            RequestType::IncrBy => "INCRBY",
            RequestType::Decr => "DECR",
            RequestType::Append => "APPEND",
            RequestType::MGet => "MGET",
            RequestType::MSet => "MSET",
            RequestType::Expire => "EXPIRE",
            RequestType::Ttl => "TTL",
            RequestType::Watch => "WATCH",
            RequestType::Unwatch => "UNWATCH",
        }
    }

    pub fn arity(&self) -> Arity {
        match self {
            RequestType::CustomCommand => Arity::AtLeast(1),
            RequestType::Ping => Arity::Range(0, 1),
            RequestType::Echo => Arity::Exact(1),
            RequestType::Hello => Arity::Range(0, 3),
            RequestType::ClientSetName => Arity::Exact(1),
            RequestType::Info => Arity::Any,
            RequestType::Get => Arity::Exact(1),
            RequestType::Set => Arity::AtLeast(2),
            RequestType::Del | RequestType::Exists => Arity::AtLeast(1),
            RequestType::Incr | RequestType::Decr => Arity::Exact(1),
            RequestType::IncrBy | RequestType::Append => Arity::Exact(2),
            RequestType::MGet => Arity::AtLeast(1),
            RequestType::MSet => Arity::Pairs,
            RequestType::Expire => Arity::Range(2, 3),
            RequestType::Ttl => Arity::Exact(1),
            RequestType::Watch => Arity::AtLeast(1),
            RequestType::Unwatch => Arity::Exact(0),
        }
    }

    /// Case-insensitive lookup of a known command name
    pub fn lookup(name: &str) -> Option<Self> {
        let request_type = match name.to_ascii_uppercase().as_str() {
            "PING" => RequestType::Ping,
            "ECHO" => RequestType::Echo,
            "HELLO" => RequestType::Hello,
            "CLIENT SETNAME" => RequestType::ClientSetName,
            "INFO" => RequestType::Info,
            "GET" => RequestType::Get,
            "SET" => RequestType::Set,
            "DEL" => RequestType::Del,
            "EXISTS" => RequestType::Exists,
            "INCR" => RequestType::Incr,
            "INCRBY" => RequestType::IncrBy,
            "DECR" => RequestType::Decr,
            "APPEND" => RequestType::Append,
            "MGET" => RequestType::MGet,
            "MSET" => RequestType::MSet,
            "EXPIRE" => RequestType::Expire,
            "TTL" => RequestType::Ttl,
            "WATCH" => RequestType::Watch,
            "UNWATCH" => RequestType::Unwatch,
            _ => return None,
        };
        Some(request_type)
    }
}

impl FromStr for RequestType {
    type Err = DriverError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::lookup(s).ok_or_else(|| DriverError::Argument(format!("Unknown command '{}'", s)))
    }
}

/// One command with its ordered, binary-safe arguments
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawCommand")]
pub struct Command {
    request_type: RequestType,
    args: Vec<ByteBuf>,
}

/// Wire shape of a [`Command`] before its arity is checked
#[derive(Deserialize)]
struct RawCommand {
    request_type: RequestType,
    args: Vec<ByteBuf>,
}

impl TryFrom<RawCommand> for Command {
    type Error = DriverError;

    fn try_from(raw: RawCommand) -> Result<Self, Self::Error> {
        Command::new(raw.request_type, raw.args)
    }
}

impl Command {
    /// Build a command, checking the argument count against the opcode's arity.
    pub fn new<I, A>(request_type: RequestType, args: I) -> DriverResult<Self>
    where
        I: IntoIterator<Item = A>,
        A: AsRef<[u8]>,
    {
        let args: Vec<ByteBuf> = args
            .into_iter()
            .map(|a| ByteBuf::from(a.as_ref().to_vec()))
            .collect();

        let arity = request_type.arity();
        if !arity.accepts(args.len()) {
            return Err(DriverError::Argument(format!(
                "{} expects {} argument(s), got {}",
                request_type.name(),
                arity,
                args.len()
            )));
        }
        if request_type == RequestType::CustomCommand && args[0].is_empty() {
            return Err(DriverError::Argument(
                "Custom command name must not be empty".to_string(),
            ));
        }

        Ok(Self { request_type, args })
    }

    /// Build a command from its textual name. Unknown names are sent as
    /// custom commands with the name as the first argument.
    pub fn from_name<I, A>(name: &str, args: I) -> DriverResult<Self>
    where
        I: IntoIterator<Item = A>,
        A: AsRef<[u8]>,
    {
        match RequestType::lookup(name) {
            Some(request_type) => Self::new(request_type, args),
            None => {
                let mut full: Vec<Vec<u8>> = vec![name.as_bytes().to_vec()];
                full.extend(args.into_iter().map(|a| a.as_ref().to_vec()));
                Self::new(RequestType::CustomCommand, full)
            }
        }
    }

    pub fn builder(request_type: RequestType) -> CommandBuilder {
        CommandBuilder {
            request_type,
            args: Vec::new(),
        }
    }

    pub fn request_type(&self) -> RequestType {
        self.request_type
    }

    pub fn args(&self) -> &[ByteBuf] {
        &self.args
    }

    pub fn arg(&self, idx: usize) -> Option<&[u8]> {
        self.args.get(idx).map(|a| a.as_slice())
    }

    /// Command name as sent to the engine
    pub fn name(&self) -> String {
        match self.request_type {
            RequestType::CustomCommand => self
                .args
                .first()
                .map(|name| String::from_utf8_lossy(name).to_uppercase())
                .unwrap_or_default(),
            other => other.name().to_string(),
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({} args)", self.name(), self.args.len())
    }
}

/// Chainable construction of a [`Command`]
#[derive(Debug, Clone)]
pub struct CommandBuilder {
    request_type: RequestType,
    args: Vec<Vec<u8>>,
}

impl CommandBuilder {
    pub fn arg(mut self, arg: impl AsRef<[u8]>) -> Self {
        self.args.push(arg.as_ref().to_vec());
        self
    }

    pub fn int_arg(mut self, value: i64) -> Self {
        self.args.push(value.to_string().into_bytes());
        self
    }

    pub fn args<I, A>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = A>,
        A: AsRef<[u8]>,
    {
        self.args
            .extend(args.into_iter().map(|a| a.as_ref().to_vec()));
        self
    }

    pub fn build(self) -> DriverResult<Command> {
        Command::new(self.request_type, self.args)
    }
}

/// Ordered group of commands answered by a single reply
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Batch {
    pub is_atomic: bool,
    /// Fail the whole batch when any element comes back as an error
    #[serde(default = "default_raise_on_error")]
    pub raise_on_error: bool,
    pub commands: Vec<Command>,
}

fn default_raise_on_error() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestBody {
    Single(Command),
    Batch(Batch),
}

/// Payload of one request frame
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Request {
    pub callback_idx: CallbackIndex,
    pub body: RequestBody,
}

impl Request {
    pub fn single(callback_idx: CallbackIndex, command: Command) -> Self {
        Self {
            callback_idx,
            body: RequestBody::Single(command),
        }
    }

    pub fn batch(callback_idx: CallbackIndex, batch: Batch) -> Self {
        Self {
            callback_idx,
            body: RequestBody::Batch(batch),
        }
    }
}
