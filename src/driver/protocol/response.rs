use serde::{Deserialize, Serialize};
use serde_bytes::ByteBuf;
use std::fmt;

use super::error::ResponseError;
use super::types::CallbackIndex;

/// Reply payload produced by the engine.
///
/// The driver only inspects it to tell an aborted transaction (`Nil` in reply
/// to an atomic batch) and batch element errors apart; everything else is
/// handed to the caller as-is.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Value {
    Nil,
    Okay,
    Int(i64),
    Bulk(ByteBuf),
    Status(String),
    Array(Vec<Value>),
    Error(ResponseError),
}

impl Value {
    pub fn bulk(data: impl AsRef<[u8]>) -> Self {
        Value::Bulk(ByteBuf::from(data.as_ref().to_vec()))
    }

    pub fn is_nil(&self) -> bool {
        matches!(self, Value::Nil)
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Value::Bulk(data) => Some(data.as_slice()),
            Value::Status(text) => Some(text.as_bytes()),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(n) => Some(*n),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Nil => write!(f, "(nil)"),
            Value::Okay => write!(f, "OK"),
            Value::Int(n) => write!(f, "(integer) {}", n),
            Value::Bulk(data) => write!(f, "\"{}\"", String::from_utf8_lossy(data)),
            Value::Status(text) => write!(f, "{}", text),
            Value::Array(items) if items.is_empty() => write!(f, "(empty array)"),
            Value::Array(items) => {
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        writeln!(f)?;
                    }
                    write!(f, "{}) {}", i + 1, item)?;
                }
                Ok(())
            }
            Value::Error(err) => write!(f, "(error) {}", err),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseBody {
    Value(Value),
    Error(ResponseError),
    /// The engine is closing the connection; nothing else will arrive
    ClosingError(String),
}

/// Payload of one response frame
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    pub callback_idx: CallbackIndex,
    pub body: ResponseBody,
}

impl Response {
    pub fn value(callback_idx: CallbackIndex, value: Value) -> Self {
        Self {
            callback_idx,
            body: ResponseBody::Value(value),
        }
    }

    pub fn ok(callback_idx: CallbackIndex) -> Self {
        Self::value(callback_idx, Value::Okay)
    }

    pub fn nil(callback_idx: CallbackIndex) -> Self {
        Self::value(callback_idx, Value::Nil)
    }

    pub fn error(callback_idx: CallbackIndex, error: ResponseError) -> Self {
        Self {
            callback_idx,
            body: ResponseBody::Error(error),
        }
    }

    pub fn closing(callback_idx: CallbackIndex, message: impl Into<String>) -> Self {
        Self {
            callback_idx,
            body: ResponseBody::ClosingError(message.into()),
        }
    }
}
