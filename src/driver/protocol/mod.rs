//! Wire protocol definitions for the multiplexed driver
//!
//! Every message is a MessagePack payload behind a 4-byte big-endian length
//! prefix, so frames can be packed back to back and decoded one at a time.

pub mod codec;
pub mod command;
pub mod error;
pub mod response;
pub mod types;

pub use codec::{
    decode_message, decode_one, decode_request, decode_response, encode_message, encode_request,
    encode_response, FRAME_HEADER_LEN, MAX_MESSAGE_SIZE,
};
pub use command::{Arity, Batch, Command, CommandBuilder, Request, RequestBody, RequestType};
pub use error::{ResponseError, ServerErrorKind};
pub use response::{Response, ResponseBody, Value};
pub use types::{CallbackIndex, ProtocolVersion};
