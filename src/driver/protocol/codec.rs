use super::command::Request;
use super::response::Response;
use crate::error::{DriverError, DriverResult};
use serde::{Deserialize, Serialize};

/// Size of the big-endian length prefix in front of every payload
pub const FRAME_HEADER_LEN: usize = 4;
pub const MAX_MESSAGE_SIZE: usize = 16 * 1024 * 1024;

pub fn encode_request(request: &Request) -> DriverResult<Vec<u8>> {
    encode_message(request)
}

pub fn encode_response(response: &Response) -> DriverResult<Vec<u8>> {
    encode_message(response)
}

/// Serialize `msg` and prepend its length, producing one self-delimited frame.
pub fn encode_message<T: Serialize>(msg: &T) -> DriverResult<Vec<u8>> {
    let payload = rmp_serde::to_vec_named(msg)
        .map_err(|e| DriverError::Encode(format!("Serialization failed: {}", e)))?;

    if payload.len() > MAX_MESSAGE_SIZE {
        return Err(DriverError::MessageTooLarge(payload.len()));
    }

    let mut buf = Vec::with_capacity(FRAME_HEADER_LEN + payload.len());
    buf.extend_from_slice(&(payload.len() as u32).to_be_bytes());
    buf.extend_from_slice(&payload);
    Ok(buf)
}

pub fn decode_request(cursor: &mut &[u8]) -> DriverResult<Request> {
    decode_one(cursor)
}

pub fn decode_response(cursor: &mut &[u8]) -> DriverResult<Response> {
    decode_one(cursor)
}

/// Decode exactly one frame from the front of `cursor`.
///
/// On success the cursor is moved past the frame. On any error it is left
/// untouched; `Incomplete` means the caller should wait for more bytes.
pub fn decode_one<'a, T: for<'de> Deserialize<'de>>(cursor: &mut &'a [u8]) -> DriverResult<T> {
    let buf: &'a [u8] = *cursor;
    if buf.len() < FRAME_HEADER_LEN {
        return Err(DriverError::Incomplete {
            needed: FRAME_HEADER_LEN - buf.len(),
        });
    }

    let mut len_buf = [0u8; FRAME_HEADER_LEN];
    len_buf.copy_from_slice(&buf[..FRAME_HEADER_LEN]);
    let msg_len = u32::from_be_bytes(len_buf) as usize;
    if msg_len > MAX_MESSAGE_SIZE {
        return Err(DriverError::MessageTooLarge(msg_len));
    }

    let frame_len = FRAME_HEADER_LEN + msg_len;
    if buf.len() < frame_len {
        return Err(DriverError::Incomplete {
            needed: frame_len - buf.len(),
        });
    }

    let msg = decode_message(&buf[FRAME_HEADER_LEN..frame_len])?;
    *cursor = &buf[frame_len..];
    Ok(msg)
}

/// Decode a bare payload (no length prefix).
///
/// The payload must hold exactly one value; leftover bytes mean the peer and
/// this side disagree on the frame layout.
pub fn decode_message<T: for<'de> Deserialize<'de>>(data: &[u8]) -> DriverResult<T> {
    let mut rest: &[u8] = data;
    let msg = {
        let mut de = rmp_serde::Deserializer::new(&mut rest);
        T::deserialize(&mut de)
            .map_err(|e| DriverError::Decode(format!("Deserialization failed: {}", e)))?
    };

    if !rest.is_empty() {
        return Err(DriverError::Decode(format!(
            "{} trailing bytes after message",
            rest.len()
        )));
    }
    Ok(msg)
}
