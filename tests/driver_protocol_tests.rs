//! Driver Protocol Tests
//!
//! Tests for the length-delimited MessagePack framing including:
//! - Request encoding/decoding
//! - Frames packed back to back in one buffer
//! - Partial and malformed input

use kvmux::driver::protocol::{
    decode_message, decode_request, decode_response, encode_message, encode_request,
    encode_response, Batch, Command, Request, RequestBody, RequestType, Response, ResponseBody,
    ResponseError, ServerErrorKind, Value, FRAME_HEADER_LEN, MAX_MESSAGE_SIZE,
};
use kvmux::DriverError;

fn single(callback_idx: u32, request_type: RequestType, args: &[&str]) -> Request {
    Request::single(callback_idx, Command::new(request_type, args).unwrap())
}

// ============================================================================
// Request Frames
// ============================================================================

#[test]
fn test_request_round_trip() {
    let request = single(7, RequestType::Set, &["user:1", "alice"]);
    let frame = encode_request(&request).unwrap();

    let mut cursor: &[u8] = &frame;
    let decoded = decode_request(&mut cursor).unwrap();
    assert_eq!(decoded, request);
    assert!(cursor.is_empty());
}

#[test]
fn test_request_without_arguments() {
    let request = single(0, RequestType::Ping, &[]);
    let frame = encode_request(&request).unwrap();

    let mut cursor: &[u8] = &frame;
    let decoded = decode_request(&mut cursor).unwrap();
    match decoded.body {
        RequestBody::Single(command) => {
            assert_eq!(command.request_type(), RequestType::Ping);
            assert!(command.args().is_empty());
        }
        other => panic!("expected single command, got {:?}", other),
    }
}

#[test]
fn test_empty_string_argument_survives() {
    let request = single(3, RequestType::Set, &["key", ""]);
    let frame = encode_request(&request).unwrap();

    let mut cursor: &[u8] = &frame;
    let RequestBody::Single(command) = decode_request(&mut cursor).unwrap().body else {
        panic!("expected single command");
    };
    assert_eq!(command.args().len(), 2);
    assert_eq!(command.arg(1), Some(&b""[..]));
}

#[test]
fn test_binary_arguments_survive() {
    let payload: Vec<u8> = (0..=255u8).collect();
    let command = Command::new(RequestType::Set, [&b"blob"[..], &payload[..]]).unwrap();
    let frame = encode_request(&Request::single(1, command)).unwrap();

    let mut cursor: &[u8] = &frame;
    let RequestBody::Single(decoded) = decode_request(&mut cursor).unwrap().body else {
        panic!("expected single command");
    };
    assert_eq!(decoded.arg(1), Some(&payload[..]));
}

#[test]
fn test_frame_length_prefix() {
    let frame = encode_request(&single(1, RequestType::Get, &["k"])).unwrap();
    let declared = u32::from_be_bytes([frame[0], frame[1], frame[2], frame[3]]) as usize;
    assert_eq!(declared, frame.len() - FRAME_HEADER_LEN);
}

#[test]
fn test_packed_frames_decode_in_order() {
    let requests = vec![
        single(1, RequestType::MGet, &["bar1", "bar2"]),
        single(3, RequestType::MGet, &["bar3", "bar4"]),
        single(4, RequestType::Get, &["bar5"]),
    ];

    let mut buffer = Vec::new();
    for request in &requests {
        buffer.extend(encode_request(request).unwrap());
    }

    let mut cursor: &[u8] = &buffer;
    let mut decoded = Vec::new();
    while !cursor.is_empty() {
        decoded.push(decode_request(&mut cursor).unwrap());
    }

    assert_eq!(decoded, requests);
    assert_eq!(decoded[0].callback_idx, 1);
    assert_eq!(decoded[1].callback_idx, 3);
}

#[test]
fn test_batch_round_trip() {
    let batch = Batch {
        is_atomic: true,
        raise_on_error: false,
        commands: vec![
            Command::new(RequestType::Set, ["a", "1"]).unwrap(),
            Command::new(RequestType::Incr, ["a"]).unwrap(),
        ],
    };
    let frame = encode_request(&Request::batch(11, batch.clone())).unwrap();

    let mut cursor: &[u8] = &frame;
    let decoded = decode_request(&mut cursor).unwrap();
    assert_eq!(decoded.callback_idx, 11);
    assert_eq!(decoded.body, RequestBody::Batch(batch));
}

#[test]
fn test_custom_command_round_trip() {
    let command = Command::from_name("object", ["encoding", "key"]).unwrap();
    assert_eq!(command.request_type(), RequestType::CustomCommand);
    assert_eq!(command.name(), "OBJECT");

    let frame = encode_request(&Request::single(2, command.clone())).unwrap();
    let mut cursor: &[u8] = &frame;
    assert_eq!(decode_request(&mut cursor).unwrap().body, RequestBody::Single(command));
}

// ============================================================================
// Response Frames
// ============================================================================

#[test]
fn test_response_variants_round_trip() {
    let responses = vec![
        Response::ok(0),
        Response::nil(1),
        Response::value(2, Value::Int(-42)),
        Response::value(3, Value::bulk("hello")),
        Response::value(
            4,
            Value::Array(vec![Value::Okay, Value::Nil, Value::Status("QUEUED".into())]),
        ),
        Response::error(5, ResponseError::new(ServerErrorKind::ExecAbort, "Transaction discarded")),
        Response::closing(6, "server shutting down"),
    ];

    let mut buffer = Vec::new();
    for response in &responses {
        buffer.extend(encode_response(response).unwrap());
    }

    let mut cursor: &[u8] = &buffer;
    for expected in &responses {
        assert_eq!(&decode_response(&mut cursor).unwrap(), expected);
    }
    assert!(cursor.is_empty());
}

#[test]
fn test_server_error_kind_defaults_when_absent() {
    #[derive(serde::Serialize)]
    struct BareError {
        message: String,
    }

    let bytes = rmp_serde::to_vec_named(&BareError {
        message: "ERR boom".into(),
    })
    .unwrap();
    let err: ResponseError = decode_message(&bytes).unwrap();
    assert_eq!(err.kind, ServerErrorKind::Unspecified);
    assert_eq!(err.to_string(), "ERR boom");
}

// ============================================================================
// Partial and Malformed Input
// ============================================================================

#[test]
fn test_every_truncation_is_incomplete() {
    let frame = encode_response(&Response::value(9, Value::bulk("abcdef"))).unwrap();

    for cut in 0..frame.len() {
        let mut cursor: &[u8] = &frame[..cut];
        match decode_response(&mut cursor) {
            Err(DriverError::Incomplete { needed }) => assert!(needed > 0),
            other => panic!("cut at {}: expected Incomplete, got {:?}", cut, other),
        }
        assert_eq!(cursor.len(), cut, "cursor must not move on Incomplete");
    }
}

#[test]
fn test_partial_second_frame_leaves_cursor_on_it() {
    let first = encode_response(&Response::ok(1)).unwrap();
    let second = encode_response(&Response::ok(2)).unwrap();
    let mut buffer = first.clone();
    buffer.extend_from_slice(&second[..second.len() - 1]);

    let mut cursor: &[u8] = &buffer;
    assert_eq!(decode_response(&mut cursor).unwrap().callback_idx, 1);
    assert!(matches!(
        decode_response(&mut cursor),
        Err(DriverError::Incomplete { needed: 1 })
    ));
    assert_eq!(cursor.len(), second.len() - 1);
}

#[test]
fn test_garbage_payload_is_decode_error() {
    let mut frame = 3u32.to_be_bytes().to_vec();
    frame.extend_from_slice(&[0xc1, 0xc1, 0xc1]);

    let mut cursor: &[u8] = &frame;
    let err = decode_response(&mut cursor).unwrap_err();
    assert!(matches!(err, DriverError::Decode(_)));
    assert!(err.is_fatal());
}

#[test]
fn test_trailing_bytes_inside_frame_are_decode_error() {
    let mut payload = rmp_serde::to_vec_named(&Response::ok(5)).unwrap();
    payload.extend_from_slice(&[0xc1, 0xc1, 0xc1]);

    let mut frame = (payload.len() as u32).to_be_bytes().to_vec();
    frame.extend_from_slice(&payload);

    let mut cursor: &[u8] = &frame;
    let err = decode_response(&mut cursor).unwrap_err();
    assert!(matches!(err, DriverError::Decode(_)));
    assert!(err.is_fatal());
    assert_eq!(cursor.len(), frame.len());
}

#[test]
fn test_wrong_shape_is_decode_error() {
    // A valid MessagePack value that is not a Response
    let frame = encode_message(&"just a string").unwrap();
    let mut cursor: &[u8] = &frame;
    assert!(matches!(decode_response(&mut cursor), Err(DriverError::Decode(_))));
}

#[test]
fn test_oversized_length_prefix_is_rejected() {
    let frame = ((MAX_MESSAGE_SIZE + 1) as u32).to_be_bytes();
    let mut cursor: &[u8] = &frame;
    assert!(matches!(
        decode_response(&mut cursor),
        Err(DriverError::MessageTooLarge(_))
    ));
}

#[test]
fn test_response_body_closing_error_shape() {
    let frame = encode_response(&Response::closing(0, "bye")).unwrap();
    let mut cursor: &[u8] = &frame;
    assert_eq!(
        decode_response(&mut cursor).unwrap().body,
        ResponseBody::ClosingError("bye".into())
    );
}
