//! Property-based tests for the frame codec, the state machine and the
//! handshake parser.
//!
//! These tests use proptest to fuzz the parsing logic and find edge cases.

use proptest::prelude::*;
use wsline::protocol::{
    Frame, HandshakeRequest, OpCode, apply_mask, apply_mask_fast, compute_accept_key, negotiate,
};
use wsline::{Action, ConnectionState, Error, Limits, Message, Role, StateMachine};

/// Strategy for generating data frame opcodes.
fn data_opcode_strategy() -> impl Strategy<Value = OpCode> {
    prop_oneof![
        Just(OpCode::Text),
        Just(OpCode::Binary),
        Just(OpCode::Continuation),
    ]
}

fn control_opcode_strategy() -> impl Strategy<Value = OpCode> {
    prop_oneof![Just(OpCode::Close), Just(OpCode::Ping), Just(OpCode::Pong),]
}

fn any_opcode_strategy() -> impl Strategy<Value = OpCode> {
    prop_oneof![
        Just(OpCode::Continuation),
        Just(OpCode::Text),
        Just(OpCode::Binary),
        Just(OpCode::Close),
        Just(OpCode::Ping),
        Just(OpCode::Pong),
        (3u8..=7).prop_map(OpCode::Reserved),
        (11u8..=15).prop_map(OpCode::Reserved),
    ]
}

fn open_machine(role: Role) -> StateMachine {
    let mut machine = StateMachine::new(role, Limits::default());
    machine.open().unwrap();
    machine
}

fn delivered(actions: Vec<Action>) -> Vec<Message> {
    actions
        .into_iter()
        .filter_map(|action| match action {
            Action::Deliver(message) => Some(message),
            _ => None,
        })
        .collect()
}

proptest! {
    // =========================================================================
    // Round trip: decode(encode(frame)) keeps fin, rsv, opcode and payload
    // =========================================================================
    #[test]
    fn test_roundtrip(
        fin in any::<bool>(),
        rsv in any::<(bool, bool, bool)>(),
        opcode in any_opcode_strategy(),
        payload in prop::collection::vec(any::<u8>(), 0..1000),
        mask in prop::option::of(any::<[u8; 4]>())
    ) {
        let mut frame = Frame::new(fin, opcode, payload.clone());
        (frame.rsv1, frame.rsv2, frame.rsv3) = rsv;

        let wire = frame.encode_with_mask(mask).unwrap();
        let (parsed, consumed) = Frame::decode(&wire).unwrap();

        prop_assert_eq!(consumed, wire.len());
        prop_assert_eq!(parsed.fin, fin);
        prop_assert_eq!((parsed.rsv1, parsed.rsv2, parsed.rsv3), rsv);
        prop_assert_eq!(parsed.opcode, opcode);
        prop_assert_eq!(parsed.masked, mask.is_some());
        prop_assert_eq!(parsed.payload(), payload.as_slice());
    }

    // =========================================================================
    // Masking is reversible, and the word-at-a-time path agrees
    // =========================================================================
    #[test]
    fn test_mask_reversible(
        data in prop::collection::vec(any::<u8>(), 0..2000),
        mask in any::<[u8; 4]>()
    ) {
        let mut masked = data.clone();
        apply_mask(&mut masked, mask);
        let mut fast = data.clone();
        apply_mask_fast(&mut fast, mask);
        prop_assert_eq!(&masked, &fast);

        apply_mask(&mut masked, mask);
        prop_assert_eq!(data, masked);
    }

    // =========================================================================
    // Encoding always uses the shortest length form
    // =========================================================================
    #[test]
    fn test_minimal_length_encoding(len in 0usize..70_000) {
        let wire = Frame::binary(vec![0u8; len]).encode_with_mask(None).unwrap();
        let (indicator, header_len) = match len {
            0..=125 => (len as u8, 2),
            126..=65_535 => (126, 4),
            _ => (127, 10),
        };
        prop_assert_eq!(wire[1], indicator);
        prop_assert_eq!(wire.len(), header_len + len);
    }

    // =========================================================================
    // Non-minimal length fields are rejected on decode
    // =========================================================================
    #[test]
    fn test_non_minimal_length_rejected(len in 0u16..=125, wide in any::<bool>()) {
        let mut wire = vec![0x82];
        if wide {
            wire.push(127);
            wire.extend_from_slice(&u64::from(len).to_be_bytes());
        } else {
            wire.push(126);
            wire.extend_from_slice(&len.to_be_bytes());
        }
        wire.extend(std::iter::repeat_n(0u8, usize::from(len)));

        prop_assert!(matches!(Frame::decode(&wire), Err(Error::InvalidFrame(_))));
    }

    // =========================================================================
    // Control frames: <=125 bytes validate, more does not
    // =========================================================================
    #[test]
    fn test_control_frame_size_limit(
        opcode in control_opcode_strategy(),
        len in 0usize..256
    ) {
        let frame = Frame::new(true, opcode, vec![0u8; len]);
        prop_assert_eq!(frame.validate().is_ok(), len <= 125);
    }

    // =========================================================================
    // Wire size calculation matches actual written bytes
    // =========================================================================
    #[test]
    fn test_wire_size_accuracy(
        fin in any::<bool>(),
        opcode in any_opcode_strategy(),
        payload in prop::collection::vec(any::<u8>(), 0..10000),
        masked in any::<bool>()
    ) {
        let frame = Frame::new(fin, opcode, payload);
        let mask = masked.then_some([0x12, 0x34, 0x56, 0x78]);
        let wire = frame.encode_with_mask(mask).unwrap();
        prop_assert_eq!(frame.wire_size(masked), wire.len());
    }

    // =========================================================================
    // Any strict prefix of a frame is incomplete, never invalid
    // =========================================================================
    #[test]
    fn test_prefix_is_incomplete(
        opcode in data_opcode_strategy(),
        payload in prop::collection::vec(any::<u8>(), 0..300),
        mask in prop::option::of(any::<[u8; 4]>()),
        cut in any::<prop::sample::Index>()
    ) {
        let wire = Frame::new(true, opcode, payload).encode_with_mask(mask).unwrap();
        let cut = cut.index(wire.len());
        let result = Frame::decode(&wire[..cut]);
        prop_assert!(
            matches!(result, Err(ref e) if e.is_incomplete()),
            "prefix of {} bytes: {:?}", cut, result
        );
    }

    // =========================================================================
    // Multiple frames can be decoded back to back
    // =========================================================================
    #[test]
    fn test_sequential_frame_decoding(
        payloads in prop::collection::vec(prop::collection::vec(any::<u8>(), 0..200), 1..5)
    ) {
        let mut buf = Vec::new();
        for payload in &payloads {
            buf.extend_from_slice(&Frame::binary(payload.clone()).encode_with_mask(None).unwrap());
        }

        let mut offset = 0;
        for (i, payload) in payloads.iter().enumerate() {
            let (parsed, consumed) = Frame::decode(&buf[offset..]).unwrap();
            prop_assert_eq!(parsed.payload(), payload.as_slice(), "frame {} payload mismatch", i);
            offset += consumed;
        }
        prop_assert_eq!(offset, buf.len(), "not all bytes consumed");
    }

    // =========================================================================
    // Partial delivery: any chunking of the stream yields the same messages
    // =========================================================================
    #[test]
    fn test_chunked_delivery(
        texts in prop::collection::vec("[a-z0-9 ]{0,300}", 1..6),
        chunk in 1usize..64
    ) {
        let mut wire = Vec::new();
        for text in &texts {
            wire.extend_from_slice(
                &Frame::text(text.clone()).encode_with_mask(Some([9, 8, 7, 6])).unwrap(),
            );
        }

        let mut server = open_machine(Role::Server);
        let mut messages = Vec::new();
        for piece in wire.chunks(chunk) {
            messages.extend(delivered(server.receive(piece)));
        }

        let expected: Vec<Message> = texts.iter().cloned().map(Message::text).collect();
        prop_assert_eq!(messages, expected);
        prop_assert_eq!(server.buffered(), 0);
        prop_assert_eq!(server.state(), ConnectionState::Open);
    }

    // =========================================================================
    // Fragmentation: TEXT(fin=0) + CONTINUATION* yields one concatenated message
    // =========================================================================
    #[test]
    fn test_fragment_reassembly(
        parts in prop::collection::vec("[a-zA-Z0-9]{0,50}", 1..10)
    ) {
        let mut client = open_machine(Role::Client);
        let last = parts.len() - 1;
        let mut wire = Vec::new();
        for (i, part) in parts.iter().enumerate() {
            let opcode = if i == 0 { OpCode::Text } else { OpCode::Continuation };
            wire.extend_from_slice(
                &Frame::new(i == last, opcode, part.clone()).encode_with_mask(None).unwrap(),
            );
        }

        let messages = delivered(client.receive(&wire));
        prop_assert_eq!(messages, vec![Message::text(parts.concat())]);
    }

    // =========================================================================
    // Masking direction: the wrong direction always aborts without a frame
    // =========================================================================
    #[test]
    fn test_wrong_mask_direction_aborts(
        payload in prop::collection::vec(any::<u8>(), 0..100),
        server_side in any::<bool>()
    ) {
        let (role, mask) = if server_side {
            (Role::Server, None)
        } else {
            (Role::Client, Some([1, 2, 3, 4]))
        };
        let mut machine = open_machine(role);
        let wire = Frame::binary(payload).encode_with_mask(mask).unwrap();

        let actions = machine.receive(&wire);
        prop_assert_eq!(actions.len(), 1);
        prop_assert!(matches!(actions[0], Action::Abort(_)));
        prop_assert_eq!(machine.state(), ConnectionState::Closed);
    }
}

#[cfg(test)]
mod targeted_tests {
    use super::*;

    /// 7-bit, 16-bit and 64-bit length boundaries.
    #[test]
    fn test_length_boundaries() {
        for len in [0, 1, 124, 125, 126, 127, 255, 256, 65534, 65535, 65536] {
            let frame = Frame::binary(vec![0xAB; len]);
            let wire = frame.encode_with_mask(None).unwrap();
            let (parsed, _) = Frame::decode(&wire).unwrap();
            assert_eq!(parsed.payload().len(), len);
        }
    }

    /// All-zero and all-0xFF masks.
    #[test]
    fn test_extreme_masks() {
        for mask in [[0, 0, 0, 0], [0xFF; 4]] {
            let frame = Frame::text("test payload");
            let wire = frame.encode_with_mask(Some(mask)).unwrap();
            let (parsed, _) = Frame::decode(&wire).unwrap();
            assert_eq!(parsed.payload(), b"test payload");
        }
    }

    #[test]
    fn test_rfc_accept_key() {
        assert_eq!(
            compute_accept_key("dGhlIHNhbXBsZSBub25jZQ=="),
            "s3pPLMBiTxaQ9kYGzzhZRbK+xOo="
        );
    }
}

proptest! {
    #[test]
    fn test_handshake_parse_no_panic(data in prop::collection::vec(any::<u8>(), 0..2000)) {
        let _ = HandshakeRequest::parse(&data);
    }

    #[test]
    fn test_handshake_truncated(truncate_at in 1usize..200) {
        let valid_request = b"GET /chat HTTP/1.1\r\n\
            Host: example.com\r\n\
            Upgrade: websocket\r\n\
            Connection: Upgrade\r\n\
            Sec-WebSocket-Key: dGhlIHNhbXBsZSBub25jZQ==\r\n\
            Sec-WebSocket-Version: 13\r\n\r\n";

        let truncated_len = truncate_at.min(valid_request.len());
        if truncated_len < valid_request.len() {
            let _ = HandshakeRequest::parse(&valid_request[..truncated_len]);
        }
    }

    #[test]
    fn test_handshake_valid_variations(
        path in "/[a-z]{1,20}",
        host in "[a-z]{3,10}\\.[a-z]{2,4}"
    ) {
        let request = format!(
            "GET {path} HTTP/1.1\r\n\
             Host: {host}\r\n\
             Upgrade: websocket\r\n\
             Connection: Upgrade\r\n\
             Sec-WebSocket-Key: dGhlIHNhbXBsZSBub25jZQ==\r\n\
             Sec-WebSocket-Version: 13\r\n\r\n"
        );

        let parsed = HandshakeRequest::parse(request.as_bytes());
        prop_assert!(parsed.is_ok(), "Valid request should parse: {:?}", parsed);
        let parsed = parsed.unwrap();
        prop_assert_eq!(negotiate(&parsed, false).status, 101);
        prop_assert_eq!(parsed.connection_url(false), format!("ws://{host}{path}"));
    }

    #[test]
    fn test_handshake_wrong_version_is_426(version in "[0-9]{1,2}") {
        prop_assume!(version != "13");
        let request = format!(
            "GET / HTTP/1.1\r\n\
             Host: example.com\r\n\
             Upgrade: websocket\r\n\
             Connection: upgrade\r\n\
             Sec-WebSocket-Key: dGhlIHNhbXBsZSBub25jZQ==\r\n\
             Sec-WebSocket-Version: {version}\r\n\r\n"
        );
        let parsed = HandshakeRequest::parse(request.as_bytes()).unwrap();
        let response = negotiate(&parsed, false);
        prop_assert_eq!(response.status, 426);
        prop_assert_eq!(response.headers.get("Sec-WebSocket-Version"), Some("13"));
    }
}
