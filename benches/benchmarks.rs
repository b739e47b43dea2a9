//! Performance benchmarks for the wsline codec and state machine.
//!
//! Run with: `cargo bench`

use criterion::{Criterion, Throughput, black_box, criterion_group, criterion_main};
use wsline::protocol::assembler::MessageAssembler;
use wsline::protocol::frame::Frame;
use wsline::protocol::handshake::{
    ClientHandshake, HandshakeRequest, HandshakeResponse, compute_accept_key, negotiate,
};
use wsline::protocol::mask::{apply_mask, apply_mask_fast};
use wsline::protocol::OpCode;
use wsline::{Limits, Role, StateMachine};

const MASK: [u8; 4] = [0x37, 0xfa, 0x21, 0x3d];

// =============================================================================
// Frame Decoding Benchmarks
// =============================================================================

fn encoded_frame(payload_size: usize, mask: Option<[u8; 4]>) -> Vec<u8> {
    Frame::binary(vec![0xAB; payload_size])
        .encode_with_mask(mask)
        .unwrap()
        .to_vec()
}

fn bench_frame_decoding(c: &mut Criterion) {
    let mut group = c.benchmark_group("frame_decoding");

    for (name, size) in [("small_10b", 10usize), ("medium_1kb", 1024), ("large_64kb", 65536)] {
        let unmasked = encoded_frame(size, None);
        let masked = encoded_frame(size, Some(MASK));

        group.throughput(Throughput::Bytes(size as u64));
        group.bench_function(format!("{name}_unmasked"), |b| {
            b.iter(|| Frame::decode(black_box(&unmasked)))
        });
        group.bench_function(format!("{name}_masked"), |b| {
            b.iter(|| Frame::decode(black_box(&masked)))
        });
    }

    group.finish();
}

fn bench_frame_encoding(c: &mut Criterion) {
    let mut group = c.benchmark_group("frame_encoding");

    for (name, size) in [("small_10b", 10usize), ("large_64kb", 65536)] {
        let frame = Frame::binary(vec![0xAB; size]);
        group.throughput(Throughput::Bytes(size as u64));
        group.bench_function(format!("{name}_server"), |b| {
            b.iter(|| black_box(&frame).encode_with_mask(None))
        });
        group.bench_function(format!("{name}_client"), |b| {
            b.iter(|| black_box(&frame).encode_with_mask(Some(MASK)))
        });
    }

    group.finish();
}

// =============================================================================
// Masking Benchmarks
// =============================================================================

fn bench_masking(c: &mut Criterion) {
    let mut group = c.benchmark_group("masking");

    for size in [64usize, 4096, 65536] {
        let mut data = vec![0xABu8; size];
        group.throughput(Throughput::Bytes(size as u64));

        group.bench_function(format!("bytewise_{size}"), |b| {
            b.iter(|| apply_mask(black_box(&mut data), black_box(MASK)))
        });
        group.bench_function(format!("wordwise_{size}"), |b| {
            b.iter(|| apply_mask_fast(black_box(&mut data), black_box(MASK)))
        });
    }

    group.finish();
}

// =============================================================================
// Handshake Benchmarks
// =============================================================================

fn bench_handshake(c: &mut Criterion) {
    let mut group = c.benchmark_group("handshake");

    let key = "dGhlIHNhbXBsZSBub25jZQ==";
    group.bench_function("compute_accept_key", |b| {
        b.iter(|| compute_accept_key(black_box(key)))
    });

    let request = b"GET /chat HTTP/1.1\r\n\
        Host: server.example.com\r\n\
        Upgrade: websocket\r\n\
        Connection: Upgrade\r\n\
        Sec-WebSocket-Key: dGhlIHNhbXBsZSBub25jZQ==\r\n\
        Sec-WebSocket-Version: 13\r\n\
        Origin: http://example.com\r\n\
        \r\n";

    group.bench_function("parse_request", |b| {
        b.iter(|| HandshakeRequest::parse(black_box(request)))
    });

    // Parse request -> negotiate -> write response
    group.bench_function("full_server_handshake", |b| {
        b.iter(|| {
            let req = HandshakeRequest::parse(black_box(request)).unwrap();
            let resp = negotiate(&req, false);
            let mut buf = Vec::with_capacity(256);
            resp.write(&mut buf).unwrap();
            black_box(buf)
        })
    });

    let response = b"HTTP/1.1 101 Switching Protocols\r\n\
        Upgrade: websocket\r\n\
        Connection: Upgrade\r\n\
        Sec-WebSocket-Accept: s3pPLMBiTxaQ9kYGzzhZRbK+xOo=\r\n\
        \r\n";
    let client = ClientHandshake::with_key(key.to_string());

    group.bench_function("parse_and_verify_response", |b| {
        b.iter(|| {
            let resp = HandshakeResponse::parse(black_box(response)).unwrap();
            client.verify(&resp)
        })
    });

    group.finish();
}

// =============================================================================
// Message Reassembly Benchmarks
// =============================================================================

fn bench_reassembly(c: &mut Criterion) {
    let mut group = c.benchmark_group("reassembly");

    group.throughput(Throughput::Bytes(65536));
    group.bench_function("single_frame_64kb", |b| {
        b.iter(|| {
            let mut assembler = MessageAssembler::new(Limits::default());
            assembler.push(Frame::binary(vec![0xAB; 65536])).unwrap()
        })
    });

    group.bench_function("10_fragments_64kb", |b| {
        b.iter(|| {
            let mut assembler = MessageAssembler::new(Limits::default());
            for i in 0..10 {
                let opcode = if i == 0 {
                    OpCode::Binary
                } else {
                    OpCode::Continuation
                };
                assembler
                    .push(Frame::new(i == 9, opcode, vec![0xAB; 6554]))
                    .unwrap();
            }
        })
    });

    group.finish();
}

// =============================================================================
// State Machine Benchmarks
// =============================================================================

fn bench_state_machine(c: &mut Criterion) {
    let mut group = c.benchmark_group("state_machine");

    // 100 masked 1 KB text frames, fed in 4 KB reads
    let frame = Frame::text(vec![b'a'; 1024]).encode_with_mask(Some(MASK)).unwrap();
    let stream: Vec<u8> = frame.iter().copied().cycle().take(frame.len() * 100).collect();

    group.throughput(Throughput::Bytes(stream.len() as u64));
    group.bench_function("server_receive_100x1kb", |b| {
        b.iter(|| {
            let mut machine = StateMachine::new(Role::Server, Limits::default());
            machine.open().unwrap();
            let mut delivered = 0;
            for chunk in stream.chunks(4096) {
                delivered += machine.receive(black_box(chunk)).len();
            }
            delivered
        })
    });

    group.finish();
}

// =============================================================================
// Criterion Setup
// =============================================================================

criterion_group!(
    benches,
    bench_frame_decoding,
    bench_frame_encoding,
    bench_masking,
    bench_handshake,
    bench_reassembly,
    bench_state_machine
);

criterion_main!(benches);
