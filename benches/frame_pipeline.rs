//! Frame pipeline benchmark suite.
//!
//! Benchmarks the per-message work of the connection event loop:
//! - Encode: frame to wire payload
//! - Decode + validate: wire payload to frame
//! - Header translation with the standard dictionary
//! - Round trip through an in-memory connection pair
//!
//! Run with: cargo bench --bench frame_pipeline
//! Results saved to: target/criterion/

use std::hint::black_box;

use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use serde_json::{Value, json};
use tokio::runtime::Runtime;

use ws_exchange::protocol::{Identifier, RequestLine, validate};
use ws_exchange::{
    Codec, Connection, ConnectionOptions, Frame, HeaderDictionary, Headers, IncomingRequest,
    JsonCodec, MemoryTransport, Method, OutgoingResponse,
};

// ============================================================================
// Benchmark Parameters
// ============================================================================

const BODY_SIZES: &[usize] = &[0, 64, 4096];
const CHUNK_COUNTS: &[usize] = &[1, 16];

// ============================================================================
// Helpers
// ============================================================================

fn sample_frame(body_size: usize) -> Frame {
    let headers: Headers = [
        ("x-id", json!(42)),
        ("x-more", json!(1)),
        ("Etag", json!("abc")),
    ]
    .into_iter()
    .collect();
    let body = (body_size > 0).then(|| Value::String("x".repeat(body_size)));
    Frame::new(
        Identifier::Request(RequestLine::new(Method::Post, "/bench?q=1")),
        headers,
        body,
    )
}

fn echo(mut request: IncomingRequest, mut response: OutgoingResponse) {
    tokio::spawn(async move {
        let chunks = request.read_to_end().await?;
        for chunk in chunks {
            response.write(chunk).await?;
        }
        response.end().await
    });
}

// ============================================================================
// Benchmark: Codec
// ============================================================================

fn bench_codec(c: &mut Criterion) {
    let codec = JsonCodec;

    let mut group = c.benchmark_group("codec");

    for &size in BODY_SIZES {
        let frame = sample_frame(size);
        group.bench_with_input(BenchmarkId::new("encode", size), &frame, |b, frame| {
            b.iter(|| codec.encode(black_box(frame)).expect("encode"));
        });

        let payload = codec.encode(&frame).expect("encode");
        group.bench_with_input(
            BenchmarkId::new("decode_validate", size),
            &payload,
            |b, payload| {
                b.iter(|| {
                    let value = codec.decode(black_box(payload)).expect("decode");
                    validate(value).expect("validate")
                });
            },
        );
    }

    group.finish();
}

// ============================================================================
// Benchmark: Header Dictionary
// ============================================================================

fn bench_dictionary(c: &mut Criterion) {
    let dictionary = HeaderDictionary::standard();
    let headers: Headers = [
        ("Message-ID", json!(7)),
        ("Connection", json!("keep-alive")),
        ("Etag", json!("abc")),
        ("X-Custom", json!("foo")),
    ]
    .into_iter()
    .collect();
    let wire = dictionary.to_wire(&headers);

    let mut group = c.benchmark_group("dictionary");
    group.bench_function("to_wire", |b| {
        b.iter(|| dictionary.to_wire(black_box(&headers)));
    });
    group.bench_function("from_wire", |b| {
        b.iter(|| dictionary.from_wire(black_box(&wire)));
    });
    group.finish();
}

// ============================================================================
// Benchmark: Exchange Round Trip
// ============================================================================

fn bench_round_trip(c: &mut Criterion) {
    let rt = Runtime::new().expect("runtime");

    let (client, _server) = rt.block_on(async {
        let ((left, left_events), (right, right_events)) = MemoryTransport::pair();
        let server = Connection::builder()
            .options(ConnectionOptions::compact())
            .router(echo)
            .build()
            .expect("server");
        server.bind(right, right_events).expect("bind server");
        let client = Connection::builder()
            .options(ConnectionOptions::compact())
            .build()
            .expect("client");
        client.bind(left, left_events).expect("bind client");
        (client, server)
    });

    let mut group = c.benchmark_group("round_trip");

    for &chunks in CHUNK_COUNTS {
        group.bench_with_input(BenchmarkId::new("echo", chunks), &chunks, |b, &chunks| {
            b.iter(|| {
                rt.block_on(async {
                    let mut request = client.request();
                    request.set_method(Method::Post);
                    for index in 0..chunks {
                        request.write(index).await.expect("write");
                    }
                    request.end().await.expect("end");
                    let mut response = request.response().await.expect("response");
                    response.read_to_end().await.expect("read")
                })
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_codec, bench_dictionary, bench_round_trip);
criterion_main!(benches);
