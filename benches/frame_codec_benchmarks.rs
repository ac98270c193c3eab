// ABOUTME: Benchmark suite for frame encode/decode performance
// ABOUTME: Measures per-frame-type codec cost and payload-size scaling

use bytes::Bytes;
use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};
use rsocket_core::frame::{
    CreditedRequestFrame, Frame, PayloadFrame, RequestChannelFrame, RequestResponseFrame,
    RequestStreamFrame, SetupFrame, SimpleRequestFrame,
};
use rsocket_core::payload::Payload;
use std::time::Duration;

fn sample_setup() -> Frame {
    Frame::Setup(SetupFrame {
        stream_id: 0,
        major_version: 1,
        minor_version: 0,
        keepalive_interval_ms: 30_000,
        max_lifetime_ms: 120_000,
        resume_token: None,
        honor_lease: false,
        metadata_mime_type: "application/json".into(),
        data_mime_type: "application/binary".into(),
        metadata: None,
        data: Bytes::new(),
    })
}

fn sample_request_response() -> Frame {
    Frame::RequestResponse(RequestResponseFrame(SimpleRequestFrame {
        stream_id: 1,
        metadata: None,
        data: Bytes::from_static(b"ping"),
    }))
}

fn sample_request_stream() -> Frame {
    Frame::RequestStream(RequestStreamFrame(CreditedRequestFrame {
        stream_id: 3,
        initial_request_n: 256,
        metadata: None,
        data: Bytes::from_static(b"tick"),
        complete: false,
    }))
}

fn sample_request_channel() -> Frame {
    Frame::RequestChannel(RequestChannelFrame(CreditedRequestFrame {
        stream_id: 5,
        initial_request_n: 256,
        metadata: None,
        data: Bytes::from_static(b"first"),
        complete: false,
    }))
}

fn sample_payload(size: usize) -> Frame {
    let data = "A".repeat(size);
    Frame::Payload(PayloadFrame::next(7, Payload::new(data)))
}

fn bench_encode(c: &mut Criterion) {
    let mut group = c.benchmark_group("encode");
    group.measurement_time(Duration::from_secs(10));

    group.bench_function("setup", |b| b.iter(|| black_box(&sample_setup()).encode()));
    group.bench_function("request_response", |b| {
        b.iter(|| black_box(&sample_request_response()).encode())
    });
    group.bench_function("request_stream", |b| {
        b.iter(|| black_box(&sample_request_stream()).encode())
    });
    group.bench_function("request_channel", |b| {
        b.iter(|| black_box(&sample_request_channel()).encode())
    });
    group.bench_function("payload", |b| {
        let frame = sample_payload(64);
        b.iter(|| black_box(&frame).encode())
    });

    group.finish();
}

fn bench_decode(c: &mut Criterion) {
    let mut group = c.benchmark_group("decode");
    group.measurement_time(Duration::from_secs(10));

    let setup_bytes = sample_setup().encode().unwrap();
    group.bench_function("setup", |b| b.iter(|| Frame::decode(black_box(&setup_bytes)).unwrap()));

    let request_response_bytes = sample_request_response().encode().unwrap();
    group.bench_function("request_response", |b| {
        b.iter(|| Frame::decode(black_box(&request_response_bytes)).unwrap())
    });

    let request_stream_bytes = sample_request_stream().encode().unwrap();
    group.bench_function("request_stream", |b| {
        b.iter(|| Frame::decode(black_box(&request_stream_bytes)).unwrap())
    });

    let payload_bytes = sample_payload(64).encode().unwrap();
    group.bench_function("payload", |b| {
        b.iter(|| Frame::decode(black_box(&payload_bytes)).unwrap())
    });

    group.finish();
}

fn bench_roundtrip(c: &mut Criterion) {
    let mut group = c.benchmark_group("roundtrip");
    group.measurement_time(Duration::from_secs(10));

    group.bench_function("request_response", |b| {
        b.iter(|| {
            let frame = sample_request_response();
            let encoded = black_box(&frame).encode().unwrap();
            Frame::decode(black_box(&encoded)).unwrap()
        })
    });

    group.bench_function("payload", |b| {
        b.iter(|| {
            let frame = sample_payload(64);
            let encoded = black_box(&frame).encode().unwrap();
            Frame::decode(black_box(&encoded)).unwrap()
        })
    });

    group.finish();
}

fn bench_payload_sizes(c: &mut Criterion) {
    let mut group = c.benchmark_group("payload_sizes");
    group.measurement_time(Duration::from_secs(10));

    let sizes = [16, 256, 4096, 65536];

    for &size in &sizes {
        let frame = sample_payload(size);
        let encoded = frame.encode().unwrap();

        group.bench_with_input(BenchmarkId::new("encode", size), &frame, |b, frame| {
            b.iter(|| black_box(frame).encode())
        });

        group.bench_with_input(BenchmarkId::new("decode", size), &encoded, |b, encoded| {
            b.iter(|| Frame::decode(black_box(encoded)).unwrap())
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_encode,
    bench_decode,
    bench_roundtrip,
    bench_payload_sizes
);
criterion_main!(benches);
