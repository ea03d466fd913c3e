//! Performance benchmarks for aparavi-dtc
//!
//! Run with: cargo bench

use aparavi_dtc::{
    MemoryTransport, PipelineDefinition, PipelineSession, SendOutcome, SessionOptions,
};
use criterion::{criterion_group, criterion_main, Criterion};
use std::sync::Arc;

fn webhook_body(objects: usize, text_len: usize) -> serde_json::Value {
    let mut map = serde_json::Map::new();
    for i in 0..objects {
        map.insert(
            format!("obj-{}", i),
            serde_json::json!({ "text": ["x".repeat(text_len)], "classifications": ["PERSON"] }),
        );
    }
    serde_json::json!({ "data": { "objects": map } })
}

fn bench_extraction(c: &mut Criterion) {
    let small = webhook_body(1, 64);
    c.bench_function("SendOutcome::from_response (1 object)", |b| {
        b.iter(|| SendOutcome::from_response(small.clone()));
    });

    let wide = webhook_body(50, 64);
    c.bench_function("SendOutcome::from_response (50 objects)", |b| {
        b.iter(|| SendOutcome::from_response(wide.clone()));
    });

    let raw = serde_json::json!({ "data": { "status": "accepted" } });
    c.bench_function("SendOutcome::from_response (fallback)", |b| {
        b.iter(|| SendOutcome::from_response(raw.clone()));
    });

    let bytes = serde_json::to_vec(&webhook_body(1, 4096)).unwrap();
    c.bench_function("webhook body parse + extract (4 KiB)", |b| {
        b.iter(|| {
            let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
            SendOutcome::from_response(body)
        });
    });
}

fn bench_pipeline_definition(c: &mut Criterion) {
    c.bench_function("PipelineDefinition::embedded", |b| {
        b.iter(|| PipelineDefinition::embedded().unwrap());
    });

    let definition = PipelineDefinition::embedded().unwrap();
    c.bench_function("PipelineDefinition::launch_body", |b| {
        b.iter(|| definition.launch_body());
    });
}

fn bench_memory_send(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();

    let session = rt.block_on(async {
        let session = PipelineSession::new(
            Arc::new(MemoryTransport::new()),
            PipelineDefinition::embedded().unwrap(),
            SessionOptions::default(),
        );
        session.start().await.unwrap();
        session
    });

    c.bench_function("MemoryTransport send", |b| {
        b.to_async(&rt)
            .iter(|| async { session.send("Call Jane Doe at 555-0100").await.unwrap() });
    });

    c.bench_function("MemoryTransport start + tear_down", |b| {
        b.to_async(&rt).iter(|| async {
            let session = PipelineSession::new(
                Arc::new(MemoryTransport::new()),
                PipelineDefinition::embedded().unwrap(),
                SessionOptions::default(),
            );
            session.start().await.unwrap();
            session.tear_down().await.unwrap();
        });
    });
}

criterion_group!(
    benches,
    bench_extraction,
    bench_pipeline_definition,
    bench_memory_send,
);
criterion_main!(benches);
