use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use tokio::runtime::Runtime;
use vectorline::identifier::ContentIdentifier;
use vectorline::request::{VectorizationRequest, VectorizationStep};
use vectorline::sources::{MemoryRequestSource, RequestSource};
use vectorline::types::{ProcessingType, StepKind};

const BATCH_SIZES: &[usize] = &[64, 256, 1024];

fn sample_request() -> VectorizationRequest {
    VectorizationRequest::new(
        ContentIdentifier::new(
            "docs",
            vec!["tenant".into(), "bench.txt".into()],
            "tenant/bench.txt",
        ),
        ProcessingType::Asynchronous,
        vec![VectorizationStep::new(StepKind::Extract)],
    )
}

async fn submit_and_drain(source: &MemoryRequestSource, batch: usize) {
    let request = sample_request();
    for _ in 0..batch {
        source.submit_request(&request).await.expect("submit");
    }
    let received = source.receive_requests(batch).await.expect("receive");
    assert_eq!(received.len(), batch);
}

fn request_source_throughput(c: &mut Criterion) {
    let runtime = Runtime::new().expect("runtime");
    let mut group = c.benchmark_group("memory_source_submit_receive");

    for &batch in BATCH_SIZES {
        group.throughput(Throughput::Elements(batch as u64));
        group.bench_with_input(BenchmarkId::from_parameter(batch), &batch, |b, &size| {
            b.to_async(&runtime).iter(|| async {
                let source = MemoryRequestSource::new("extract");
                submit_and_drain(&source, size).await;
            });
        });
    }

    group.finish();
}

criterion_group!(benches, request_source_throughput);
criterion_main!(benches);
