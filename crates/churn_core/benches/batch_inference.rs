use churn_core::fixtures::{high_risk_record, low_risk_record, reference_artifact};
use churn_core::CustomerRecord;
use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

const BATCH_SIZES: [usize; 3] = [1, 64, 1024];

fn generate_batch(size: usize) -> Vec<CustomerRecord> {
    (0..size)
        .map(|idx| {
            let mut record = if idx % 2 == 0 {
                high_risk_record()
            } else {
                low_risk_record()
            };
            record.insert("age", 20.0 + (idx % 60) as f64);
            record.insert("balance", (idx as f64 * 1_373.0) % 250_000.0);
            record
        })
        .collect()
}

fn benchmark_batch_inference(c: &mut Criterion) {
    let artifact = reference_artifact();

    let mut group = c.benchmark_group("batch_inference");
    for size in BATCH_SIZES {
        let batch = generate_batch(size);
        group.throughput(Throughput::Elements(size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &batch, |b, batch| {
            b.iter(|| {
                let preds = artifact.predict(batch);
                criterion::black_box(preds)
            });
        });
    }
    group.finish();
}

criterion_group!(benches, benchmark_batch_inference);
criterion_main!(benches);
