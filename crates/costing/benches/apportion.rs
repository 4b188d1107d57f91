use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};

use ironbooks_costing::apportion;

fn bench_apportion(c: &mut Criterion) {
    let mut group = c.benchmark_group("apportion");
    for lines in [10usize, 100, 1_000] {
        let basis: Vec<u64> = (0..lines as u64).map(|i| (i * 7_919) % 1_013 + 1).collect();
        group.bench_with_input(BenchmarkId::from_parameter(lines), &basis, |b, basis| {
            b.iter(|| apportion(black_box(123_456_789), black_box(basis)))
        });
    }
    group.finish();
}

criterion_group!(benches, bench_apportion);
criterion_main!(benches);
