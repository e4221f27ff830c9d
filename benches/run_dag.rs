use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use std::time::Duration;
use terramate::core::path::ProjectPath;
use terramate::core::rundag;
use terramate::core::stack::{Stack, StackRef};

fn chain(n: usize) -> Vec<Stack> {
    let mut stacks = Vec::with_capacity(n);
    for i in 0..n {
        let mut s = Stack::new(ProjectPath::new(&format!("/s{i}")));
        if i > 0 {
            s.after.push(StackRef::Path(format!("/s{}", i - 1)));
        }
        stacks.push(s);
    }
    stacks
}

fn bench_build_and_order(c: &mut Criterion) {
    let mut group = c.benchmark_group("run_dag");
    group.measurement_time(Duration::from_secs(10));

    for size in [10, 100, 1000].iter() {
        let stacks = chain(*size);
        let candidates: Vec<ProjectPath> = stacks.iter().map(|s| s.dir.clone()).collect();

        group.bench_with_input(BenchmarkId::new("build", size), size, |b, _| {
            b.iter(|| {
                let dag = rundag::build(&stacks, &candidates).unwrap();
                black_box(dag);
            });
        });

        let dag = rundag::build(&stacks, &candidates).unwrap();
        group.bench_with_input(BenchmarkId::new("topological_order", size), size, |b, _| {
            b.iter(|| {
                let order = rundag::topological_order(&dag, false);
                black_box(order);
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_build_and_order);
criterion_main!(benches);
