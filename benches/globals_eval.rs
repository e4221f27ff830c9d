use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use std::fs;
use std::time::Duration;
use tempfile::TempDir;
use terramate::core::{globals, loader, path::ProjectPath};

fn write_globals_tree(root: &std::path::Path, depth: usize, keys_per_level: usize) {
    let mut dir = root.to_path_buf();
    for level in 0..depth {
        fs::create_dir_all(&dir).unwrap();
        let mut body = String::from("globals {\n");
        for k in 0..keys_per_level {
            body.push_str(&format!("  k{level}_{k} = {level}\n"));
        }
        body.push_str("}\n");
        fs::write(dir.join("globals.tm"), body).unwrap();
        dir = dir.join(format!("d{level}"));
    }
    fs::create_dir_all(&dir).unwrap();
    fs::write(dir.join("stack.tm"), "stack {}\n").unwrap();
}

fn bench_globals_evaluate(c: &mut Criterion) {
    let mut group = c.benchmark_group("globals_evaluate");
    group.measurement_time(Duration::from_secs(10));

    for depth in [2, 8, 32].iter() {
        let temp_dir = TempDir::new().unwrap();
        write_globals_tree(temp_dir.path(), *depth, 5);
        let result = loader::load(temp_dir.path());
        let stack_dir = result
            .tree
            .stack_dirs()
            .into_iter()
            .next()
            .unwrap_or_else(ProjectPath::root);

        group.bench_with_input(BenchmarkId::new("depth", depth), depth, |b, _| {
            b.iter(|| {
                let value = globals::evaluate(&result.tree, &stack_dir).unwrap();
                black_box(value);
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_globals_evaluate);
criterion_main!(benches);
