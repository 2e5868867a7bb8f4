//! Benchmarks for directory discovery (spec.md C7 step 1).
//!
//! Run with: cargo bench -p cq-index --bench discovery_bench

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use cq_index::{discover, DiscoveryConfig};
use std::fs;
use tempfile::TempDir;

fn create_test_repo(file_count: usize, avg_lines: usize) -> TempDir {
  let dir = TempDir::new().unwrap();
  fs::create_dir(dir.path().join(".git")).unwrap();

  let src_dir = dir.path().join("src");
  fs::create_dir(&src_dir).unwrap();
  for i in 0..file_count {
    fs::write(src_dir.join(format!("module_{i}.rs")), generate_file(avg_lines, i)).unwrap();
  }

  let target_dir = dir.path().join("target");
  fs::create_dir(&target_dir).unwrap();
  for i in 0..10 {
    fs::write(target_dir.join(format!("build_{i}.rs")), "ignored").unwrap();
  }

  dir
}

fn generate_file(lines: usize, seed: usize) -> String {
  let mut content = String::from("//! module\n\nuse std::collections::HashMap;\n\n");
  for i in 0..(lines / 10) {
    content.push_str(&format!("pub fn function_{seed}_{i}(arg: i32) -> i32 {{ arg * 2 + {i} }}\n"));
  }
  content
}

fn bench_discover_small_repo(c: &mut Criterion) {
  let dir = create_test_repo(20, 50);
  c.bench_function("discover_20_files", |b| {
    b.iter(|| discover(black_box(dir.path()), &DiscoveryConfig::default()).unwrap());
  });
}

fn bench_discover_medium_repo(c: &mut Criterion) {
  let dir = create_test_repo(100, 100);
  c.bench_function("discover_100_files", |b| {
    b.iter(|| discover(black_box(dir.path()), &DiscoveryConfig::default()).unwrap());
  });
}

fn bench_discover_parallel_workers(c: &mut Criterion) {
  let dir = create_test_repo(150, 80);
  let mut group = c.benchmark_group("discover_workers");
  for workers in [1, 2, 4, 8] {
    let cfg = DiscoveryConfig { workers, ..DiscoveryConfig::default() };
    group.bench_with_input(BenchmarkId::from_parameter(workers), &cfg, |b, cfg| {
      b.iter(|| discover(black_box(dir.path()), cfg).unwrap());
    });
  }
  group.finish();
}

criterion_group!(benches, bench_discover_small_repo, bench_discover_medium_repo, bench_discover_parallel_workers);
criterion_main!(benches);
