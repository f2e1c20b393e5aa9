//! # Digest Benchmarks
//!
//! Performance benchmarks for reading class files and building digests.
//!
//! Run with: `cargo bench -p annodigest-core`

use annodigest_core::{
    Annotation, ClassWriter, MemberDef, MemoryProvider, Session, TypeName, Value, read_records,
};
use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use std::hint::black_box;

/// A class with `members` annotated methods.
fn wide_class(name: &str, members: usize) -> ClassWriter {
    let mut writer = ClassWriter::new(name).annotation(
        Annotation::new("bench/Component")
            .with("value", Value::string(name))
            .with("tags", Value::Array(vec![Value::string("a"), Value::string("b")])),
    );
    for i in 0..members {
        writer = writer.method(
            MemberDef::new(format!("m{i}"), "(Ljava/lang/String;)V").annotation(
                Annotation::new("bench/Exposed").with("path", Value::string(format!("/m{i}"))),
            ),
        );
    }
    writer
}

/// A superclass chain `bench/L0 <- bench/L1 <- ... <- bench/L{depth-1}`.
fn chain_provider(depth: usize, members: usize) -> MemoryProvider {
    let mut provider = MemoryProvider::new();
    for level in 0..depth {
        let mut writer = wide_class(&format!("bench/L{level}"), members);
        if level > 0 {
            writer = writer.super_class(format!("bench/L{}", level - 1));
        }
        provider
            .insert(writer.to_bytes().expect("write"))
            .expect("insert");
    }
    provider
}

// =============================================================================
// BENCHMARKS
// =============================================================================

fn bench_read_records(c: &mut Criterion) {
    let mut group = c.benchmark_group("read_records");

    for members in [10, 100, 1000].iter() {
        let bytes = wide_class("bench/Wide", *members)
            .to_bytes()
            .expect("write");
        group.bench_with_input(BenchmarkId::from_parameter(members), &bytes, |b, bytes| {
            b.iter(|| black_box(read_records(bytes)));
        });
    }

    group.finish();
}

fn bench_full_digest(c: &mut Criterion) {
    let mut group = c.benchmark_group("full_digest");

    for depth in [2, 8, 32].iter() {
        let provider = chain_provider(*depth, 20);
        let leaf = TypeName::new(format!("bench/L{}", depth - 1));
        group.bench_with_input(BenchmarkId::from_parameter(depth), &leaf, |b, leaf| {
            b.iter(|| {
                // Fresh session each time so parsing is included.
                let session = Session::new(provider.clone());
                black_box(session.digest(leaf))
            });
        });
    }

    group.finish();
}

fn bench_cached_digest(c: &mut Criterion) {
    let session = Session::new(chain_provider(32, 20));
    let leaf = TypeName::new("bench/L31");
    session.digest(&leaf).expect("warm cache");

    c.bench_function("cached_digest_depth_32", |b| {
        b.iter(|| black_box(session.digest(&leaf)));
    });
}

criterion_group!(
    benches,
    bench_read_records,
    bench_full_digest,
    bench_cached_digest
);
criterion_main!(benches);
