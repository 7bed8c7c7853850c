//! # etx Pipeline Benchmarks
//!
//! | Benchmark | What is measured |
//! |-----------|------------------|
//! | encrypt/per_call | Instantiate + marshal + invoke + release |
//! | encrypt/shared | Marshal + invoke + release on a warm instance |
//! | encrypt/payload | Shared instance across payload sizes |

use std::sync::Arc;

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use etx_pipeline::{Encryptor, ModuleEncryptor, ModuleLifecycle, PlaintextPayload, PublicKey};
use etx_tests::fixtures;

fn encryptor(lifecycle: ModuleLifecycle) -> ModuleEncryptor {
    let factory = fixtures::factory(fixtures::FIXED_CIPHERTEXT).expect("fixture compiles");
    ModuleEncryptor::new(Arc::new(factory), lifecycle)
}

fn bench_encrypt_lifecycle(c: &mut Criterion) {
    let runtime = tokio::runtime::Runtime::new().expect("runtime");
    let key = PublicKey::from_wire(&format!("0x{}", "ab".repeat(128)), None).expect("key");
    let plaintext = PlaintextPayload::from("hello");

    let mut group = c.benchmark_group("encrypt");
    for (name, lifecycle) in [
        ("per_call", ModuleLifecycle::PerCall),
        ("shared", ModuleLifecycle::Shared),
    ] {
        let encryptor = encryptor(lifecycle);
        group.bench_function(name, |b| {
            b.iter(|| runtime.block_on(encryptor.encrypt(black_box(&plaintext), &key)))
        });
    }
    group.finish();
}

fn bench_encrypt_payload_size(c: &mut Criterion) {
    let runtime = tokio::runtime::Runtime::new().expect("runtime");
    let key = PublicKey::from_wire(&format!("0x{}", "ab".repeat(128)), None).expect("key");

    let mut group = c.benchmark_group("encrypt/payload");
    for size in [64usize, 1024, 16 * 1024] {
        let encryptor = encryptor(ModuleLifecycle::Shared);
        let plaintext = PlaintextPayload::from(vec![b'a'; size]);
        group.throughput(Throughput::Bytes(size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &plaintext, |b, plaintext| {
            b.iter(|| runtime.block_on(encryptor.encrypt(black_box(plaintext), &key)))
        });
    }
    group.finish();
}

criterion_group!(benches, bench_encrypt_lifecycle, bench_encrypt_payload_size);
criterion_main!(benches);
