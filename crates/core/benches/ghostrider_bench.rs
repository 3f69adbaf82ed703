//! Benchmarks for GhostRider sequencing and hashing

use criterion::{Criterion, black_box, criterion_group, criterion_main};
use ghostrider_core::{
    FourWayKernel, HEADER_LEN, HashKernel, HeaderWords, NONCE_WORD, WorkerContext,
    derive_from_header, derive_sequence, format_header,
};

const HEADER_HEX: &str = "00000020a1b2c3d4e5f60718293a4b5c6d7e8f90a1b2c3d4e5f60718293a4b5c6d7e8f90\
                          0f1e2d3c4b5a69788796a5b4c3d2e1f00f1e2d3c4b5a69788796a5b4c3d2e1f0\
                          5f5e1000ffff001d00000000";

fn bench_header() -> [u8; HEADER_LEN] {
    let bytes = hex::decode(HEADER_HEX).expect("valid hex");
    bytes.try_into().expect("80-byte header")
}

fn bench_derive_sequence(c: &mut Criterion) {
    let header = bench_header();
    c.bench_function("derive_sequence", |b| {
        b.iter(|| derive_from_header(black_box(&header)))
    });

    c.bench_function("derive_sequence_varying", |b| {
        let mut bytes = [0u8; 32];
        let mut n: u64 = 0;
        b.iter(|| {
            bytes[..8].copy_from_slice(&n.to_le_bytes());
            n = n.wrapping_add(1);
            derive_sequence(black_box(&bytes))
        })
    });
}

fn bench_hash(c: &mut Criterion) {
    let header = bench_header();
    let mut ctx = WorkerContext::new(0);
    ctx.prepare(derive_from_header(&header), [0; 6])
        .expect("scratch allocation");

    c.bench_function("ghostrider_single", |b| {
        let kernel = ghostrider_core::ScalarKernel;
        let mut input: [HeaderWords; 1] = [format_header(&header)];
        let mut out = [[0u8; 32]; 1];
        b.iter(|| {
            input[0][NONCE_WORD] = input[0][NONCE_WORD].wrapping_add(1);
            kernel.hash(&mut ctx, black_box(&input), &mut out).unwrap();
            out[0]
        })
    });

    let mut ctx = WorkerContext::new(0);
    ctx.prepare(derive_from_header(&header), [1; 6])
        .expect("scratch allocation");

    c.bench_function("ghostrider_4way_doubled", |b| {
        let base = format_header(&header);
        let mut inputs = [base; 4];
        let mut out = [[0u8; 32]; 4];
        let mut nonce = 0u32;
        b.iter(|| {
            for (lane, input) in inputs.iter_mut().enumerate() {
                input[NONCE_WORD] = nonce.wrapping_add(lane as u32);
            }
            nonce = nonce.wrapping_add(4);
            FourWayKernel.hash(&mut ctx, black_box(&inputs), &mut out).unwrap();
            out
        })
    });
}

criterion_group!(benches, bench_derive_sequence, bench_hash);
criterion_main!(benches);
