//! Benchmarks for chunk storage access and wire blob round-trips.

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use vx_schemas::coordinates::{AbsChunkPos, InChunkPos, CHUNK_DIM3Z};
use vx_schemas::voxel::{BlockData, Chunk};

fn checkerboard_chunk() -> Chunk {
    let mut chunk = Chunk::new_built(AbsChunkPos::ZERO, 0, 15);
    for idx in 0..CHUNK_DIM3Z {
        let pos = InChunkPos::try_from_index(idx).unwrap();
        let value = if idx % 2 == 0 {
            BlockData::new(1, 15, 0)
        } else {
            BlockData::AIR
        };
        chunk.set(pos, value).unwrap();
    }
    chunk
}

fn bench_chunk_access(c: &mut Criterion) {
    let dense = checkerboard_chunk();
    let monotone = Chunk::new_built(AbsChunkPos::ZERO, 0, 15);

    c.bench_function("chunk/get dense", |b| {
        b.iter(|| {
            let mut acc = 0u32;
            for idx in (0..CHUNK_DIM3Z).step_by(7) {
                let pos = InChunkPos::try_from_index(idx).unwrap();
                acc = acc.wrapping_add(dense.get(black_box(pos)).to_bits());
            }
            acc
        })
    });

    c.bench_function("chunk/get monotone", |b| {
        b.iter(|| {
            let mut acc = 0u32;
            for idx in (0..CHUNK_DIM3Z).step_by(7) {
                let pos = InChunkPos::try_from_index(idx).unwrap();
                acc = acc.wrapping_add(monotone.get(black_box(pos)).to_bits());
            }
            acc
        })
    });
}

fn bench_blob_round_trip(c: &mut Criterion) {
    let dense = checkerboard_chunk();
    c.bench_function("chunk/export dense", |b| b.iter(|| black_box(&dense).export()));

    let blob = dense.export();
    c.bench_function("chunk/from_blob dense", |b| {
        b.iter(|| Chunk::from_blob(AbsChunkPos::ZERO, 0, black_box(&blob)).unwrap())
    });
}

criterion_group!(benches, bench_chunk_access, bench_blob_round_trip);
criterion_main!(benches);
