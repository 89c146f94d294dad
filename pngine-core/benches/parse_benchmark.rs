use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use pngine_core::bytecode::parse;
use pngine_core::testing::ProgramBuilder;

const COMPUTE_WGSL: &str = "@compute @workgroup_size(64) fn cs_main() {}";
const RENDER_WGSL: &str = "// vs_main / fs_main placeholder";

/// A stream shaped like a real mid-sized animation: a few pipelines,
/// a handful of buffers, and a timeline of overlapping windows.
fn build_stream(instructions: u32) -> Vec<u8> {
    let mut b = ProgramBuilder::new()
        .buffer(1, 4096, 0b010)
        .buffer(2, 256, 0b001)
        .texture(3, 512, 512, 0, 0b101)
        .compute_pipeline(4, "cs_main", COMPUTE_WGSL)
        .render_pipeline(5, "main", RENDER_WGSL)
        .bind_group(6, 4, 0, &[(0, 1), (1, 2)])
        .clear(0.0, f32::INFINITY, [0.0, 0.0, 0.0, 1.0]);
    for i in 0..instructions {
        let start = i as f32 * 0.1;
        b = b
            .dispatch(start, start + 1.0, 4, Some(6), [8, 8, 1])
            .draw(start, start + 1.0, 5, None, 3, 1);
    }
    b.build()
}

fn bench_parse(c: &mut Criterion) {
    let mut group = c.benchmark_group("PNGB parse");

    for count in [10u32, 100, 1000] {
        let bytes = build_stream(count);
        group.throughput(Throughput::Bytes(bytes.len() as u64));
        group.bench_function(format!("{count}_instructions"), |b| {
            b.iter(|| {
                let program = parse(black_box(&bytes)).unwrap();
                black_box(program);
            })
        });
    }

    group.finish();
}

fn bench_reject_truncated(c: &mut Criterion) {
    let bytes = build_stream(100);
    let truncated = &bytes[..bytes.len() / 2];

    c.bench_function("PNGB reject truncated", |b| {
        b.iter(|| {
            let err = parse(black_box(truncated)).unwrap_err();
            black_box(err);
        })
    });
}

criterion_group!(benches, bench_parse, bench_reject_truncated);
criterion_main!(benches);
