//! Feed throughput benchmark suite.
//!
//! Measures how fast segments move through a `StreamBuffer` into a headless
//! surface:
//! - Segment sizes: 256 B, 4 KiB, 32 KiB
//! - Completion: synchronous appends, deferred appends (queue path)
//!
//! The surface capacity is small enough that eviction runs repeatedly.
//!
//! Run with: cargo bench --bench feed_throughput
//! Results saved to: target/criterion/

use bytes::Bytes;
use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use tokio::runtime::Runtime;

use remote_audio::{
    BufferOptions, Codec, Completion, MemorySurface, MemorySurfaceOptions, StreamBuffer,
};

// ============================================================================
// Benchmark Parameters
// ============================================================================

const SEGMENT_SIZES: &[usize] = &[256, 4 * 1024, 32 * 1024];
const SEGMENTS_PER_ITER: usize = 512;
const CAPACITY_BYTES: usize = 1024 * 1024;
const BYTES_PER_SECOND: f64 = 12_000.0;

// ============================================================================
// Benchmark: Feed
// ============================================================================

fn bench_feed(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();

    let mut group = c.benchmark_group("feed");

    for &size in SEGMENT_SIZES {
        group.throughput(Throughput::Bytes((size * SEGMENTS_PER_ITER) as u64));

        for (name, completion) in [
            ("immediate", Completion::Immediate),
            ("deferred", Completion::Deferred),
        ] {
            group.bench_with_input(BenchmarkId::new(name, size), &size, |b, &size| {
                b.to_async(&rt)
                    .iter(|| async move { feed_segments(completion, size).await });
            });
        }
    }

    group.finish();
}

// ============================================================================
// Helpers
// ============================================================================

async fn feed_segments(completion: Completion, size: usize) -> usize {
    let surface = MemorySurface::new(
        MemorySurfaceOptions::default()
            .with_capacity(CAPACITY_BYTES)
            .with_bytes_per_second(BYTES_PER_SECOND)
            .with_completion(completion)
            .with_recording(false),
    );
    let probe = surface.probe();

    let options = BufferOptions::default().with_max_pending(SEGMENTS_PER_ITER);
    let mut buffer = StreamBuffer::for_codec(Codec::Opus, options);
    buffer.attach(surface).await.unwrap();

    let segment = Bytes::from(vec![0u8; size]);

    for n in 0..SEGMENTS_PER_ITER {
        buffer.feed(segment.clone()).unwrap();

        // Let the queue build up before draining it
        if n % 8 == 7 {
            drain(&mut buffer, &probe).await;
        }
    }
    drain(&mut buffer, &probe).await;

    buffer.detach().await;
    probe.appended_bytes()
}

async fn drain(buffer: &mut StreamBuffer<MemorySurface>, probe: &remote_audio::MemoryProbe) {
    while probe.complete_update() {
        let event = buffer.next_event().await.unwrap();
        buffer.handle_event(event).unwrap();
    }
}

// ============================================================================
// Criterion Setup
// ============================================================================

criterion_group!(benches, bench_feed);
criterion_main!(benches);
