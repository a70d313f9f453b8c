use criterion::{Criterion, Throughput, black_box, criterion_group, criterion_main};
use strata_icc::{IdPublisher, IdSubscriber, Publisher, Subscriber};
use strata_perf::temp_shm_root;

const HWM: usize = 1 << 16;

fn channel(label: &str) -> (IdPublisher, IdSubscriber, std::path::PathBuf) {
    let root = temp_shm_root(label);
    let path = root.join("bench.ids");
    let publisher = IdPublisher::create(&path, HWM).expect("failed to create publisher");
    let subscriber = IdSubscriber::open(&path).expect("failed to open subscriber");
    (publisher, subscriber, root)
}

fn bench_publish(c: &mut Criterion) {
    let (mut publisher, _subscriber, root) = channel("pub");
    let mut group = c.benchmark_group("notify");
    group.throughput(Throughput::Elements(1));

    let mut id = 0u64;
    group.bench_function("publish", |b| {
        b.iter(|| {
            id += 1;
            publisher.publish(black_box(id)).expect("publish");
        });
    });

    drop(group);
    let _ = std::fs::remove_dir_all(&root);
}

fn bench_try_next(c: &mut Criterion) {
    let (mut publisher, mut subscriber, root) = channel("read");
    let mut group = c.benchmark_group("notify");
    group.throughput(Throughput::Elements(1));

    group.bench_function("try_next (pending)", |b| {
        b.iter_custom(|iters| {
            for id in 0..iters {
                publisher.publish(id).expect("publish");
            }
            let start = std::time::Instant::now();
            for _ in 0..iters {
                black_box(subscriber.try_next());
            }
            start.elapsed()
        });
    });

    group.bench_function("try_next (empty)", |b| {
        b.iter(|| black_box(subscriber.try_next()));
    });

    drop(group);
    let _ = std::fs::remove_dir_all(&root);
}

fn bench_hwm(c: &mut Criterion) {
    let mut group = c.benchmark_group("notify_hwm");
    group.throughput(Throughput::Elements(1));

    for &hwm in &[1024usize, 16384, 65536] {
        let root = temp_shm_root(&format!("hwm_{hwm}"));
        let path = root.join("bench.ids");
        let mut publisher = IdPublisher::create(&path, hwm).expect("failed to create publisher");
        let mut subscriber = IdSubscriber::open(&path).expect("failed to open subscriber");

        let mut id = 0u64;
        group.bench_function(format!("round_trip_hwm_{hwm}"), |b| {
            b.iter(|| {
                id += 1;
                publisher.publish(black_box(id)).expect("publish");
                black_box(subscriber.try_next());
            });
        });

        let _ = std::fs::remove_dir_all(&root);
    }

    group.finish();
}

criterion_group!(benches, bench_publish, bench_try_next, bench_hwm);
criterion_main!(benches);
