//! Criterion benchmark untuk Cirbuf
//!
//! Run dengan: cargo bench

use cirbuf::{page_size, Cirbuf};
use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};

const CAPACITY: usize = 64 * 1024;

fn bench_offer_poll(c: &mut Criterion) {
    let mut group = c.benchmark_group("cirbuf");

    for msg_size in [16usize, 256, 4096].iter() {
        let msg = vec![0xA5u8; *msg_size];
        group.throughput(Throughput::Bytes(*msg_size as u64));

        // Offer + poll dengan ukuran yang sama: head/tail terus berputar
        group.bench_function(format!("offer_poll_{}", msg_size), |b| {
            let mut cb = Cirbuf::new(CAPACITY).unwrap();
            b.iter(|| {
                cb.offer(black_box(&msg));
                black_box(cb.poll(msg.len()));
            });
        });
    }

    // Pesan 3000 byte sengaja tidak membagi capacity, jadi sering melewati boundary
    group.throughput(Throughput::Bytes(3000));
    group.bench_function("offer_poll_straddling", |b| {
        let mut cb = Cirbuf::new(CAPACITY).unwrap();
        let msg = vec![0x5Au8; 3000];
        b.iter(|| {
            while cb.offer(black_box(&msg)) == 0 {
                cb.poll(msg.len());
            }
        });
    });

    group.finish();
}

fn bench_fill_drain(c: &mut Criterion) {
    let mut group = c.benchmark_group("staging");
    let chunk = vec![1u8; 10_000];
    group.throughput(Throughput::Bytes(chunk.len() as u64));

    group.bench_function("fill_from_drain_to", |b| {
        let mut cb = Cirbuf::new(4 * page_size()).unwrap();
        let mut sink = std::io::sink();
        b.iter(|| {
            let mut src: &[u8] = &chunk;
            while !src.is_empty() {
                cb.fill_from(&mut src).unwrap();
                cb.drain_to(&mut sink).unwrap();
            }
        });
    });

    group.finish();
}

criterion_group!(benches, bench_offer_poll, bench_fill_drain);
criterion_main!(benches);
